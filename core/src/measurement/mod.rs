pub mod record;
pub mod set;
pub mod site;

pub use record::{decimal_year, TimeRecord};
pub use set::{BeamProfile, GateGeometry, MeasurementSet};
pub use site::{Beam, RadarSite};
