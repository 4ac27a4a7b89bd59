//! Vector velocity resolution for multi-beam incoherent-scatter radar.
//!
//! Line-of-sight drifts are filtered, mapped into magnetic apex coordinates, binned
//! in magnetic latitude, integrated in time and inverted into 3-D plasma drift and
//! convection electric field estimates, then projected back to geodetic components.

pub mod apex;
pub mod math;
pub mod measurement;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use apex::{ApexModel, DipoleApex};
pub use measurement::{Beam, GateGeometry, MeasurementSet, RadarSite, TimeRecord};
pub use pipeline::{ResolvedVectors, Resolver};
pub use prelude::{ResolveConfig, StageError, StageResult};
