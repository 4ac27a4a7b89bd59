pub mod binning;
pub mod efield;
pub mod filter;
pub mod geodetic;
pub mod integration;
pub mod outflow;
pub mod transform;
pub mod vvels;

pub use binning::{Bin, BinningStage};
pub use efield::{ElectricField, ElectricFieldStage};
pub use filter::{FilterStage, LosSeries};
pub use geodetic::{GeodeticOutput, GeodeticStage};
pub use integration::{IntegrationPeriod, IntegrationStage};
pub use outflow::OutflowStage;
pub use transform::{ApexBasis, ApexGeometry, TransformStage};
pub use vvels::{vvels, CellOutcome, VelocityEstimate, VelocityField, VelocityStage};
