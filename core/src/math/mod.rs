pub mod interp;
pub mod matrix;
pub mod stats;

pub use interp::lin_interp;
pub use matrix::MatrixHelper;
pub use stats::StatsHelper;
