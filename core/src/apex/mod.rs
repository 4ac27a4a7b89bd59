//! Geomagnetic apex coordinates, consumed by the pipeline through [`ApexModel`].
//!
//! Positions are geodetic latitude/longitude in degrees and altitude in km. Vector
//! quantities are expressed in local geodetic east/north/up components.

pub mod dipole;

pub use dipole::DipoleApex;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::prelude::StageResult;

/// Covariant (`d`) and contravariant (`e`) apex base vectors at one location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasisVectors {
    pub d: [Vector3<f64>; 3],
    pub e: [Vector3<f64>; 3],
}

impl BasisVectors {
    pub fn nan() -> Self {
        let nan = Vector3::from_element(f64::NAN);
        Self {
            d: [nan; 3],
            e: [nan; 3],
        }
    }

    /// Magnitude of `d1 x d2`, the flux-tube scale factor D.
    pub fn scale_factor(&self) -> f64 {
        self.d[0].cross(&self.d[1]).norm()
    }
}

/// Apex coordinate model evaluated at a single epoch.
///
/// Implementations reject non-finite positions with an error; callers strip
/// missing gates before calling in.
pub trait ApexModel: Sized + Send + Sync {
    /// Initializes the model for a decimal year.
    fn at_epoch(year: f64) -> StageResult<Self>;

    fn epoch(&self) -> f64;

    /// Geodetic position to (apex latitude, apex longitude).
    fn geo_to_apex(&self, lat: f64, lon: f64, alt: f64) -> StageResult<(f64, f64)>;

    /// Apex position to geodetic (latitude, longitude) at altitude `alt`.
    /// NaN when the field line does not reach that altitude.
    fn apex_to_geo(&self, mlat: f64, mlon: f64, alt: f64) -> StageResult<(f64, f64)>;

    fn basis_vectors(&self, lat: f64, lon: f64, alt: f64) -> StageResult<BasisVectors>;

    /// Field component along e3, `Be3 = |B| / D`, in tesla.
    fn field_magnitude(&self, mlat: f64, mlon: f64, alt: f64) -> StageResult<f64>;
}
