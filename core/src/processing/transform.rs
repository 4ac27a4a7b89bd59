use nalgebra::Vector3;
use serde::Serialize;

use crate::apex::ApexModel;
use crate::measurement::GateGeometry;
use crate::prelude::StageResult;
use crate::telemetry::log::LogManager;

/// Apex coordinates and geometry of one range gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ApexBasis {
    pub mlat: f64,
    pub mlon: f64,
    /// Covariant base vectors d1, d2, d3 in east/north/up components.
    pub d: [Vector3<f64>; 3],
    /// Projection of the geodetic k-vector onto (d1, d2, d3).
    pub a: Vector3<f64>,
    /// Flux-tube scale factor, |d1 x d2|.
    pub scale: f64,
}

impl ApexBasis {
    pub fn nan() -> Self {
        let nan = Vector3::from_element(f64::NAN);
        Self {
            mlat: f64::NAN,
            mlon: f64::NAN,
            d: [nan; 3],
            a: nan,
            scale: f64::NAN,
        }
    }
}

/// Per-gate apex geometry, index-aligned with the measurement gates.
#[derive(Debug, Clone, Serialize)]
pub struct ApexGeometry {
    pub gates: Vec<ApexBasis>,
}

impl ApexGeometry {
    pub fn mlat(&self) -> Vec<f64> {
        self.gates.iter().map(|g| g.mlat).collect()
    }

    pub fn mlon(&self) -> Vec<f64> {
        self.gates.iter().map(|g| g.mlon).collect()
    }
}

/// Maps gate positions and k-vectors into the apex frame.
pub struct TransformStage {
    logger: LogManager,
}

impl TransformStage {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("transform"),
        }
    }

    pub fn execute<M: ApexModel>(
        &self,
        geometry: &GateGeometry,
        model: &M,
    ) -> StageResult<ApexGeometry> {
        let mut gates = Vec::with_capacity(geometry.len());
        let mut skipped = 0usize;

        for idx in 0..geometry.len() {
            let (lat, lon, alt) = (geometry.lat[idx], geometry.lon[idx], geometry.alt[idx]);
            if !(lat.is_finite() && lon.is_finite() && alt.is_finite()) {
                gates.push(ApexBasis::nan());
                skipped += 1;
                continue;
            }

            let alt_km = alt / 1000.0;
            let (mlat, mlon) = model.geo_to_apex(lat, lon, alt_km)?;
            let basis = model.basis_vectors(lat, lon, alt_km)?;
            let k = Vector3::new(geometry.ke[idx], geometry.kn[idx], geometry.kz[idx]);

            gates.push(ApexBasis {
                mlat,
                mlon,
                d: basis.d,
                a: Vector3::new(k.dot(&basis.d[0]), k.dot(&basis.d[1]), k.dot(&basis.d[2])),
                scale: basis.scale_factor(),
            });
        }

        self.logger.record(&format!(
            "transformed {} gates at epoch {:.3} ({} without position)",
            gates.len(),
            model.epoch(),
            skipped
        ));
        Ok(ApexGeometry { gates })
    }
}

impl Default for TransformStage {
    fn default() -> Self {
        Self::new()
    }
}
