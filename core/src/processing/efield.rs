use nalgebra::Matrix3;
use ndarray::{Array1, Array3, Array4};
use serde::Serialize;

use crate::apex::ApexModel;
use crate::math::matrix::MatrixHelper;
use crate::prelude::{StageError, StageResult};
use crate::processing::binning::Bin;
use crate::processing::vvels::VelocityField;
use crate::telemetry::log::LogManager;

/// Convection electric field in covariant apex components (Ed1, Ed2, Ed3).
#[derive(Debug, Clone, Serialize)]
pub struct ElectricField {
    /// Be3 at each bin's representative location, tesla.
    pub be3: Array1<f64>,
    /// (periods, bins, 3), V/m
    pub field: Array3<f64>,
    /// (periods, bins, 3, 3)
    pub covariance: Array4<f64>,
}

/// `E = -V x B` in apex components; only the two perpendicular axes survive.
pub fn drift_to_field(be3: f64) -> Matrix3<f64> {
    Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0) * be3
}

pub struct ElectricFieldStage {
    altitude: f64,
    logger: LogManager,
}

impl ElectricFieldStage {
    /// `altitude` is the km height at which Be3 is evaluated.
    pub fn new(altitude: f64) -> Self {
        Self {
            altitude,
            logger: LogManager::new("efield"),
        }
    }

    pub fn execute<M: ApexModel>(
        &self,
        velocity: &VelocityField,
        bins: &[Bin],
        model: &M,
    ) -> StageResult<ElectricField> {
        let (periods, nbins, _) = velocity.velocity.dim();
        if nbins != bins.len() {
            return Err(StageError::ShapeMismatch {
                name: "velocity",
                expected: format!("{} bins", bins.len()),
                found: format!("{nbins} bins"),
            });
        }

        let mut be3 = Array1::from_elem(nbins, f64::NAN);
        for (idx, bin) in bins.iter().enumerate() {
            if bin.mlat.is_finite() && bin.mlon.is_finite() {
                be3[idx] = model.field_magnitude(bin.mlat, bin.mlon, self.altitude)?;
            }
        }

        let mut field = Array3::from_elem((periods, nbins, 3), f64::NAN);
        let mut covariance = Array4::from_elem((periods, nbins, 3, 3), f64::NAN);
        for t in 0..periods {
            for b in 0..nbins {
                let (v, s) = velocity.estimate(t, b);
                let (e, se) = MatrixHelper::rotate(&drift_to_field(be3[b]), &v, &s);
                for i in 0..3 {
                    field[[t, b, i]] = e[i];
                    for j in 0..3 {
                        covariance[[t, b, i, j]] = se[(i, j)];
                    }
                }
            }
        }

        let missing = be3.iter().filter(|b| !b.is_finite()).count();
        if missing > 0 {
            self.logger
                .caution(&format!("{missing} bins have no field magnitude"));
        }
        self.logger.record(&format!(
            "derived electric field for {periods} periods x {nbins} bins at {} km",
            self.altitude
        ));
        Ok(ElectricField {
            be3,
            field,
            covariance,
        })
    }
}
