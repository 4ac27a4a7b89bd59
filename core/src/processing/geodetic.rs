use nalgebra::{Matrix3, Vector3};
use ndarray::{Array1, Array2, Array3, Array4};
use serde::Serialize;

use crate::apex::{ApexModel, BasisVectors};
use crate::math::matrix::MatrixHelper;
use crate::prelude::{StageError, StageResult};
use crate::processing::binning::Bin;
use crate::processing::efield::ElectricField;
use crate::processing::vvels::VelocityField;
use crate::telemetry::log::LogManager;

/// Vectors re-expressed in local geodetic east/north/up at a fixed altitude.
#[derive(Debug, Clone, Serialize)]
pub struct GeodeticOutput {
    pub gdlat: Array1<f64>,
    pub gdlon: Array1<f64>,
    /// km, one value per bin
    pub gdalt: Array1<f64>,
    pub velocity: Array3<f64>,
    pub velocity_covariance: Array4<f64>,
    pub velocity_magnitude: Array2<f64>,
    pub field: Array3<f64>,
    pub field_covariance: Array4<f64>,
    pub field_magnitude: Array2<f64>,
}

pub struct GeodeticStage {
    altitude: f64,
    logger: LogManager,
}

struct Projected {
    vector: Array3<f64>,
    covariance: Array4<f64>,
    magnitude: Array2<f64>,
}

impl Projected {
    fn new(periods: usize, bins: usize) -> Self {
        Self {
            vector: Array3::from_elem((periods, bins, 3), f64::NAN),
            covariance: Array4::from_elem((periods, bins, 3, 3), f64::NAN),
            magnitude: Array2::from_elem((periods, bins), f64::NAN),
        }
    }

    fn store(&mut self, t: usize, b: usize, vector: Vector3<f64>, covariance: Matrix3<f64>) {
        for i in 0..3 {
            self.vector[[t, b, i]] = vector[i];
            for j in 0..3 {
                self.covariance[[t, b, i, j]] = covariance[(i, j)];
            }
        }
        self.magnitude[[t, b]] = vector.norm();
    }
}

impl GeodeticStage {
    /// `altitude` is the km height at which bins are placed.
    pub fn new(altitude: f64) -> Self {
        Self {
            altitude,
            logger: LogManager::new("geodetic"),
        }
    }

    pub fn execute<M: ApexModel>(
        &self,
        velocity: &VelocityField,
        field: &ElectricField,
        bins: &[Bin],
        model: &M,
    ) -> StageResult<GeodeticOutput> {
        let (periods, nbins, _) = velocity.velocity.dim();
        if nbins != bins.len() || field.field.dim() != velocity.velocity.dim() {
            return Err(StageError::ShapeMismatch {
                name: "field",
                expected: format!("{periods} periods x {} bins", bins.len()),
                found: format!("{:?} and {:?}", velocity.velocity.dim(), field.field.dim()),
            });
        }

        let mut gdlat = Array1::from_elem(nbins, f64::NAN);
        let mut gdlon = Array1::from_elem(nbins, f64::NAN);
        let mut basis = vec![BasisVectors::nan(); nbins];
        for (idx, bin) in bins.iter().enumerate() {
            if !(bin.mlat.is_finite() && bin.mlon.is_finite()) {
                continue;
            }
            let (lat, lon) = model.apex_to_geo(bin.mlat, bin.mlon, self.altitude)?;
            if lat.is_finite() && lon.is_finite() {
                gdlat[idx] = lat;
                gdlon[idx] = lon;
                basis[idx] = model.basis_vectors(lat, lon, self.altitude)?;
            }
        }

        let mut projected_v = Projected::new(periods, nbins);
        let mut projected_e = Projected::new(periods, nbins);
        for (b, vectors) in basis.iter().enumerate() {
            let to_enu_v = MatrixHelper::from_basis(&vectors.e);
            let to_enu_e = MatrixHelper::from_basis(&vectors.d);
            for t in 0..periods {
                let (v, sv) = velocity.estimate(t, b);
                let (v, sv) = MatrixHelper::rotate(&to_enu_v, &v, &sv);
                projected_v.store(t, b, v, sv);

                let e = Vector3::from_fn(|i, _| field.field[[t, b, i]]);
                let se = Matrix3::from_fn(|i, j| field.covariance[[t, b, i, j]]);
                let (e, se) = MatrixHelper::rotate(&to_enu_e, &e, &se);
                projected_e.store(t, b, e, se);
            }
        }

        let placed = gdlat.iter().filter(|v| v.is_finite()).count();
        if placed < nbins {
            self.logger.caution(&format!(
                "{} of {nbins} bins could not be placed at {} km",
                nbins - placed,
                self.altitude
            ));
        }
        self.logger
            .record(&format!("projected {nbins} bins to geodetic at {} km", self.altitude));

        Ok(GeodeticOutput {
            gdlat,
            gdlon,
            gdalt: Array1::from_elem(nbins, self.altitude),
            velocity: projected_v.vector,
            velocity_covariance: projected_v.covariance,
            velocity_magnitude: projected_v.magnitude,
            field: projected_e.vector,
            field_covariance: projected_e.covariance,
            field_magnitude: projected_e.magnitude,
        })
    }
}
