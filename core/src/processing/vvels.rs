//! Bayesian multi-beam vector velocity reconstruction (Heinselman & Nicolls, 2008).
//!
//! Every (integration period, bin) cell combines its LoS measurements `vlos = A V + noise`
//! with a zero-mean Gaussian prior on `V` into a posterior mean and covariance. Cells that
//! cannot be resolved come back NaN-filled with a [`CellOutcome`] saying why; they never
//! abort the run.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use ndarray::{Array2, Array3, Array4};
use rayon::prelude::*;
use serde::Serialize;

use crate::math::matrix::MatrixHelper;
use crate::prelude::{ResolveConfig, StageResult};
use crate::processing::binning::Bin;
use crate::processing::filter::LosSeries;
use crate::processing::integration::IntegrationPeriod;
use crate::processing::transform::ApexGeometry;
use crate::telemetry::log::LogManager;

/// Relative singular-value floor below which the geometry matrix counts as rank deficient.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellOutcome {
    Resolved,
    /// Fewer finite measurements than the configured minimum.
    UnderDetermined,
    /// Rank-deficient geometry or a non-invertible matrix.
    Singular,
}

/// Posterior drift estimate of one cell, in covariant apex components (Ve1, Ve2, Ve3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityEstimate {
    pub velocity: Vector3<f64>,
    pub covariance: Matrix3<f64>,
    pub outcome: CellOutcome,
}

impl VelocityEstimate {
    fn missing(outcome: CellOutcome) -> Self {
        Self {
            velocity: MatrixHelper::nan_vector(),
            covariance: MatrixHelper::nan_matrix(),
            outcome,
        }
    }
}

/// Resolves one cell. `a` holds the apex k-vector components of each measurement.
pub fn vvels(
    vlos: &[f64],
    dvlos: &[f64],
    a: &[Vector3<f64>],
    prior: &[f64; 3],
    min_points: usize,
) -> VelocityEstimate {
    let finite: Vec<usize> = (0..vlos.len())
        .filter(|&i| vlos[i].is_finite() && dvlos[i].is_finite() && a[i].iter().all(|c| c.is_finite()))
        .collect();
    let n = finite.len();
    if n == 0 || n < min_points {
        return VelocityEstimate::missing(CellOutcome::UnderDetermined);
    }
    if finite.iter().any(|&i| dvlos[i] == 0.0) {
        return VelocityEstimate::missing(CellOutcome::Singular);
    }

    let geometry = DMatrix::from_fn(n, 3, |row, col| a[finite[row]][col]);
    let values = DVector::from_iterator(n, finite.iter().map(|&i| vlos[i]));
    let variances = DVector::from_iterator(n, finite.iter().map(|&i| dvlos[i] * dvlos[i]));

    let singular_values = geometry.clone().svd(false, false).singular_values;
    if singular_values.len() < 3 || singular_values.min() <= singular_values.max() * RANK_TOLERANCE {
        return VelocityEstimate::missing(CellOutcome::Singular);
    }

    let Some(covariance) = posterior_covariance(&geometry, &variances, prior) else {
        return VelocityEstimate::missing(CellOutcome::Singular);
    };
    let velocity = if n > 3 {
        Some(information_mean(&geometry, &variances, &values, &covariance))
    } else {
        gain_mean(&geometry, &variances, &values, prior)
    };

    match velocity {
        Some(v) if v.iter().chain(covariance.iter()).all(|x| x.is_finite()) => VelocityEstimate {
            velocity: v,
            covariance,
            outcome: CellOutcome::Resolved,
        },
        _ => VelocityEstimate::missing(CellOutcome::Singular),
    }
}

/// `(A^T S_E^-1 A + S_V^-1)^-1`
fn posterior_covariance(
    geometry: &DMatrix<f64>,
    variances: &DVector<f64>,
    prior: &[f64; 3],
) -> Option<Matrix3<f64>> {
    let weighted = DMatrix::from_fn(geometry.nrows(), 3, |row, col| {
        geometry[(row, col)] / variances[row]
    });
    let information = geometry.transpose() * weighted;
    let mut precision = Matrix3::from_fn(|row, col| information[(row, col)]);
    for axis in 0..3 {
        precision[(axis, axis)] += 1.0 / prior[axis];
    }
    precision.try_inverse()
}

/// `S_post A^T S_E^-1 vlos`, the 3x3 form used once there are more measurements than unknowns.
fn information_mean(
    geometry: &DMatrix<f64>,
    variances: &DVector<f64>,
    values: &DVector<f64>,
    covariance: &Matrix3<f64>,
) -> Vector3<f64> {
    let whitened = values.component_div(variances);
    let projected = geometry.transpose() * whitened;
    covariance * Vector3::new(projected[0], projected[1], projected[2])
}

/// `S_V A^T (A S_V A^T + S_E)^-1 vlos`
fn gain_mean(
    geometry: &DMatrix<f64>,
    variances: &DVector<f64>,
    values: &DVector<f64>,
    prior: &[f64; 3],
) -> Option<Vector3<f64>> {
    let prior_matrix = DMatrix::from_diagonal(&DVector::from_column_slice(prior));
    let innovation =
        geometry * &prior_matrix * geometry.transpose() + DMatrix::from_diagonal(variances);
    let gain = innovation.try_inverse()?;
    let v = prior_matrix * geometry.transpose() * gain * values;
    Some(Vector3::new(v[0], v[1], v[2]))
}

/// Dense velocity estimates over (periods x bins).
#[derive(Debug, Clone, Serialize)]
pub struct VelocityField {
    /// (periods, bins, 3)
    pub velocity: Array3<f64>,
    /// (periods, bins, 3, 3)
    pub covariance: Array4<f64>,
    pub outcomes: Array2<CellOutcome>,
}

impl VelocityField {
    pub fn estimate(&self, period: usize, bin: usize) -> (Vector3<f64>, Matrix3<f64>) {
        let v = Vector3::from_fn(|i, _| self.velocity[[period, bin, i]]);
        let s = Matrix3::from_fn(|i, j| self.covariance[[period, bin, i, j]]);
        (v, s)
    }
}

/// Runs the reconstruction over every (integration period, bin) cell.
pub struct VelocityStage {
    prior: [f64; 3],
    min_points: usize,
    parallel: bool,
    logger: LogManager,
}

impl VelocityStage {
    pub fn new(config: &ResolveConfig) -> Self {
        Self {
            prior: config.covar,
            min_points: config.min_num_points,
            parallel: config.parallel,
            logger: LogManager::new("vvels"),
        }
    }

    fn resolve_cell(
        &self,
        series: &LosSeries,
        apex: &ApexGeometry,
        bin: &Bin,
        period: &IntegrationPeriod,
    ) -> VelocityEstimate {
        let capacity = bin.gates.len() * period.records.len();
        let mut vlos = Vec::with_capacity(capacity);
        let mut dvlos = Vec::with_capacity(capacity);
        let mut a = Vec::with_capacity(capacity);

        for &gate in &bin.gates {
            for &record in &period.records {
                vlos.push(series.vlos[[record, gate]]);
                dvlos.push(series.dvlos[[record, gate]]);
                a.push(apex.gates[gate].a);
            }
        }
        vvels(&vlos, &dvlos, &a, &self.prior, self.min_points)
    }

    pub fn execute(
        &self,
        series: &LosSeries,
        apex: &ApexGeometry,
        bins: &[Bin],
        periods: &[IntegrationPeriod],
    ) -> StageResult<VelocityField> {
        let resolve_period = |period: &IntegrationPeriod| -> Vec<VelocityEstimate> {
            bins.iter()
                .map(|bin| self.resolve_cell(series, apex, bin, period))
                .collect()
        };
        let cells: Vec<Vec<VelocityEstimate>> = if self.parallel {
            periods.par_iter().map(resolve_period).collect()
        } else {
            periods.iter().map(resolve_period).collect()
        };

        let shape = (periods.len(), bins.len());
        let mut velocity = Array3::from_elem((shape.0, shape.1, 3), f64::NAN);
        let mut covariance = Array4::from_elem((shape.0, shape.1, 3, 3), f64::NAN);
        let mut outcomes = Array2::from_elem(shape, CellOutcome::UnderDetermined);

        for (t, row) in cells.iter().enumerate() {
            for (b, cell) in row.iter().enumerate() {
                for i in 0..3 {
                    velocity[[t, b, i]] = cell.velocity[i];
                    for j in 0..3 {
                        covariance[[t, b, i, j]] = cell.covariance[(i, j)];
                    }
                }
                outcomes[[t, b]] = cell.outcome;
                if cell.outcome != CellOutcome::Resolved {
                    self.logger
                        .detail(&format!("period {t} bin {b}: {:?}", cell.outcome));
                }
            }
        }

        let resolved = outcomes
            .iter()
            .filter(|o| **o == CellOutcome::Resolved)
            .count();
        self.logger.record(&format!(
            "resolved {} of {} cells ({} periods x {} bins)",
            resolved,
            outcomes.len(),
            shape.0,
            shape.1
        ));
        Ok(VelocityField {
            velocity,
            covariance,
            outcomes,
        })
    }
}
