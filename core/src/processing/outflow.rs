use crate::math::interp::lin_interp;
use crate::measurement::BeamProfile;
use crate::prelude::{StageError, StageResult};
use crate::processing::filter::LosSeries;
use crate::processing::transform::ApexGeometry;
use crate::telemetry::log::LogManager;

/// Removes field-aligned ion outflow from LoS velocities using the up-B beam.
pub struct OutflowStage {
    logger: LogManager,
}

impl OutflowStage {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("outflow"),
        }
    }

    /// `upb` is `None` when no up-B beam is configured, which leaves the series untouched.
    pub fn execute(
        &self,
        series: &LosSeries,
        gate_alt: &[f64],
        apex: &ApexGeometry,
        upb: Option<&BeamProfile>,
    ) -> StageResult<LosSeries> {
        let Some(upb) = upb else {
            self.logger.detail("no up-B beam configured, skipping");
            return Ok(series.clone());
        };

        let (records, gates) = series.vlos.dim();
        if upb.vlos.nrows() != records || upb.dvlos.nrows() != records {
            return Err(StageError::ShapeMismatch {
                name: "upb",
                expected: format!("{records} records"),
                found: format!("{} records", upb.vlos.nrows()),
            });
        }
        if gate_alt.len() != gates || apex.gates.len() != gates {
            return Err(StageError::ShapeMismatch {
                name: "gate_alt",
                expected: format!("{gates} gates"),
                found: format!("{} altitudes, {} apex gates", gate_alt.len(), apex.gates.len()),
            });
        }

        let mut corrected = series.clone();
        for record in 0..records {
            let fp = upb.vlos.row(record).to_vec();
            let dfp = upb.dvlos.row(record).to_vec();
            let (vion, dvion) = lin_interp(gate_alt, &upb.alt, &fp, &dfp);

            for (gate, basis) in apex.gates.iter().enumerate() {
                let weight = basis.scale * basis.a[2];
                let v = series.vlos[[record, gate]];
                let dv = series.dvlos[[record, gate]];
                corrected.vlos[[record, gate]] = v + weight * vion[gate];
                corrected.dvlos[[record, gate]] =
                    (dv.powi(2) + weight.powi(2) * dvion[gate].powi(2)).sqrt();
            }
        }

        self.logger.record(&format!(
            "corrected {} records, {} finite points remain",
            records,
            corrected.finite_count()
        ));
        Ok(corrected)
    }
}

impl Default for OutflowStage {
    fn default() -> Self {
        Self::new()
    }
}
