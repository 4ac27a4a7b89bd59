use crate::generator::profile::build_measurements;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use serde::Serialize;
use vvelscore::processing::CellOutcome;
use vvelscore::{DipoleApex, MeasurementSet, ResolvedVectors, Resolver};

#[derive(Debug, Serialize)]
pub struct WorkflowResult {
    pub true_drift: [f64; 3],
    /// Largest deviation of any resolved drift component from the truth, m/s.
    pub max_error: f64,
    pub resolved: ResolvedVectors,
}

impl WorkflowResult {
    pub fn summary(&self) -> String {
        let metrics = &self.resolved.metrics;
        format!(
            "periods={} bins={} resolved={} under_determined={} singular={} max_error={:.3} m/s",
            self.resolved.int_period.len(),
            self.resolved.bin_mlat.len(),
            metrics.resolved,
            metrics.under_determined,
            metrics.singular,
            self.max_error
        )
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self) -> anyhow::Result<MeasurementSet> {
        build_measurements(&self.config.generator).context("generating synthetic measurements")
    }

    pub fn execute(&self, data: &MeasurementSet) -> anyhow::Result<WorkflowResult> {
        let resolver = Resolver::<DipoleApex>::new(self.config.resolve.clone())
            .context("configuring resolver")?;
        let resolved = resolver.run(data).context("resolving vectors")?;

        let truth = self.config.generator.drift;
        let mut max_error = 0.0f64;
        for ((t, b), outcome) in resolved.outcomes.indexed_iter() {
            if *outcome != CellOutcome::Resolved {
                continue;
            }
            for (axis, expected) in truth.iter().enumerate() {
                max_error = max_error.max((resolved.velocity[[t, b, axis]] - expected).abs());
            }
        }

        Ok(WorkflowResult {
            true_drift: truth,
            max_error,
            resolved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_recovers_generated_drift() {
        let cfg = WorkflowConfig {
            resolve: vvelscore::ResolveConfig {
                bin_edges: vec![60.0, 72.0],
                ..WorkflowConfig::default().resolve
            },
            ..Default::default()
        };
        let runner = Runner::new(cfg);
        let data = runner.generate().unwrap();
        let result = runner.execute(&data).unwrap();
        assert_eq!(result.resolved.metrics.resolved, 10);
        assert!(result.max_error < 1.0, "{}", result.summary());
    }

    #[test]
    fn outflow_is_corrected_end_to_end() {
        let mut cfg = WorkflowConfig::default();
        cfg.generator.outflow = 60.0;
        cfg.resolve.bin_edges = vec![60.0, 72.0];
        let runner = Runner::new(cfg);
        let data = runner.generate().unwrap();
        let result = runner.execute(&data).unwrap();
        assert!(result.max_error < 1.0, "{}", result.summary());
    }

    #[test]
    fn invalid_resolve_config_fails() {
        let mut cfg = WorkflowConfig::default();
        cfg.resolve.covar = [0.0, 1.0, 1.0];
        let runner = Runner::new(cfg);
        let data = runner.generate().unwrap();
        assert!(runner.execute(&data).is_err());
    }
}
