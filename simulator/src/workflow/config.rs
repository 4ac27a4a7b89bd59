use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use vvelscore::ResolveConfig;

use crate::generator::profile::GeneratorConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub resolve: ResolveConfig,
    pub generator: GeneratorConfig,
}

impl Default for WorkflowConfig {
    /// Resolves every generated beam except the up-B beam, which only feeds the
    /// outflow correction.
    fn default() -> Self {
        let generator = GeneratorConfig::default();
        let beam_codes = generator
            .beams
            .iter()
            .map(|b| b.code)
            .filter(|&code| Some(code) != generator.upb_beam_code)
            .collect();
        let resolve = ResolveConfig {
            upb_beam_code: generator.upb_beam_code,
            beam_codes: Some(beam_codes),
            ..Default::default()
        };
        Self { resolve, generator }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .resolve
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        integration_time: Option<f64>,
        min_num_points: Option<usize>,
        seed: Option<u64>,
    ) -> Self {
        Self::default().with_overrides(integration_time, min_num_points, seed)
    }

    /// Replaces the fields given on the command line.
    pub fn with_overrides(
        mut self,
        integration_time: Option<f64>,
        min_num_points: Option<usize>,
        seed: Option<u64>,
    ) -> Self {
        if integration_time.is_some() {
            self.resolve.integration_time = integration_time;
        }
        if let Some(points) = min_num_points {
            self.resolve.min_num_points = points;
        }
        if let Some(seed) = seed {
            self.generator.seed = seed;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_overrides_defaults() {
        let cfg = WorkflowConfig::from_args(Some(300.0), None, Some(7));
        assert_eq!(cfg.resolve.integration_time, Some(300.0));
        assert_eq!(cfg.resolve.min_num_points, 1);
        assert_eq!(cfg.generator.seed, 7);
        let codes = cfg.resolve.beam_codes.unwrap();
        assert!(!codes.contains(&cfg.resolve.upb_beam_code.unwrap()));
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"resolve:\n  min_num_points: 4\n  covar: [1.0e6, 1.0e6, 100.0]\ngenerator:\n  num_records: 3\n  drift: [100.0, 50.0, 0.0]\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.resolve.min_num_points, 4);
        assert_eq!(cfg.resolve.covar[2], 100.0);
        assert_eq!(cfg.generator.num_records, 3);
        assert_eq!(cfg.generator.range_step, 50.0);
    }

    #[test]
    fn invalid_yaml_config_is_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"resolve:\n  min_alt: 500.0\n  max_alt: 100.0\n")
            .unwrap();
        let path = temp.into_temp_path();
        let err = WorkflowConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("validating workflow config"));
    }
}
