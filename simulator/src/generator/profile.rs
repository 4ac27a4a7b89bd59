use anyhow::{ensure, Context};
use nalgebra::Vector3;
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use vvelscore::measurement::decimal_year;
use vvelscore::processing::TransformStage;
use vvelscore::{ApexModel, Beam, DipoleApex, MeasurementSet, RadarSite, TimeRecord};

use crate::generator::template::{pfisr_beams, pfisr_site, PFISR_UP_B};

/// Configuration for generating a synthetic radar measurement set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub site: RadarSite,
    pub beams: Vec<Beam>,
    /// Slant ranges in km; the stop value is exclusive.
    pub range_start: f64,
    pub range_stop: f64,
    pub range_step: f64,
    /// Unix seconds of the first record.
    pub start_time: f64,
    pub num_records: usize,
    /// Seconds per record.
    pub record_length: f64,
    /// True drift in covariant apex components (Ve1, Ve2, Ve3), m/s.
    pub drift: [f64; 3],
    /// Field-aligned outflow seen by every beam and measured by the up-B beam, m/s.
    pub outflow: f64,
    pub upb_beam_code: Option<u32>,
    pub dvlos: f64,
    pub ne: f64,
    /// Half-width of the uniform noise added to every LoS velocity, m/s.
    pub noise: f64,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            site: pfisr_site(),
            beams: pfisr_beams(),
            range_start: 80.0,
            range_stop: 800.0,
            range_step: 50.0,
            // 2019-05-28T00:00:00Z
            start_time: 1_559_001_600.0,
            num_records: 10,
            record_length: 60.0,
            drift: [500.0, -200.0, 0.0],
            outflow: 0.0,
            upb_beam_code: Some(PFISR_UP_B),
            dvlos: 10.0,
            ne: 1e11,
            noise: 0.0,
            seed: 0,
        }
    }
}

impl GeneratorConfig {
    pub fn ranges(&self) -> Vec<f64> {
        let mut ranges = Vec::new();
        let mut range = self.range_start;
        while range < self.range_stop {
            ranges.push(range);
            range += self.range_step;
        }
        ranges
    }

    pub fn drift_vector(&self) -> Vector3<f64> {
        Vector3::from(self.drift)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.beams.is_empty(), "generator needs at least one beam");
        ensure!(self.num_records > 0, "generator needs at least one record");
        ensure!(
            self.range_step > 0.0 && self.range_start < self.range_stop,
            "range gates must satisfy start < stop with a positive step"
        );
        ensure!(self.record_length > 0.0, "record length must be positive");
        ensure!(self.noise >= 0.0, "noise amplitude must be non-negative");
        Ok(())
    }
}

/// Builds a measurement set whose LoS velocities follow the resolver's forward model.
///
/// Non-up-B beams see `A . V` minus the outflow projection; the up-B beam sees the
/// outflow itself, so the outflow correction restores the pure drift signal.
pub fn build_measurements(config: &GeneratorConfig) -> anyhow::Result<MeasurementSet> {
    config.validate()?;
    let geometry = config.site.gate_geometry(&config.beams, &config.ranges());
    let time: Vec<TimeRecord> = (0..config.num_records)
        .map(|i| {
            let start = config.start_time + config.record_length * i as f64;
            TimeRecord::new(start, start + config.record_length)
        })
        .collect();

    let model = DipoleApex::at_epoch(decimal_year(config.start_time))
        .context("initializing apex model for synthetic geometry")?;
    let apex = TransformStage::new()
        .execute(&geometry, &model)
        .context("projecting synthetic k-vectors")?;

    let drift = config.drift_vector();
    let signal: Vec<f64> = apex
        .gates
        .iter()
        .zip(&geometry.beam_code)
        .map(|(gate, &code)| {
            if Some(code) == config.upb_beam_code {
                config.outflow
            } else {
                gate.a.dot(&drift) - gate.scale * gate.a[2] * config.outflow
            }
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let shape = (time.len(), geometry.len());
    let vlos = Array2::from_shape_fn(shape, |(_, gate)| {
        let jitter = if config.noise > 0.0 {
            rng.gen_range(-config.noise..config.noise)
        } else {
            0.0
        };
        signal[gate] + jitter
    });

    log::info!(
        "generated {} records x {} gates from {} beams",
        shape.0,
        shape.1,
        config.beams.len()
    );
    Ok(MeasurementSet {
        time,
        vlos,
        dvlos: Array2::from_elem(shape, config.dvlos),
        ne: Array2::from_elem(shape, config.ne),
        geometry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_legacy_generator() {
        let config = GeneratorConfig::default();
        assert_eq!(config.ranges().len(), 15);
        assert_eq!(config.ranges()[14], 780.0);

        let data = build_measurements(&config).unwrap();
        assert_eq!(data.num_records(), 10);
        assert_eq!(data.num_gates(), 15 * config.beams.len());
        assert_eq!(data.time[9].end - data.time[0].start, 600.0);
        data.validate().unwrap();
    }

    #[test]
    fn noise_is_bounded_and_seeded() {
        let config = GeneratorConfig {
            noise: 5.0,
            seed: 42,
            ..Default::default()
        };
        let clean = build_measurements(&GeneratorConfig::default()).unwrap();
        let noisy = build_measurements(&config).unwrap();
        let again = build_measurements(&config).unwrap();
        assert_eq!(noisy.vlos, again.vlos);
        for (a, b) in noisy.vlos.iter().zip(clean.vlos.iter()) {
            assert!((a - b).abs() <= 5.0);
        }
        assert_ne!(noisy.vlos, clean.vlos);
    }

    #[test]
    fn up_b_beam_measures_outflow() {
        let config = GeneratorConfig {
            outflow: 75.0,
            ..Default::default()
        };
        let data = build_measurements(&config).unwrap();
        let upb = data.beam_profile(PFISR_UP_B).unwrap();
        assert!(upb.vlos.iter().all(|v| *v == 75.0));
    }

    #[test]
    fn empty_beam_table_is_rejected() {
        let config = GeneratorConfig {
            beams: Vec::new(),
            ..Default::default()
        };
        assert!(build_measurements(&config).is_err());
    }
}
