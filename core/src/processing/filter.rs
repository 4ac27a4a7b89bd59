use ndarray::{Array2, Zip};
use serde::Serialize;

use crate::math::stats::StatsHelper;
use crate::measurement::MeasurementSet;
use crate::prelude::{ResolveConfig, StageResult};
use crate::telemetry::log::LogManager;

/// LoS velocity and error grids (records x gates); NaN marks a discarded point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LosSeries {
    pub vlos: Array2<f64>,
    pub dvlos: Array2<f64>,
}

impl LosSeries {
    pub fn finite_count(&self) -> usize {
        StatsHelper::count_finite(self.vlos.iter())
    }

    fn discard(&mut self, record: usize, gate: usize) {
        self.vlos[[record, gate]] = f64::NAN;
        self.dvlos[[record, gate]] = f64::NAN;
    }
}

/// Quality filter that nulls measurements unfit for vector reconstruction.
pub struct FilterStage {
    chirp: f64,
    ne_min: f64,
    min_alt: f64,
    max_alt: f64,
    ppp: [f64; 4],
    beam_codes: Option<Vec<u32>>,
    logger: LogManager,
}

impl FilterStage {
    pub fn new(config: &ResolveConfig) -> Self {
        Self {
            chirp: config.chirp,
            ne_min: config.ne_min,
            min_alt: config.min_alt,
            max_alt: config.max_alt,
            ppp: config.ppp,
            beam_codes: config.beam_codes.clone(),
            logger: LogManager::new("filter"),
        }
    }

    pub fn execute(&self, data: &MeasurementSet) -> StageResult<LosSeries> {
        let geometry = &data.geometry;
        let mut series = LosSeries {
            vlos: data.vlos.mapv(|v| v + self.chirp),
            dvlos: data.dvlos.clone(),
        };
        let initial = series.finite_count();

        if let Some(codes) = &self.beam_codes {
            for (gate, code) in geometry.beam_code.iter().enumerate() {
                if !codes.contains(code) {
                    for record in 0..data.num_records() {
                        series.discard(record, gate);
                    }
                }
            }
        }

        for ((record, gate), &ne) in data.ne.indexed_iter() {
            if ne < self.ne_min {
                series.discard(record, gate);
            }
        }

        let (lower, upper) = (self.min_alt * 1000.0, self.max_alt * 1000.0);
        for (gate, &alt) in geometry.alt.iter().enumerate() {
            if alt < lower || alt > upper {
                for record in 0..data.num_records() {
                    series.discard(record, gate);
                }
            }
        }

        let [offset, fractional, _, absolute] = self.ppp;
        let reject = Zip::from(&series.vlos)
            .and(&series.dvlos)
            .map_collect(|&v, &dv| dv.abs() / (v.abs() + offset) > fractional && dv.abs() > absolute);
        for ((record, gate), &bad) in reject.indexed_iter() {
            if bad {
                series.discard(record, gate);
            }
        }

        let remaining = series.finite_count();
        self.logger.record(&format!(
            "kept {} of {} finite points ({} nulled)",
            remaining,
            initial,
            initial - remaining
        ));
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{GateGeometry, TimeRecord};

    fn config() -> ResolveConfig {
        ResolveConfig {
            chirp: 0.0,
            ne_min: 1e10,
            min_alt: 150.0,
            max_alt: 400.0,
            ppp: [200.0, 0.5, 2000.0, 100.0],
            ..Default::default()
        }
    }

    fn dataset(vlos: Vec<f64>, dvlos: Vec<f64>, ne: Vec<f64>, alt: Vec<f64>) -> MeasurementSet {
        let gates = alt.len();
        let records = vlos.len() / gates;
        MeasurementSet {
            time: (0..records)
                .map(|i| TimeRecord::new(i as f64 * 60.0, (i + 1) as f64 * 60.0))
                .collect(),
            geometry: GateGeometry {
                beam_code: vec![1; gates],
                alt,
                lat: vec![65.0; gates],
                lon: vec![-147.0; gates],
                ke: vec![0.0; gates],
                kn: vec![0.0; gates],
                kz: vec![1.0; gates],
            },
            vlos: Array2::from_shape_vec((records, gates), vlos).unwrap(),
            dvlos: Array2::from_shape_vec((records, gates), dvlos).unwrap(),
            ne: Array2::from_shape_vec((records, gates), ne).unwrap(),
        }
    }

    #[test]
    fn chirp_is_added_before_filtering() {
        let data = dataset(vec![100.0], vec![10.0], vec![1e11], vec![250e3]);
        let stage = FilterStage::new(&ResolveConfig {
            chirp: -5.0,
            ..config()
        });
        let out = stage.execute(&data).unwrap();
        assert_eq!(out.vlos[[0, 0]], 95.0);
        assert_eq!(out.dvlos[[0, 0]], 10.0);
    }

    #[test]
    fn low_density_points_are_nulled() {
        let data = dataset(
            vec![100.0, 100.0, 100.0, 100.0],
            vec![10.0; 4],
            vec![1e11, 1e9, 5e9, 1e11],
            vec![250e3, 250e3],
        );
        let out = FilterStage::new(&config()).execute(&data).unwrap();
        for ((record, gate), &ne) in data.ne.indexed_iter() {
            if ne < 1e10 {
                assert!(out.vlos[[record, gate]].is_nan());
                assert!(out.dvlos[[record, gate]].is_nan());
            } else {
                assert!(out.vlos[[record, gate]].is_finite());
            }
        }
    }

    #[test]
    fn altitude_window_is_in_kilometers() {
        let data = dataset(
            vec![1.0, 1.0, 1.0],
            vec![1.0; 3],
            vec![1e11; 3],
            vec![100e3, 300e3, 450e3],
        );
        let out = FilterStage::new(&config()).execute(&data).unwrap();
        assert!(out.vlos[[0, 0]].is_nan());
        assert_eq!(out.vlos[[0, 1]], 1.0);
        assert!(out.vlos[[0, 2]].is_nan());
    }

    #[test]
    fn error_rejection_needs_both_tests_to_fail() {
        // fractional only, absolute only, both
        let data = dataset(
            vec![0.0, 1000.0, 0.0],
            vec![150.0, 150.0, 90.0],
            vec![1e11; 3],
            vec![250e3; 3],
        );
        let out = FilterStage::new(&config()).execute(&data).unwrap();
        // 150 / 200 > 0.5 and 150 > 100
        assert!(out.vlos[[0, 0]].is_nan());
        // 150 / 1200 <= 0.5
        assert_eq!(out.vlos[[0, 1]], 1000.0);
        // 90 <= 100
        assert_eq!(out.vlos[[0, 2]], 0.0);
    }

    #[test]
    fn unselected_beams_are_nulled() {
        let mut data = dataset(vec![1.0, 2.0], vec![1.0; 2], vec![1e11; 2], vec![250e3; 2]);
        data.geometry.beam_code = vec![7, 8];
        let stage = FilterStage::new(&ResolveConfig {
            beam_codes: Some(vec![8]),
            ..config()
        });
        let out = stage.execute(&data).unwrap();
        assert!(out.vlos[[0, 0]].is_nan());
        assert_eq!(out.vlos[[0, 1]], 2.0);
    }

    #[test]
    fn filtering_never_restores_missing_points() {
        let data = dataset(
            vec![f64::NAN, 10.0, 20.0, f64::NAN],
            vec![f64::NAN, 1.0, 1.0, 5.0],
            vec![1e11, 1e9, 1e11, 1e11],
            vec![250e3, 250e3],
        );
        let out = FilterStage::new(&config()).execute(&data).unwrap();
        for ((record, gate), v) in data.vlos.indexed_iter() {
            if v.is_nan() {
                assert!(out.vlos[[record, gate]].is_nan());
            }
        }
        assert!(out.finite_count() <= StatsHelper::count_finite(data.vlos.iter()));
        assert_eq!(out.vlos.dim(), data.vlos.dim());
    }
}
