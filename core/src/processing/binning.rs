use serde::Serialize;

use crate::math::stats::StatsHelper;
use crate::prelude::StageResult;
use crate::processing::transform::ApexGeometry;
use crate::telemetry::log::LogManager;

/// Half-open magnetic latitude interval and the gates that fall in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    /// Representative apex latitude (interval midpoint) and longitude.
    pub mlat: f64,
    pub mlon: f64,
    pub gates: Vec<usize>,
}

impl Bin {
    pub fn contains(&self, mlat: f64) -> bool {
        mlat >= self.lower && mlat < self.upper
    }
}

/// Partitions gates into fixed magnetic latitude bins.
pub struct BinningStage {
    edges: Vec<f64>,
    logger: LogManager,
}

impl BinningStage {
    pub fn new(edges: &[f64]) -> Self {
        Self {
            edges: edges.to_vec(),
            logger: LogManager::new("binning"),
        }
    }

    pub fn execute(&self, apex: &ApexGeometry) -> StageResult<Vec<Bin>> {
        let mlat = apex.mlat();
        let mlon = StatsHelper::nanmean(&apex.mlon());

        let bins: Vec<Bin> = self
            .edges
            .windows(2)
            .map(|edge| {
                let (lower, upper) = (edge[0], edge[1]);
                let gates = mlat
                    .iter()
                    .enumerate()
                    .filter(|(_, &m)| m >= lower && m < upper)
                    .map(|(idx, _)| idx)
                    .collect();
                Bin {
                    lower,
                    upper,
                    mlat: (lower + upper) / 2.0,
                    mlon,
                    gates,
                }
            })
            .collect();

        let binned: usize = bins.iter().map(|b| b.gates.len()).sum();
        let empty = bins.iter().filter(|b| b.gates.is_empty()).count();
        self.logger.record(&format!(
            "{} bins hold {} of {} gates ({} empty)",
            bins.len(),
            binned,
            mlat.len(),
            empty
        ));
        if binned == 0 {
            self.logger.caution("no gate falls inside the configured bin edges");
        }
        Ok(bins)
    }
}
