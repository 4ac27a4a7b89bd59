use std::sync::Mutex;

use serde::Serialize;

use crate::processing::vvels::CellOutcome;

pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

/// Tally of reconstruction outcomes over every (period, bin) cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub resolved: usize,
    pub under_determined: usize,
    pub singular: usize,
}

impl Metrics {
    pub fn total(&self) -> usize {
        self.resolved + self.under_determined + self.singular
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_outcome(&self, outcome: CellOutcome) {
        if let Ok(mut metrics) = self.inner.lock() {
            match outcome {
                CellOutcome::Resolved => metrics.resolved += 1,
                CellOutcome::UnderDetermined => metrics.under_determined += 1,
                CellOutcome::Singular => metrics.singular += 1,
            }
        }
    }

    pub fn snapshot(&self) -> Metrics {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            Metrics::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
