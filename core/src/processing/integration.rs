use serde::Serialize;

use crate::measurement::TimeRecord;
use crate::prelude::{StageError, StageResult};
use crate::telemetry::log::LogManager;

/// A window of consecutive raw records that are resolved together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationPeriod {
    pub start: f64,
    pub end: f64,
    pub records: Vec<usize>,
}

impl IntegrationPeriod {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Groups raw time records into integration periods.
pub struct IntegrationStage {
    integration_time: Option<f64>,
    logger: LogManager,
}

impl IntegrationStage {
    pub fn new(integration_time: Option<f64>) -> Self {
        Self {
            integration_time,
            logger: LogManager::new("integration"),
        }
    }

    pub fn execute(&self, time: &[TimeRecord]) -> StageResult<Vec<IntegrationPeriod>> {
        if time.is_empty() {
            return Err(StageError::EmptyInput("no time records to integrate".into()));
        }

        let periods = match self.integration_time {
            None => time
                .iter()
                .enumerate()
                .map(|(idx, record)| IntegrationPeriod {
                    start: record.start,
                    end: record.end,
                    records: vec![idx],
                })
                .collect(),
            Some(target) => Self::accumulate(time, target),
        };

        self.logger.record(&format!(
            "{} records grouped into {} integration periods",
            time.len(),
            periods.len()
        ));
        Ok(periods)
    }

    fn accumulate(time: &[TimeRecord], target: f64) -> Vec<IntegrationPeriod> {
        let mut periods = Vec::new();
        let mut records = Vec::new();
        let mut window_start: Option<f64> = None;
        let last = time.len() - 1;

        for (idx, record) in time.iter().enumerate() {
            let start = *window_start.get_or_insert(record.start);
            records.push(idx);

            if record.end - start >= target || idx == last {
                periods.push(IntegrationPeriod {
                    start,
                    end: record.end,
                    records: std::mem::take(&mut records),
                });
                window_start = None;
            }
        }
        periods
    }
}
