use serde::{Deserialize, Serialize};

/// Shared configuration for every resolution stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Constant Doppler offset added to every LoS velocity (m/s).
    pub chirp: f64,
    /// Electron density floor; points below it are discarded.
    pub ne_min: f64,
    /// Minimum integration window in seconds. `None` keeps the raw records.
    pub integration_time: Option<f64>,
    /// Diagonal prior covariance of (Ve1, Ve2, Ve3) in m^2/s^2.
    pub covar: [f64; 3],
    /// Error rejection parameters: offset, fractional threshold, unused, absolute threshold.
    pub ppp: [f64; 4],
    /// Altitude window in km.
    pub min_alt: f64,
    pub max_alt: f64,
    pub min_num_points: usize,
    /// Beam code of the field-aligned beam used for outflow correction.
    pub upb_beam_code: Option<u32>,
    /// Restricts processing to these beams when set.
    pub beam_codes: Option<Vec<u32>>,
    /// Magnetic latitude bin edges in degrees.
    pub bin_edges: Vec<f64>,
    /// Altitude (km) of the geodetic output and of the Be3 evaluation.
    pub output_altitude: f64,
    pub parallel: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            chirp: 0.0,
            ne_min: 2.0e10,
            integration_time: None,
            covar: [3000.0 * 3000.0, 3000.0 * 3000.0, 15.0 * 15.0],
            ppp: [200.0, 0.5, 2000.0, 100.0],
            min_alt: 150.0,
            max_alt: 400.0,
            min_num_points: 1,
            upb_beam_code: None,
            beam_codes: None,
            bin_edges: arange_edges(64.0, 68.0, 0.25),
            output_altitude: 200.0,
            parallel: false,
        }
    }
}

impl ResolveConfig {
    /// Rejects configurations the pipeline cannot run with.
    pub fn validate(&self) -> StageResult<()> {
        let scalars = [
            ("chirp", self.chirp),
            ("ne_min", self.ne_min),
            ("min_alt", self.min_alt),
            ("max_alt", self.max_alt),
            ("output_altitude", self.output_altitude),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                return Err(StageError::InvalidConfig(format!("{name} must be finite")));
            }
        }
        if self.ppp.iter().any(|p| !p.is_finite()) {
            return Err(StageError::InvalidConfig("ppp must be finite".into()));
        }
        if self.covar.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(StageError::InvalidConfig(
                "covar entries must be positive variances".into(),
            ));
        }
        if self.min_alt >= self.max_alt {
            return Err(StageError::InvalidConfig(format!(
                "min_alt {} must be below max_alt {}",
                self.min_alt, self.max_alt
            )));
        }
        if self.min_num_points == 0 {
            return Err(StageError::InvalidConfig(
                "min_num_points must be at least 1".into(),
            ));
        }
        if let Some(seconds) = self.integration_time {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(StageError::InvalidConfig(format!(
                    "integration_time {seconds} must be positive"
                )));
            }
        }
        if self.bin_edges.len() < 2 {
            return Err(StageError::InvalidConfig(
                "at least two bin edges are required".into(),
            ));
        }
        if self.bin_edges.iter().any(|e| !e.is_finite())
            || self.bin_edges.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(StageError::InvalidConfig(
                "bin edges must be finite and strictly increasing".into(),
            ));
        }
        if self.output_altitude < 0.0 {
            return Err(StageError::InvalidConfig(
                "output_altitude must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Edges `start, start + step, ...` strictly below `stop`.
pub fn arange_edges(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop <= start {
        return Vec::new();
    }
    let count = ((stop - start) / step).ceil() as usize;
    (0..count)
        .map(|i| start + i as f64 * step)
        .filter(|edge| *edge < stop)
        .collect()
}

/// Common error type for the resolution pipeline. Every variant is fatal to a run.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("shape mismatch for {name}: expected {expected}, found {found}")]
    ShapeMismatch {
        name: &'static str,
        expected: String,
        found: String,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("empty input: {0}")]
    EmptyInput(String),
    #[error("beam {0} not present in measurement set")]
    UnknownBeam(u32),
    #[error("apex model failure: {0}")]
    ApexModel(String),
}

pub type StageResult<T> = Result<T, StageError>;
