use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::measurement::record::{decimal_year, TimeRecord};
use crate::prelude::{StageError, StageResult};

/// Time-invariant geodetic geometry of every range gate, flattened across beams.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateGeometry {
    pub beam_code: Vec<u32>,
    /// Geodetic altitude in meters.
    pub alt: Vec<f64>,
    /// Geodetic latitude and longitude in degrees.
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// Line-of-sight unit vector in local east/north/up components.
    pub ke: Vec<f64>,
    pub kn: Vec<f64>,
    pub kz: Vec<f64>,
}

impl GateGeometry {
    pub fn len(&self) -> usize {
        self.alt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alt.is_empty()
    }

    fn validate(&self) -> StageResult<()> {
        let expected = self.len();
        let columns: [(&'static str, usize); 6] = [
            ("beam_code", self.beam_code.len()),
            ("lat", self.lat.len()),
            ("lon", self.lon.len()),
            ("ke", self.ke.len()),
            ("kn", self.kn.len()),
            ("kz", self.kz.len()),
        ];
        for (name, found) in columns {
            if found != expected {
                return Err(StageError::ShapeMismatch {
                    name,
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Altitude profile and time series of a single beam.
#[derive(Debug, Clone)]
pub struct BeamProfile {
    pub alt: Vec<f64>,
    pub vlos: Array2<f64>,
    pub dvlos: Array2<f64>,
}

/// Radar measurements consumed by the resolver. Time-varying arrays are records x gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementSet {
    pub time: Vec<TimeRecord>,
    pub geometry: GateGeometry,
    pub vlos: Array2<f64>,
    pub dvlos: Array2<f64>,
    pub ne: Array2<f64>,
}

impl MeasurementSet {
    pub fn num_records(&self) -> usize {
        self.time.len()
    }

    pub fn num_gates(&self) -> usize {
        self.geometry.len()
    }

    /// Checks that every co-indexed array agrees on the record and gate counts.
    pub fn validate(&self) -> StageResult<()> {
        if self.time.is_empty() {
            return Err(StageError::EmptyInput("no time records".into()));
        }
        if self.geometry.is_empty() {
            return Err(StageError::EmptyInput("no range gates".into()));
        }
        self.geometry.validate()?;

        let expected = (self.num_records(), self.num_gates());
        let grids = [
            ("vlos", self.vlos.dim()),
            ("dvlos", self.dvlos.dim()),
            ("ne", self.ne.dim()),
        ];
        for (name, found) in grids {
            if found != expected {
                return Err(StageError::ShapeMismatch {
                    name,
                    expected: format!("{:?}", expected),
                    found: format!("{:?}", found),
                });
            }
        }

        if let Some(bad) = self
            .time
            .iter()
            .position(|t| !t.start.is_finite() || !t.end.is_finite() || t.end < t.start)
        {
            return Err(StageError::InvalidInput(format!(
                "time record {bad} is not a finite, ordered (start, end) pair"
            )));
        }
        Ok(())
    }

    /// Decimal year of the first record, used as the fixed model epoch for a run.
    pub fn epoch_year(&self) -> StageResult<f64> {
        self.time
            .first()
            .map(|t| decimal_year(t.start))
            .ok_or_else(|| StageError::EmptyInput("no time records".into()))
    }

    /// Gate indices belonging to `code`, in gate order.
    pub fn beam_gates(&self, code: u32) -> Vec<usize> {
        self.geometry
            .beam_code
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == code)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Extracts the raw altitude profile and time series of one beam.
    pub fn beam_profile(&self, code: u32) -> StageResult<BeamProfile> {
        let gates = self.beam_gates(code);
        if gates.is_empty() {
            return Err(StageError::UnknownBeam(code));
        }
        Ok(BeamProfile {
            alt: gates.iter().map(|&g| self.geometry.alt[g]).collect(),
            vlos: self.vlos.select(Axis(1), &gates),
            dvlos: self.dvlos.select(Axis(1), &gates),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_beam_set() -> MeasurementSet {
        MeasurementSet {
            time: vec![TimeRecord::new(0.0, 60.0), TimeRecord::new(60.0, 120.0)],
            geometry: GateGeometry {
                beam_code: vec![1, 1, 2],
                alt: vec![200e3, 300e3, 250e3],
                lat: vec![65.0; 3],
                lon: vec![-147.0; 3],
                ke: vec![0.0; 3],
                kn: vec![0.0; 3],
                kz: vec![1.0; 3],
            },
            vlos: Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
            dvlos: Array2::from_elem((2, 3), 10.0),
            ne: Array2::from_elem((2, 3), 1e11),
        }
    }

    #[test]
    fn consistent_set_validates() {
        two_beam_set().validate().unwrap();
    }

    #[test]
    fn mismatched_density_shape_is_fatal() {
        let mut set = two_beam_set();
        set.ne = Array2::from_elem((2, 2), 1e11);
        match set.validate() {
            Err(StageError::ShapeMismatch { name, .. }) => assert_eq!(name, "ne"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn mismatched_geometry_column_is_fatal() {
        let mut set = two_beam_set();
        set.geometry.kn.pop();
        assert!(matches!(
            set.validate(),
            Err(StageError::ShapeMismatch { name: "kn", .. })
        ));
    }

    #[test]
    fn beam_profile_selects_beam_columns() {
        let profile = two_beam_set().beam_profile(1).unwrap();
        assert_eq!(profile.alt, vec![200e3, 300e3]);
        assert_eq!(profile.vlos.dim(), (2, 2));
        assert_eq!(profile.vlos[[1, 1]], 5.0);
    }

    #[test]
    fn missing_beam_is_reported() {
        assert!(matches!(
            two_beam_set().beam_profile(9),
            Err(StageError::UnknownBeam(9))
        ));
    }
}
