use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::apex::dipole::EARTH_RADIUS;
use crate::measurement::GateGeometry;

/// Pointing of one radar beam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub code: u32,
    /// Degrees clockwise from geographic north.
    pub azimuth: f64,
    /// Degrees above the local horizon.
    pub elevation: f64,
}

/// Radar location; altitude in km.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarSite {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

/// East, north and up unit vectors at a geocentric position.
fn local_frame(lat: f64, lon: f64) -> [Vector3<f64>; 3] {
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
    [
        Vector3::new(-sin_lon, cos_lon, 0.0),
        Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat),
        Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat),
    ]
}

impl RadarSite {
    fn position(&self) -> Vector3<f64> {
        local_frame(self.lat, self.lon)[2] * (EARTH_RADIUS + self.alt)
    }

    /// Unit line-of-sight vector of `beam` in Earth-centred coordinates.
    pub fn pointing(&self, beam: &Beam) -> Vector3<f64> {
        let [east, north, up] = local_frame(self.lat, self.lon);
        let (sin_az, cos_az) = beam.azimuth.to_radians().sin_cos();
        let (sin_el, cos_el) = beam.elevation.to_radians().sin_cos();
        east * (cos_el * sin_az) + north * (cos_el * cos_az) + up * sin_el
    }

    /// Gate positions and local k-vectors along straight rays over a spherical Earth.
    ///
    /// Gates are ordered beam-major; `ranges` are slant ranges in km.
    pub fn gate_geometry(&self, beams: &[Beam], ranges: &[f64]) -> GateGeometry {
        let origin = self.position();
        let mut geometry = GateGeometry::default();

        for beam in beams {
            let k = self.pointing(beam);
            for &range in ranges {
                let gate = origin + k * range;
                let r = gate.norm();
                let lat = (gate.z / r).asin().to_degrees();
                let lon = gate.y.atan2(gate.x).to_degrees();
                let [east, north, up] = local_frame(lat, lon);

                geometry.beam_code.push(beam.code);
                geometry.alt.push((r - EARTH_RADIUS) * 1000.0);
                geometry.lat.push(lat);
                geometry.lon.push(lon);
                geometry.ke.push(k.dot(&east));
                geometry.kn.push(k.dot(&north));
                geometry.kz.push(k.dot(&up));
            }
        }
        geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PFISR: RadarSite = RadarSite {
        lat: 65.13,
        lon: -147.47,
        alt: 0.213,
    };

    #[test]
    fn zenith_beam_stays_over_the_site() {
        let beam = Beam {
            code: 1,
            azimuth: 0.0,
            elevation: 90.0,
        };
        let geometry = PFISR.gate_geometry(&[beam], &[100.0, 300.0]);
        assert_eq!(geometry.len(), 2);
        assert!((geometry.lat[1] - PFISR.lat).abs() < 1e-9);
        assert!((geometry.lon[1] - PFISR.lon).abs() < 1e-9);
        assert!((geometry.alt[1] - 300_213.0).abs() < 1e-6);
        assert!((geometry.kz[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn oblique_beam_drifts_and_tilts_upward() {
        let beam = Beam {
            code: 7,
            azimuth: 0.0,
            elevation: 30.0,
        };
        let geometry = PFISR.gate_geometry(&[beam], &[200.0, 600.0]);
        assert!(geometry.lat[1] > geometry.lat[0]);
        assert!(geometry.lat[0] > PFISR.lat);
        // Earth curvature makes the ray more vertical in the gate's own frame
        assert!(geometry.kz[1] > geometry.kz[0]);
        assert!(geometry.kz[0] > 0.5);
        for idx in 0..2 {
            let norm = (geometry.ke[idx].powi(2) + geometry.kn[idx].powi(2) + geometry.kz[idx].powi(2))
                .sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
            assert!(geometry.ke[idx].abs() < 1e-9);
        }
    }
}
