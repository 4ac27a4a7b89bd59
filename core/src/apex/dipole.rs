use nalgebra::{Matrix3, Vector3};

use crate::apex::{ApexModel, BasisVectors};
use crate::prelude::{StageError, StageResult};

/// Mean Earth radius used by IGRF, in km.
pub const EARTH_RADIUS: f64 = 6371.2;
/// Modified-apex reference height, in km.
pub const REFERENCE_HEIGHT: f64 = 0.0;

/// IGRF first-degree Gauss coefficients (year, g10, g11, h11) in nT.
const IGRF_DIPOLE: [(f64, f64, f64, f64); 6] = [
    (2000.0, -29619.4, -1728.2, 5186.1),
    (2005.0, -29554.63, -1669.05, 5077.99),
    (2010.0, -29496.57, -1586.42, 4944.26),
    (2015.0, -29441.46, -1501.77, 4795.99),
    (2020.0, -29404.8, -1450.9, 4652.5),
    (2025.0, -29350.0, -1410.3, 4545.5),
];
/// Secular variation after the last epoch, nT/yr.
const IGRF_SECULAR: (f64, f64, f64) = (12.6, 10.0, -21.5);
const LAST_VALID_YEAR: f64 = 2030.0;

const ANGLE_STEP: f64 = 1e-5;
const RADIUS_STEP: f64 = 1e-2;

/// Centred-dipole apex model.
///
/// The dipole axis and moment follow the IGRF degree-1 coefficients at the
/// requested epoch. Apex latitude is the modified apex latitude of Richmond (1995)
/// on a spherical Earth; base vectors come from central-difference gradients of
/// the apex coordinates.
#[derive(Debug, Clone)]
pub struct DipoleApex {
    epoch: f64,
    /// Rotates geocentric unit vectors into the dipole frame.
    rotation: Matrix3<f64>,
    /// Equatorial surface field strength in tesla.
    b0: f64,
    pole: (f64, f64),
}

fn dipole_coefficients(year: f64) -> StageResult<(f64, f64, f64)> {
    let first = IGRF_DIPOLE[0].0;
    if !year.is_finite() || year < first || year > LAST_VALID_YEAR {
        return Err(StageError::ApexModel(format!(
            "epoch {year} outside supported range [{first}, {LAST_VALID_YEAR}]"
        )));
    }

    let last = IGRF_DIPOLE[IGRF_DIPOLE.len() - 1];
    if year >= last.0 {
        let dt = year - last.0;
        return Ok((
            last.1 + IGRF_SECULAR.0 * dt,
            last.2 + IGRF_SECULAR.1 * dt,
            last.3 + IGRF_SECULAR.2 * dt,
        ));
    }

    let segment = IGRF_DIPOLE
        .windows(2)
        .find(|w| year >= w[0].0 && year < w[1].0)
        .ok_or_else(|| StageError::ApexModel(format!("no IGRF segment for {year}")))?;
    let (a, b) = (segment[0], segment[1]);
    let t = (year - a.0) / (b.0 - a.0);
    Ok((
        a.1 + (b.1 - a.1) * t,
        a.2 + (b.2 - a.2) * t,
        a.3 + (b.3 - a.3) * t,
    ))
}

fn unit_vector(lat: f64, lon: f64) -> Vector3<f64> {
    Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

/// Wraps an angle difference into (-pi, pi].
fn wrap_angle(delta: f64) -> f64 {
    let wrapped = delta.rem_euclid(2.0 * std::f64::consts::PI);
    if wrapped > std::f64::consts::PI {
        wrapped - 2.0 * std::f64::consts::PI
    } else {
        wrapped
    }
}

fn check_finite(values: &[f64], what: &str) -> StageResult<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(StageError::ApexModel(format!(
            "non-finite input to {what}: {values:?}"
        )))
    }
}

impl DipoleApex {
    /// Geographic (latitude, longitude) of the northern geomagnetic pole, degrees.
    pub fn pole(&self) -> (f64, f64) {
        self.pole
    }

    /// Dipole latitude and longitude (radians) of a geocentric direction.
    fn dipole_coords(&self, lat: f64, lon: f64) -> (f64, f64) {
        let u = self.rotation * unit_vector(lat, lon);
        (u.z.clamp(-1.0, 1.0).asin(), u.y.atan2(u.x))
    }

    /// Apex coordinates in radians at geocentric radius `r` (km).
    fn apex_radians(&self, lat: f64, lon: f64, r: f64) -> (f64, f64) {
        let (theta, phi) = self.dipole_coords(lat, lon);
        let cos_mlat = ((EARTH_RADIUS + REFERENCE_HEIGHT) / r).sqrt() * theta.cos();
        let mlat = cos_mlat.min(1.0).acos();
        (if theta < 0.0 { -mlat } else { mlat }, phi)
    }

    /// Gradients of apex latitude and longitude in east/north/up components (1/km).
    fn apex_gradients(&self, lat: f64, lon: f64, r: f64) -> (Vector3<f64>, Vector3<f64>) {
        let h = ANGLE_STEP;
        let dr = RADIUS_STEP;

        let (lat_e1, lon_e1) = self.apex_radians(lat, lon + h, r);
        let (lat_e0, lon_e0) = self.apex_radians(lat, lon - h, r);
        let (lat_n1, lon_n1) = self.apex_radians(lat + h, lon, r);
        let (lat_n0, lon_n0) = self.apex_radians(lat - h, lon, r);
        let (lat_u1, lon_u1) = self.apex_radians(lat, lon, r + dr);
        let (lat_u0, lon_u0) = self.apex_radians(lat, lon, r - dr);

        let east = 2.0 * h * r * lat.cos();
        let north = 2.0 * h * r;
        let up = 2.0 * dr;

        let grad_lat = Vector3::new(
            (lat_e1 - lat_e0) / east,
            (lat_n1 - lat_n0) / north,
            (lat_u1 - lat_u0) / up,
        );
        let grad_lon = Vector3::new(
            wrap_angle(lon_e1 - lon_e0) / east,
            wrap_angle(lon_n1 - lon_n0) / north,
            wrap_angle(lon_u1 - lon_u0) / up,
        );
        (grad_lat, grad_lon)
    }
}

impl ApexModel for DipoleApex {
    fn at_epoch(year: f64) -> StageResult<Self> {
        let (g10, g11, h11) = dipole_coefficients(year)?;
        let moment = (g10 * g10 + g11 * g11 + h11 * h11).sqrt();
        let colat = (-g10 / moment).acos();
        let lon = (-h11).atan2(-g11);

        let (sin_t, cos_t) = colat.sin_cos();
        let (sin_p, cos_p) = lon.sin_cos();
        let about_z = Matrix3::new(cos_p, sin_p, 0.0, -sin_p, cos_p, 0.0, 0.0, 0.0, 1.0);
        let about_y = Matrix3::new(cos_t, 0.0, -sin_t, 0.0, 1.0, 0.0, sin_t, 0.0, cos_t);

        Ok(Self {
            epoch: year,
            rotation: about_y * about_z,
            b0: moment * 1e-9,
            pole: (90.0 - colat.to_degrees(), lon.to_degrees()),
        })
    }

    fn epoch(&self) -> f64 {
        self.epoch
    }

    fn geo_to_apex(&self, lat: f64, lon: f64, alt: f64) -> StageResult<(f64, f64)> {
        check_finite(&[lat, lon, alt], "geo_to_apex")?;
        let (mlat, mlon) =
            self.apex_radians(lat.to_radians(), lon.to_radians(), EARTH_RADIUS + alt);
        Ok((mlat.to_degrees(), mlon.to_degrees()))
    }

    fn apex_to_geo(&self, mlat: f64, mlon: f64, alt: f64) -> StageResult<(f64, f64)> {
        check_finite(&[mlat, mlon, alt], "apex_to_geo")?;
        let r = EARTH_RADIUS + alt;
        let cos_theta = mlat.to_radians().cos() * (r / (EARTH_RADIUS + REFERENCE_HEIGHT)).sqrt();
        if cos_theta > 1.0 {
            return Ok((f64::NAN, f64::NAN));
        }
        let theta = cos_theta.acos().copysign(mlat);
        let phi = mlon.to_radians();
        let u = Vector3::new(theta.cos() * phi.cos(), theta.cos() * phi.sin(), theta.sin());
        let v = self.rotation.transpose() * u;
        Ok((
            v.z.clamp(-1.0, 1.0).asin().to_degrees(),
            v.y.atan2(v.x).to_degrees(),
        ))
    }

    fn basis_vectors(&self, lat: f64, lon: f64, alt: f64) -> StageResult<BasisVectors> {
        check_finite(&[lat, lon, alt], "basis_vectors")?;
        let (lat, lon, r) = (lat.to_radians(), lon.to_radians(), EARTH_RADIUS + alt);
        let (mlat, _) = self.apex_radians(lat, lon, r);
        let (grad_lat, grad_lon) = self.apex_gradients(lat, lon, r);

        let reference = EARTH_RADIUS + REFERENCE_HEIGHT;
        let sin_inclination = 2.0 * mlat.sin() / (4.0 - 3.0 * mlat.cos().powi(2)).sqrt();

        let d1 = grad_lon * (reference * mlat.cos());
        let d2 = grad_lat * (-reference * sin_inclination);
        let e3 = d1.cross(&d2);
        let d3 = e3 / e3.norm_squared();
        let e1 = d2.cross(&d3);
        let e2 = d3.cross(&d1);

        Ok(BasisVectors {
            d: [d1, d2, d3],
            e: [e1, e2, e3],
        })
    }

    fn field_magnitude(&self, mlat: f64, mlon: f64, alt: f64) -> StageResult<f64> {
        let (lat, lon) = self.apex_to_geo(mlat, mlon, alt)?;
        if !lat.is_finite() || !lon.is_finite() {
            return Ok(f64::NAN);
        }
        let (theta, _) = self.dipole_coords(lat.to_radians(), lon.to_radians());
        let r = EARTH_RADIUS + alt;
        let field = self.b0 * (EARTH_RADIUS / r).powi(3) * (1.0 + 3.0 * theta.sin().powi(2)).sqrt();
        let scale = self.basis_vectors(lat, lon, alt)?.scale_factor();
        Ok(field / scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> DipoleApex {
        DipoleApex::at_epoch(2019.4).unwrap()
    }

    #[test]
    fn pole_matches_igrf_2020() {
        let (lat, lon) = DipoleApex::at_epoch(2020.0).unwrap().pole();
        assert!((lat - 80.6).abs() < 0.1, "pole latitude {lat}");
        assert!((lon + 72.7).abs() < 0.1, "pole longitude {lon}");
    }

    #[test]
    fn epoch_outside_table_is_rejected() {
        assert!(matches!(
            DipoleApex::at_epoch(1995.0),
            Err(StageError::ApexModel(_))
        ));
        assert!(DipoleApex::at_epoch(2031.0).is_err());
        assert!(DipoleApex::at_epoch(2028.0).is_ok());
    }

    #[test]
    fn pole_maps_to_apex_pole_at_ground() {
        let apex = model();
        let (lat, lon) = apex.pole();
        let (mlat, _) = apex.geo_to_apex(lat, lon, 0.0).unwrap();
        assert!((mlat - 90.0).abs() < 1e-4);
    }

    #[test]
    fn apex_round_trip_recovers_position() {
        let apex = model();
        let (mlat, mlon) = apex.geo_to_apex(66.0, -147.0, 300.0).unwrap();
        assert!(mlat > 60.0 && mlat < 70.0, "mlat {mlat}");
        let (lat, lon) = apex.apex_to_geo(mlat, mlon, 300.0).unwrap();
        assert!((lat - 66.0).abs() < 1e-8);
        assert!((lon + 147.0).abs() < 1e-8);
    }

    #[test]
    fn equatorial_field_line_does_not_reach_altitude() {
        let (lat, lon) = model().apex_to_geo(0.0, 10.0, 300.0).unwrap();
        assert!(lat.is_nan() && lon.is_nan());
    }

    #[test]
    fn base_vectors_are_dual() {
        let basis = model().basis_vectors(65.5, -147.5, 250.0).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                let dot = basis.d[i].dot(&basis.e[j]);
                assert!((dot - expected).abs() < 1e-9, "d{i}.e{j} = {dot}");
            }
        }
    }

    #[test]
    fn base_vectors_point_east_and_along_field() {
        let basis = model().basis_vectors(65.5, -147.5, 250.0).unwrap();
        let d1 = basis.d[0];
        let d3 = basis.d[2];
        assert!(d1.x > 0.85 * d1.norm(), "d1 {d1:?}");
        // northern hemisphere field points down
        assert!(d3.z < -0.9 * d3.norm(), "d3 {d3:?}");
        assert!(basis.d[0].dot(&basis.d[2]).abs() < 1e-9);
        assert!(basis.d[1].dot(&basis.d[2]).abs() < 1e-9);
    }

    #[test]
    fn field_magnitude_is_plausible() {
        let be3 = model().field_magnitude(65.0, -95.0, 200.0).unwrap();
        assert!(be3 > 3e-5 && be3 < 8e-5, "Be3 {be3}");
    }

    #[test]
    fn non_finite_positions_are_rejected() {
        let apex = model();
        assert!(apex.geo_to_apex(f64::NAN, 0.0, 100.0).is_err());
        assert!(apex.basis_vectors(60.0, f64::INFINITY, 100.0).is_err());
    }
}
