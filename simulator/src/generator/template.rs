use vvelscore::{Beam, RadarSite};

/// Up-B beam code of the Poker Flat array.
pub const PFISR_UP_B: u32 = 64157;

/// Poker Flat Incoherent Scatter Radar, Alaska.
pub fn pfisr_site() -> RadarSite {
    RadarSite {
        lat: 65.13,
        lon: -147.47,
        alt: 0.213,
    }
}

/// A typical PFISR imaging pattern: the up-B beam plus a fan of oblique beams.
pub fn pfisr_beams() -> Vec<Beam> {
    [
        (PFISR_UP_B, -154.3, 77.5),
        (64016, 14.04, 90.0),
        (64964, -34.69, 66.09),
        (65066, 75.03, 65.56),
        (65162, 104.0, 55.0),
        (65262, -130.0, 55.0),
        (65383, 160.0, 60.0),
        (64046, 0.0, 45.0),
    ]
    .iter()
    .map(|&(code, azimuth, elevation)| Beam {
        code,
        azimuth,
        elevation,
    })
    .collect()
}
