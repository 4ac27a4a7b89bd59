/// Piecewise-linear interpolation of `fp(xp)` onto `x`, propagating the sample errors `dfp`.
///
/// `xp` must be increasing. Targets outside `[min(xp), max(xp))`, or that fall between
/// non-bracketing samples, come back as NaN for both value and error.
pub fn lin_interp(x: &[f64], xp: &[f64], fp: &[f64], dfp: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let lower = xp.iter().copied().filter(|v| v.is_finite()).fold(f64::INFINITY, f64::min);
    let upper = xp
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);

    x.iter()
        .map(|&xi| {
            if !(xi >= lower && xi < upper) {
                return (f64::NAN, f64::NAN);
            }
            let Some(i) = xp.windows(2).position(|w| xi >= w[0] && xi < w[1]) else {
                return (f64::NAN, f64::NAN);
            };
            let t = (xi - xp[i]) / (xp[i + 1] - xp[i]);
            let value = fp[i] + (fp[i + 1] - fp[i]) * t;
            let error = ((1.0 - t).powi(2) * dfp[i].powi(2) + t.powi(2) * dfp[i + 1].powi(2)).sqrt();
            (value, error)
        })
        .unzip()
}
