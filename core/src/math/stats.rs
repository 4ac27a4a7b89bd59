pub struct StatsHelper;

impl StatsHelper {
    /// Mean of the finite entries; NaN when there are none.
    pub fn nanmean(samples: &[f64]) -> f64 {
        let (sum, count) = samples
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            return f64::NAN;
        }
        sum / count as f64
    }

    pub fn count_finite<'a>(samples: impl IntoIterator<Item = &'a f64>) -> usize {
        samples.into_iter().filter(|v| v.is_finite()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanmean_skips_missing_values() {
        assert_eq!(StatsHelper::nanmean(&[1.0, f64::NAN, 3.0]), 2.0);
    }

    #[test]
    fn nanmean_of_all_missing_is_nan() {
        assert!(StatsHelper::nanmean(&[f64::NAN, f64::NAN]).is_nan());
        assert!(StatsHelper::nanmean(&[]).is_nan());
    }

    #[test]
    fn count_finite_ignores_nan_and_inf() {
        assert_eq!(
            StatsHelper::count_finite(&[1.0, f64::NAN, f64::INFINITY, -2.0]),
            2
        );
    }
}
