use crate::error::AnalyticsError;
use core_types::PairedRate;

/// Log returns of both legs of an aligned series.
///
/// A step is skipped when either side's previous or current rate is not
/// positive, so the two returned vectors always have equal length.
pub fn paired_log_returns(rows: &[PairedRate]) -> (Vec<f64>, Vec<f64>) {
    rows.windows(2)
        .filter(|w| w[0].rate_a > 0.0 && w[0].rate_b > 0.0 && w[1].rate_a > 0.0 && w[1].rate_b > 0.0)
        .map(|w| ((w[1].rate_a / w[0].rate_a).ln(), (w[1].rate_b / w[0].rate_b).ln()))
        .unzip()
}

/// Pearson correlation coefficient of two equally long series.
pub fn pearson(a: &[f64], b: &[f64]) -> Result<f64, AnalyticsError> {
    if a.len() != b.len() {
        return Err(AnalyticsError::InsufficientData(
            "series have mismatched lengths".to_string(),
        ));
    }
    let n = a.len();
    if n < 2 {
        return Err(AnalyticsError::InsufficientData("not enough samples".to_string()));
    }

    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let (mut num, mut den_a, mut den_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let da = x - mean_a;
        let db = y - mean_b;
        num += da * db;
        den_a += da * da;
        den_b += db * db;
    }

    let den = (den_a * den_b).sqrt();
    if den == 0.0 {
        return Err(AnalyticsError::InsufficientData("zero variance".to_string()));
    }
    // Rounding can push a perfect correlation just past one.
    Ok((num / den).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(minute: u32, rate_a: f64, rate_b: f64) -> PairedRate {
        PairedRate {
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
            rate_a,
            rate_b,
            base: "USD".to_string(),
        }
    }

    #[test]
    fn perfectly_linear_series_correlate_to_one() {
        let r = pearson(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        let r = pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_series_has_no_correlation() {
        assert!(matches!(
            pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(AnalyticsError::InsufficientData(_))
        ));
    }

    #[test]
    fn two_point_series_stay_within_unit_bounds() {
        // Two returns always correlate to exactly +1 or -1 before rounding.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            (seed >> 11) as f64 / (1u64 << 53) as f64 - 0.5
        };
        for _ in 0..10_000 {
            let a = [next(), next()];
            let b = [next(), next()];
            if let Ok(r) = pearson(&a, &b) {
                assert!((-1.0..=1.0).contains(&r), "r = {r}");
            }
        }
    }

    #[test]
    fn log_returns_skip_non_positive_steps() {
        let rows = vec![row(0, 1.0, 2.0), row(1, 0.0, 2.0), row(2, 1.0, 4.0), row(3, 2.0, 4.0)];
        let (a, b) = paired_log_returns(&rows);
        // Only the last step has positive rates on both ends.
        assert_eq!(a.len(), 1);
        assert!((a[0] - 2f64.ln()).abs() < 1e-12);
        assert_eq!(b, vec![0.0]);
    }
}
