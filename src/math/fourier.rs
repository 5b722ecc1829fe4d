//! Fourier features for periodic components.
//!
//! A seasonality of period `P` days and order `N` contributes `2N` columns:
//!
//! - `sin(2πk·t/P)`, `cos(2πk·t/P)` for `k = 1..=N`
//!
//! with `t` measured in days since 1970-01-01 so the phase does not depend on
//! the training window.

use std::f64::consts::PI;

use chrono::NaiveDateTime;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Days (fractional) since the Unix epoch, on the naive wall clock.
pub fn days_since_epoch(ts: NaiveDateTime) -> f64 {
    ts.and_utc().timestamp_millis() as f64 / MS_PER_DAY
}

/// Write the `2 * order` Fourier terms of `t_days` into `out`.
///
/// # Panics
/// Panics if `out.len() < 2 * order`.
pub fn fill_fourier(t_days: f64, period: f64, order: usize, out: &mut [f64]) {
    for k in 1..=order {
        let x = 2.0 * PI * k as f64 * t_days / period;
        out[2 * (k - 1)] = x.sin();
        out[2 * (k - 1) + 1] = x.cos();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn epoch_offset_in_days() {
        let ts = NaiveDate::from_ymd_opt(1970, 1, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert!((days_since_epoch(ts) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn terms_repeat_every_period() {
        let mut a = [0.0; 6];
        let mut b = [0.0; 6];
        fill_fourier(3.25, 7.0, 3, &mut a);
        fill_fourier(3.25 + 7.0, 7.0, 3, &mut b);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-9);
        }
        // sin² + cos² = 1 for every harmonic.
        for k in 0..3 {
            assert!((a[2 * k].powi(2) + a[2 * k + 1].powi(2) - 1.0).abs() < 1e-12);
        }
    }
}
