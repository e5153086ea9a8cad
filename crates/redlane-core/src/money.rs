//! Monetary rounding.
//!
//! Amounts travel as `f64` and are rounded half-up to two decimal places at
//! the end of every calculation. The scaled value is nudged by a tiny epsilon
//! before rounding so binary representations such as `1.005` (stored as
//! `1.00499999...`) round the way a decimal reader expects.

const ROUNDING_EPSILON: f64 = 1e-9;

/// Round `value` half-up (away from zero) to two decimal places.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scaled = value * 100.0;
    let nudged = scaled + ROUNDING_EPSILON * scaled.signum();
    nudged.round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_up() {
        assert_eq!(round2(1.005), 1.01);
        assert_eq!(round2(2.675), 2.68);
        assert_eq!(round2(0.125), 0.13);
    }

    #[test]
    fn negative_rounds_away_from_zero() {
        assert_eq!(round2(-1.005), -1.01);
    }

    #[test]
    fn exact_values_unchanged() {
        assert_eq!(round2(14950.0), 14950.0);
        assert_eq!(round2(25.0), 25.0);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn truncates_below_half() {
        assert_eq!(round2(3.14159), 3.14);
    }
}
