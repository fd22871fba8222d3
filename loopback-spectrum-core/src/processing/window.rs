//! Window and smoothing functions shared by the analyzers.

use std::f32::consts::TAU;

/// Hann window applied to one sample.
///
/// Both ends of the window evaluate to zero. Windows shorter than two
/// samples have no interior and yield zero.
pub fn hann(sample: f32, index: usize, total: usize) -> f32 {
    if total < 2 {
        return 0.0;
    }
    sample * 0.5 * (1.0 - (TAU * index as f32 / (total - 1) as f32).cos())
}

/// Single-pole low-pass (exponential) filter step.
///
/// A coefficient of 0 freezes the output, 1 passes `input` straight through.
pub fn low_pass(input: f32, previous: f32, coefficient: f32) -> f32 {
    previous + coefficient * (input - previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn hann_is_zero_at_both_ends() {
        for total in [2usize, 3, 16, 1023, 1024, 4096] {
            assert_abs_diff_eq!(hann(0.8, 0, total), 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(hann(0.8, total - 1, total), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn degenerate_window_lengths_yield_zero() {
        assert_eq!(hann(0.8, 0, 0), 0.0);
        assert_eq!(hann(0.8, 0, 1), 0.0);
    }

    #[test]
    fn hann_peaks_at_centre() {
        assert_abs_diff_eq!(hann(2.0, 2, 5), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(hann(1.0, 1, 5), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn low_pass_coefficient_limits() {
        assert_eq!(low_pass(10.0, 4.0, 0.0), 4.0);
        assert_eq!(low_pass(10.0, 4.0, 1.0), 10.0);
        assert_abs_diff_eq!(low_pass(10.0, 4.0, 0.5), 7.0);
    }
}
