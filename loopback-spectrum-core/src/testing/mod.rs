//! In-memory capture backend and signal helpers for tests and demos.

pub mod scripted;

pub use scripted::{ScriptedPacket, ScriptedProvider, ScriptedSource};

use std::f32::consts::TAU;

/// `frames` frames of an interleaved stereo sine, identical on both channels.
pub fn sine_frames(frequency: f32, amplitude: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
    let step = TAU * frequency / sample_rate as f32;
    (0..frames)
        .flat_map(|i| {
            let value = amplitude * (step * i as f32).sin();
            [value, value]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sine_is_interleaved_stereo() {
        let samples = sine_frames(12000.0, 0.5, 48000, 4);
        assert_eq!(samples.len(), 8);
        assert_abs_diff_eq!(samples[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(samples[2], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(samples[3], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(samples[6], -0.5, epsilon = 1e-6);
    }
}
