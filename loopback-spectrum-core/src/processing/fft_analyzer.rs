use parking_lot::Mutex;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::models::config::AnalyzerConfig;
use crate::models::error::CaptureError;
use crate::models::sample_block::CapturedBlock;
use crate::processing::bands::{walk_bins, FrequencyBandTable};
use crate::processing::window::{hann, low_pass};
use crate::traits::analyzer::Analyzer;

/// Reusable FFT state. Buffers grow to the largest cycle seen.
struct FftWorkspace {
    planner: FftPlanner<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    sums: Vec<f32>,
}

impl FftWorkspace {
    fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            spectrum: Vec::new(),
            scratch: Vec::new(),
            sums: Vec::new(),
        }
    }
}

/// Spectral band analyzer.
///
/// Each cycle the mirrored stereo block is summed to mono in place,
/// Hann-windowed and transformed. Bin energies (`re² + im²`) are summed per
/// band, compressed with a natural log and smoothed against the previous
/// output.
///
/// Band sums are deliberately not divided by their bin count, which keeps
/// the wide high bands from flattening out. A band that owns no energy
/// produces `-inf` (and `NaN` once smoothed against it); consumers should
/// clamp before display.
pub struct FftBandAnalyzer {
    table: Mutex<FrequencyBandTable>,
    workspace: Mutex<FftWorkspace>,
    smoothing: f32,
    gain: f32,
}

impl FftBandAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            table: Mutex::new(FrequencyBandTable::new(config.bands)),
            workspace: Mutex::new(FftWorkspace::new()),
            smoothing: config.smoothing,
            gain: config.gain,
        })
    }

    /// Replace the band edges, keeping outputs for bands that remain.
    pub fn set_frequency_bands(&self, edges: Vec<u32>) {
        self.table.lock().set_edges(edges);
    }

    pub fn frequency_bands(&self) -> Vec<u32> {
        self.table.lock().edges().to_vec()
    }

    /// Current smoothed band magnitudes.
    pub fn band_outputs(&self) -> Vec<f32> {
        self.table.lock().outputs().to_vec()
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Default for FftBandAnalyzer {
    fn default() -> Self {
        Self {
            table: Mutex::new(FrequencyBandTable::default()),
            workspace: Mutex::new(FftWorkspace::new()),
            smoothing: 0.5,
            gain: 1.0,
        }
    }
}

impl Analyzer for FftBandAnalyzer {
    fn on_samples_ready(&self, block: &mut CapturedBlock) {
        // Drop a trailing odd frame; the real FFT needs an even length.
        let len = block.frames() & !1;
        if len == 0 {
            log::trace!("FFT analyzer skipped an empty block");
            return;
        }
        let sample_rate = block.sample_rate();

        // Mono frame i only overwrites slots already read (i <= 2i).
        let samples = block.samples_mut();
        for i in 0..len {
            let mixed = (samples[2 * i] + samples[2 * i + 1]) * self.gain;
            samples[i] = hann(mixed, i, len);
        }

        let mut workspace = self.workspace.lock();
        let FftWorkspace {
            planner,
            spectrum,
            scratch,
            sums,
        } = &mut *workspace;

        spectrum.clear();
        spectrum.extend(samples[..len].iter().map(|&re| Complex::new(re, 0.0)));

        let fft = planner.plan_fft_forward(len);
        let scratch_len = fft.get_inplace_scratch_len();
        if scratch.len() < scratch_len {
            scratch.resize(scratch_len, Complex::default());
        }
        fft.process_with_scratch(spectrum.as_mut_slice(), &mut scratch[..scratch_len]);

        let mut table = self.table.lock();
        sums.clear();
        sums.resize(table.len(), 0.0);
        walk_bins(table.edges(), sample_rate, len, |bin, band| {
            sums[band] += spectrum[bin].norm_sqr();
        });

        let smoothing = self.smoothing;
        for (output, &energy) in table.outputs_mut().iter_mut().zip(sums.iter()) {
            *output = low_pass(energy.ln(), *output, smoothing);
        }
    }

    fn processed_output(&self, out: &mut Vec<f32>) -> bool {
        let table = self.table.lock();
        out.clear();
        out.extend_from_slice(table.outputs());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sine_frames;
    use approx::assert_abs_diff_eq;

    fn block_from(samples: &[f32], sample_rate: u32) -> CapturedBlock {
        let mut block = CapturedBlock::new();
        block.set_sample_rate(sample_rate);
        block
            .append_frames(samples, samples.len() / 2, 2, false)
            .unwrap();
        block
    }

    fn argmax(values: &[f32]) -> usize {
        values
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    #[test]
    fn sine_energy_lands_in_its_band() {
        let analyzer = FftBandAnalyzer::default();
        let mut block = block_from(&sine_frames(440.0, 1.0, 48000, 1024), 48000);

        analyzer.on_samples_ready(&mut block);

        let outputs = analyzer.band_outputs();
        assert_eq!(outputs.len(), 9);
        assert_eq!(argmax(&outputs), 4);
        assert!(outputs.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn first_cycle_keeps_half_the_log_energy() {
        let analyzer = FftBandAnalyzer::default();
        let mut once = block_from(&sine_frames(1000.0, 0.5, 48000, 512), 48000);
        analyzer.on_samples_ready(&mut once);
        let first = analyzer.band_outputs();

        let passthrough = FftBandAnalyzer::new(AnalyzerConfig {
            smoothing: 1.0,
            ..AnalyzerConfig::default()
        })
        .unwrap();
        let mut again = block_from(&sine_frames(1000.0, 0.5, 48000, 512), 48000);
        passthrough.on_samples_ready(&mut again);
        let raw = passthrough.band_outputs();

        for (smoothed, raw) in first.iter().zip(raw.iter()) {
            assert_abs_diff_eq!(*smoothed, raw * 0.5, epsilon = 1e-4);
        }
    }

    #[test]
    fn downmix_rewrites_mirror_in_place() {
        let analyzer = FftBandAnalyzer::default();
        let mut block = block_from(&[0.25; 10], 48000);

        analyzer.on_samples_ready(&mut block);

        let samples = block.samples();
        // First four slots hold the windowed mono signal, the tail is untouched.
        assert_abs_diff_eq!(samples[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(samples[1], hann(0.5, 1, 4), epsilon = 1e-6);
        assert_abs_diff_eq!(samples[3], 0.0, epsilon = 1e-6);
        assert_eq!(&samples[4..], &[0.25; 6]);
    }

    #[test]
    fn empty_and_single_frame_blocks_are_ignored() {
        let analyzer = FftBandAnalyzer::default();
        let mut empty = block_from(&[], 48000);
        analyzer.on_samples_ready(&mut empty);
        let mut single = block_from(&[0.3, 0.3], 48000);
        analyzer.on_samples_ready(&mut single);

        assert!(analyzer.band_outputs().iter().all(|v| *v == 0.0));
        assert_eq!(single.samples(), &[0.3, 0.3]);
    }

    #[test]
    fn silent_band_goes_to_negative_infinity() {
        let analyzer = FftBandAnalyzer::default();
        let mut silence = block_from(&[0.0; 256], 48000);
        analyzer.on_samples_ready(&mut silence);

        assert!(analyzer
            .band_outputs()
            .iter()
            .all(|v| v.is_infinite() && v.is_sign_negative()));
    }

    #[test]
    fn band_resize_keeps_existing_outputs() {
        let analyzer = FftBandAnalyzer::new(AnalyzerConfig {
            bands: vec![200, 800, 3200],
            ..AnalyzerConfig::default()
        })
        .unwrap();
        let mut block = block_from(&sine_frames(500.0, 1.0, 48000, 1024), 48000);
        analyzer.on_samples_ready(&mut block);
        let before = analyzer.band_outputs();

        analyzer.set_frequency_bands(vec![200, 800, 3200, 6400, 12800]);

        let after = analyzer.band_outputs();
        assert_eq!(&after[..3], &before[..]);
        assert_eq!(&after[3..], &[0.0, 0.0]);
        assert_eq!(analyzer.frequency_bands(), vec![200, 800, 3200, 6400, 12800]);
    }

    #[test]
    fn processed_output_reports_band_vector() {
        let analyzer = FftBandAnalyzer::default();
        let mut out = vec![42.0];
        assert!(analyzer.processed_output(&mut out));
        assert_eq!(out, vec![0.0; 9]);
    }
}
