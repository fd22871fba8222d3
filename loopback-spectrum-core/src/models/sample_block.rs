use super::audio_models::CAPTURE_CHANNELS;
use super::error::CaptureError;

const CHANNELS: usize = CAPTURE_CHANNELS as usize;

/// Interleaved stereo float samples from one capture cycle.
///
/// The backing storage tracks the high-water mark of every frame count it
/// has held and never shrinks; `frames` selects the valid prefix. Used for
/// the capture loop's working buffer, the shared published block and each
/// consumer's private mirror.
#[derive(Debug, Clone, Default)]
pub struct CapturedBlock {
    samples: Vec<f32>,
    frames: usize,
    sample_rate: u32,
}

impl CapturedBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of valid frames (one frame = one sample per channel).
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        CAPTURE_CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Frames the block can hold without growing.
    pub fn capacity_frames(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    /// The valid interleaved samples, `frames * channels` long.
    pub fn samples(&self) -> &[f32] {
        &self.samples[..self.frames * CHANNELS]
    }

    /// Mutable view of the valid samples for in-place processing.
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples[..self.frames * CHANNELS]
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    /// Marks the block empty without releasing storage.
    pub fn clear(&mut self) {
        self.frames = 0;
    }

    /// Grows storage to hold at least `frames` frames. Never shrinks.
    pub fn ensure_capacity(&mut self, frames: usize) -> Result<(), CaptureError> {
        let needed = frames
            .checked_mul(CHANNELS)
            .ok_or(CaptureError::AllocationFailed { requested: usize::MAX })?;
        if needed > self.samples.len() {
            self.samples
                .try_reserve_exact(needed - self.samples.len())
                .map_err(|_| CaptureError::AllocationFailed { requested: needed })?;
            self.samples.resize(needed, 0.0);
        }
        Ok(())
    }

    /// Replaces this block's contents with `other`'s, growing if needed.
    pub fn copy_from(&mut self, other: &CapturedBlock) -> Result<(), CaptureError> {
        self.ensure_capacity(other.frames)?;
        let len = other.frames * CHANNELS;
        self.samples[..len].copy_from_slice(&other.samples[..len]);
        self.frames = other.frames;
        self.sample_rate = other.sample_rate;
        Ok(())
    }

    /// Appends `frames` frames of device data with `source_channels`
    /// interleaved channels, keeping the first two.
    ///
    /// Silent packets, and any frames missing from a short `data` slice,
    /// are written as zeros so grown storage never exposes stale samples.
    pub fn append_frames(
        &mut self,
        data: &[f32],
        frames: usize,
        source_channels: u16,
        silent: bool,
    ) -> Result<(), CaptureError> {
        if frames == 0 {
            return Ok(());
        }
        let start = self.frames;
        let end = start
            .checked_add(frames)
            .ok_or(CaptureError::AllocationFailed { requested: usize::MAX })?;
        self.ensure_capacity(end)?;

        let dst = &mut self.samples[start * CHANNELS..end * CHANNELS];
        let source_channels = source_channels as usize;
        let copied = if silent || source_channels < CHANNELS {
            0
        } else {
            let mut copied = 0;
            for (frame, out) in data
                .chunks_exact(source_channels)
                .zip(dst.chunks_exact_mut(CHANNELS))
            {
                out.copy_from_slice(&frame[..CHANNELS]);
                copied += 1;
            }
            copied
        };
        dst[copied * CHANNELS..].fill(0.0);

        self.frames = end;
        Ok(())
    }
}
