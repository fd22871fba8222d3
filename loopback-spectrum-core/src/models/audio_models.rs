use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Number of interleaved channels carried by every published block.
pub const CAPTURE_CHANNELS: u16 = 2;

/// Sample encoding reported by a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    Float32,
    Int16,
    Int24,
    Int32,
    Unknown,
}

/// Fixed format of an opened capture stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    /// Duration of the device-side buffer. The capture loop wakes twice per
    /// buffer so no packet is overwritten before it is drained.
    pub buffer_duration: Duration,
}

impl StreamFormat {
    /// Checks the stream can feed the analysis pipeline: 32-bit float with
    /// at least two channels and a non-zero rate.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.sample_format != SampleFormat::Float32 {
            return Err(CaptureError::UnsupportedFormat(format!(
                "expected 32-bit float samples, got {:?}",
                self.sample_format
            )));
        }
        if self.channels < CAPTURE_CHANNELS {
            return Err(CaptureError::UnsupportedFormat(format!(
                "need at least {} channels, device has {}",
                CAPTURE_CHANNELS, self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(CaptureError::UnsupportedFormat("sample rate is zero".into()));
        }
        Ok(())
    }

    /// Sleep between capture cycles: half the device buffer.
    pub fn poll_interval(&self) -> Duration {
        self.buffer_duration / 2
    }
}

/// An audio endpoint a provider captures from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Counters describing the capture loop's work so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureDiagnostics {
    pub cycles: u64,
    pub empty_cycles: u64,
    pub packets: u64,
    pub silent_packets: u64,
    pub frames_captured: u64,
    pub consumers_notified: u64,
    pub last_cycle_frames: usize,
}
