//! Mix-format interpretation shared by the WASAPI backend.
//!
//! Kept free of Win32 types so it builds and tests on every platform.

use std::time::Duration;

use loopback_spectrum_core::models::audio_models::{SampleFormat, StreamFormat};

/// WASAPI reference time units (100 ns) per second.
pub const REFTIMES_PER_SEC: u64 = 10_000_000;

pub const WAVE_FORMAT_PCM: u16 = 1;
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
/// Extended format; the real encoding is in the `SubFormat` GUID.
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// `KSDATAFORMAT_SUBTYPE_IEEE_FLOAT` as a `u128`.
pub const SUBTYPE_IEEE_FLOAT: u128 = 0x00000003_0000_0010_8000_00aa00389b71;

/// Sample encoding of a mix format.
///
/// `float_subformat` is only consulted for `WAVE_FORMAT_EXTENSIBLE`.
pub fn classify_sample_format(format_tag: u16, bits_per_sample: u16, float_subformat: bool) -> SampleFormat {
    let is_float = match format_tag {
        WAVE_FORMAT_IEEE_FLOAT => true,
        WAVE_FORMAT_PCM => false,
        WAVE_FORMAT_EXTENSIBLE => float_subformat,
        _ => return SampleFormat::Unknown,
    };
    match (is_float, bits_per_sample) {
        (true, 32) => SampleFormat::Float32,
        (false, 16) => SampleFormat::Int16,
        (false, 24) => SampleFormat::Int24,
        (false, 32) => SampleFormat::Int32,
        _ => SampleFormat::Unknown,
    }
}

/// Requested buffer duration in reference time units.
pub fn duration_to_reftime(duration: Duration) -> i64 {
    let units = duration.as_nanos() / 100;
    i64::try_from(units).unwrap_or(i64::MAX)
}

/// Duration of a device buffer of `frames` frames.
pub fn buffer_duration(frames: u32, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let reftime = REFTIMES_PER_SEC * frames as u64 / sample_rate as u64;
    Duration::from_nanos(reftime * 100)
}

/// Stream format reported to the capture loop for an initialized client.
pub fn stream_format(
    sample_rate: u32,
    channels: u16,
    sample_format: SampleFormat,
    buffer_frames: u32,
) -> StreamFormat {
    StreamFormat {
        sample_rate,
        channels,
        sample_format,
        buffer_duration: buffer_duration(buffer_frames, sample_rate),
    }
}
