use crate::models::audio_models::StreamFormat;
use crate::models::error::CaptureError;

/// One packet of interleaved device samples.
///
/// `data` holds `frames * channels` samples in the stream's channel layout.
/// When `silent` is set the contents of `data` are meaningless and the
/// packet is treated as `frames` frames of silence.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub data: &'a [f32],
    pub frames: usize,
    pub silent: bool,
}

/// An opened capture stream, polled by the capture loop.
pub trait PacketSource {
    /// Fixed format of this stream.
    fn format(&self) -> StreamFormat;

    /// Next available packet, or `None` once the device has nothing queued.
    ///
    /// The returned packet stays valid until the next call. An error is
    /// unrecoverable and ends the capture run.
    fn next_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError>;
}
