use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioSource, SampleFormat, StreamFormat};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::packet_source::{Packet, PacketSource};

/// One scripted device packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedPacket {
    /// Interleaved samples in the provider's channel layout.
    Audio(Vec<f32>),
    /// A packet flagged silent, carrying this many frames.
    Silence(usize),
    /// A device failure, returned from `next_packet`.
    Error(CaptureError),
}

impl ScriptedPacket {
    pub fn audio(samples: Vec<f32>) -> Self {
        Self::Audio(samples)
    }

    pub fn silence(frames: usize) -> Self {
        Self::Silence(frames)
    }

    pub fn error(error: CaptureError) -> Self {
        Self::Error(error)
    }
}

type Script = Arc<Mutex<VecDeque<Vec<ScriptedPacket>>>>;

/// In-memory capture provider driven by a script of cycles.
///
/// Each pushed cycle is the list of packets the source reports as queued
/// for one wake of the capture loop. Once the script runs out every cycle
/// is empty. Cycles can be pushed while capture is running. Clones share
/// the script and the open/close counters.
#[derive(Clone)]
pub struct ScriptedProvider {
    script: Script,
    format: StreamFormat,
    open_error: Option<CaptureError>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    /// 48 kHz float stereo with a 10 ms buffer.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            format: StreamFormat {
                sample_rate: 48000,
                channels: 2,
                sample_format: SampleFormat::Float32,
                buffer_duration: Duration::from_millis(10),
            },
            open_error: None,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_format(mut self, format: StreamFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.format.channels = channels;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.format.sample_rate = sample_rate;
        self
    }

    /// Make every `open` fail with `error`.
    pub fn failing_open(mut self, error: CaptureError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn push_cycle(&self, packets: Vec<ScriptedPacket>) {
        self.script.lock().push_back(packets);
    }

    /// Cycles not yet consumed by a source.
    pub fn pending_cycles(&self) -> usize {
        self.script.lock().len()
    }

    /// Number of sources opened so far.
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of sources dropped so far.
    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureProvider for ScriptedProvider {
    fn is_available(&self) -> bool {
        self.open_error.is_none()
    }

    fn open(&self, _config: &CaptureConfiguration) -> Result<Box<dyn PacketSource>, CaptureError> {
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            script: Arc::clone(&self.script),
            format: self.format,
            cycle: None,
            held: Vec::new(),
            closed: Arc::clone(&self.closed),
        }))
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: "scripted".into(),
            name: "Scripted loopback".into(),
            is_default: true,
        }
    }
}

/// Source opened by a [`ScriptedProvider`].
///
/// `next_packet` yields the current cycle's packets in order, then `None`
/// once, which ends the capture loop's drain for that cycle.
pub struct ScriptedSource {
    script: Script,
    format: StreamFormat,
    cycle: Option<VecDeque<ScriptedPacket>>,
    held: Vec<f32>,
    closed: Arc<AtomicUsize>,
}

impl PacketSource for ScriptedSource {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn next_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError> {
        if self.cycle.is_none() {
            match self.script.lock().pop_front() {
                Some(packets) => self.cycle = Some(packets.into()),
                None => return Ok(None),
            }
        }
        let next = self.cycle.as_mut().and_then(VecDeque::pop_front);

        match next {
            None => {
                self.cycle = None;
                Ok(None)
            }
            Some(ScriptedPacket::Audio(samples)) => {
                self.held = samples;
                let frames = self.held.len() / self.format.channels.max(1) as usize;
                Ok(Some(Packet {
                    data: &self.held,
                    frames,
                    silent: false,
                }))
            }
            Some(ScriptedPacket::Silence(frames)) => Ok(Some(Packet {
                data: &[],
                frames,
                silent: true,
            })),
            Some(ScriptedPacket::Error(error)) => Err(error),
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
