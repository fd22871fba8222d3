use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{CaptureDiagnostics, StreamFormat};
use crate::models::error::CaptureError;
use crate::models::sample_block::CapturedBlock;
use crate::session::registry::ConsumerRegistry;
use crate::traits::packet_source::PacketSource;

/// What one capture cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// Nothing was queued; no publish, no fan-out.
    Empty,
    Published { frames: usize, consumers: usize },
}

/// Body of the capture thread: drains packets into a working buffer,
/// publishes it to the shared block and fans out to consumers.
pub(crate) struct CaptureLoop {
    working: CapturedBlock,
    registry: ConsumerRegistry,
    diagnostics: Arc<Mutex<CaptureDiagnostics>>,
    channels: u16,
}

impl CaptureLoop {
    pub(crate) fn new(
        format: &StreamFormat,
        registry: ConsumerRegistry,
        diagnostics: Arc<Mutex<CaptureDiagnostics>>,
    ) -> Self {
        let mut working = CapturedBlock::new();
        working.set_sample_rate(format.sample_rate);
        Self {
            working,
            registry,
            diagnostics,
            channels: format.channels,
        }
    }

    /// Drain every queued packet, then publish and notify consumers if any
    /// frames arrived.
    pub(crate) fn run_cycle(&mut self, source: &mut dyn PacketSource) -> Result<CycleOutcome, CaptureError> {
        self.working.clear();
        let mut packets = 0u64;
        let mut silent = 0u64;

        while let Some(packet) = source.next_packet()? {
            packets += 1;
            if packet.silent {
                silent += 1;
            }
            self.working
                .append_frames(packet.data, packet.frames, self.channels, packet.silent)?;
        }

        let frames = self.working.frames();
        {
            let mut diagnostics = self.diagnostics.lock();
            diagnostics.cycles += 1;
            diagnostics.packets += packets;
            diagnostics.silent_packets += silent;
            diagnostics.last_cycle_frames = frames;
            if frames == 0 {
                diagnostics.empty_cycles += 1;
            } else {
                diagnostics.frames_captured += frames as u64;
            }
        }
        if frames == 0 {
            return Ok(CycleOutcome::Empty);
        }

        self.registry.block().lock().copy_from(&self.working)?;

        let consumers = self.registry.dispatch();
        self.diagnostics.lock().consumers_notified += consumers as u64;
        log::trace!("Published {} frames to {} consumers", frames, consumers);
        Ok(CycleOutcome::Published { frames, consumers })
    }

    /// Frames the working buffer can hold without growing.
    #[cfg(test)]
    pub(crate) fn working_capacity(&self) -> usize {
        self.working.capacity_frames()
    }
}
