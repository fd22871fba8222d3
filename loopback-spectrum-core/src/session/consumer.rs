use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::AnalyzerConfig;
use crate::models::error::CaptureError;
use crate::models::sample_block::CapturedBlock;
use crate::processing::fft_analyzer::FftBandAnalyzer;
use crate::session::registry::{SampleConsumer, SourceLink};
use crate::traits::analyzer::{Analyzer, RawCapture};

/// State guarded by the consumer's private lock.
struct ConsumerState {
    /// Allocated on the first `process`.
    mirror: Option<CapturedBlock>,
    change_count: u32,
    link: Option<SourceLink>,
}

/// A subscriber to a capture source.
///
/// Each cycle the capture thread copies the shared block into this
/// consumer's private mirror, runs the analyzer on it, then bumps the
/// change counter. Readers on other threads compare counters between polls
/// to detect new data; every read sees a complete cycle.
///
/// Lock order is private state, then the shared block (or the analyzer's
/// own locks). Dropping a consumer removes it from its registry.
pub struct LoopbackConsumer<A: Analyzer = RawCapture> {
    state: Mutex<ConsumerState>,
    analyzer: A,
}

/// Consumer running the FFT band analyzer.
pub type FftConsumer = LoopbackConsumer<FftBandAnalyzer>;

impl<A: Analyzer> LoopbackConsumer<A> {
    pub fn new(analyzer: A) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ConsumerState {
                mirror: None,
                change_count: 0,
                link: None,
            }),
            analyzer,
        })
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    /// Refresh the mirror from the shared block and run the analyzer.
    ///
    /// Normally called by the capture thread. Does nothing, with a warning,
    /// if the consumer is not associated with a source.
    pub fn process(&self) {
        self.refresh(true);
    }

    /// Mirror and analyze. An unlinked consumer is skipped; the capture
    /// thread hits that case legitimately when a consumer is unsubscribed
    /// after the fan-out snapshot was taken.
    fn refresh(&self, warn_unlinked: bool) {
        let mut state = self.state.lock();
        let ConsumerState {
            mirror,
            change_count,
            link,
        } = &mut *state;
        let Some(link) = link.as_ref() else {
            if warn_unlinked {
                log::warn!("Consumer is not associated with a sample source; nothing to process");
            } else {
                log::trace!("Skipped a consumer unsubscribed during fan-out");
            }
            return;
        };
        let mirror = mirror.get_or_insert_with(CapturedBlock::new);

        {
            let shared = link.block.lock();
            if let Err(e) = mirror.copy_from(&shared) {
                log::error!("Failed to mirror captured samples: {}", e);
                return;
            }
        }

        self.analyzer.on_samples_ready(mirror);
        *change_count = change_count.wrapping_add(1);
    }

    /// Copy the mirrored interleaved samples into `out` and return the
    /// change counter.
    pub fn audio_output(&self, out: &mut Vec<f32>) -> u32 {
        let state = self.state.lock();
        out.clear();
        if let Some(mirror) = &state.mirror {
            out.extend_from_slice(mirror.samples());
        }
        state.change_count
    }

    /// Copy the analyzer's processed output into `out` and return the
    /// change counter, or leave `out` empty and return 0 if the analyzer
    /// produces none.
    pub fn processed_output(&self, out: &mut Vec<f32>) -> u32 {
        let state = self.state.lock();
        if self.analyzer.processed_output(out) {
            state.change_count
        } else {
            0
        }
    }

    /// Number of completed `process` calls, wrapping at `u32::MAX`.
    pub fn change_count(&self) -> u32 {
        self.state.lock().change_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.state
            .lock()
            .mirror
            .as_ref()
            .map_or(0, CapturedBlock::sample_rate)
    }

    pub fn frames(&self) -> usize {
        self.state.lock().mirror.as_ref().map_or(0, CapturedBlock::frames)
    }

    /// Frames the mirror can hold without growing.
    pub fn capacity_frames(&self) -> usize {
        self.state
            .lock()
            .mirror
            .as_ref()
            .map_or(0, CapturedBlock::capacity_frames)
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().link.is_some()
    }
}

impl LoopbackConsumer<RawCapture> {
    /// Consumer that only mirrors raw samples.
    pub fn raw() -> Arc<Self> {
        Self::new(RawCapture)
    }
}

impl LoopbackConsumer<FftBandAnalyzer> {
    pub fn fft(config: AnalyzerConfig) -> Result<Arc<Self>, CaptureError> {
        Ok(Self::new(FftBandAnalyzer::new(config)?))
    }

    pub fn set_frequency_bands(&self, edges: Vec<u32>) {
        self.analyzer.set_frequency_bands(edges);
    }

    pub fn frequency_bands(&self) -> Vec<u32> {
        self.analyzer.frequency_bands()
    }
}

impl<A: Analyzer> SampleConsumer for LoopbackConsumer<A> {
    fn process(&self) {
        self.refresh(false);
    }

    fn link(&self, link: SourceLink) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.link.is_some() {
            return Err(CaptureError::AlreadySubscribed);
        }
        state.link = Some(link);
        Ok(())
    }

    fn unlink(&self) -> Option<SourceLink> {
        self.state.lock().link.take()
    }
}

impl<A: Analyzer> Drop for LoopbackConsumer<A> {
    fn drop(&mut self) {
        if let Some(link) = self.state.get_mut().link.take() {
            link.detach_from_registry();
        }
    }
}

#[cfg(test)]
impl<A: Analyzer> LoopbackConsumer<A> {
    pub(crate) fn set_change_count(&self, count: u32) {
        self.state.lock().change_count = count;
    }
}
