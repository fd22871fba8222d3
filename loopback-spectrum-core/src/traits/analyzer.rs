use crate::models::sample_block::CapturedBlock;

/// Per-consumer processing hook run after each capture cycle.
///
/// Called on the capture thread while the owning consumer's private lock is
/// held, after the consumer's mirror has been refreshed. Implementations may
/// rewrite the mirror in place. Failures are handled internally; nothing is
/// propagated back to the capture loop.
pub trait Analyzer: Send + Sync + 'static {
    /// Process the freshly mirrored samples.
    fn on_samples_ready(&self, _block: &mut CapturedBlock) {}

    /// Write this analyzer's processed output into `out`.
    ///
    /// Returns `false` (with `out` cleared) when the analyzer produces no
    /// processed data.
    fn processed_output(&self, out: &mut Vec<f32>) -> bool {
        out.clear();
        false
    }
}

/// Analyzer that keeps only the raw mirrored samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCapture;

impl Analyzer for RawCapture {}
