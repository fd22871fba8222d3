//! # loopback-spectrum-core
//!
//! Platform-agnostic core of the loopback spectrum pipeline.
//!
//! A capture thread drains the system's render mix from a platform backend,
//! publishes each cycle into a shared block and fans it out to subscribed
//! consumers. Each consumer mirrors the block under its own lock and runs an
//! analyzer on it; the FFT band analyzer turns the mirror into smoothed
//! per-band log magnitudes. Platform backends (Windows WASAPI) implement
//! `CaptureProvider` and plug into the generic `CaptureService`.
//!
//! ## Architecture
//!
//! ```text
//! loopback-spectrum-core (this crate)
//! ├── traits/       ← CaptureProvider, PacketSource, Analyzer, CaptureDelegate
//! ├── models/       ← CaptureError, CaptureState, configs, CapturedBlock, StreamFormat
//! ├── processing/   ← Hann window, low-pass, band table, FftBandAnalyzer
//! ├── session/      ← CaptureService, ConsumerRegistry, LoopbackConsumer
//! └── testing/      ← ScriptedProvider (in-memory backend), signal helpers
//! ```
//!
//! ## Example
//!
//! ```
//! use loopback_spectrum_core::testing::{sine_frames, ScriptedPacket, ScriptedProvider};
//! use loopback_spectrum_core::{AnalyzerConfig, CaptureConfiguration, CaptureService, LoopbackConsumer};
//!
//! let provider = ScriptedProvider::new();
//! provider.push_cycle(vec![ScriptedPacket::audio(sine_frames(440.0, 0.5, 48000, 1024))]);
//!
//! let service = CaptureService::new(provider, CaptureConfiguration::default()).unwrap();
//! let bands = LoopbackConsumer::fft(AnalyzerConfig::default()).unwrap();
//! service.subscribe(&bands).unwrap();
//! service.start().unwrap();
//!
//! let mut out = Vec::new();
//! let _counter = bands.processed_output(&mut out);
//! service.stop().unwrap();
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod testing;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{AudioSource, CaptureDiagnostics, SampleFormat, StreamFormat, CAPTURE_CHANNELS};
pub use models::config::{AnalyzerConfig, CaptureConfiguration};
pub use models::error::CaptureError;
pub use models::sample_block::CapturedBlock;
pub use models::state::CaptureState;
pub use processing::bands::{bin_band_assignment, default_band_edges, FrequencyBandTable};
pub use processing::fft_analyzer::FftBandAnalyzer;
pub use processing::window::{hann, low_pass};
pub use session::capture_service::CaptureService;
pub use session::consumer::{FftConsumer, LoopbackConsumer};
pub use session::registry::ConsumerRegistry;
pub use traits::analyzer::{Analyzer, RawCapture};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_provider::CaptureProvider;
pub use traits::packet_source::{Packet, PacketSource};
