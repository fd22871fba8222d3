//! # loopback-spectrum-windows
//!
//! Windows WASAPI backend for loopback-spectrum.
//!
//! Provides:
//! - `WasapiLoopbackCapture`: system audio capture via WASAPI loopback on the
//!   default render endpoint
//! - `format`: mix-format classification and reference-time conversions
//!
//! ## Usage
//! ```ignore
//! use loopback_spectrum_core::{AnalyzerConfig, CaptureConfiguration, CaptureService, LoopbackConsumer};
//! use loopback_spectrum_windows::WasapiLoopbackCapture;
//!
//! let service = CaptureService::new(WasapiLoopbackCapture::default_device(), CaptureConfiguration::default())?;
//! let bands = LoopbackConsumer::fft(AnalyzerConfig::default())?;
//! service.subscribe(&bands)?;
//! service.start()?;
//! ```

pub mod format;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;

#[cfg(target_os = "windows")]
pub use wasapi_loopback::{WasapiLoopbackCapture, WasapiLoopbackSource};
