use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use crate::processing::bands::default_band_edges;

/// Configuration for a capture service.
///
/// Loadable from JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Buffer duration requested from the device, in milliseconds (default: 50).
    pub buffer_duration_ms: u64,

    /// Fixed sleep between capture cycles. `None` derives it from the
    /// device-reported buffer duration.
    pub poll_interval_ms: Option<u64>,

    /// Name given to the capture thread.
    pub thread_name: String,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.buffer_duration_ms == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "buffer duration must be positive".into(),
            ));
        }
        if self.poll_interval_ms == Some(0) {
            return Err(CaptureError::ConfigurationFailed(
                "poll interval must be positive".into(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(CaptureError::ConfigurationFailed(
                "thread name must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(self.buffer_duration_ms)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            CaptureError::ConfigurationFailed(format!("failed to parse capture configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            buffer_duration_ms: 50,
            poll_interval_ms: None,
            thread_name: "loopback-capture".into(),
        }
    }
}

/// Configuration for an FFT band analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Upper edge of each band in Hz, ascending.
    pub bands: Vec<u32>,

    /// Low-pass coefficient applied to each band's log magnitude (default: 0.5).
    pub smoothing: f32,

    /// Gain applied when the two channels are summed to mono (default: 1.0).
    pub gain: f32,
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "smoothing must be within [0, 1], got {}",
                self.smoothing
            )));
        }
        if !self.gain.is_finite() {
            return Err(CaptureError::ConfigurationFailed("gain must be finite".into()));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            CaptureError::ConfigurationFailed(format!("failed to parse analyzer configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            bands: default_band_edges(),
            smoothing: 0.5,
            gain: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CaptureConfiguration::default().validate().is_ok());
        assert!(AnalyzerConfig::default().validate().is_ok());
        assert_eq!(
            AnalyzerConfig::default().bands,
            vec![30, 60, 120, 240, 480, 960, 1920, 3840, 7680]
        );
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = CaptureConfiguration::from_json_str(r#"{ "poll_interval_ms": 5 }"#).unwrap();
        assert_eq!(config.poll_interval(), Some(Duration::from_millis(5)));
        assert_eq!(config.buffer_duration_ms, 50);

        let analyzer = AnalyzerConfig::from_json_str(r#"{ "bands": [100, 1000] }"#).unwrap();
        assert_eq!(analyzer.bands, vec![100, 1000]);
        assert_eq!(analyzer.smoothing, 0.5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            CaptureConfiguration::from_json_str(r#"{ "buffer_duration_ms": 0 }"#),
            Err(CaptureError::ConfigurationFailed(_))
        ));
        assert!(matches!(
            AnalyzerConfig::from_json_str(r#"{ "smoothing": 1.5 }"#),
            Err(CaptureError::ConfigurationFailed(_))
        ));
        assert!(matches!(
            AnalyzerConfig::from_json_str("not json"),
            Err(CaptureError::ConfigurationFailed(_))
        ));
    }
}
