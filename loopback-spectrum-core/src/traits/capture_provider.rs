use crate::models::audio_models::AudioSource;
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::traits::packet_source::PacketSource;

/// Interface for platform-specific loopback capture backends.
///
/// Implemented by:
/// - `WasapiLoopbackCapture` (Windows)
/// - `ScriptedProvider` (in-memory, for tests and demos)
pub trait CaptureProvider: Send + Sync {
    /// Whether this capture source is currently available.
    fn is_available(&self) -> bool;

    /// Open the device and start streaming.
    ///
    /// Called on the capture thread, which owns the returned source for the
    /// whole run. Dropping the source releases every device resource.
    fn open(&self, config: &CaptureConfiguration) -> Result<Box<dyn PacketSource>, CaptureError>;

    /// Information about the audio device backing this provider.
    fn device_info(&self) -> AudioSource;
}
