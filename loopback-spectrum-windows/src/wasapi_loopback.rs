//! WASAPI loopback capture provider for system audio.
//!
//! Captures the mix going to the default render endpoint using
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`. No special permissions needed on Windows.
//! DRM-protected audio arrives as silent packets.

use std::ptr;
use std::slice;

use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use loopback_spectrum_core::models::audio_models::{AudioSource, StreamFormat};
use loopback_spectrum_core::models::config::CaptureConfiguration;
use loopback_spectrum_core::models::error::CaptureError;
use loopback_spectrum_core::traits::capture_provider::CaptureProvider;
use loopback_spectrum_core::traits::packet_source::{Packet, PacketSource};

use crate::format;

/// WASAPI loopback capture on the default render device.
pub struct WasapiLoopbackCapture {
    device_name: String,
}

impl WasapiLoopbackCapture {
    pub fn default_device() -> Self {
        Self {
            device_name: "System Audio (Loopback)".into(),
        }
    }
}

impl Default for WasapiLoopbackCapture {
    fn default() -> Self {
        Self::default_device()
    }
}

impl CaptureProvider for WasapiLoopbackCapture {
    fn is_available(&self) -> bool {
        // Loopback is available on every shared-mode render endpoint.
        true
    }

    fn open(&self, config: &CaptureConfiguration) -> Result<Box<dyn PacketSource>, CaptureError> {
        let source = unsafe { WasapiLoopbackSource::open(config)? };
        log::info!(
            "Opened loopback on {}: {:?}",
            self.device_name,
            source.format
        );
        Ok(Box::new(source))
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: "system-loopback".into(),
            name: self.device_name.clone(),
            is_default: true,
        }
    }
}

/// A started loopback stream. Lives on the capture thread that opened it.
///
/// Fields drop in declaration order: COM interfaces first, then the mix
/// format, then COM itself.
pub struct WasapiLoopbackSource {
    capture_client: IAudioCaptureClient,
    audio_client: IAudioClient,
    format: StreamFormat,
    channels: usize,
    /// Frames of the buffer handed out by the last `next_packet`, released
    /// on the following call.
    pending_release: Option<u32>,
    _mix_format: MixFormat,
    _com: CoUninitializeGuard,
}

impl WasapiLoopbackSource {
    /// Sequence:
    /// 1. CoInitializeEx (MTA)
    /// 2. Default render endpoint, activate IAudioClient
    /// 3. Initialize shared-mode loopback with the mix format
    /// 4. IAudioCaptureClient, MMCSS registration, Start
    ///
    /// # Safety
    /// Must be called on the thread that will poll the source.
    unsafe fn open(config: &CaptureConfiguration) -> Result<Self, CaptureError> {
        CoInitializeEx(None, COINIT_MULTITHREADED)
            .ok()
            .map_err(|e| device_error("CoInitializeEx", e))?;
        let com = CoUninitializeGuard;

        let enumerator: IMMDeviceEnumerator =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|_| CaptureError::DeviceNotAvailable)?;

        // Loopback reads from the render endpoint.
        let device = enumerator
            .GetDefaultAudioEndpoint(eRender, eConsole)
            .map_err(|_| CaptureError::DeviceNotAvailable)?;

        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| device_error("IMMDevice::Activate", e))?;

        let mix_format = MixFormat(
            audio_client
                .GetMixFormat()
                .map_err(|e| device_error("GetMixFormat", e))?,
        );
        let wave = &*mix_format.0;
        let sample_rate = wave.nSamplesPerSec;
        let channels = wave.nChannels;
        let sample_format = format::classify_sample_format(
            wave.wFormatTag,
            wave.wBitsPerSample,
            mix_format.has_float_subformat(),
        );

        audio_client
            .Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_LOOPBACK,
                format::duration_to_reftime(config.buffer_duration()),
                0,
                mix_format.0,
                None,
            )
            .map_err(|e| device_error("IAudioClient::Initialize (loopback)", e))?;

        let buffer_frames = audio_client
            .GetBufferSize()
            .map_err(|e| device_error("GetBufferSize", e))?;

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| device_error("GetService", e))?;

        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        if let Err(e) = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) {
            log::debug!("MMCSS registration failed: {}", e);
        }

        audio_client
            .Start()
            .map_err(|e| device_error("IAudioClient::Start", e))?;

        Ok(Self {
            capture_client,
            audio_client,
            format: format::stream_format(sample_rate, channels, sample_format, buffer_frames),
            channels: channels as usize,
            pending_release: None,
            _mix_format: mix_format,
            _com: com,
        })
    }

    unsafe fn release_pending(&mut self) -> Result<(), CaptureError> {
        if let Some(frames) = self.pending_release.take() {
            self.capture_client
                .ReleaseBuffer(frames)
                .map_err(|e| device_error("ReleaseBuffer", e))?;
        }
        Ok(())
    }
}

impl PacketSource for WasapiLoopbackSource {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn next_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError> {
        unsafe {
            self.release_pending()?;

            let queued = self
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| device_error("GetNextPacketSize", e))?;
            if queued == 0 {
                return Ok(None);
            }

            let mut buffer: *mut u8 = ptr::null_mut();
            let mut frames: u32 = 0;
            let mut flags: u32 = 0;
            self.capture_client
                .GetBuffer(&mut buffer, &mut frames, &mut flags, None, None)
                .map_err(|e| device_error("GetBuffer", e))?;
            self.pending_release = Some(frames);

            let silent = flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0;
            // The buffer stays valid until ReleaseBuffer on the next call.
            let data: &[f32] = if buffer.is_null() || silent {
                &[]
            } else {
                slice::from_raw_parts(buffer as *const f32, frames as usize * self.channels)
            };
            Ok(Some(Packet {
                data,
                frames: frames as usize,
                silent,
            }))
        }
    }
}

impl Drop for WasapiLoopbackSource {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.release_pending() {
                log::warn!("{}", e);
            }
            let _ = self.audio_client.Stop();
        }
        log::info!("Closed loopback stream");
    }
}

/// Mix format allocated by `GetMixFormat`, freed with `CoTaskMemFree`.
struct MixFormat(*mut WAVEFORMATEX);

impl MixFormat {
    /// Whether an extensible format's `SubFormat` is IEEE float.
    unsafe fn has_float_subformat(&self) -> bool {
        if (*self.0).wFormatTag != format::WAVE_FORMAT_EXTENSIBLE {
            return false;
        }
        let ext = self.0 as *const WAVEFORMATEXTENSIBLE;
        // WAVEFORMATEXTENSIBLE is packed.
        let sub_format = ptr::read_unaligned(ptr::addr_of!((*ext).SubFormat));
        sub_format == windows::core::GUID::from_u128(format::SUBTYPE_IEEE_FLOAT)
    }
}

impl Drop for MixFormat {
    fn drop(&mut self) {
        unsafe {
            CoTaskMemFree(Some(self.0 as *const _));
        }
    }
}

struct CoUninitializeGuard;

impl Drop for CoUninitializeGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

fn device_error(operation: &str, error: windows::core::Error) -> CaptureError {
    CaptureError::DeviceError(format!(
        "{} failed ({:#010x}): {}",
        operation,
        error.code().0,
        error.message()
    ))
}
