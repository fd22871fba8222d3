use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;

use crate::models::audio_models::{AudioSource, CaptureDiagnostics};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::sample_block::CapturedBlock;
use crate::models::state::CaptureState;
use crate::session::capture_loop::CaptureLoop;
use crate::session::consumer::LoopbackConsumer;
use crate::session::registry::ConsumerRegistry;
use crate::traits::analyzer::Analyzer;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::CaptureProvider;

/// State shared between the service handle and its capture thread.
struct ServiceShared {
    state: Mutex<CaptureState>,
    delegate: Mutex<Option<Arc<dyn CaptureDelegate>>>,
    diagnostics: Arc<Mutex<CaptureDiagnostics>>,
}

impl ServiceShared {
    fn set_state(&self, new_state: CaptureState) {
        *self.state.lock() = new_state.clone();
        let delegate = self.delegate.lock().clone();
        if let Some(delegate) = delegate {
            delegate.on_state_changed(&new_state);
        }
    }

    fn fail(&self, error: CaptureError) {
        let delegate = self.delegate.lock().clone();
        if let Some(delegate) = &delegate {
            delegate.on_error(&error);
        }
        self.set_state(CaptureState::Failed(error));
    }
}

/// Run flag and thread of the most recently started capture run.
///
/// Every `start` gets a fresh flag, so a finishing thread can only ever
/// clear its own.
struct ActiveRun {
    keep_running: Arc<AtomicBool>,
    thread: ThreadId,
}

/// Loopback capture service.
///
/// Owns one capture thread at a time. Each wake the thread drains the
/// device into a working buffer, publishes it to the shared block and runs
/// every subscribed consumer. Consumers can be added and removed at any
/// time, running or not.
///
/// `start` and `stop` are serialized: a `start` racing a `stop` on another
/// thread waits until the old capture thread has exited and released the
/// device. From the capture thread (an analyzer or delegate) `stop` only
/// clears the run flag and `start` is refused. Delegates are notified on
/// the thread making the transition and must not call `start` or `stop`
/// synchronously from `on_state_changed`.
///
/// ```text
/// [CaptureProvider] → [PacketSource] → working buffer
///                                           │ publish
///                                           ▼
///                                     shared block ──→ consumer mirrors → analyzers
/// ```
pub struct CaptureService<P: CaptureProvider + 'static> {
    provider: Arc<P>,
    config: CaptureConfiguration,
    registry: ConsumerRegistry,
    shared: Arc<ServiceShared>,
    /// Handle of the current or last capture thread. Held by `start` and by
    /// `stop` across the join.
    lifecycle: Mutex<Option<JoinHandle<()>>>,
    /// Only ever locked briefly, and after `lifecycle` when both are held.
    active: Mutex<Option<ActiveRun>>,
}

impl<P: CaptureProvider + 'static> CaptureService<P> {
    pub fn new(provider: P, config: CaptureConfiguration) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            provider: Arc::new(provider),
            config,
            registry: ConsumerRegistry::new(Arc::new(Mutex::new(CapturedBlock::new()))),
            shared: Arc::new(ServiceShared {
                state: Mutex::new(CaptureState::Idle),
                delegate: Mutex::new(None),
                diagnostics: Arc::new(Mutex::new(CaptureDiagnostics::default())),
            }),
            lifecycle: Mutex::new(None),
            active: Mutex::new(None),
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        *self.shared.delegate.lock() = Some(delegate);
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state.lock().clone()
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.shared.diagnostics.lock().clone()
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_available()
    }

    pub fn device_info(&self) -> AudioSource {
        self.provider.device_info()
    }

    /// Whether a capture thread has been started and not yet stopped or
    /// failed.
    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|run| run.keep_running.load(Ordering::SeqCst))
    }

    fn is_capture_thread(&self) -> bool {
        let current = thread::current().id();
        self.active
            .lock()
            .as_ref()
            .is_some_and(|run| run.thread == current)
    }

    pub fn registry(&self) -> &ConsumerRegistry {
        &self.registry
    }

    /// Frames in the most recently published block.
    pub fn published_frames(&self) -> usize {
        self.registry.block().lock().frames()
    }

    pub fn subscribe<A: Analyzer>(&self, consumer: &Arc<LoopbackConsumer<A>>) -> Result<(), CaptureError> {
        self.registry.subscribe(consumer)
    }

    pub fn unsubscribe<A: Analyzer>(&self, consumer: &Arc<LoopbackConsumer<A>>) -> Result<(), CaptureError> {
        self.registry.unsubscribe(consumer)
    }

    /// Spawn the capture thread. Transitions: idle/failed → capturing.
    ///
    /// The device is opened on the new thread; open failures show up as a
    /// `Failed` state, not as an error here. Waits for a `stop` in progress
    /// on another thread to finish first.
    pub fn start(&self) -> Result<(), CaptureError> {
        if self.is_capture_thread() {
            log::warn!("Loopback capture cannot be restarted from its own capture thread");
            return Err(CaptureError::AlreadyRunning);
        }

        let mut lifecycle = self.lifecycle.lock();
        if self.is_running() {
            log::warn!("Loopback capture is already running");
            return Err(CaptureError::AlreadyRunning);
        }
        // A thread that stopped itself or failed is finished or finishing.
        // It never takes the lifecycle lock, so joining here cannot block on us.
        if let Some(stale) = lifecycle.take() {
            join_capture_thread(stale);
        }

        self.shared.set_state(CaptureState::Capturing);

        let keep_running = Arc::new(AtomicBool::new(true));
        let provider = Arc::clone(&self.provider);
        let config = self.config.clone();
        let registry = self.registry.clone();
        let shared = Arc::clone(&self.shared);
        let run_flag = Arc::clone(&keep_running);

        // Held until the run is recorded, so the new thread sees itself as
        // the capture thread from its first cycle.
        let mut active = self.active.lock();
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                log::info!("Loopback capture thread started");
                let result = run_capture(provider.as_ref(), &config, registry, &shared, &run_flag);
                match result {
                    Ok(()) => log::info!("Loopback capture thread stopped"),
                    Err(e) => {
                        log::error!("Loopback capture failed: {}", e);
                        shared.fail(e);
                    }
                }
                run_flag.store(false, Ordering::SeqCst);
            });

        match spawned {
            Ok(handle) => {
                *active = Some(ActiveRun {
                    keep_running,
                    thread: handle.thread().id(),
                });
                *lifecycle = Some(handle);
                Ok(())
            }
            Err(e) => {
                *active = None;
                drop(active);
                let error = CaptureError::Unknown(format!("failed to spawn capture thread: {}", e));
                log::error!("{}", error);
                self.shared.fail(error.clone());
                Err(error)
            }
        }
    }

    /// Ask the capture thread to stop and wait for it to exit.
    ///
    /// The flag is checked once per wake. Called from the capture thread
    /// itself (e.g. by an analyzer) it returns without joining; the next
    /// `start` or drop reaps the thread.
    pub fn stop(&self) -> Result<(), CaptureError> {
        if self.is_capture_thread() {
            if !self.clear_run_flag() {
                log::warn!("Loopback capture is not running");
                return Err(CaptureError::NotRunning);
            }
            log::debug!("Stop requested from the capture thread; exiting after this cycle");
            if self.state().is_capturing() {
                self.shared.set_state(CaptureState::Idle);
            }
            return Ok(());
        }

        let mut lifecycle = self.lifecycle.lock();
        if !self.clear_run_flag() {
            log::warn!("Loopback capture is not running");
            return Err(CaptureError::NotRunning);
        }
        if let Some(handle) = lifecycle.take() {
            join_capture_thread(handle);
        }
        if self.state().is_capturing() {
            self.shared.set_state(CaptureState::Idle);
        }
        Ok(())
    }

    /// Clear the active run's flag. Returns whether it was set.
    fn clear_run_flag(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|run| run.keep_running.swap(false, Ordering::SeqCst))
    }
}

impl<P: CaptureProvider + 'static> Drop for CaptureService<P> {
    fn drop(&mut self) {
        if let Some(run) = self.active.get_mut() {
            run.keep_running.store(false, Ordering::SeqCst);
        }
        if let Some(handle) = self.lifecycle.get_mut().take() {
            join_capture_thread(handle);
        }
    }
}

fn join_capture_thread(handle: JoinHandle<()>) {
    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        log::error!("Loopback capture thread panicked");
    }
}

/// Capture thread body. Returning drops the source, which releases the
/// device on every exit path.
fn run_capture<P: CaptureProvider>(
    provider: &P,
    config: &CaptureConfiguration,
    registry: ConsumerRegistry,
    shared: &ServiceShared,
    keep_running: &AtomicBool,
) -> Result<(), CaptureError> {
    let mut source = provider.open(config)?;
    let format = source.format();
    format.validate()?;

    let period = config.poll_interval().unwrap_or_else(|| format.poll_interval());
    log::info!(
        "Capturing {} Hz, {} channels, waking every {:?}",
        format.sample_rate,
        format.channels,
        period
    );

    let mut capture = CaptureLoop::new(&format, registry, Arc::clone(&shared.diagnostics));
    while keep_running.load(Ordering::SeqCst) {
        thread::sleep(period);
        capture.run_cycle(source.as_mut())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::models::config::AnalyzerConfig;
    use crate::processing::fft_analyzer::FftBandAnalyzer;
    use crate::testing::{sine_frames, ScriptedPacket, ScriptedProvider};
    use crate::traits::analyzer::RawCapture;

    fn fast_config() -> CaptureConfiguration {
        CaptureConfiguration {
            poll_interval_ms: Some(1),
            ..CaptureConfiguration::default()
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<CaptureState>>,
        errors: Mutex<Vec<CaptureError>>,
    }

    impl CaptureDelegate for Recorder {
        fn on_state_changed(&self, state: &CaptureState) {
            self.states.lock().push(state.clone());
        }

        fn on_error(&self, error: &CaptureError) {
            self.errors.lock().push(error.clone());
        }
    }

    #[test]
    fn tone_reaches_its_band_end_to_end() {
        let provider = ScriptedProvider::new();
        provider.push_cycle(vec![ScriptedPacket::audio(sine_frames(440.0, 0.5, 48000, 1024))]);
        let service = CaptureService::new(provider, fast_config()).unwrap();
        let consumer = LoopbackConsumer::fft(AnalyzerConfig::default()).unwrap();
        service.subscribe(&consumer).unwrap();

        service.start().unwrap();
        assert!(wait_until(|| consumer.change_count() >= 1));
        service.stop().unwrap();

        let mut bands = Vec::new();
        assert_eq!(consumer.processed_output(&mut bands), 1);
        let loudest = bands
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0;
        assert_eq!(loudest, 4);
        assert_eq!(service.published_frames(), 1024);
    }

    #[test]
    fn start_twice_and_redundant_stop_are_rejected() {
        let service = CaptureService::new(ScriptedProvider::new(), fast_config()).unwrap();

        assert_eq!(service.stop(), Err(CaptureError::NotRunning));
        service.start().unwrap();
        assert_eq!(service.start(), Err(CaptureError::AlreadyRunning));
        assert!(service.state().is_capturing());

        service.stop().unwrap();
        assert_eq!(service.stop(), Err(CaptureError::NotRunning));
        assert!(service.state().is_idle());
        assert_eq!(service.provider().closed_count(), 1);
    }

    #[test]
    fn open_failure_fails_the_run() {
        let provider = ScriptedProvider::new().failing_open(CaptureError::DeviceNotAvailable);
        let service = CaptureService::new(provider, fast_config()).unwrap();
        let recorder = Arc::new(Recorder::default());
        service.set_delegate(recorder.clone());

        service.start().unwrap();
        assert!(wait_until(|| !service.is_running()));

        assert_eq!(
            service.state(),
            CaptureState::Failed(CaptureError::DeviceNotAvailable)
        );
        assert_eq!(*recorder.errors.lock(), vec![CaptureError::DeviceNotAvailable]);
        assert_eq!(
            *recorder.states.lock(),
            vec![
                CaptureState::Capturing,
                CaptureState::Failed(CaptureError::DeviceNotAvailable)
            ]
        );
    }

    #[test]
    fn non_float_or_mono_stream_is_refused() {
        let provider = ScriptedProvider::new().with_channels(1);
        let service = CaptureService::new(provider, fast_config()).unwrap();

        service.start().unwrap();
        assert!(wait_until(|| !service.is_running()));

        assert!(matches!(
            service.state().error(),
            Some(CaptureError::UnsupportedFormat(_))
        ));
        assert_eq!(service.provider().opened_count(), 1);
        assert_eq!(service.provider().closed_count(), 1);
    }

    #[test]
    fn device_loss_releases_source_and_allows_restart() {
        let provider = ScriptedProvider::new();
        provider.push_cycle(vec![ScriptedPacket::error(CaptureError::DeviceError(
            "endpoint removed".into(),
        ))]);
        let service = CaptureService::new(provider, fast_config()).unwrap();

        service.start().unwrap();
        assert!(wait_until(|| !service.is_running()));
        assert!(service.state().is_failed());
        assert_eq!(service.provider().closed_count(), 1);

        service.start().unwrap();
        assert!(service.state().is_capturing());
        service.stop().unwrap();
        assert_eq!(service.provider().opened_count(), 2);
        assert_eq!(service.provider().closed_count(), 2);
    }

    #[test]
    fn consumers_join_while_running() {
        let service = CaptureService::new(ScriptedProvider::new(), fast_config()).unwrap();
        service.start().unwrap();

        let late = LoopbackConsumer::raw();
        service.subscribe(&late).unwrap();
        service
            .provider()
            .push_cycle(vec![ScriptedPacket::audio(vec![0.25, -0.25])]);

        assert!(wait_until(|| late.change_count() == 1));
        let mut out = Vec::new();
        late.audio_output(&mut out);
        assert_eq!(out, vec![0.25, -0.25]);

        service.unsubscribe(&late).unwrap();
        service.stop().unwrap();

        let diagnostics = service.diagnostics();
        assert_eq!(diagnostics.frames_captured, 1);
        assert_eq!(diagnostics.consumers_notified, 1);
        assert!(diagnostics.cycles >= 1);
    }

    #[test]
    fn dropping_the_service_stops_capture() {
        let provider = ScriptedProvider::new();
        let counts = provider.clone();
        let service = CaptureService::new(provider, fast_config()).unwrap();
        service.start().unwrap();
        assert!(wait_until(|| service.diagnostics().cycles > 0));

        drop(service);
        assert_eq!(counts.opened_count(), 1);
        assert_eq!(counts.closed_count(), 1);
    }

    /// Stops its service from inside the capture thread.
    struct StopOnFirstCycle {
        service: Mutex<Option<Arc<CaptureService<ScriptedProvider>>>>,
        result: Mutex<Option<Result<(), CaptureError>>>,
    }

    impl Analyzer for StopOnFirstCycle {
        fn on_samples_ready(&self, _block: &mut CapturedBlock) {
            if let Some(service) = self.service.lock().take() {
                *self.result.lock() = Some(service.stop());
            }
        }
    }

    #[test]
    fn stop_from_capture_thread_does_not_join() {
        let provider = ScriptedProvider::new();
        provider.push_cycle(vec![ScriptedPacket::audio(vec![0.0; 8])]);
        let service = Arc::new(CaptureService::new(provider, fast_config()).unwrap());
        let stopper = LoopbackConsumer::new(StopOnFirstCycle {
            service: Mutex::new(Some(Arc::clone(&service))),
            result: Mutex::new(None),
        });
        service.subscribe(&stopper).unwrap();

        service.start().unwrap();
        assert!(wait_until(|| !service.is_running()));
        assert!(wait_until(|| stopper.analyzer().result.lock().is_some()));

        assert_eq!(*stopper.analyzer().result.lock(), Some(Ok(())));
        assert!(service.state().is_idle());
        // The next start reaps the finished thread.
        service.start().unwrap();
        service.stop().unwrap();
    }

    /// Holds the capture thread inside every cycle for a while.
    #[derive(Default)]
    struct SlowAnalyzer {
        cycles: std::sync::atomic::AtomicUsize,
    }

    impl Analyzer for SlowAnalyzer {
        fn on_samples_ready(&self, _block: &mut CapturedBlock) {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(200));
        }
    }

    #[test]
    fn start_waits_for_stop_on_another_thread() {
        let provider = ScriptedProvider::new();
        for _ in 0..50 {
            provider.push_cycle(vec![ScriptedPacket::audio(vec![0.1; 8])]);
        }
        let service = Arc::new(CaptureService::new(provider, fast_config()).unwrap());
        let slow = LoopbackConsumer::new(SlowAnalyzer::default());
        service.subscribe(&slow).unwrap();

        service.start().unwrap();
        assert!(wait_until(|| slow.analyzer().cycles.load(Ordering::SeqCst) >= 1));

        let (tx, rx) = std::sync::mpsc::channel();
        let stopper = {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let _ = tx.send(service.stop());
            })
        };
        // The stopper clears the flag under the lifecycle lock, then joins
        // the first run while it sleeps in its analyzer.
        assert!(wait_until(|| !service.is_running()));

        service.start().unwrap();
        // The first run released its source before the second was spawned.
        assert_eq!(service.provider().closed_count(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(Ok(())));
        stopper.join().unwrap();

        assert!(service.is_running());
        assert!(service.state().is_capturing());
        service.stop().unwrap();
        assert!(!service.is_running());
        assert!(service.state().is_idle());
        assert_eq!(service.provider().opened_count(), 2);
        assert_eq!(service.provider().closed_count(), 2);
    }

    #[test]
    fn raw_consumers_see_default_analyzer_behaviour() {
        let provider = ScriptedProvider::new();
        provider.push_cycle(vec![ScriptedPacket::audio(vec![0.5; 4])]);
        let service = CaptureService::new(provider, fast_config()).unwrap();
        let raw: Arc<LoopbackConsumer<RawCapture>> = LoopbackConsumer::raw();
        let fft = LoopbackConsumer::new(FftBandAnalyzer::default());
        service.subscribe(&raw).unwrap();
        service.subscribe(&fft).unwrap();

        service.start().unwrap();
        assert!(wait_until(|| fft.change_count() == 1));
        service.stop().unwrap();

        let mut out = Vec::new();
        assert_eq!(raw.processed_output(&mut out), 0);
        assert!(out.is_empty());
        assert_eq!(raw.audio_output(&mut out), 1);
        assert_eq!(out, vec![0.5; 4]);
    }
}
