//! The acquisition controller: a run state machine with a dedicated worker thread.
//!
//! A run is started in one of two modes. Continuous mode polls the meter one reading at
//! a time at a configurable interval, optionally bounded by a duration limit; Buffered
//! mode arms the instrument's internal trace buffer for a hardware-timed burst, polls
//! for completion, and bulk-reads the result. Both feed the same [`SampleStore`] and
//! share the same start/pause/stop/status plumbing.
//!
//! The worker never calls into consumer code. It only appends to the store and updates
//! the shared status record; the consumer polls both at its own cadence.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use dmmrs::{DmmError, Transport};

use crate::{
    BUFFER_CAPACITY, Keithley2000,
    config::MeasurementConfig,
    store::{Sample, SampleStore},
};

/// Default capacity of the live sample store.
pub const DEFAULT_STORE_CAPACITY: usize = 10_000;

/// Smallest allowed sample interval in Continuous mode. Shorter intervals are clamped;
/// the meter cannot keep up below this and the bus would just back up.
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

/// How often Buffered mode polls the instrument for the capture fill state.
const BUFFER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// State of the acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run is active.
    Idle,
    /// The measurement configuration is being applied to the instrument.
    Configuring,
    /// The worker is acquiring.
    Running,
    /// The worker is alive but not sampling (Continuous mode only).
    Paused,
    /// A stop was requested and the worker has not yet acknowledged it.
    Stopping,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunState::Idle,
            1 => RunState::Configuring,
            2 => RunState::Running,
            3 => RunState::Paused,
            4 => RunState::Stopping,
            _ => unreachable!("invalid run state encoding"),
        }
    }
}

/// Settings for a Continuous mode run.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousSettings {
    /// Time between readings. Clamped to a minimum of 50 ms.
    pub interval: Duration,
    /// Stop automatically once this much time has elapsed; `None` runs until stopped.
    pub duration_limit: Option<Duration>,
    /// Combine trigger and fetch into a single bus transaction per reading. Saves one
    /// round trip; the trigger source must be immediate.
    pub fast_mode: bool,
}

impl Default for ContinuousSettings {
    fn default() -> Self {
        ContinuousSettings {
            interval: Duration::from_millis(100),
            duration_limit: None,
            fast_mode: false,
        }
    }
}

/// Settings for a Buffered mode run.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedSettings {
    /// Number of points to capture, clamped to the instrument's [`BUFFER_CAPACITY`].
    pub points: usize,
}

impl Default for BufferedSettings {
    fn default() -> Self {
        BufferedSettings {
            points: BUFFER_CAPACITY,
        }
    }
}

/// The acquisition strategy for one run.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionMode {
    /// Poll single readings at a fixed interval.
    Continuous(ContinuousSettings),
    /// Hardware-timed burst capture into the instrument's trace buffer.
    Buffered(BufferedSettings),
}

/// Fill progress of a Buffered mode capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferProgress {
    /// Points captured so far, as of the last poll.
    pub filled: usize,
    /// Points requested.
    pub target: usize,
}

/// A snapshot of the controller's state for the consumer.
#[derive(Debug, Clone)]
pub struct RunStatus {
    /// Current run state.
    pub state: RunState,
    /// The active mode, `None` when idle.
    pub mode: Option<AcquisitionMode>,
    /// Number of samples currently in the store.
    pub samples: usize,
    /// Capture progress, Buffered mode only.
    pub progress: Option<BufferProgress>,
    /// The error that terminated the last run, if any. Cleared when a new run starts.
    pub error: Option<Arc<DmmError>>,
}

/// State shared between the control thread and the acquisition worker.
struct RunShared {
    state: AtomicU8,
    stop: AtomicBool,
    paused: AtomicBool,
    /// Time origin of the run. Replaced when the store is cleared mid-run.
    epoch: Mutex<Instant>,
    filled: AtomicUsize,
    target: AtomicUsize,
    last_error: Mutex<Option<Arc<DmmError>>>,
}

/// Device state the worker has to undo on its way out.
struct RestoreActions {
    display: bool,
    autozero: bool,
}

/// The acquisition controller.
///
/// Owns the driver and the live sample store, runs at most one worker thread at a time,
/// and exposes the start/pause/stop/status API to the control thread. See the crate
/// documentation for a usage example.
pub struct AcquisitionController<T: Transport + Send + 'static> {
    driver: Keithley2000<T>,
    store: Arc<SampleStore>,
    config: MeasurementConfig,
    mode: Option<AcquisitionMode>,
    shared: Arc<RunShared>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Transport + Send + 'static> AcquisitionController<T> {
    /// Create a controller with the default store capacity.
    pub fn new(driver: Keithley2000<T>) -> Self {
        Self::with_capacity(driver, DEFAULT_STORE_CAPACITY)
    }

    /// Create a controller whose store holds at most `capacity` samples.
    pub fn with_capacity(driver: Keithley2000<T>, capacity: usize) -> Self {
        AcquisitionController {
            driver,
            store: Arc::new(SampleStore::new(capacity)),
            config: MeasurementConfig::default(),
            mode: None,
            shared: Arc::new(RunShared {
                state: AtomicU8::new(RunState::Idle as u8),
                stop: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                epoch: Mutex::new(Instant::now()),
                filled: AtomicUsize::new(0),
                target: AtomicUsize::new(0),
                last_error: Mutex::new(None),
            }),
            worker: None,
        }
    }

    /// Set the measurement configuration for the next run.
    ///
    /// The configuration is validated here and applied to the instrument when the run
    /// starts. While a run is active the configuration is owned by the run and cannot
    /// be changed; stop first, then reconfigure.
    pub fn configure(&mut self, config: MeasurementConfig) -> Result<(), DmmError> {
        if self.state() != RunState::Idle {
            return Err(DmmError::Config(
                "Cannot reconfigure while an acquisition run is active.".to_string(),
            ));
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// The configuration the next run will use (or the active run is using).
    ///
    /// Exports label their data from this.
    pub fn active_config(&self) -> &MeasurementConfig {
        &self.config
    }

    /// A handle to the live sample store, for consumers that poll it directly.
    pub fn store(&self) -> Arc<SampleStore> {
        Arc::clone(&self.store)
    }

    /// Mutable access to the driver, e.g. to identify the meter or beep between runs.
    ///
    /// The connection is owned by the control thread; do not issue commands through this
    /// while a run is Running or Paused, they would interleave with the worker's.
    pub fn driver(&mut self) -> &mut Keithley2000<T> {
        &mut self.driver
    }

    /// Start an acquisition run.
    ///
    /// Applies the measurement configuration (any failure aborts the start, no worker
    /// is spawned, and the controller returns to Idle), records the run's time origin,
    /// and spawns the worker for the requested mode.
    pub fn start(&mut self, mode: AcquisitionMode) -> Result<(), DmmError> {
        if self.state() != RunState::Idle {
            return Err(DmmError::Config(
                "An acquisition run is already active.".to_string(),
            ));
        }
        // Reap the worker of a run that auto-stopped.
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        self.shared
            .state
            .store(RunState::Configuring as u8, Ordering::SeqCst);
        if let Err(e) = self.driver.configure(&self.config) {
            self.shared
                .state
                .store(RunState::Idle as u8, Ordering::SeqCst);
            return Err(e);
        }

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.filled.store(0, Ordering::SeqCst);
        let target = match &mode {
            AcquisitionMode::Buffered(settings) => settings.points.clamp(1, BUFFER_CAPACITY),
            AcquisitionMode::Continuous(_) => 0,
        };
        self.shared.target.store(target, Ordering::SeqCst);
        *self
            .shared
            .epoch
            .lock()
            .expect("Mutex should not be poisoned") = Instant::now();
        *self
            .shared
            .last_error
            .lock()
            .expect("Mutex should not be poisoned") = None;
        self.mode = Some(mode.clone());

        let restore = RestoreActions {
            display: !self.config.display_enabled,
            autozero: !self.config.autozero_enabled,
        };
        let driver = self.driver.clone();
        let store = Arc::clone(&self.store);
        let shared = Arc::clone(&self.shared);

        self.shared
            .state
            .store(RunState::Running as u8, Ordering::SeqCst);
        self.worker = Some(thread::spawn(move || {
            run_worker(driver, store, shared, mode, restore)
        }));
        Ok(())
    }

    /// Suspend sampling without terminating the worker. Continuous mode only; a
    /// hardware burst cannot be interrupted without losing its timing, so in Buffered
    /// mode this is a no-op.
    pub fn pause(&mut self) {
        if matches!(self.mode, Some(AcquisitionMode::Continuous(_)))
            && self
                .shared
                .state
                .compare_exchange(
                    RunState::Running as u8,
                    RunState::Paused as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
        {
            self.shared.paused.store(true, Ordering::SeqCst);
        }
    }

    /// Resume sampling after a pause.
    pub fn resume(&mut self) {
        if self
            .shared
            .state
            .compare_exchange(
                RunState::Paused as u8,
                RunState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            self.shared.paused.store(false, Ordering::SeqCst);
        }
    }

    /// Stop the active run and wait for the worker to acknowledge.
    ///
    /// The stop flag is observed at the top of each loop iteration or poll cycle, so the
    /// wait is bounded by one sample interval (or poll interval) plus a transport call
    /// already in flight. The worker restores the device state it changed before the
    /// controller returns to Idle; when this returns the device is idle and restored.
    pub fn stop(&mut self) {
        if self.state() != RunState::Idle {
            self.shared
                .state
                .store(RunState::Stopping as u8, Ordering::SeqCst);
            self.shared.stop.store(true, Ordering::SeqCst);
        }
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            log::error!("Acquisition worker panicked.");
        }
        self.shared
            .state
            .store(RunState::Idle as u8, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    /// The current run state.
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// A snapshot of state, mode, sample count, capture progress, and the last error.
    pub fn status(&self) -> RunStatus {
        let state = self.state();
        let mode = if state == RunState::Idle {
            None
        } else {
            self.mode.clone()
        };
        let progress = match mode {
            Some(AcquisitionMode::Buffered(_)) => Some(BufferProgress {
                filled: self.shared.filled.load(Ordering::SeqCst),
                target: self.shared.target.load(Ordering::SeqCst),
            }),
            _ => None,
        };
        RunStatus {
            state,
            mode,
            samples: self.store.len(),
            progress,
            error: self
                .shared
                .last_error
                .lock()
                .expect("Mutex should not be poisoned")
                .clone(),
        }
    }

    /// A non-destructive ordered copy of the current samples.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.store.snapshot()
    }

    /// Drop all samples. During an active run this also resets the run's time origin,
    /// so the next sample starts over at zero elapsed seconds.
    pub fn clear_samples(&mut self) {
        self.store.clear();
        let state = self.state();
        if state == RunState::Running || state == RunState::Paused {
            *self
                .shared
                .epoch
                .lock()
                .expect("Mutex should not be poisoned") = Instant::now();
        }
    }
}

impl<T: Transport + Send + 'static> Drop for AcquisitionController<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker entry point: run the strategy, record a terminating error if any, restore the
/// device state this run changed, and return the controller to Idle.
fn run_worker<T: Transport + Send>(
    mut driver: Keithley2000<T>,
    store: Arc<SampleStore>,
    shared: Arc<RunShared>,
    mode: AcquisitionMode,
    restore: RestoreActions,
) {
    let result = match &mode {
        AcquisitionMode::Continuous(settings) => {
            continuous_loop(&mut driver, &store, &shared, settings)
        }
        AcquisitionMode::Buffered(settings) => {
            buffered_capture(&mut driver, &store, &shared, settings)
        }
    };
    if let Err(e) = result {
        log::error!("Acquisition run aborted: {e}");
        *shared
            .last_error
            .lock()
            .expect("Mutex should not be poisoned") = Some(Arc::new(e));
    }
    restore_device_state(&mut driver, &restore);
    shared.paused.store(false, Ordering::SeqCst);
    shared.state.store(RunState::Idle as u8, Ordering::SeqCst);
}

/// Continuous mode: one reading per interval until stopped, errored, or past the
/// duration limit. While paused the loop idles without touching the instrument.
fn continuous_loop<T: Transport>(
    driver: &mut Keithley2000<T>,
    store: &SampleStore,
    shared: &RunShared,
    settings: &ContinuousSettings,
) -> Result<(), DmmError> {
    let interval = settings.interval.max(MIN_SAMPLE_INTERVAL);
    loop {
        if shared.stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !shared.paused.load(Ordering::SeqCst) {
            let elapsed = shared
                .epoch
                .lock()
                .expect("Mutex should not be poisoned")
                .elapsed();
            if let Some(limit) = settings.duration_limit
                && elapsed > limit
            {
                return Ok(());
            }
            let value = if settings.fast_mode {
                driver.measure_fast()?
            } else {
                driver.measure_single()?
            };
            store.append(Sample {
                elapsed: elapsed.as_secs_f64(),
                value,
            });
            shared.filled.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(interval);
    }
}

/// Buffered mode: arm the trace buffer, poll until the capture completes or a stop is
/// signaled, then abort, bulk-read, and store whatever the meter captured.
fn buffered_capture<T: Transport>(
    driver: &mut Keithley2000<T>,
    store: &SampleStore,
    shared: &RunShared,
    settings: &BufferedSettings,
) -> Result<(), DmmError> {
    let target = settings.points.clamp(1, BUFFER_CAPACITY);

    driver.buffer_configure(target)?;
    driver.buffer_start(target)?;

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        let count = driver.buffer_count()?;
        shared.filled.store(count, Ordering::SeqCst);
        if driver.buffer_is_complete(target)? {
            break;
        }
        thread::sleep(BUFFER_POLL_INTERVAL);
    }

    // Also on an early stop: abort the capture and keep the points the meter did take.
    let values = driver.buffer_read()?;
    let total = shared
        .epoch
        .lock()
        .expect("Mutex should not be poisoned")
        .elapsed()
        .as_secs_f64();
    shared.filled.store(values.len(), Ordering::SeqCst);
    store.append_many(synthesize_timestamps(&values, total));
    Ok(())
}

/// Spread the aggregate capture duration evenly over the returned readings.
///
/// The meter reports no per-sample timing for a burst, only the run as a whole, so
/// `timestamp(i) = i * total / (N - 1)` for N > 1; a single sample is timestamped at 0.
/// Fewer returned values than requested get timestamps for what was returned, nothing is
/// fabricated.
pub fn synthesize_timestamps(values: &[f64], total_duration: f64) -> Vec<Sample> {
    match values.len() {
        0 => Vec::new(),
        1 => vec![Sample {
            elapsed: 0.0,
            value: values[0],
        }],
        n => {
            let step = total_duration / (n - 1) as f64;
            values
                .iter()
                .enumerate()
                .map(|(i, &value)| Sample {
                    elapsed: i as f64 * step,
                    value,
                })
                .collect()
        }
    }
}

/// Undo the device state this run changed. Best effort: a meter that just dropped off
/// the bus should not turn a finished run into an error, so failures are only logged.
fn restore_device_state<T: Transport>(driver: &mut Keithley2000<T>, restore: &RestoreActions) {
    if restore.display
        && let Err(e) = driver.set_display(true)
    {
        log::warn!("Failed to restore the instrument display: {e}");
    }
    if restore.autozero
        && let Err(e) = driver.set_autozero(true)
    {
        log::warn!("Failed to restore auto-zero: {e}");
    }
}
