//! Fixed-period scheduler
//!
//! A `Looper` owns one thread that fans out `on_loop` to every registered
//! [`Loop`] once per period, in registration order. It knows nothing about
//! what the loops do. Each callback is isolated: an error or a panic in one
//! is logged and counted, and the remaining loops still run that tick.

use parking_lot::Mutex;
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::LooperConfig;
use crate::{Error, Result};

/// Three-callback lifecycle driven by a [`Looper`]
///
/// Timestamps are seconds since the looper was created, from a monotonic
/// clock.
pub trait Loop: Send + Sync {
    /// Called once per `start()`, before the first `on_loop`
    fn on_start(&self, timestamp: f64);

    /// Called once per period while running
    fn on_loop(&self, timestamp: f64) -> Result<()>;

    /// Called once per `stop()`, after the last `on_loop`
    fn on_stop(&self, timestamp: f64);

    /// Name for logging
    fn name(&self) -> &str {
        "loop"
    }
}

/// Something loops can be registered with
pub trait Registrar {
    fn register(&mut self, handle: Arc<dyn Loop>) -> Result<()>;
}

thread_local! {
    static ON_SCHEDULER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread is a looper thread
///
/// Blocking routines check this and refuse to run on the control thread.
pub fn on_scheduler_thread() -> bool {
    ON_SCHEDULER.with(Cell::get)
}

/// Timing and failure counters for a looper
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LooperStats {
    /// Completed ticks
    pub iterations: u64,
    /// Ticks that ran longer than the period
    pub overruns: u64,
    /// Callbacks that returned an error or panicked
    pub callback_failures: u64,
    /// Duration of the latest tick
    pub last_tick: Duration,
    /// Longest tick so far
    pub max_tick: Duration,
}

impl LooperStats {
    fn record(&mut self, elapsed: Duration, period: Duration, failures: u64) {
        self.iterations += 1;
        self.callback_failures += failures;
        self.last_tick = elapsed;
        self.max_tick = self.max_tick.max(elapsed);
        if elapsed > period {
            self.overruns += 1;
        }
    }

    /// Fraction of ticks that overran (0.0 to 1.0)
    pub fn overrun_ratio(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.overruns as f64 / self.iterations as f64
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn isolated<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(Error::Callback(format!(
            "panicked: {}",
            panic_message(payload)
        ))),
    }
}

/// Run every loop's `on_loop` once, returning how many failed
fn fan_out(looper: &str, loops: &[Arc<dyn Loop>], timestamp: f64) -> u64 {
    let mut failures = 0;
    for handle in loops {
        if let Err(e) = isolated(|| handle.on_loop(timestamp)) {
            failures += 1;
            tracing::error!(looper, handle = handle.name(), "on_loop failed: {}", e);
        }
    }
    failures
}

/// A fixed-period scheduler
///
/// # Example
/// ```ignore
/// use strut_core::{Looper, LooperConfig, Registrar};
///
/// let mut looper = Looper::new(LooperConfig::new(10.0).with_name("enabled"));
/// looper.register(climber_loop)?;
/// looper.start()?;
/// // ...
/// looper.stop();
/// ```
pub struct Looper {
    config: LooperConfig,
    loops: Vec<Arc<dyn Loop>>,
    epoch: Instant,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<LooperStats>>,
    thread: Option<JoinHandle<()>>,
}

impl Looper {
    pub fn new(config: LooperConfig) -> Self {
        Self {
            config,
            loops: Vec::new(),
            epoch: Instant::now(),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(LooperStats::default())),
            thread: None,
        }
    }

    /// Seconds since this looper was created
    pub fn timestamp(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn config(&self) -> &LooperConfig {
        &self.config
    }

    /// Number of registered loops
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    pub fn stats(&self) -> LooperStats {
        *self.stats.lock()
    }

    /// Call `on_start` on every loop, then begin ticking
    ///
    /// Does nothing if already running. Fails with [`Error::Config`] before
    /// any callback runs if the configured period is out of range.
    pub fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            tracing::debug!(looper = %self.config.name, "start ignored: already running");
            return Ok(());
        }
        let period = self.config.period()?;

        let timestamp = self.timestamp();
        for handle in &self.loops {
            let result = isolated(|| {
                handle.on_start(timestamp);
                Ok(())
            });
            if let Err(e) = result {
                tracing::error!(looper = %self.config.name, handle = handle.name(), "on_start failed: {}", e);
            }
        }

        self.running.store(true, Ordering::SeqCst);

        let loops: Arc<[Arc<dyn Loop>]> = self.loops.clone().into();
        let running = self.running.clone();
        let stats = self.stats.clone();
        let name = self.config.name.clone();
        let warn_on_overrun = self.config.warn_on_overrun;
        let epoch = self.epoch;

        let thread = thread::Builder::new()
            .name(format!("looper-{}", name))
            .spawn(move || {
                ON_SCHEDULER.with(|flag| flag.set(true));
                while running.load(Ordering::SeqCst) {
                    let tick_start = Instant::now();
                    let timestamp = epoch.elapsed().as_secs_f64();

                    let failures = fan_out(&name, &loops, timestamp);

                    let elapsed = tick_start.elapsed();
                    stats.lock().record(elapsed, period, failures);

                    if let Some(remaining) = period.checked_sub(elapsed) {
                        thread::sleep(remaining);
                    } else if warn_on_overrun {
                        tracing::warn!(looper = %name, "tick overrun by {:?}", elapsed - period);
                    }
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                Error::InvalidState(format!("cannot spawn looper thread: {}", e))
            })?;

        self.thread = Some(thread);
        tracing::info!(looper = %self.config.name, loops = self.loops.len(), "looper started");
        Ok(())
    }

    /// Stop ticking, then call `on_stop` on every loop
    ///
    /// The looper thread is joined first, so no `on_loop` can follow an
    /// `on_stop`. Does nothing if not running.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            tracing::debug!(looper = %self.config.name, "stop ignored: not running");
            return;
        };

        self.running.store(false, Ordering::SeqCst);
        if thread.join().is_err() {
            tracing::error!(looper = %self.config.name, "looper thread panicked");
        }

        let timestamp = self.timestamp();
        for handle in &self.loops {
            let result = isolated(|| {
                handle.on_stop(timestamp);
                Ok(())
            });
            if let Err(e) = result {
                tracing::error!(looper = %self.config.name, handle = handle.name(), "on_stop failed: {}", e);
            }
        }
        tracing::info!(looper = %self.config.name, "looper stopped");
    }

    /// Run a single tick on the calling thread, returning the failure count
    ///
    /// Only valid while stopped.
    pub fn run_once(&self) -> Result<u64> {
        if self.thread.is_some() {
            return Err(Error::InvalidState(
                "run_once called while the looper is running".into(),
            ));
        }
        Ok(fan_out(&self.config.name, &self.loops, self.timestamp()))
    }
}

impl Registrar for Looper {
    fn register(&mut self, handle: Arc<dyn Loop>) -> Result<()> {
        if self.thread.is_some() {
            return Err(Error::InvalidState(format!(
                "cannot register {} while looper {} is running",
                handle.name(),
                self.config.name
            )));
        }
        tracing::debug!(looper = %self.config.name, handle = handle.name(), "registered loop");
        self.loops.push(handle);
        Ok(())
    }
}

impl Drop for Looper {
    fn drop(&mut self) {
        self.stop();
    }
}
