//! Robot subsystems
//!
//! Each subsystem composes a [`SubsystemBase`] for logging and telemetry,
//! implements [`Subsystem`], and registers a named [`Loop`](crate::control::Loop)
//! with the scheduler. Construction returns a [`Construction`] so callers see
//! whether the hardware came up.

mod climber;

pub use climber::{
    at_target, resolve, Climber, ClimberLoop, ClimberReadings, ClimberSnapshot, SystemState,
    WantedState,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::comm::{TelemetrySink, TelemetryValue};
use crate::control::Registrar;
use crate::{Error, Result};

/// Lifecycle surface shared by all subsystems
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &str;

    /// Register this subsystem's loops; called once during robot setup
    fn register_enabled_loops(&self, registrar: &mut dyn Registrar) -> Result<()>;

    /// Push current state to the dashboard; pure read
    fn output_telemetry(&self, sink: &dyn TelemetrySink);

    /// Blocking hardware self-test. Never call from the scheduler thread.
    fn check_system(&self, variant: &str) -> Result<bool>;

    /// Put hardware in its resting condition
    fn stop(&self);
}

/// Outcome of building a subsystem
///
/// A degraded subsystem is still a usable value: it answers queries and
/// telemetry, and its actuation is inert.
#[derive(Debug)]
pub enum Construction<T> {
    Ready(T),
    Degraded { subsystem: T, reason: Error },
}

impl<T> Construction<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn subsystem(&self) -> &T {
        match self {
            Self::Ready(s) | Self::Degraded { subsystem: s, .. } => s,
        }
    }

    pub fn into_subsystem(self) -> T {
        match self {
            Self::Ready(s) | Self::Degraded { subsystem: s, .. } => s,
        }
    }

    /// Why construction degraded, if it did
    pub fn reason(&self) -> Option<&Error> {
        match self {
            Self::Ready(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Diagnostic counters, bumped alongside each log line
#[derive(Debug, Default)]
pub struct Diagnostics {
    notices: AtomicU64,
    warnings: AtomicU64,
    errors: AtomicU64,
}

impl Diagnostics {
    pub fn notices(&self) -> u64 {
        self.notices.load(Ordering::Relaxed)
    }

    pub fn warnings(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Logging and telemetry helpers a subsystem composes
#[derive(Debug)]
pub struct SubsystemBase {
    name: String,
    diagnostics: Diagnostics,
}

impl SubsystemBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// One diagnostic per construction: a notice on success, an error on failure
    pub fn log_initialized(&self, outcome: std::result::Result<(), &Error>) {
        match outcome {
            Ok(()) => self.log_notice("init SUCCEEDED"),
            Err(e) => self.log_error(format_args!("init FAILED: {}", e)),
        }
    }

    pub fn log_notice(&self, message: impl fmt::Display) {
        self.diagnostics.notices.fetch_add(1, Ordering::Relaxed);
        tracing::info!(subsystem = %self.name, "{}", message);
    }

    pub fn log_warning(&self, message: impl fmt::Display) {
        self.diagnostics.warnings.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(subsystem = %self.name, "{}", message);
    }

    pub fn log_error(&self, message: impl fmt::Display) {
        self.diagnostics.errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!(subsystem = %self.name, "{}", message);
    }

    pub fn log_debug(&self, message: impl fmt::Display) {
        tracing::debug!(subsystem = %self.name, "{}", message);
    }

    fn key(&self, field: &str) -> String {
        format!("{}/{}", self.name, field)
    }

    pub fn put_state(&self, sink: &dyn TelemetrySink, state: impl fmt::Display) {
        sink.put(&self.key("State"), TelemetryValue::Text(state.to_string()));
    }

    pub fn put_wanted_state(&self, sink: &dyn TelemetrySink, wanted: impl fmt::Display) {
        sink.put(
            &self.key("WantedState"),
            TelemetryValue::Text(wanted.to_string()),
        );
    }

    pub fn put_number(&self, sink: &dyn TelemetrySink, field: &str, value: f64) {
        sink.put(&self.key(field), TelemetryValue::Number(value));
    }

    pub fn put_flag(&self, sink: &dyn TelemetrySink, field: &str, value: bool) {
        sink.put(&self.key(field), TelemetryValue::Flag(value));
    }
}
