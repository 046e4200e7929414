//! strut-core: subsystem state machines and the periodic scheduler that drives them
//!
//! A robot is a set of independently owned subsystems. Each one keeps an
//! operator-supplied *wanted* state and a *system* state that only the
//! control thread advances. Actuation fires once per state entry, never once
//! per tick, and sensors decide whether a commanded state has physically
//! been reached.
//!
//! # Modules
//!
//! - [`control`] - Periodic scheduler (`Looper`) and the generic state cell
//! - [`hardware`] - Actuator, sensor and bus binding traits, plus mocks
//! - [`comm`] - Topics and the telemetry sink
//! - [`subsystems`] - Shared subsystem capability and the climber
//! - [`config`] - Serializable robot constants
//!
//! # Architecture
//!
//! ```text
//! operator thread                    looper thread (10 ms)
//! ┌──────────────┐  set_wanted   ┌──────────────┐  on_loop  ┌────────┐
//! │ control board│──────────────►│  StateCell   │◄──────────│ Looper │
//! └──────────────┘               └──────┬───────┘           └────────┘
//!                                       │ entry action (edge only)
//!                                       ▼
//!                                 actuators / sensors
//! ```

#![warn(unused_must_use)]

pub mod comm;
pub mod config;
pub mod control;
pub mod hardware;
pub mod subsystems;

// Re-exports for convenience
pub use comm::{TelemetrySink, TelemetryTable, TelemetryValue, Topic};
pub use config::{ClimberConfig, LooperConfig, RobotConfig};
pub use control::{Loop, Looper, LooperStats, Registrar, StateCell, Tick, Wanted};
pub use hardware::{Actuator, ActuatorId, Direction, HardwareBinding, ProximitySensor};
pub use subsystems::{Climber, Construction, Subsystem, SubsystemBase};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for strut-core
///
/// Nothing at this layer aborts the control process. Subsystems turn these
/// into logged diagnostics and fall back to a safe state; the variants exist
/// so construction and configuration paths can report *why*.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors must be handled or explicitly ignored with let _ = ..."]
#[non_exhaustive]
pub enum Error {
    /// A device handle could not be acquired from the binding layer.
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// The expected device controller is not reachable on the bus.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted in the wrong lifecycle phase or thread.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A raw state code that maps to no known state.
    #[error("Unknown state code: {0}")]
    UnknownState(u32),

    /// A lifecycle callback failed or panicked.
    #[error("Callback error: {0}")]
    Callback(String),

    /// The blocking self-test could not complete.
    #[error("Self-test error: {0}")]
    SelfTest(String),

    /// A communication channel was closed unexpectedly.
    #[error("Channel closed")]
    ChannelClosed,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(format!("I/O error: {}", e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(format!("JSON error: {}", e))
    }
}

/// Result type alias for strut-core operations
pub type Result<T> = std::result::Result<T, Error>;
