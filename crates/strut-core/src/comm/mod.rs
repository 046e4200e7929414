//! Communication primitives
//!
//! Topics for in-process fan-out and the telemetry sink subsystems push to.

mod telemetry;
mod topic;

pub use telemetry::{TelemetryEntry, TelemetrySink, TelemetryTable, TelemetryValue};
pub use topic::{Subscriber, Topic, TopicConfig};
