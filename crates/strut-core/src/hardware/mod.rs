//! Hardware abstraction
//!
//! Traits for the actuator, sensor and bus-probe bindings consumed by
//! subsystems, and an in-memory mock binding.

pub mod mock;
mod traits;

pub use mock::{ActuatorCommand, CommandLog, MockActuator, MockBinding, MockSensor};
pub use traits::{Actuator, ActuatorId, Direction, HardwareBinding, ProximitySensor};
