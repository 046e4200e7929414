//! Hardware binding traits
//!
//! The narrow surface through which subsystems reach devices. Real driver
//! bindings and the mocks in [`super::mock`] implement the same traits so
//! subsystem code never knows which one it talks to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::Result;

/// Commanded direction of a double-acting actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Reverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Reverse => write!(f, "reverse"),
        }
    }
}

/// Bus address of an actuator: controller plus its forward/reverse channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActuatorId {
    pub controller: u8,
    pub forward_channel: u8,
    pub reverse_channel: u8,
}

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.controller, self.forward_channel, self.reverse_channel
        )
    }
}

/// A binary double-acting actuator
///
/// Commands are fire-and-forget and idempotent, but each one costs bus
/// bandwidth, so callers should only issue them on state entry.
pub trait Actuator: Send + Sync {
    /// Command a direction
    fn set_direction(&self, direction: Direction);

    /// Bus address of this actuator
    fn id(&self) -> ActuatorId;
}

/// A distance sensor
///
/// Reads never block and always return a best-effort current value.
pub trait ProximitySensor: Send + Sync {
    /// Distance reading in centimetres
    fn distance(&self) -> f64;

    /// Raw output voltage
    fn voltage(&self) -> f64;
}

/// Factory and bus probe for device handles
pub trait HardwareBinding: Send + Sync {
    /// Check that a device controller answers on the bus
    #[must_use]
    fn validate_controller(&self, controller: u8) -> bool;

    /// Acquire an actuator handle; the caller owns it exclusively
    fn actuator(
        &self,
        controller: u8,
        forward_channel: u8,
        reverse_channel: u8,
    ) -> Result<Box<dyn Actuator>>;

    /// Acquire a shared handle to a sensor owned by the binding layer
    fn proximity_sensor(&self, channel: u8) -> Result<Arc<dyn ProximitySensor>>;
}
