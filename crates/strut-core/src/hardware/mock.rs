//! Mock hardware for tests and bench runs
//!
//! `MockBinding` hands out actuators that append every command to a shared
//! log, and sensors whose readings are set from the test.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Actuator, ActuatorId, Direction, HardwareBinding, ProximitySensor};
use crate::{Error, Result};

/// One recorded actuator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorCommand {
    pub id: ActuatorId,
    pub direction: Direction,
}

/// Shared, append-only record of commands
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    entries: Arc<Mutex<Vec<ActuatorCommand>>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, command: ActuatorCommand) {
        self.entries.lock().push(command);
    }

    /// Number of commands recorded so far
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all commands in issue order
    pub fn entries(&self) -> Vec<ActuatorCommand> {
        self.entries.lock().clone()
    }

    /// Commands issued to one controller channel pair
    pub fn for_actuator(&self, id: ActuatorId) -> Vec<Direction> {
        self.entries
            .lock()
            .iter()
            .filter(|c| c.id == id)
            .map(|c| c.direction)
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// An actuator that records instead of moving
#[derive(Debug)]
pub struct MockActuator {
    id: ActuatorId,
    log: CommandLog,
    last: Mutex<Option<Direction>>,
}

impl MockActuator {
    pub fn new(id: ActuatorId, log: CommandLog) -> Self {
        Self {
            id,
            log,
            last: Mutex::new(None),
        }
    }

    /// Last commanded direction, if any
    pub fn last_direction(&self) -> Option<Direction> {
        *self.last.lock()
    }
}

impl Actuator for MockActuator {
    fn set_direction(&self, direction: Direction) {
        *self.last.lock() = Some(direction);
        self.log.push(ActuatorCommand {
            id: self.id,
            direction,
        });
    }

    fn id(&self) -> ActuatorId {
        self.id
    }
}

#[derive(Debug, Clone, Copy)]
struct Reading {
    distance: f64,
    voltage: f64,
}

/// A sensor with test-controlled readings
#[derive(Debug)]
pub struct MockSensor {
    reading: RwLock<Reading>,
}

impl MockSensor {
    pub fn new(distance: f64, voltage: f64) -> Self {
        Self {
            reading: RwLock::new(Reading { distance, voltage }),
        }
    }

    pub fn set_distance(&self, distance: f64) {
        self.reading.write().distance = distance;
    }

    pub fn set_voltage(&self, voltage: f64) {
        self.reading.write().voltage = voltage;
    }
}

impl Default for MockSensor {
    fn default() -> Self {
        // Far from anything: nothing confirmed until a test says so
        Self::new(80.0, 0.4)
    }
}

impl ProximitySensor for MockSensor {
    fn distance(&self) -> f64 {
        self.reading.read().distance
    }

    fn voltage(&self) -> f64 {
        self.reading.read().voltage
    }
}

/// A binding whose bus contents are declared up front
#[derive(Debug, Default)]
pub struct MockBinding {
    controllers: RwLock<HashSet<u8>>,
    sensors: RwLock<HashMap<u8, Arc<MockSensor>>>,
    log: CommandLog,
    fail_actuators: AtomicBool,
}

impl MockBinding {
    /// A binding where the given controllers answer on the bus
    pub fn with_controllers(controllers: &[u8]) -> Self {
        Self {
            controllers: RwLock::new(controllers.iter().copied().collect()),
            ..Default::default()
        }
    }

    /// Make a controller (un)reachable
    pub fn set_controller_present(&self, controller: u8, present: bool) {
        let mut controllers = self.controllers.write();
        if present {
            controllers.insert(controller);
        } else {
            controllers.remove(&controller);
        }
    }

    /// Make every later actuator acquisition fail
    pub fn fail_actuator_acquisition(&self, fail: bool) {
        self.fail_actuators.store(fail, Ordering::Relaxed);
    }

    /// Log shared by every actuator this binding created
    pub fn commands(&self) -> CommandLog {
        self.log.clone()
    }

    /// The sensor on a channel, created on first use
    pub fn sensor(&self, channel: u8) -> Arc<MockSensor> {
        self.sensors
            .write()
            .entry(channel)
            .or_insert_with(|| Arc::new(MockSensor::default()))
            .clone()
    }
}

impl HardwareBinding for MockBinding {
    fn validate_controller(&self, controller: u8) -> bool {
        self.controllers.read().contains(&controller)
    }

    fn actuator(
        &self,
        controller: u8,
        forward_channel: u8,
        reverse_channel: u8,
    ) -> Result<Box<dyn Actuator>> {
        if self.fail_actuators.load(Ordering::Relaxed) {
            return Err(Error::Hardware(format!(
                "cannot open actuator on channels {}/{}",
                forward_channel, reverse_channel
            )));
        }
        let id = ActuatorId {
            controller,
            forward_channel,
            reverse_channel,
        };
        Ok(Box::new(MockActuator::new(id, self.log.clone())))
    }

    fn proximity_sensor(&self, channel: u8) -> Result<Arc<dyn ProximitySensor>> {
        Ok(self.sensor(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mock_actuator_records() {
        let binding = MockBinding::with_controllers(&[1]);
        let actuator = binding.actuator(1, 0, 1).unwrap();
        actuator.set_direction(Direction::Forward);
        actuator.set_direction(Direction::Reverse);

        let log = binding.commands();
        assert_eq!(
            log.for_actuator(actuator.id()),
            vec![Direction::Forward, Direction::Reverse]
        );
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_mock_sensor_shared_handle() {
        let binding = MockBinding::default();
        let handle = binding.proximity_sensor(3).unwrap();
        binding.sensor(3).set_distance(4.5);
        assert_relative_eq!(handle.distance(), 4.5);
    }

    #[test]
    fn test_controller_presence() {
        let binding = MockBinding::with_controllers(&[1]);
        assert!(binding.validate_controller(1));
        assert!(!binding.validate_controller(0));
        binding.set_controller_present(1, false);
        assert!(!binding.validate_controller(1));
    }

    #[test]
    fn test_actuator_acquisition_failure() {
        let binding = MockBinding::with_controllers(&[1]);
        binding.fail_actuator_acquisition(true);
        assert!(matches!(binding.actuator(1, 0, 1), Err(Error::Hardware(_))));
    }
}
