//! Climber subsystem
//!
//! Four double-acting supports (front-left, front-right, rear-left,
//! rear-right) lift the robot onto a platform. Downward IR sensors confirm
//! when a retracted pair has cleared the platform edge.
//!
//! | Wanted                 | System                  | Entry action          |
//! |------------------------|-------------------------|-----------------------|
//! | `Disable`              | `Disabling`             | retract all four      |
//! | `Climb`                | `Climbing`              | extend all four       |
//! | `RetractFrontSupports` | `RetractingFrontSupports` | retract front pair  |
//! | `RetractRearSupports`  | `RetractingRearSupports`  | retract rear pair   |
//!
//! Any transition is allowed in any order. Sequencing is the operator's job.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{Construction, Diagnostics, Subsystem, SubsystemBase};
use crate::comm::TelemetrySink;
use crate::config::{ClimberConfig, SolenoidChannels};
use crate::control::{on_scheduler_thread, Loop, Registrar, StateCell, Wanted};
use crate::hardware::{Actuator, Direction, HardwareBinding, ProximitySensor};
use crate::{Error, Result};

const NAME: &str = "Climber";

/// Operator intent for the climber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WantedState {
    Disable,
    Climb,
    RetractFrontSupports,
    RetractRearSupports,
}

impl WantedState {
    pub const ALL: [Self; 4] = [
        Self::Disable,
        Self::Climb,
        Self::RetractFrontSupports,
        Self::RetractRearSupports,
    ];

    /// Raw code used by operator-input mappings
    pub fn code(self) -> u32 {
        match self {
            Self::Disable => 0,
            Self::Climb => 1,
            Self::RetractFrontSupports => 2,
            Self::RetractRearSupports => 3,
        }
    }
}

impl TryFrom<u32> for WantedState {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|w| w.code() == code)
            .ok_or(Error::UnknownState(code))
    }
}

impl fmt::Display for WantedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disable => write!(f, "DISABLE"),
            Self::Climb => write!(f, "CLIMB"),
            Self::RetractFrontSupports => write!(f, "RETRACT_FRONT_SUPPORTS"),
            Self::RetractRearSupports => write!(f, "RETRACT_REAR_SUPPORTS"),
        }
    }
}

/// Commanded condition of the climber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemState {
    Disabling,
    Climbing,
    RetractingFrontSupports,
    RetractingRearSupports,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabling => write!(f, "DISABLING"),
            Self::Climbing => write!(f, "CLIMBING"),
            Self::RetractingFrontSupports => write!(f, "RETRACTING_FRONT_SUPPORTS"),
            Self::RetractingRearSupports => write!(f, "RETRACTING_REAR_SUPPORTS"),
        }
    }
}

/// Map an intent to the state that realizes it
pub fn resolve(wanted: WantedState) -> SystemState {
    match wanted {
        WantedState::Disable => SystemState::Disabling,
        WantedState::Climb => SystemState::Climbing,
        WantedState::RetractFrontSupports => SystemState::RetractingFrontSupports,
        WantedState::RetractRearSupports => SystemState::RetractingRearSupports,
    }
}

/// Distances from the two confirming sensors, in centimetres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimberReadings {
    pub front_cm: f64,
    pub rear_cm: f64,
}

impl ClimberReadings {
    /// Readings that confirm nothing
    pub const UNAVAILABLE: Self = Self {
        front_cm: f64::INFINITY,
        rear_cm: f64::INFINITY,
    };
}

/// Whether the commanded state is physically confirmed
///
/// `Disable` and `Climb` have no sensor, so matching the commanded state is
/// enough. Retraction also needs its sensor at or below `trigger_cm`.
/// An unrecognized intent is an error; callers treat it as not at target.
pub fn at_target(
    wanted: Wanted<WantedState>,
    system: SystemState,
    readings: &ClimberReadings,
    trigger_cm: f64,
) -> Result<bool> {
    let wanted = match wanted {
        Wanted::Known(w) => w,
        Wanted::Unrecognized(code) => return Err(Error::UnknownState(code)),
    };
    let reached = match wanted {
        WantedState::Disable => system == SystemState::Disabling,
        WantedState::Climb => system == SystemState::Climbing,
        WantedState::RetractFrontSupports => {
            system == SystemState::RetractingFrontSupports && readings.front_cm <= trigger_cm
        }
        WantedState::RetractRearSupports => {
            system == SystemState::RetractingRearSupports && readings.rear_cm <= trigger_cm
        }
    };
    Ok(reached)
}

struct ActuatorGroup {
    front_left: Box<dyn Actuator>,
    front_right: Box<dyn Actuator>,
    rear_left: Box<dyn Actuator>,
    rear_right: Box<dyn Actuator>,
}

impl ActuatorGroup {
    fn set_front(&self, direction: Direction) {
        self.front_left.set_direction(direction);
        self.front_right.set_direction(direction);
    }

    fn set_rear(&self, direction: Direction) {
        self.rear_left.set_direction(direction);
        self.rear_right.set_direction(direction);
    }

    fn set_all(&self, direction: Direction) {
        self.set_front(direction);
        self.set_rear(direction);
    }
}

struct SensorSet {
    front_left: Arc<dyn ProximitySensor>,
    front_right: Arc<dyn ProximitySensor>,
    downward_front_left: Arc<dyn ProximitySensor>,
    downward_front_right: Arc<dyn ProximitySensor>,
    downward_rear_left: Arc<dyn ProximitySensor>,
    downward_rear_right: Arc<dyn ProximitySensor>,
}

impl SensorSet {
    fn named(&self) -> [(&'static str, &Arc<dyn ProximitySensor>); 6] {
        [
            ("Front Left", &self.front_left),
            ("Front Right", &self.front_right),
            ("Downward Front Left", &self.downward_front_left),
            ("Downward Front Right", &self.downward_front_right),
            ("Downward Rear Left", &self.downward_rear_left),
            ("Downward Rear Right", &self.downward_rear_right),
        ]
    }

    fn readings(&self) -> ClimberReadings {
        ClimberReadings {
            front_cm: self.downward_front_left.distance(),
            rear_cm: self.downward_rear_left.distance(),
        }
    }
}

struct Hardware {
    actuators: ActuatorGroup,
    sensors: SensorSet,
}

impl Hardware {
    fn acquire(config: &ClimberConfig, binding: &dyn HardwareBinding) -> Result<Self> {
        config.validate()?;
        let controller = config.controller_id;
        if !binding.validate_controller(controller) {
            return Err(Error::Validation(format!(
                "climber pneumatics controller {} isn't on the bus",
                controller
            )));
        }

        let actuator = |channels: SolenoidChannels| {
            binding.actuator(controller, channels.extend, channels.retract)
        };
        let actuators = ActuatorGroup {
            front_left: actuator(config.front_left)?,
            front_right: actuator(config.front_right)?,
            rear_left: actuator(config.rear_left)?,
            rear_right: actuator(config.rear_right)?,
        };

        let ch = &config.sensors;
        let sensors = SensorSet {
            front_left: binding.proximity_sensor(ch.front_left)?,
            front_right: binding.proximity_sensor(ch.front_right)?,
            downward_front_left: binding.proximity_sensor(ch.downward_front_left)?,
            downward_front_right: binding.proximity_sensor(ch.downward_front_right)?,
            downward_rear_left: binding.proximity_sensor(ch.downward_rear_left)?,
            downward_rear_right: binding.proximity_sensor(ch.downward_rear_right)?,
        };

        Ok(Self { actuators, sensors })
    }
}

/// Consistent view for telemetry and tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimberSnapshot {
    pub wanted: Wanted<WantedState>,
    pub system: SystemState,
    pub degraded: bool,
    /// Entry actions executed since construction
    pub entries: u64,
    /// Latest downward front-left voltage sampled while climbing
    pub climb_voltage: Option<f64>,
}

struct ClimberInner {
    base: SubsystemBase,
    config: ClimberConfig,
    cell: StateCell<WantedState, SystemState>,
    hardware: Option<Hardware>,
    entries: AtomicU64,
    climb_voltage: Mutex<Option<f64>>,
}

impl ClimberInner {
    fn tick(&self) -> Result<()> {
        let tick = match self.hardware {
            Some(_) => self.cell.advance(resolve),
            None => self.cell.advance(|_| SystemState::Disabling),
        };

        if let Some(code) = tick.unrecognized {
            self.base.log_error(format_args!(
                "unhandled wanted state code {}, resolving to {}",
                code, tick.state
            ));
        }

        let Some(hardware) = &self.hardware else {
            return Ok(());
        };

        if tick.entered {
            self.base
                .log_debug(format_args!("{} -> {}", tick.previous, tick.state));
            self.enter(tick.state, &hardware.actuators);
            self.entries.fetch_add(1, Ordering::Relaxed);
        }

        let sample = (tick.state == SystemState::Climbing)
            .then(|| hardware.sensors.downward_front_left.voltage());
        *self.climb_voltage.lock() = sample;

        Ok(())
    }

    fn enter(&self, state: SystemState, actuators: &ActuatorGroup) {
        match state {
            SystemState::Disabling => actuators.set_all(Direction::Reverse),
            SystemState::Climbing => actuators.set_all(Direction::Forward),
            SystemState::RetractingFrontSupports => actuators.set_front(Direction::Reverse),
            SystemState::RetractingRearSupports => actuators.set_rear(Direction::Reverse),
        }
    }

    fn readings(&self) -> ClimberReadings {
        self.hardware
            .as_ref()
            .map_or(ClimberReadings::UNAVAILABLE, |hw| hw.sensors.readings())
    }
}

/// The climber's scheduler lifecycle
pub struct ClimberLoop {
    inner: Arc<ClimberInner>,
}

impl Loop for ClimberLoop {
    fn on_start(&self, _timestamp: f64) {
        self.inner
            .cell
            .reset(WantedState::Disable, SystemState::Disabling);
    }

    fn on_loop(&self, _timestamp: f64) -> Result<()> {
        self.inner.tick()
    }

    fn on_stop(&self, _timestamp: f64) {
        Climber::stop_inner(&self.inner);
    }

    fn name(&self) -> &str {
        NAME
    }
}

/// Climber subsystem handle
///
/// Cloning yields another handle to the same subsystem, so the operator
/// thread and the dashboard can each hold one.
#[derive(Clone)]
pub struct Climber {
    inner: Arc<ClimberInner>,
}

impl Climber {
    /// Acquire hardware and build the climber
    ///
    /// Never fails outright: if the controller is missing or a handle can't
    /// be acquired the climber comes back degraded, stuck in `Disabling`
    /// with inert actuation.
    pub fn new(config: ClimberConfig, binding: &dyn HardwareBinding) -> Construction<Self> {
        let base = SubsystemBase::new(NAME);
        let (hardware, failure) = match Hardware::acquire(&config, binding) {
            Ok(hw) => {
                base.log_initialized(Ok(()));
                (Some(hw), None)
            }
            Err(e) => {
                base.log_initialized(Err(&e));
                (None, Some(e))
            }
        };

        let climber = Self {
            inner: Arc::new(ClimberInner {
                base,
                config,
                cell: StateCell::new(
                    WantedState::Disable,
                    SystemState::Disabling,
                    SystemState::Disabling,
                ),
                hardware,
                entries: AtomicU64::new(0),
                climb_voltage: Mutex::new(None),
            }),
        };

        match failure {
            None => Construction::Ready(climber),
            Some(reason) => Construction::Degraded {
                subsystem: climber,
                reason,
            },
        }
    }

    /// Store a new intent; takes effect on the next tick
    pub fn set_wanted_state(&self, wanted: WantedState) {
        self.inner.cell.set_wanted(wanted);
    }

    /// Store an intent from a raw operator-input code
    pub fn set_wanted_code(&self, code: u32) {
        self.inner.cell.set_wanted_code(code);
    }

    pub fn wanted_state(&self) -> Wanted<WantedState> {
        self.inner.cell.wanted()
    }

    pub fn system_state(&self) -> SystemState {
        self.inner.cell.system()
    }

    pub fn is_degraded(&self) -> bool {
        self.inner.hardware.is_none()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.inner.base.diagnostics()
    }

    pub fn config(&self) -> &ClimberConfig {
        &self.inner.config
    }

    /// Whether the commanded state has been physically reached
    pub fn at_target(&self) -> bool {
        let snapshot = self.inner.cell.snapshot();
        let readings = self.inner.readings();
        match at_target(
            snapshot.wanted,
            snapshot.system,
            &readings,
            self.inner.config.trigger_distance_cm,
        ) {
            Ok(reached) => reached,
            Err(e) => {
                if self.inner.cell.claim_unrecognized().is_some() {
                    self.inner
                        .base
                        .log_error(format_args!("climber in unhandled wanted state: {}", e));
                }
                false
            }
        }
    }

    pub fn snapshot(&self) -> ClimberSnapshot {
        let cell = self.inner.cell.snapshot();
        ClimberSnapshot {
            wanted: cell.wanted,
            system: cell.system,
            degraded: self.is_degraded(),
            entries: self.inner.entries.load(Ordering::Relaxed),
            climb_voltage: *self.inner.climb_voltage.lock(),
        }
    }

    /// Lifecycle handle for the scheduler
    pub fn loop_handle(&self) -> Arc<ClimberLoop> {
        Arc::new(ClimberLoop {
            inner: self.inner.clone(),
        })
    }

    fn stop_inner(inner: &ClimberInner) {
        // Double-acting supports hold position unpowered; nothing to release
        inner.base.log_debug("stop");
    }

    fn pause(seconds: f64) {
        let delay = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl fmt::Debug for Climber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Climber")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl Subsystem for Climber {
    fn name(&self) -> &str {
        NAME
    }

    fn register_enabled_loops(&self, registrar: &mut dyn Registrar) -> Result<()> {
        registrar.register(self.loop_handle())
    }

    fn output_telemetry(&self, sink: &dyn TelemetrySink) {
        let base = &self.inner.base;
        let snapshot = self.snapshot();
        base.put_state(sink, snapshot.system);
        base.put_wanted_state(sink, snapshot.wanted);
        base.put_flag(sink, "Degraded", snapshot.degraded);
        if let Some(hardware) = &self.inner.hardware {
            let front = &hardware.sensors.front_left;
            base.put_number(sink, "FrontIRVoltage", front.voltage());
            base.put_number(sink, "FrontIRDistance", front.distance());
        }
        if let Some(voltage) = snapshot.climb_voltage {
            base.put_number(sink, "ClimbIRVoltage", voltage);
        }
    }

    fn check_system(&self, variant: &str) -> Result<bool> {
        if on_scheduler_thread() {
            return Err(Error::InvalidState(
                "climber self-test must not run on the scheduler thread".into(),
            ));
        }
        let base = &self.inner.base;
        let Some(hardware) = &self.inner.hardware else {
            base.log_warning("self-test skipped: hardware unavailable");
            return Ok(false);
        };
        let timing = self.inner.config.self_test;
        base.log_debug(format_args!("self-test variant '{}'", variant));

        base.log_notice(format_args!("Lifting for {} seconds", timing.extend_hold_s));
        hardware.actuators.set_all(Direction::Forward);
        Self::pause(timing.extend_hold_s);
        hardware.actuators.set_all(Direction::Reverse);
        Self::pause(timing.retract_settle_s);

        base.log_notice("Testing IR sensors");
        for (label, sensor) in hardware.sensors.named() {
            base.log_notice(format_args!(
                "{} IR sensor distance is {} and voltage is {}",
                label,
                sensor.distance(),
                sensor.voltage()
            ));
            Self::pause(timing.per_sensor_s);
        }
        Ok(true)
    }

    fn stop(&self) {
        Self::stop_inner(&self.inner);
    }
}
