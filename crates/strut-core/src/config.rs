//! Robot configuration
//!
//! Constants that used to live in a static table, as serde structs with
//! defaults. A JSON file may override any subset of fields.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::{Error, Result};

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LooperConfig {
    /// Name used for the thread and in logs
    pub name: Arc<str>,
    /// Tick period in milliseconds
    pub period_ms: f64,
    /// Whether to warn when a tick runs longer than the period
    pub warn_on_overrun: bool,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            name: "enabled".into(),
            period_ms: 10.0,
            warn_on_overrun: true,
        }
    }
}

impl LooperConfig {
    /// Create a config with the given period in milliseconds
    pub fn new(period_ms: f64) -> Self {
        Self {
            period_ms,
            ..Default::default()
        }
    }

    /// Set the looper name
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Set overrun warnings
    pub fn with_overrun_warnings(mut self, enabled: bool) -> Self {
        self.warn_on_overrun = enabled;
        self
    }

    /// Get the tick period
    ///
    /// Fails unless the period is positive and at most [`Self::MAX_PERIOD_MS`].
    pub fn period(&self) -> Result<Duration> {
        if !(self.period_ms > 0.0 && self.period_ms <= Self::MAX_PERIOD_MS) {
            return Err(Error::Config(format!(
                "looper period must be in (0, {}] ms, got {} ms",
                Self::MAX_PERIOD_MS,
                self.period_ms
            )));
        }
        Duration::try_from_secs_f64(self.period_ms / 1000.0)
            .map_err(|e| Error::Config(format!("invalid looper period: {}", e)))
    }

    /// Longest accepted tick period, one minute
    pub const MAX_PERIOD_MS: f64 = 60_000.0;

    pub fn validate(&self) -> Result<()> {
        self.period().map(|_| ())
    }
}

/// Extend/retract channel pair of one double-acting solenoid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolenoidChannels {
    pub extend: u8,
    pub retract: u8,
}

impl SolenoidChannels {
    pub const fn new(extend: u8, retract: u8) -> Self {
        Self { extend, retract }
    }
}

/// Analog input channels of the climber's IR sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimberSensorChannels {
    pub front_left: u8,
    pub front_right: u8,
    pub downward_front_left: u8,
    pub downward_front_right: u8,
    pub downward_rear_left: u8,
    pub downward_rear_right: u8,
}

impl Default for ClimberSensorChannels {
    fn default() -> Self {
        Self {
            front_left: 0,
            front_right: 1,
            downward_front_left: 2,
            downward_front_right: 3,
            downward_rear_left: 4,
            downward_rear_right: 5,
        }
    }
}

/// Delays of the blocking self-test, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfTestTiming {
    /// How long the supports stay extended
    pub extend_hold_s: f64,
    /// Settle time after retracting everything
    pub retract_settle_s: f64,
    /// Pause after logging each sensor
    pub per_sensor_s: f64,
}

impl Default for SelfTestTiming {
    fn default() -> Self {
        Self {
            extend_hold_s: 5.0,
            retract_settle_s: 2.0,
            per_sensor_s: 5.0,
        }
    }
}

impl SelfTestTiming {
    /// No waiting at all
    pub fn instant() -> Self {
        Self {
            extend_hold_s: 0.0,
            retract_settle_s: 0.0,
            per_sensor_s: 0.0,
        }
    }
}

/// Climber constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimberConfig {
    /// Pneumatics controller id on the bus
    pub controller_id: u8,
    pub front_left: SolenoidChannels,
    pub front_right: SolenoidChannels,
    pub rear_left: SolenoidChannels,
    pub rear_right: SolenoidChannels,
    pub sensors: ClimberSensorChannels,
    /// A downward sensor at or below this distance (cm) confirms retraction
    pub trigger_distance_cm: f64,
    pub self_test: SelfTestTiming,
}

impl Default for ClimberConfig {
    fn default() -> Self {
        Self {
            controller_id: 1,
            front_left: SolenoidChannels::new(0, 1),
            front_right: SolenoidChannels::new(2, 3),
            rear_left: SolenoidChannels::new(4, 5),
            rear_right: SolenoidChannels::new(6, 7),
            sensors: ClimberSensorChannels::default(),
            trigger_distance_cm: 10.0,
            self_test: SelfTestTiming::default(),
        }
    }
}

impl ClimberConfig {
    /// Set the retraction trigger distance
    pub fn with_trigger_distance(mut self, cm: f64) -> Self {
        self.trigger_distance_cm = cm;
        self
    }

    /// Set the self-test timing
    pub fn with_self_test(mut self, timing: SelfTestTiming) -> Self {
        self.self_test = timing;
        self
    }

    /// Check channel uniqueness and threshold sanity
    pub fn validate(&self) -> Result<()> {
        if !(self.trigger_distance_cm > 0.0) {
            return Err(Error::Config(format!(
                "trigger distance must be positive, got {}",
                self.trigger_distance_cm
            )));
        }
        let timing = self.self_test;
        for delay in [
            timing.extend_hold_s,
            timing.retract_settle_s,
            timing.per_sensor_s,
        ] {
            if !(delay.is_finite() && delay >= 0.0) {
                return Err(Error::Config(format!(
                    "self-test delay must be a non-negative number of seconds, got {}",
                    delay
                )));
            }
        }
        let mut seen = HashSet::new();
        for pair in [self.front_left, self.front_right, self.rear_left, self.rear_right] {
            for channel in [pair.extend, pair.retract] {
                if !seen.insert(channel) {
                    return Err(Error::Config(format!(
                        "solenoid channel {} assigned twice",
                        channel
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Whole-robot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub looper: LooperConfig,
    pub climber: ClimberConfig,
}

impl RobotConfig {
    /// Parse a JSON document; absent fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        tracing::info!(path = %path.as_ref().display(), "loaded robot config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.looper.validate()?;
        self.climber.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = RobotConfig::default();
        assert_eq!(config.looper.period().unwrap(), Duration::from_millis(10));
        assert_eq!(config.climber.controller_id, 1);
        assert_eq!(config.climber.rear_right, SolenoidChannels::new(6, 7));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RobotConfig::from_json_str(
            r#"{ "looper": { "period_ms": 20.0 }, "climber": { "trigger_distance_cm": 7.5 } }"#,
        )
        .unwrap();
        assert_relative_eq!(config.looper.period_ms, 20.0);
        assert!(config.looper.warn_on_overrun);
        assert_relative_eq!(config.climber.trigger_distance_cm, 7.5);
        assert_eq!(config.climber.front_left, SolenoidChannels::new(0, 1));
    }

    #[test]
    fn test_looper_name_survives_json() {
        let config = RobotConfig {
            looper: LooperConfig::new(20.0).with_name("enabled-fast"),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed = RobotConfig::from_json_str(&json).unwrap();
        assert_eq!(&*parsed.looper.name, "enabled-fast");
        assert_relative_eq!(parsed.looper.period_ms, 20.0);
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let mut config = RobotConfig::default();
        config.climber.rear_left = SolenoidChannels::new(0, 5);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_period_rejected() {
        let result = RobotConfig::from_json_str(r#"{ "looper": { "period_ms": 0.0 } }"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_out_of_range_periods_rejected() {
        for json in [
            r#"{ "looper": { "period_ms": 1e300 } }"#,
            r#"{ "looper": { "period_ms": -5.0 } }"#,
            r#"{ "looper": { "period_ms": 60001.0 } }"#,
        ] {
            assert!(matches!(
                RobotConfig::from_json_str(json),
                Err(Error::Config(_))
            ));
        }
        assert!(LooperConfig::new(f64::NAN).period().is_err());
        assert!(LooperConfig::new(f64::INFINITY).period().is_err());
        assert_eq!(
            LooperConfig::new(LooperConfig::MAX_PERIOD_MS).period().unwrap(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            RobotConfig::from_json_str("{ not json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = RobotConfig::load("/nonexistent/strut/robot.json");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
