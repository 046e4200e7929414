//! Telemetry sink
//!
//! Subsystems push key/value pairs once per telemetry cycle. The sink is
//! whatever the host wires in: a latest-value table for a dashboard, a
//! topic feeding a transport thread, or both.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{Subscriber, Topic};
use crate::Result;

/// A single telemetry value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl TelemetryValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Flag(b) => write!(f, "{}", b),
        }
    }
}

impl From<f64> for TelemetryValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for TelemetryValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

impl From<String> for TelemetryValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for TelemetryValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Destination for telemetry pushes
pub trait TelemetrySink: Send + Sync {
    fn put(&self, key: &str, value: TelemetryValue);
}

/// Latest value per key
#[derive(Debug, Default)]
pub struct TelemetryTable {
    values: RwLock<BTreeMap<String, TelemetryValue>>,
}

impl TelemetryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<TelemetryValue> {
        self.values.read().get(key).cloned()
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_number())
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_text().map(str::to_string))
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Copy of every entry, ordered by key
    pub fn snapshot(&self) -> BTreeMap<String, TelemetryValue> {
        self.values.read().clone()
    }

    /// Apply every entry waiting on a telemetry feed, returning how many
    ///
    /// Lets a dashboard thread keep a table in step with a
    /// `Topic<TelemetryEntry>` the control side publishes to.
    pub fn mirror(&self, feed: &Subscriber<TelemetryEntry>) -> usize {
        let entries = feed.drain();
        let count = entries.len();
        let mut values = self.values.write();
        for entry in entries {
            values.insert(entry.key, entry.value);
        }
        count
    }

    /// Serialize the whole table as a JSON object
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.values.read())?)
    }
}

impl TelemetrySink for TelemetryTable {
    fn put(&self, key: &str, value: TelemetryValue) {
        self.values.write().insert(key.to_string(), value);
    }
}

/// One pushed pair, as carried on a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    pub key: String,
    pub value: TelemetryValue,
}

impl TelemetrySink for Topic<TelemetryEntry> {
    fn put(&self, key: &str, value: TelemetryValue) {
        self.publish(TelemetryEntry {
            key: key.to_string(),
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_table_keeps_latest() {
        let table = TelemetryTable::new();
        table.put("Climber/State", "Disabling".into());
        table.put("Climber/State", "Climbing".into());
        table.put("Climber/FrontIRDistance", TelemetryValue::Number(12.5));

        assert_eq!(table.len(), 2);
        assert_eq!(table.text("Climber/State").as_deref(), Some("Climbing"));
        assert_relative_eq!(table.number("Climber/FrontIRDistance").unwrap(), 12.5);
        assert_eq!(table.number("Climber/State"), None);
    }

    #[test]
    fn test_table_json() {
        let table = TelemetryTable::new();
        table.put("a", true.into());
        table.put("b", TelemetryValue::Number(2.0));
        assert_eq!(table.to_json().unwrap(), r#"{"a":true,"b":2.0}"#);
    }

    #[test]
    fn test_topic_sink() {
        let topic = Topic::<TelemetryEntry>::new("telemetry");
        let sub = topic.subscribe();
        let sink: &dyn TelemetrySink = &topic;
        sink.put("Climber/Degraded", false.into());

        let entry = sub.try_recv().unwrap().unwrap();
        assert_eq!(entry.key, "Climber/Degraded");
        assert_eq!(entry.value.as_flag(), Some(false));
    }

    #[test]
    fn test_mirror_applies_feed_in_order() {
        let topic = Topic::<TelemetryEntry>::new("telemetry");
        let feed = topic.subscribe();
        topic.put("Climber/State", TelemetryValue::Text("CLIMBING".into()));
        topic.put("Climber/FrontIRDistance", TelemetryValue::Number(12.0));
        topic.put("Climber/FrontIRDistance", TelemetryValue::Number(9.5));

        let table = TelemetryTable::new();
        assert_eq!(table.mirror(&feed), 3);
        assert_eq!(table.len(), 2);
        assert_relative_eq!(table.number("Climber/FrontIRDistance").unwrap(), 9.5);
        assert_eq!(table.mirror(&feed), 0);
    }
}
