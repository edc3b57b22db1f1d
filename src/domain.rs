//! ==============================================================================
//! domain.rs - device / sensor model produced by the aggregation pipeline
//! ==============================================================================
//!
//! purpose:
//!     plain data types shared by the gateway, the pipeline and the cards.
//!     nothing in here performs io.
//!
//! relationships:
//!     - built by: pipeline.rs (one DeviceRecord per discovered device)
//!     - read by: card.rs, render.rs, server.rs
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// what kind of quantity a sensor reports, drives icon and units
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    Temperature,
    Humidity,
    Bulb,
    Unknown,
}

impl DisplayKind {
    /// map the loose `type` strings reported by the REST server / older ui
    pub fn from_reported(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "temp" | "temperature" | "type" => Self::Temperature,
            "humid" | "humidity" => Self::Humidity,
            "bulb" | "light" => Self::Bulb,
            _ => Self::Unknown,
        }
    }
}

// ==============================================================================
// sensor id
// ==============================================================================
// ids come from the REST server as dotted object/instance paths, e.g. ".3303.0"
// (the leading segment is empty). the second segment is the object type token
// used to look up the rule table.

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId {
    raw: String,
    device_segment: String,
    type_segment: Option<String>,
    instance_segment: Option<String>,
}

impl SensorId {
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, '.');
        let device_segment = parts.next().unwrap_or_default().to_string();
        let type_segment = parts
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let instance_segment = parts.next().map(str::to_string);

        Self {
            raw: raw.to_string(),
            device_segment,
            type_segment,
            instance_segment,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn device_segment(&self) -> &str {
        &self.device_segment
    }

    /// object type token, `None` when the id has no second segment
    pub fn type_segment(&self) -> Option<&str> {
        self.type_segment.as_deref()
    }

    pub fn instance_segment(&self) -> Option<&str> {
        self.instance_segment.as_deref()
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for SensorId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

// ==============================================================================
// values
// ==============================================================================

/// last-known value of a sensor as the REST server returned it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl SensorValue {
    /// interpret the value as a light switch state
    pub fn is_on(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0,
            Self::Flag(b) => *b,
            Self::Text(s) => matches!(s.trim().to_ascii_uppercase().as_str(), "ON" | "1" | "TRUE"),
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Flag(b) => f.write_str(if *b { "ON" } else { "OFF" }),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// body of `devices/{dev}/sensors/{id}/value`
#[derive(Clone, Debug, Deserialize)]
pub struct ValueReading {
    #[serde(rename = "type", default)]
    pub reported_type: Option<String>,
    pub value: SensorValue,
}

/// one point of a sensor's history, timestamp in epoch milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp: i64,
    pub value: f64,
}

// ==============================================================================
// records
// ==============================================================================

/// snapshot of one sensor from the last successful pipeline run
#[derive(Clone, Debug, Serialize)]
pub struct SensorRecord {
    pub id: SensorId,
    /// `id` plus the rule's value suffix, used for value and stat lookups
    pub resource: String,
    #[serde(rename = "type")]
    pub kind: DisplayKind,
    pub value: SensorValue,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeviceRecord {
    pub name: String,
    pub sensors: Vec<SensorRecord>,
}

/// device name -> record, only ever built from a fully successful run
pub type DeviceMap = BTreeMap<String, DeviceRecord>;
