use std::{
    fmt::Display,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The sensor-fusion output a session streams or logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    EulerAngle,
    Quaternion,
    Gravity,
    LinearAcceleration,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::EulerAngle,
        Channel::Quaternion,
        Channel::Gravity,
        Channel::LinearAcceleration,
    ];

    /// Returns true if the given value belongs to this channel
    pub fn matches(&self, value: &SampleValue) -> bool {
        value.channel() == *self
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Channel::EulerAngle => "EulerAngle",
            Channel::Quaternion => "Quaternion",
            Channel::Gravity => "Gravity",
            Channel::LinearAcceleration => "LinearAcceleration",
        };
        write!(f, "{name}")
    }
}

/// Values produced by the sensor-fusion outputs. Angles are in degrees,
/// gravity is a unit vector and linear acceleration is in g.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    EulerAngle { pitch: f64, roll: f64, yaw: f64 },
    Quaternion { x: f64, y: f64, z: f64, w: f64 },
    Gravity { x: f64, y: f64, z: f64 },
    LinearAcceleration { x: f64, y: f64, z: f64 },
}

impl SampleValue {
    pub fn channel(&self) -> Channel {
        match self {
            SampleValue::EulerAngle { .. } => Channel::EulerAngle,
            SampleValue::Quaternion { .. } => Channel::Quaternion,
            SampleValue::Gravity { .. } => Channel::Gravity,
            SampleValue::LinearAcceleration { .. } => Channel::LinearAcceleration,
        }
    }

    /// Numeric fields in their fixed record order. The scalar part of a
    /// quaternion is not recorded.
    pub fn fields(&self) -> Vec<f64> {
        match *self {
            SampleValue::EulerAngle { pitch, roll, yaw } => vec![pitch, roll, yaw],
            SampleValue::Quaternion { x, y, z, .. } => vec![x, y, z],
            SampleValue::Gravity { x, y, z } => vec![x, y, z],
            SampleValue::LinearAcceleration { x, y, z } => vec![x, y, z],
        }
    }
}

/// A single timestamped sensor-fusion reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: SystemTime,
    pub value: SampleValue,
}

impl Sample {
    pub fn new(timestamp: SystemTime, value: SampleValue) -> Self {
        Self { timestamp, value }
    }

    /// Create a sample captured now
    pub fn now(value: SampleValue) -> Self {
        Self::new(SystemTime::now(), value)
    }

    /// Create a sample from fractional seconds since the Unix epoch. Returns
    /// [None] if the time is not finite or out of range for [SystemTime].
    pub fn at_secs(secs: f64, value: SampleValue) -> Option<Self> {
        let offset = Duration::try_from_secs_f64(secs.abs()).ok()?;
        let timestamp = if secs >= 0.0 {
            UNIX_EPOCH.checked_add(offset)?
        } else {
            UNIX_EPOCH.checked_sub(offset)?
        };
        Some(Self::new(timestamp, value))
    }

    pub fn channel(&self) -> Channel {
        self.value.channel()
    }

    /// Capture time as fractional seconds since the Unix epoch
    pub fn timestamp_secs(&self) -> f64 {
        match self.timestamp.duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_secs_f64(),
            Err(before) => -before.duration().as_secs_f64(),
        }
    }
}
