use std::fmt::Display;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Connection state of a [super::Device]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Discovery,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ConnectionState::Discovery => "Discovery",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Disconnected => "Disconnected",
        };
        write!(f, "{text}")
    }
}

/// Full-scale range of the accelerometer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum AccelerometerRange {
    #[serde(rename = "2g")]
    G2,
    #[serde(rename = "4g")]
    G4,
    #[default]
    #[serde(rename = "8g")]
    G8,
    #[serde(rename = "16g")]
    G16,
}

impl AccelerometerRange {
    /// Range in g
    pub fn g(&self) -> f64 {
        match self {
            AccelerometerRange::G2 => 2.0,
            AccelerometerRange::G4 => 4.0,
            AccelerometerRange::G8 => 8.0,
            AccelerometerRange::G16 => 16.0,
        }
    }
}

/// Sensor-fusion algorithm mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Accelerometer, gyroscope and magnetometer with absolute heading
    #[default]
    Ndof,
    /// Accelerometer and gyroscope, relative heading
    ImuPlus,
    /// Accelerometer and magnetometer
    Compass,
    /// Accelerometer and magnetometer with gyro emulation
    M4g,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Green,
    Red,
}
