use serde::Serialize;

use crate::device::{Channel, ConnectionState};

use super::{logging::LogState, scale::DisplayPoint, stream::StreamState};

/// Last telemetry read from the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Telemetry {
    /// Battery level in percent
    pub battery: Option<u8>,
    /// Temperature in degrees Celsius
    pub temperature: Option<f64>,
}

/// Result of a completed log download
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadReport {
    /// Number of samples added to the buffer
    pub samples: usize,
    /// Set if clearing the device log failed. The downloaded samples are
    /// still valid.
    pub cleanup_error: Option<String>,
}

/// Snapshot of a session manager
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    /// [None] once the device has been released
    pub connection: Option<ConnectionState>,
    pub stream: StreamState,
    pub stream_channel: Option<Channel>,
    pub log: LogState,
    pub log_channel: Option<Channel>,
    pub progress: f64,
    pub samples: usize,
    pub telemetry: Telemetry,
    pub last_point: Option<DisplayPoint>,
}
