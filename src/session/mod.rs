pub mod buffer;
pub mod client;
pub mod command;
pub mod export;
pub mod logging;
pub mod manager;
pub mod scale;
pub mod sink;
pub mod status;
pub mod stream;
pub mod supervisor;

#[cfg(test)]
mod buffer_test;
#[cfg(test)]
mod supervisor_test;

use std::{io, time::Duration};

use thiserror::Error;

use crate::device::{Channel, DeviceError};

pub use self::buffer::SampleBuffer;
pub use self::client::{ClientError, SessionClient};
pub use self::manager::SessionManager;
pub use self::scale::{ChannelScale, DisplayPoint};
pub use self::sink::{LogStatusSink, StatusSink};
pub use self::status::{DownloadReport, SessionStatus, Telemetry};
pub use self::supervisor::{ConnectionSupervisor, Subscription};

/// Errors establishing a connection to the device
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("timed out after {0:?} waiting for the device to connect")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Transport(DeviceError),
}

/// Possible errors of a sensor-fusion session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Connection(#[from] ConnectionError),
    #[error("a session is already active for this output")]
    AlreadyActive,
    #[error("device is busy with another session: {0}")]
    Busy(&'static str),
    #[error("device is not connected")]
    NotConnected,
    #[error("device is not logging")]
    NotLogging,
    #[error("device has been released")]
    DeviceReleased,
    #[error("device request failed: {0}")]
    Device(#[from] DeviceError),
    #[error("device did not answer the {0} request within {1:?}")]
    RequestTimeout(&'static str, Duration),
    #[error("{0} sample received while streaming {1}")]
    ChannelMismatch(Channel, Channel),
    #[error("stream failed, the device must be reset: {0}")]
    StreamDelivery(String),
    #[error("log download failed, logged data is preserved on the device: {0}")]
    LogDownload(String),
    #[error("unable to clear the device log: {0}")]
    Cleanup(String),
    #[error("unable to write export: {0}")]
    ExportIo(#[from] io::Error),
}
