pub mod sample;
pub mod state;

use std::future::Future;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

pub use self::sample::{Channel, Sample, SampleValue};
pub use self::state::{AccelerometerRange, ConnectionState, FusionMode, LedColor};

/// Possible errors reported by a [Device] implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("device is not connected")]
    NotConnected,
    #[error("{0}")]
    Failed(String),
}

impl From<&str> for DeviceError {
    fn from(value: &str) -> Self {
        Self::Failed(value.to_string())
    }
}

impl From<String> for DeviceError {
    fn from(value: String) -> Self {
        Self::Failed(value)
    }
}

/// Sender half used by a [Device] to push live samples for a channel. An
/// `Err` value is a delivery failure and ends the stream.
pub type SampleSender = mpsc::Sender<Result<Sample, DeviceError>>;

/// A [Device] is a connected sensor-fusion capable wearable. Every method that
/// talks to the hardware is asynchronous and independently failable. The
/// application owns the device; sessions only hold a weak reference to it.
pub trait Device: Send + Sync + 'static {
    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Subscribe to connection state transitions. The channel closes when the
    /// device is dropped.
    fn state_changes(&self) -> broadcast::Receiver<ConnectionState>;

    /// Configured full-scale range of the accelerometer
    fn accelerometer_range(&self) -> AccelerometerRange;

    fn connect(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Read the battery level in percent
    fn read_battery(&self) -> impl Future<Output = Result<u8, DeviceError>> + Send;

    /// Read the onboard thermistor in degrees Celsius
    fn read_temperature(&self) -> impl Future<Output = Result<f64, DeviceError>> + Send;

    /// Flash the onboard LED the given number of times
    fn flash_led(
        &self,
        color: LedColor,
        flashes: u8,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Issue a full device reset
    fn reset(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Select the sensor-fusion algorithm used for all outputs
    fn set_fusion_mode(
        &self,
        mode: FusionMode,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Start pushing live samples for the given channel to `tx`.
    fn start_notifications(
        &self,
        channel: Channel,
        tx: SampleSender,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn stop_notifications(
        &self,
        channel: Channel,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Start buffering samples for the given channel in device flash
    fn start_logging(&self, channel: Channel)
        -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Stop logging and download everything logged for the channel. Progress
    /// fractions are sent to `progress` while the download runs. When `erase`
    /// is set the flash is erased on the next disconnect.
    fn download_log_and_stop_logging(
        &self,
        channel: Channel,
        erase: bool,
        progress: mpsc::Sender<f64>,
    ) -> impl Future<Output = Result<Vec<Sample>, DeviceError>> + Send;
}
