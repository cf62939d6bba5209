use std::time::Duration;

pub const APP_NAME: &str = "fusionlink";

/// Seconds to wait for a connection attempt, including the reconnect done
/// after erasing a log
pub const DEFAULT_CONNECT_TIMEOUT_SECS: f64 = 15.0;

/// Seconds to wait for a disconnect, fusion mode change or notification
/// request. Kept below [CLIENT_TIMEOUT] so a hung device cannot stall clients.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 2.0;

/// Prefix of exported CSV files
pub const DEFAULT_EXPORT_LABEL: &str = "SensorFusion";

/// Date format appended to exported file names
pub const EXPORT_DATE_FORMAT: &str = "%m_%d_%Y-%H_%M_%S";

/// Number of LED flashes used to acknowledge a connect or disconnect
pub const LED_FLASH_COUNT: u8 = 3;

/// Maximum duration to wait for the session manager to accept or answer a
/// command. Reaching it usually means a deadlock.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the session manager command channel
pub const BUFFER_SIZE: usize = 2048;
