use crate::device::ConnectionState;

use super::scale::DisplayPoint;

/// Receives everything a session wants to show to the user: status text,
/// download progress, error alerts, plotted points and connection changes.
pub trait StatusSink: Send + Sync {
    fn status(&self, text: &str);

    /// Download progress in [0, 1]
    fn progress(&self, _fraction: f64) {}

    fn alert(&self, title: &str, message: &str);

    /// A sample projected into display coordinates
    fn plot(&self, _point: DisplayPoint) {}

    fn connection(&self, _state: ConnectionState) {}
}

/// [StatusSink] writing everything to the log
#[derive(Debug, Default, Clone)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn status(&self, text: &str) {
        log::info!("{text}");
    }

    fn progress(&self, fraction: f64) {
        log::info!("Progress: {:.0}%", fraction * 100.0);
    }

    fn alert(&self, title: &str, message: &str) {
        log::error!("{title}: {message}");
    }

    fn plot(&self, point: DisplayPoint) {
        log::trace!("Plot: {:.3} {:.3} {:.3}", point.x, point.y, point.z);
    }

    fn connection(&self, state: ConnectionState) {
        log::info!("Device {state}");
    }
}
