use serde::Serialize;

use crate::device::Channel;

use super::{scale::ChannelScale, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogState {
    Idle,
    Logging,
    Downloading,
    Cleanup,
}

/// State machine for on-device logging: log, download, then erase the flash.
///
/// Like [super::stream::StreamSession], completions are matched against the
/// generation of the session they belong to.
#[derive(Debug)]
pub struct LogSession {
    state: LogState,
    scale: Option<ChannelScale>,
    progress: f64,
    generation: u64,
}

impl Default for LogSession {
    fn default() -> Self {
        Self {
            state: LogState::Idle,
            scale: None,
            progress: 0.0,
            generation: 0,
        }
    }
}

impl LogSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LogState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == LogState::Idle
    }

    /// Returns true while a download or the cleanup after it is running
    pub fn is_transferring(&self) -> bool {
        matches!(self.state, LogState::Downloading | LogState::Cleanup)
    }

    pub fn channel(&self) -> Option<Channel> {
        if self.is_idle() {
            return None;
        }
        self.scale.map(|s| s.channel())
    }

    pub fn scale(&self) -> Option<ChannelScale> {
        self.scale
    }

    /// Last reported download progress
    pub fn progress(&self) -> f64 {
        self.progress
    }

    fn is_current(&self, generation: u64, state: LogState) -> bool {
        self.generation == generation && self.state == state
    }

    /// Enter the logging state for the channel of the given scale
    pub fn start(&mut self, scale: ChannelScale) -> Result<u64, SessionError> {
        if !self.is_idle() {
            return Err(SessionError::AlreadyActive);
        }
        self.generation += 1;
        self.state = LogState::Logging;
        self.scale = Some(scale);
        self.progress = 0.0;
        Ok(self.generation)
    }

    /// Move from logging to downloading. Returns the generation and the
    /// channel to download.
    pub fn begin_download(&mut self) -> Result<(u64, Channel), SessionError> {
        if self.state != LogState::Logging {
            return Err(SessionError::NotLogging);
        }
        let Some(scale) = self.scale else {
            return Err(SessionError::NotLogging);
        };
        self.state = LogState::Downloading;
        self.progress = 0.0;
        Ok((self.generation, scale.channel()))
    }

    /// Record download progress. The value is clamped to [0, 1]; returns it
    /// if it should be reported, or [None] if it is stale or would move the
    /// progress backwards.
    pub fn update_progress(&mut self, generation: u64, fraction: f64) -> Option<f64> {
        if !self.is_current(generation, LogState::Downloading) || fraction.is_nan() {
            return None;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction < self.progress {
            return None;
        }
        self.progress = fraction;
        Some(fraction)
    }

    /// Download of the given generation succeeded. Returns true if the
    /// session moved on to the cleanup.
    pub fn finish_download(&mut self, generation: u64) -> bool {
        if !self.is_current(generation, LogState::Downloading) {
            return false;
        }
        self.state = LogState::Cleanup;
        true
    }

    /// Download of the given generation failed. Returns true if the session
    /// was downloading and is now idle again.
    pub fn fail_download(&mut self, generation: u64) -> bool {
        if !self.is_current(generation, LogState::Downloading) {
            return false;
        }
        self.state = LogState::Idle;
        true
    }

    /// Abandon a running download. Late completions of the aborted download
    /// are ignored.
    pub fn abort_download(&mut self) -> bool {
        if self.state != LogState::Downloading {
            return false;
        }
        self.state = LogState::Idle;
        true
    }

    /// Cleanup of the given generation completed, successfully or not
    pub fn finish_cleanup(&mut self, generation: u64) -> bool {
        if !self.is_current(generation, LogState::Cleanup) {
            return false;
        }
        self.state = LogState::Idle;
        true
    }
}
