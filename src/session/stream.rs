use serde::Serialize;

use crate::device::{Channel, Sample};

use super::{
    scale::{ChannelScale, DisplayPoint},
    SessionError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamState {
    Idle,
    Active,
}

/// What happened to a sample handed to [StreamSession::accept]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Disposition {
    /// The sample belongs to the active stream and should be buffered
    Accepted(DisplayPoint),
    /// The sample arrived for a stream that is no longer active
    Stale,
    /// The sample is from a different channel than the active stream
    Mismatched(Channel),
}

#[derive(Debug, Clone, Copy)]
struct ActiveStream {
    channel: Channel,
    scale: ChannelScale,
    generation: u64,
    sample_count: usize,
}

/// State machine for live notification streaming of a single channel.
///
/// Every start hands out a new generation number. Completions carry the
/// generation they were started with, so anything arriving after the stream
/// stopped (or failed) is recognised as stale and ignored.
#[derive(Debug, Default)]
pub struct StreamSession {
    active: Option<ActiveStream>,
    generation: u64,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StreamState {
        match self.active {
            Some(_) => StreamState::Active,
            None => StreamState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn channel(&self) -> Option<Channel> {
        self.active.map(|a| a.channel)
    }

    /// Number of samples accepted since the stream started
    pub fn sample_count(&self) -> usize {
        self.active.map(|a| a.sample_count).unwrap_or_default()
    }

    /// Returns true if the given generation is the active stream
    pub fn is_current(&self, generation: u64) -> bool {
        self.active.is_some_and(|a| a.generation == generation)
    }

    /// Start streaming with the given scale. Returns the generation of the
    /// new stream.
    pub fn start(&mut self, scale: ChannelScale) -> Result<u64, SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        self.generation += 1;
        self.active = Some(ActiveStream {
            channel: scale.channel(),
            scale,
            generation: self.generation,
            sample_count: 0,
        });
        Ok(self.generation)
    }

    /// Stop the active stream. Returns the channel that was streaming, or
    /// [None] if the session was already idle.
    pub fn stop(&mut self) -> Option<Channel> {
        self.active.take().map(|a| a.channel)
    }

    /// Terminate the stream of the given generation after a delivery error.
    /// Returns the channel only the first time a live generation fails.
    pub fn fail(&mut self, generation: u64) -> Option<Channel> {
        if !self.is_current(generation) {
            return None;
        }
        self.stop()
    }

    /// Account for a sample delivered to the given generation
    pub fn accept(&mut self, generation: u64, sample: &Sample) -> Disposition {
        let Some(active) = self.active.as_mut() else {
            return Disposition::Stale;
        };
        if active.generation != generation {
            return Disposition::Stale;
        }
        let Some(point) = active.scale.project(&sample.value) else {
            return Disposition::Mismatched(sample.channel());
        };
        active.sample_count += 1;
        Disposition::Accepted(point)
    }
}
