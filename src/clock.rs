//! Transport state and position arithmetic.
//!
//! The clock never reads the wall time itself; every transition and query
//! takes the instant to use, so the whole state machine can be driven in
//! tests with chosen instants.

use std::time::Instant;

use crate::error::EngineError;

/// Play and seek targets within this many seconds of zero start the
/// original stream from the top instead of deriving a substream.
pub const SEEK_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

/// Position bookkeeping for one transport.
///
/// While playing, the position is the stream time at the last anchor plus
/// the wall time elapsed since; pausing folds the elapsed time into a held
/// position and drops the anchor. Every transition bumps a generation
/// counter so work prepared for an old position can be recognized as stale.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    state: TransportState,
    /// Position while not running: frozen by pause, the pending target
    /// while a seek is prepared, zero when stopped.
    held_seconds: f64,
    /// Stream time at the moment the wall anchor was taken.
    anchor_seconds: f64,
    wall_anchor: Option<Instant>,
    generation: u64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            state: TransportState::Stopped,
            held_seconds: 0.0,
            anchor_seconds: 0.0,
            wall_anchor: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stream position at `now`. Pure: reading never changes the clock.
    pub fn position_at(&self, now: Instant) -> f64 {
        match (self.state, self.wall_anchor) {
            (TransportState::Playing, Some(anchor)) => {
                self.anchor_seconds + now.duration_since(anchor).as_secs_f64()
            }
            _ => self.held_seconds,
        }
    }

    /// Starts running at `target_seconds`. Valid while stopped or paused;
    /// a running transport seeks instead.
    pub fn play_at(&mut self, target_seconds: f64, now: Instant) -> Result<(), EngineError> {
        check_seconds(target_seconds)?;
        if self.state == TransportState::Playing {
            return Err(EngineError::InvalidState {
                op: "play",
                state: self.state,
            });
        }
        self.anchor_seconds = target_seconds;
        self.held_seconds = target_seconds;
        self.wall_anchor = Some(now);
        self.state = TransportState::Playing;
        self.generation += 1;
        Ok(())
    }

    /// Freezes the running position and returns it.
    pub fn pause_at(&mut self, now: Instant) -> Result<f64, EngineError> {
        if self.state != TransportState::Playing {
            return Err(EngineError::InvalidState {
                op: "pause",
                state: self.state,
            });
        }
        self.held_seconds = self.position_at(now);
        self.wall_anchor = None;
        self.state = TransportState::Paused;
        self.generation += 1;
        Ok(self.held_seconds)
    }

    /// Parks the transport paused at `target_seconds`, whatever the state
    /// was. Used while playback at the target is prepared off-thread, so
    /// position reads show the target before the stream starts.
    pub fn hold_at(&mut self, target_seconds: f64) -> Result<(), EngineError> {
        check_seconds(target_seconds)?;
        self.held_seconds = target_seconds;
        self.wall_anchor = None;
        self.state = TransportState::Paused;
        self.generation += 1;
        Ok(())
    }

    /// Moves the position to `target_seconds` without changing state. A
    /// running transport keeps running from the new position; a paused or
    /// stopped one holds it for the next play.
    pub fn seek_at(&mut self, target_seconds: f64, now: Instant) -> Result<(), EngineError> {
        check_seconds(target_seconds)?;
        self.held_seconds = target_seconds;
        if self.state == TransportState::Playing {
            self.anchor_seconds = target_seconds;
            self.wall_anchor = Some(now);
        }
        self.generation += 1;
        Ok(())
    }

    /// Back to stopped at position zero, from any state.
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.held_seconds = 0.0;
        self.anchor_seconds = 0.0;
        self.wall_anchor = None;
        self.generation += 1;
    }

    pub(crate) fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            running: self.state == TransportState::Playing,
            anchor_seconds: self.anchor_seconds,
            wall_anchor: self.wall_anchor,
            held_seconds: self.held_seconds,
        }
    }
}

pub(crate) fn check_seconds(seconds: f64) -> Result<(), EngineError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(EngineError::InvalidArgument {
            what: "seconds must be finite and non-negative",
        });
    }
    Ok(())
}

/// Copyable view of the clock, published for lock-free position reads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PositionSnapshot {
    pub(crate) running: bool,
    pub(crate) anchor_seconds: f64,
    pub(crate) wall_anchor: Option<Instant>,
    pub(crate) held_seconds: f64,
}

impl PositionSnapshot {
    pub(crate) fn idle() -> Self {
        PlaybackClock::new().snapshot()
    }

    pub(crate) fn position(&self) -> f64 {
        match (self.running, self.wall_anchor) {
            (true, Some(anchor)) => self.anchor_seconds + anchor.elapsed().as_secs_f64(),
            _ => self.held_seconds,
        }
    }
}
