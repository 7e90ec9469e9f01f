//! Transport engine.
//!
//! One thread owns the playback state and the backend; everything else
//! talks to it over channels and reads the position through a lock-free
//! snapshot. Substreams for seeks are prepared off-thread and handed back
//! over a second channel, so a slow synthesis never wedges the command
//! loop, and a result prepared for an abandoned target is recognized by
//! its stale generation and dropped.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::PlaybackBackend;
use crate::clock::{self, PlaybackClock, PositionSnapshot, SEEK_EPSILON, TransportState};
use crate::error::EngineError;
use crate::gap::{GapReport, GapSettings, enforce_min_gaps};
use crate::seek::substream_from;
use crate::timeline::Timeline;
use crate::timing::TempoMap;

#[derive(Debug, Clone)]
pub enum TransportCommand {
    /// Replace the loaded timeline, stopping playback first. With gap
    /// settings given, the minimum-gap pass runs over the incoming stream.
    Load {
        timeline: Timeline,
        gap: Option<GapSettings>,
    },
    /// Start playing at the given time.
    Play { from_seconds: f64 },
    Pause,
    /// Rebuild playback at the paused position.
    Resume,
    /// Move to the given time, keeping the running/paused distinction.
    Seek { seconds: f64 },
    Stop,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportUpdate {
    Loaded {
        duration_seconds: f64,
        gap: Option<GapReport>,
    },
    Started {
        from_seconds: f64,
    },
    Paused {
        at_seconds: f64,
    },
    Stopped,
    /// A play or seek target lay past the last event, so the transport
    /// stopped instead of playing.
    ReachedEnd,
    Error {
        message: String,
    },
}

pub struct TransportHandle {
    pub command_tx: Sender<TransportCommand>,
    pub update_rx: Receiver<TransportUpdate>,
    position: PositionReader,
}

impl TransportHandle {
    pub fn position(&self) -> PositionReader {
        self.position.clone()
    }
}

/// Lock-free reader of the transport position. Clone one per thread that
/// wants to display or poll the position.
#[derive(Clone)]
pub struct PositionReader {
    snapshot: Arc<ArcSwap<PositionSnapshot>>,
}

impl PositionReader {
    /// Current position in seconds: pure arithmetic over the last
    /// published snapshot, safe to call at any rate from any thread.
    pub fn current_position(&self) -> f64 {
        self.snapshot.load().position()
    }
}

pub fn spawn_transport(backend: Arc<Mutex<dyn PlaybackBackend>>) -> TransportHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();
    let snapshot = Arc::new(ArcSwap::from_pointee(PositionSnapshot::idle()));
    let position = PositionReader {
        snapshot: Arc::clone(&snapshot),
    };

    std::thread::spawn(move || {
        transport_thread(command_rx, update_tx, backend, snapshot);
    });

    TransportHandle {
        command_tx,
        update_rx,
        position,
    }
}

struct LoadedTimeline {
    timeline: Arc<Timeline>,
    map: Arc<TempoMap>,
}

/// Result of an off-thread substream synthesis, tagged with the clock
/// generation it was prepared for.
struct SeekOutcome {
    generation: u64,
    target_seconds: f64,
    result: Result<Option<Timeline>, EngineError>,
}

struct EngineState {
    backend: Arc<Mutex<dyn PlaybackBackend>>,
    snapshot: Arc<ArcSwap<PositionSnapshot>>,
    update_tx: Sender<TransportUpdate>,
    seek_tx: Sender<SeekOutcome>,
    loaded: Option<LoadedTimeline>,
    clock: PlaybackClock,
    /// A synthesis worker is out; playback starts when it reports back
    /// with a matching generation.
    pending_play: bool,
}

fn transport_thread(
    command_rx: Receiver<TransportCommand>,
    update_tx: Sender<TransportUpdate>,
    backend: Arc<Mutex<dyn PlaybackBackend>>,
    snapshot: Arc<ArcSwap<PositionSnapshot>>,
) {
    let (seek_tx, seek_rx) = crossbeam::channel::unbounded();
    let mut state = EngineState {
        backend,
        snapshot,
        update_tx,
        seek_tx,
        loaded: None,
        clock: PlaybackClock::new(),
        pending_play: false,
    };

    loop {
        crossbeam::select! {
            recv(command_rx) -> msg => match msg {
                Ok(TransportCommand::Load { timeline, gap }) => {
                    let result = load(&mut state, timeline, gap);
                    report(&state, result);
                }
                Ok(TransportCommand::Play { from_seconds }) => {
                    let result = request_playback(&mut state, from_seconds);
                    report(&state, result);
                }
                Ok(TransportCommand::Pause) => {
                    let result = pause(&mut state);
                    report(&state, result);
                }
                Ok(TransportCommand::Resume) => {
                    let result = resume(&mut state);
                    report(&state, result);
                }
                Ok(TransportCommand::Seek { seconds }) => {
                    let result = seek(&mut state, seconds);
                    report(&state, result);
                }
                Ok(TransportCommand::Stop) => {
                    halt(&mut state);
                    let _ = state.update_tx.send(TransportUpdate::Stopped);
                }
                Ok(TransportCommand::Shutdown) | Err(crossbeam::channel::RecvError) => break,
            },
            recv(seek_rx) -> msg => {
                if let Ok(outcome) = msg {
                    finish_seek(&mut state, outcome);
                }
            }
        }
    }

    halt(&mut state);
}

fn report(state: &EngineState, result: Result<(), EngineError>) {
    if let Err(e) = result {
        warn!("transport command failed: {}", e);
        let _ = state.update_tx.send(TransportUpdate::Error {
            message: e.to_string(),
        });
    }
}

fn publish(state: &EngineState) {
    state.snapshot.store(Arc::new(state.clock.snapshot()));
}

fn silence(state: &EngineState) {
    let mut backend = state.backend.lock();
    backend.all_notes_off();
    backend.stop();
}

/// Silence the backend and put the clock back to stopped at zero.
fn halt(state: &mut EngineState) {
    state.pending_play = false;
    silence(state);
    state.clock.stop();
    publish(state);
}

fn load(
    state: &mut EngineState,
    timeline: Timeline,
    gap: Option<GapSettings>,
) -> Result<(), EngineError> {
    halt(state);
    let (timeline, gap_report) = match gap {
        Some(settings) => {
            let (respaced, report) = enforce_min_gaps(&timeline, settings)?;
            (respaced, Some(report))
        }
        None => (timeline, None),
    };
    let map = TempoMap::from_timeline(&timeline);
    let duration_seconds = timeline.duration_seconds(&map)?;
    debug!(
        "loaded timeline: {} events, {:.3}s",
        timeline.event_count(),
        duration_seconds
    );
    state.loaded = Some(LoadedTimeline {
        timeline: Arc::new(timeline),
        map: Arc::new(map),
    });
    let _ = state.update_tx.send(TransportUpdate::Loaded {
        duration_seconds,
        gap: gap_report,
    });
    Ok(())
}

/// Common path behind play, resume, and seek-while-running: interrupt any
/// current playback, move the clock to the target, then either start the
/// original stream (targets at the top) or send a worker off to derive
/// the substream.
fn request_playback(state: &mut EngineState, target_seconds: f64) -> Result<(), EngineError> {
    clock::check_seconds(target_seconds)?;
    let (timeline, map) = match &state.loaded {
        Some(loaded) => (Arc::clone(&loaded.timeline), Arc::clone(&loaded.map)),
        None => return Err(EngineError::NothingLoaded),
    };

    let now = Instant::now();
    if state.clock.state() == TransportState::Playing {
        state.clock.pause_at(now)?;
        silence(state);
    }
    state.pending_play = false;
    // Park paused at the target so position reads show it before the
    // stream starts, and so a pause or resume in the window is legal.
    state.clock.hold_at(target_seconds)?;
    publish(state);

    if target_seconds.abs() < SEEK_EPSILON {
        // The original stream already starts at the top; no synthesis.
        return begin_stream(state, (*timeline).clone(), target_seconds);
    }

    let generation = state.clock.generation();
    let seek_tx = state.seek_tx.clone();
    state.pending_play = true;
    std::thread::spawn(move || {
        let result = substream_from(&timeline, &map, target_seconds);
        let _ = seek_tx.send(SeekOutcome {
            generation,
            target_seconds,
            result,
        });
    });
    debug!(
        "seek to {:.3}s queued, generation {}",
        target_seconds, generation
    );
    Ok(())
}

fn begin_stream(
    state: &mut EngineState,
    stream: Timeline,
    at_seconds: f64,
) -> Result<(), EngineError> {
    state
        .backend
        .lock()
        .play_from_start(stream)
        .map_err(|message| EngineError::Backend { message })?;
    state.clock.play_at(at_seconds, Instant::now())?;
    publish(state);
    let _ = state.update_tx.send(TransportUpdate::Started {
        from_seconds: at_seconds,
    });
    Ok(())
}

fn finish_seek(state: &mut EngineState, outcome: SeekOutcome) {
    if outcome.generation != state.clock.generation() {
        debug!(
            "discarding superseded seek to {:.3}s",
            outcome.target_seconds
        );
        return;
    }
    state.pending_play = false;
    match outcome.result {
        Ok(Some(stream)) => {
            let result = begin_stream(state, stream, outcome.target_seconds);
            if result.is_err() {
                halt(state);
                let _ = state.update_tx.send(TransportUpdate::Stopped);
            }
            report(state, result);
        }
        Ok(None) => {
            // Past the last event: stopping is the answer, not an error.
            debug!("nothing to play at {:.3}s", outcome.target_seconds);
            halt(state);
            let _ = state.update_tx.send(TransportUpdate::ReachedEnd);
            let _ = state.update_tx.send(TransportUpdate::Stopped);
        }
        Err(e) => {
            halt(state);
            let _ = state.update_tx.send(TransportUpdate::Stopped);
            report(state, Err(e));
        }
    }
}

fn pause(state: &mut EngineState) -> Result<(), EngineError> {
    let now = Instant::now();
    let at_seconds = if state.pending_play {
        // Playback was still being prepared; cancel the completion and
        // hold the target.
        state.pending_play = false;
        let held = state.clock.position_at(now);
        state.clock.seek_at(held, now)?;
        held
    } else {
        let frozen = state.clock.pause_at(now)?;
        silence(state);
        frozen
    };
    publish(state);
    debug!("paused at {:.3}s", at_seconds);
    let _ = state.update_tx.send(TransportUpdate::Paused { at_seconds });
    Ok(())
}

fn resume(state: &mut EngineState) -> Result<(), EngineError> {
    if state.clock.state() != TransportState::Paused {
        return Err(EngineError::InvalidState {
            op: "resume",
            state: state.clock.state(),
        });
    }
    let target = state.clock.position_at(Instant::now());
    debug!("resume rebuilds playback at {:.3}s", target);
    request_playback(state, target)
}

fn seek(state: &mut EngineState, seconds: f64) -> Result<(), EngineError> {
    if state.clock.state() == TransportState::Playing || state.pending_play {
        return request_playback(state, seconds);
    }
    if state.loaded.is_none() {
        return Err(EngineError::NothingLoaded);
    }
    state.clock.seek_at(seconds, Instant::now())?;
    publish(state);
    if state.clock.state() == TransportState::Paused {
        let _ = state.update_tx.send(TransportUpdate::Paused {
            at_seconds: seconds,
        });
    }
    Ok(())
}
