//! Event timeline model: delta-timed events grouped into tracks, the shared
//! currency of every component in this crate. Events are immutable once
//! built; algorithms that change timing produce new lists.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::timing::{self, TempoMap};

/// Native integer time unit of the event format. How long one tick lasts in
/// real time depends on the tempo in force at that point.
pub type Tick = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    NoteOn {
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    /// Tempo from this point on, in microseconds per beat (lower = faster).
    TempoChange {
        micros_per_beat: u32,
    },
    EndOfTrack,
    /// Anything else the surrounding application parsed. The payload is
    /// opaque to this crate and is carried through byte-for-byte.
    Other {
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Ticks since the previous event on the same track.
    pub delta_ticks: Tick,
    pub kind: EventKind,
}

impl Event {
    pub fn new(delta_ticks: Tick, kind: EventKind) -> Self {
        Self { delta_ticks, kind }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub events: Vec<Event>,
}

impl Track {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Events with their derived absolute tick positions, in stream order.
    pub fn iter_absolute(&self) -> impl Iterator<Item = (Tick, &Event)> + '_ {
        self.events.iter().scan(0 as Tick, |at, event| {
            *at += event.delta_ticks;
            Some((*at, event))
        })
    }

    /// Absolute tick position of the last event, 0 for an empty track.
    pub fn end_tick(&self) -> Tick {
        self.events.iter().map(|e| e.delta_ticks).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    /// Ticks per beat, constant for the whole timeline. Always positive.
    pub ticks_per_beat: u16,
    pub tracks: Vec<Track>,
}

impl Timeline {
    pub fn new(ticks_per_beat: u16, tracks: Vec<Track>) -> Result<Self, EngineError> {
        if ticks_per_beat == 0 {
            return Err(EngineError::InvalidArgument {
                what: "ticks_per_beat must be positive",
            });
        }
        Ok(Self {
            ticks_per_beat,
            tracks,
        })
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(|t| t.events.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(|t| t.events.is_empty())
    }

    /// Wall-clock length of the timeline: the time of the latest event on
    /// any track under the given tempo map.
    pub fn duration_seconds(&self, map: &TempoMap) -> Result<f64, EngineError> {
        let last_tick = self.tracks.iter().map(Track::end_tick).max().unwrap_or(0);
        timing::ticks_to_seconds(map, self.ticks_per_beat, last_tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(delta: Tick, pitch: u8) -> Event {
        Event::new(
            delta,
            EventKind::NoteOn {
                channel: 0,
                pitch,
                velocity: 100,
            },
        )
    }

    #[test]
    fn absolute_positions_accumulate_deltas() {
        let track = Track::new(vec![note_on(0, 60), note_on(100, 62), note_on(50, 64)]);
        let at: Vec<Tick> = track.iter_absolute().map(|(t, _)| t).collect();
        assert_eq!(at, vec![0, 100, 150]);
        assert_eq!(track.end_tick(), 150);
    }

    #[test]
    fn zero_resolution_is_rejected() {
        assert_eq!(
            Timeline::new(0, Vec::new()),
            Err(EngineError::InvalidArgument {
                what: "ticks_per_beat must be positive",
            })
        );
    }

    #[test]
    fn duration_spans_the_longest_track() {
        let timeline = Timeline::new(
            480,
            vec![
                Track::new(vec![note_on(480, 60)]),
                Track::new(vec![note_on(0, 72), note_on(960, 72)]),
            ],
        )
        .unwrap();
        let map = TempoMap::default();
        // 960 ticks at 500000 µs/beat and 480 ticks/beat = 1.0 s.
        let secs = timeline.duration_seconds(&map).unwrap();
        assert!((secs - 1.0).abs() < 1e-9);
    }
}
