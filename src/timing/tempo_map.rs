//! Ordered tempo table built from a timeline's tempo change events.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::timeline::{EventKind, Tick, Timeline, Track};

/// Tempo in force when a stream says nothing at tick 0: 500000 microseconds
/// per beat, i.e. 120 beats per minute.
pub const DEFAULT_MICROS_PER_BEAT: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoEntry {
    pub tick: Tick,
    pub micros_per_beat: u32,
}

/// Every tempo in the stream at its absolute tick position, strictly
/// ordered, one entry per tick. Entry 0 always sits at tick 0, so every
/// tick from 0 on has a defined tempo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoMap {
    entries: Vec<TempoEntry>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self {
            entries: vec![TempoEntry {
                tick: 0,
                micros_per_beat: DEFAULT_MICROS_PER_BEAT,
            }],
        }
    }
}

impl TempoMap {
    /// Collects the tempo changes of one track in stream order. When two
    /// changes land on the same tick the later one in the stream wins. A
    /// change to zero microseconds per beat cannot be expressed as a rate
    /// and is dropped.
    pub fn build(track: &Track) -> Self {
        let mut map = Self::default();
        for (tick, event) in track.iter_absolute() {
            if let EventKind::TempoChange { micros_per_beat } = event.kind {
                if micros_per_beat == 0 {
                    warn!("ignoring zero tempo change at tick {}", tick);
                    continue;
                }
                match map.entries.last_mut() {
                    Some(last) if last.tick == tick => last.micros_per_beat = micros_per_beat,
                    _ => map.entries.push(TempoEntry {
                        tick,
                        micros_per_beat,
                    }),
                }
            }
        }
        map
    }

    /// Tempo changes live on the first track by convention; a timeline with
    /// no tracks gets the default map.
    pub fn from_timeline(timeline: &Timeline) -> Self {
        timeline.tracks.first().map(Self::build).unwrap_or_default()
    }

    /// Tempo in force at `tick`: the last entry at or before it.
    pub fn tempo_at(&self, tick: Tick) -> u32 {
        let after = self.entries.partition_point(|e| e.tick <= tick);
        match after {
            0 => DEFAULT_MICROS_PER_BEAT,
            n => self.entries[n - 1].micros_per_beat,
        }
    }

    pub fn entries(&self) -> &[TempoEntry] {
        &self.entries
    }

    /// Constant-tempo spans as (start tick, end tick, µs per beat). The
    /// last span has no end.
    pub(crate) fn segments(&self) -> impl Iterator<Item = (Tick, Option<Tick>, u32)> + '_ {
        self.entries.iter().enumerate().map(|(i, entry)| {
            let end = self.entries.get(i + 1).map(|next| next.tick);
            (entry.tick, end, entry.micros_per_beat)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Event;

    fn tempo(delta: Tick, micros_per_beat: u32) -> Event {
        Event::new(delta, EventKind::TempoChange { micros_per_beat })
    }

    #[test]
    fn empty_track_yields_the_default_map() {
        let map = TempoMap::build(&Track::default());
        assert_eq!(
            map.entries(),
            &[TempoEntry {
                tick: 0,
                micros_per_beat: DEFAULT_MICROS_PER_BEAT,
            }]
        );
        assert_eq!(map.tempo_at(0), DEFAULT_MICROS_PER_BEAT);
        assert_eq!(map.tempo_at(1_000_000), DEFAULT_MICROS_PER_BEAT);
    }

    #[test]
    fn changes_are_collected_at_absolute_positions() {
        let track = Track::new(vec![tempo(0, 600_000), tempo(480, 300_000), tempo(480, 250_000)]);
        let map = TempoMap::build(&track);
        assert_eq!(
            map.entries(),
            &[
                TempoEntry {
                    tick: 0,
                    micros_per_beat: 600_000,
                },
                TempoEntry {
                    tick: 480,
                    micros_per_beat: 300_000,
                },
                TempoEntry {
                    tick: 960,
                    micros_per_beat: 250_000,
                },
            ]
        );
    }

    #[test]
    fn later_change_on_the_same_tick_wins() {
        let track = Track::new(vec![tempo(0, 600_000), tempo(0, 400_000)]);
        let map = TempoMap::build(&track);
        assert_eq!(map.entries().len(), 1);
        assert_eq!(map.tempo_at(0), 400_000);
    }

    #[test]
    fn change_at_tick_zero_replaces_the_default() {
        let track = Track::new(vec![tempo(0, 750_000)]);
        let map = TempoMap::build(&track);
        assert_eq!(map.entries().len(), 1);
        assert_eq!(map.tempo_at(0), 750_000);
    }

    #[test]
    fn lookup_picks_the_last_entry_at_or_before() {
        let track = Track::new(vec![tempo(100, 600_000), tempo(200, 300_000)]);
        let map = TempoMap::build(&track);
        assert_eq!(map.tempo_at(0), DEFAULT_MICROS_PER_BEAT);
        assert_eq!(map.tempo_at(99), DEFAULT_MICROS_PER_BEAT);
        assert_eq!(map.tempo_at(100), 600_000);
        assert_eq!(map.tempo_at(199), 600_000);
        assert_eq!(map.tempo_at(200), 300_000);
        assert_eq!(map.tempo_at(10_000), 300_000);
    }

    #[test]
    fn zero_tempo_changes_are_dropped() {
        let track = Track::new(vec![tempo(0, 0), tempo(480, 0)]);
        let map = TempoMap::build(&track);
        assert_eq!(map.entries().len(), 1);
        assert_eq!(map.tempo_at(480), DEFAULT_MICROS_PER_BEAT);
    }
}
