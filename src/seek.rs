//! Seek by resynthesis.
//!
//! Jumping into the middle of a delta-timed stream cannot be done by
//! racing through the skipped prefix; instead a standalone stream is
//! derived that starts at the requested time, carries the tempo that was
//! in force there, and plays through a backend that only knows how to
//! start from the top.

use tracing::debug;

use crate::error::EngineError;
use crate::timeline::{Event, EventKind, Tick, Timeline, Track};
use crate::timing::{self, DEFAULT_MICROS_PER_BEAT, TempoMap};

/// Derives the substream that starts `start_seconds` into the timeline.
///
/// Events before the start are dropped; tempo changes among them are
/// folded into the tempo the substream opens with. The earliest retained
/// event across all tracks plays at delta 0, later events keep their
/// spacing, and every non-empty track ends with an end-of-track marker.
/// `Ok(None)` means the start lies past the last event and there is
/// nothing left to play.
pub fn substream_from(
    timeline: &Timeline,
    map: &TempoMap,
    start_seconds: f64,
) -> Result<Option<Timeline>, EngineError> {
    let start_tick = timing::seconds_to_ticks(map, timeline.ticks_per_beat, start_seconds)?;
    let active_tempo = map.tempo_at(start_tick);

    let retained: Vec<Vec<(Tick, &Event)>> = timeline
        .tracks
        .iter()
        .map(|track| {
            track
                .iter_absolute()
                .filter(|(tick, _)| *tick >= start_tick)
                .collect()
        })
        .collect();

    // All tracks share one anchor so they stay aligned with each other.
    let anchor = retained
        .iter()
        .filter_map(|events| events.first().map(|(tick, _)| *tick))
        .min();
    let Some(anchor) = anchor else {
        debug!("seek to {:.3}s lies past the last event", start_seconds);
        return Ok(None);
    };

    let mut tracks = Vec::with_capacity(retained.len());
    for (index, events) in retained.iter().enumerate() {
        let mut out = Vec::with_capacity(events.len() + 2);
        if index == 0 && active_tempo != DEFAULT_MICROS_PER_BEAT {
            out.push(Event::new(
                0,
                EventKind::TempoChange {
                    micros_per_beat: active_tempo,
                },
            ));
        }
        let mut prev = anchor;
        for (tick, event) in events {
            out.push(Event::new(tick - prev, event.kind.clone()));
            prev = *tick;
        }
        if out.last().is_some_and(|e| e.kind != EventKind::EndOfTrack) {
            out.push(Event::new(0, EventKind::EndOfTrack));
        }
        tracks.push(Track::new(out));
    }

    debug!(
        "substream from {:.3}s: start tick {}, anchor {}, {} µs/beat",
        start_seconds, start_tick, anchor, active_tempo
    );
    Ok(Some(Timeline {
        ticks_per_beat: timeline.ticks_per_beat,
        tracks,
    }))
}
