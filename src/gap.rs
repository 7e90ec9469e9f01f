//! Minimum-gap reconstruction for repeated notes.
//!
//! When the same (channel, pitch) is struck again almost immediately, many
//! renderers blur the two notes into one. This pass pulls the earlier
//! note's release forward so a real gap separates the strikes. Only note
//! timing moves; every event survives with its payload untouched, so the
//! pass can run on every load without accumulating changes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::timeline::{Event, EventKind, Tick, Timeline, Track};
use crate::timing::TempoMap;

/// No note may be shortened below this many ticks.
const MIN_NOTE_TICKS: Tick = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapSettings {
    /// Minimum silence between a note's release and the next strike of the
    /// same (channel, pitch), in milliseconds. Converted to ticks once,
    /// under the tempo in force at time zero.
    pub minimum_gap_ms: u32,
}

impl Default for GapSettings {
    fn default() -> Self {
        Self { minimum_gap_ms: 10 }
    }
}

/// What a reconstruction pass did. Advisory only; the adjusted timeline is
/// playable regardless of these counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GapReport {
    /// NoteOn events that found a matching release.
    pub notes_paired: usize,
    /// Releases pulled forward to open a gap.
    pub adjusted: usize,
    /// Pairs left alone because shortening would have crossed the duration
    /// floor.
    pub too_short_to_adjust: usize,
    /// NoteOn events with no release anywhere in their track.
    pub unmatched: usize,
}

/// Rewrites delta times so consecutive strikes of one (channel, pitch) are
/// separated by at least the configured gap. Running the pass on its own
/// output changes nothing.
pub fn enforce_min_gaps(
    timeline: &Timeline,
    settings: GapSettings,
) -> Result<(Timeline, GapReport), EngineError> {
    if timeline.ticks_per_beat == 0 {
        return Err(EngineError::InvalidArgument {
            what: "ticks_per_beat must be positive",
        });
    }
    let reference_tempo = TempoMap::from_timeline(timeline).tempo_at(0);
    let gap_ticks = u64::from(settings.minimum_gap_ms)
        .saturating_mul(1_000)
        .saturating_mul(u64::from(timeline.ticks_per_beat))
        / u64::from(reference_tempo);
    let floor = (gap_ticks / 4).max(MIN_NOTE_TICKS);

    let mut report = GapReport::default();
    let tracks = timeline
        .tracks
        .iter()
        .map(|track| respace_track(track, gap_ticks, floor, &mut report))
        .collect();

    if report.unmatched > 0 {
        warn!(
            "{} note-on(s) without a release treated as zero-length notes",
            report.unmatched
        );
    }
    debug!(
        "minimum gap pass: {} adjusted, {} too short to adjust, gap {} ticks, floor {}",
        report.adjusted, report.too_short_to_adjust, gap_ticks, floor
    );

    Ok((
        Timeline {
            ticks_per_beat: timeline.ticks_per_beat,
            tracks,
        },
        report,
    ))
}

struct NotePair {
    key: (u8, u8),
    /// Index of the NoteOn in the placed event list.
    on: usize,
    /// Index of the release, if one was found.
    off: Option<usize>,
    start: Tick,
    end: Tick,
}

fn respace_track(track: &Track, gap_ticks: u64, floor: Tick, report: &mut GapReport) -> Track {
    // Work on absolute positions; deltas come back at the end.
    let mut placed: Vec<(Tick, EventKind)> = Vec::with_capacity(track.events.len());
    let mut at: Tick = 0;
    for event in &track.events {
        at += event.delta_ticks;
        placed.push((at, event.kind.clone()));
    }

    // Pair strikes with releases. A NoteOn with velocity 0 releases like a
    // NoteOff. Releases close the most recent open strike of their key, so
    // overlapping strikes of one pitch pair innermost-first.
    let mut open: HashMap<(u8, u8), Vec<usize>> = HashMap::new();
    let mut pairs: Vec<NotePair> = Vec::new();
    for (i, (tick, kind)) in placed.iter().enumerate() {
        let (key, is_release) = match kind {
            EventKind::NoteOn {
                channel,
                pitch,
                velocity,
            } => ((*channel, *pitch), *velocity == 0),
            EventKind::NoteOff { channel, pitch, .. } => ((*channel, *pitch), true),
            _ => continue,
        };
        if is_release {
            if let Some(on) = open.get_mut(&key).and_then(Vec::pop) {
                pairs.push(NotePair {
                    key,
                    on,
                    off: Some(i),
                    start: placed[on].0,
                    end: *tick,
                });
            }
        } else {
            open.entry(key).or_default().push(i);
        }
    }
    report.notes_paired += pairs.len();

    // Strikes that never release become zero-length notes at their own
    // position, so later strikes of the key still get their gap.
    for (key, stack) in open {
        for on in stack {
            report.unmatched += 1;
            pairs.push(NotePair {
                key,
                on,
                off: None,
                start: placed[on].0,
                end: placed[on].0,
            });
        }
    }

    // Left to right within each key, pull releases forward until every
    // consecutive (prev, cur) of the same key has the full gap, unless that
    // would leave prev shorter than the floor.
    pairs.sort_by_key(|p| (p.key, p.start, p.on));
    for i in 1..pairs.len() {
        if pairs[i].key != pairs[i - 1].key {
            continue;
        }
        let cur_start = i128::from(pairs[i].start);
        let prev = &mut pairs[i - 1];
        if cur_start - i128::from(prev.end) >= i128::from(gap_ticks) {
            continue;
        }
        let Some(off) = prev.off else {
            report.too_short_to_adjust += 1;
            continue;
        };
        let candidate = cur_start - i128::from(gap_ticks);
        if candidate - i128::from(prev.start) >= i128::from(floor) {
            let new_end = candidate as Tick;
            placed[off].0 = new_end;
            prev.end = new_end;
            report.adjusted += 1;
        } else {
            report.too_short_to_adjust += 1;
        }
    }

    // Releases may have moved past other events; re-sort by position,
    // keeping the original stream order for simultaneous events, then turn
    // positions back into deltas.
    let mut order: Vec<usize> = (0..placed.len()).collect();
    order.sort_by_key(|&i| placed[i].0);
    let mut events = Vec::with_capacity(placed.len());
    let mut prev_tick: Tick = 0;
    for i in order {
        let (tick, ref kind) = placed[i];
        events.push(Event::new(tick - prev_tick, kind.clone()));
        prev_tick = tick;
    }
    Track::new(events)
}
