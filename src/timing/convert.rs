//! Tick / wall-time conversion across tempo segments.
//!
//! Positions accumulate in an integer "scaled" space of ticks multiplied by
//! microseconds per beat, and the resolution divides out only at the edge.
//! Both directions walk the same integer sums, so converting a tick to
//! seconds and back lands on the same tick give or take one.

use crate::error::EngineError;
use crate::timeline::Tick;

use super::tempo_map::TempoMap;

fn check_resolution(ticks_per_beat: u16) -> Result<(), EngineError> {
    if ticks_per_beat == 0 {
        return Err(EngineError::InvalidArgument {
            what: "ticks_per_beat must be positive",
        });
    }
    Ok(())
}

/// Scaled position of `tick`: the sum over every tempo segment below it of
/// segment ticks times the segment's microseconds per beat.
fn tick_to_scaled(map: &TempoMap, tick: Tick) -> u128 {
    let mut scaled: u128 = 0;
    for (start, end, micros_per_beat) in map.segments() {
        if start >= tick {
            break;
        }
        let stop = end.map_or(tick, |e| e.min(tick));
        scaled += u128::from(stop - start) * u128::from(micros_per_beat);
    }
    scaled
}

/// Inverse of [`tick_to_scaled`], flooring within the containing segment.
fn scaled_to_tick(map: &TempoMap, target: u128) -> Tick {
    let mut acc: u128 = 0;
    let mut seg_start: Tick = 0;
    let mut seg_micros: u32 = super::tempo_map::DEFAULT_MICROS_PER_BEAT;
    for (start, end, micros_per_beat) in map.segments() {
        seg_start = start;
        seg_micros = micros_per_beat;
        if let Some(end) = end {
            let span = u128::from(end - start) * u128::from(micros_per_beat);
            if acc + span > target {
                break;
            }
            acc += span;
        }
    }
    let within = (target - acc) / u128::from(seg_micros);
    seg_start.saturating_add(Tick::try_from(within).unwrap_or(Tick::MAX))
}

/// Absolute tick position to elapsed microseconds from tick 0.
pub fn ticks_to_micros(
    map: &TempoMap,
    ticks_per_beat: u16,
    tick: Tick,
) -> Result<u64, EngineError> {
    check_resolution(ticks_per_beat)?;
    let micros = tick_to_scaled(map, tick) / u128::from(ticks_per_beat);
    Ok(u64::try_from(micros).unwrap_or(u64::MAX))
}

/// Elapsed microseconds from tick 0 to the tick playing at that time.
pub fn micros_to_ticks(
    map: &TempoMap,
    ticks_per_beat: u16,
    micros: u64,
) -> Result<Tick, EngineError> {
    check_resolution(ticks_per_beat)?;
    let target = u128::from(micros) * u128::from(ticks_per_beat);
    Ok(scaled_to_tick(map, target))
}

/// Absolute tick position to elapsed seconds from tick 0. Tick 0 is always
/// exactly 0.0 seconds.
pub fn ticks_to_seconds(
    map: &TempoMap,
    ticks_per_beat: u16,
    tick: Tick,
) -> Result<f64, EngineError> {
    check_resolution(ticks_per_beat)?;
    let scaled = tick_to_scaled(map, tick) as f64;
    Ok(scaled / (f64::from(ticks_per_beat) * 1_000_000.0))
}

/// Elapsed seconds from tick 0 to the tick playing at that time. Negative
/// or non-finite times are refused, never clamped.
pub fn seconds_to_ticks(
    map: &TempoMap,
    ticks_per_beat: u16,
    seconds: f64,
) -> Result<Tick, EngineError> {
    check_resolution(ticks_per_beat)?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(EngineError::InvalidArgument {
            what: "seconds must be finite and non-negative",
        });
    }
    let target = (seconds * f64::from(ticks_per_beat) * 1_000_000.0).round();
    Ok(scaled_to_tick(map, target as u128))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Event, EventKind, Track};

    fn map_of(changes: &[(Tick, u32)]) -> TempoMap {
        let mut events = Vec::new();
        let mut prev = 0;
        for &(tick, micros_per_beat) in changes {
            events.push(Event::new(tick - prev, EventKind::TempoChange { micros_per_beat }));
            prev = tick;
        }
        TempoMap::build(&Track::new(events))
    }

    #[test]
    fn tick_zero_is_time_zero_and_back() {
        let map = map_of(&[(0, 273_519), (977, 1_204_033)]);
        assert_eq!(ticks_to_seconds(&map, 480, 0).unwrap(), 0.0);
        assert_eq!(seconds_to_ticks(&map, 480, 0.0).unwrap(), 0);
    }

    #[test]
    fn single_tempo_known_values() {
        let map = TempoMap::default();
        // 480 ticks at 500000 µs/beat and 480 ticks/beat is one beat: 0.5 s.
        assert!((ticks_to_seconds(&map, 480, 480).unwrap() - 0.5).abs() < 1e-12);
        assert!((ticks_to_seconds(&map, 480, 960).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(seconds_to_ticks(&map, 480, 0.5).unwrap(), 480);
        assert_eq!(seconds_to_ticks(&map, 480, 10.0).unwrap(), 9600);
        assert_eq!(ticks_to_micros(&map, 480, 480).unwrap(), 500_000);
        assert_eq!(micros_to_ticks(&map, 480, 500_000).unwrap(), 480);
    }

    #[test]
    fn conversion_crosses_tempo_changes() {
        // 500000 µs/beat until tick 480, then twice as fast.
        let map = map_of(&[(480, 250_000)]);
        let secs = ticks_to_seconds(&map, 480, 960).unwrap();
        assert!((secs - 0.75).abs() < 1e-12);
        assert_eq!(seconds_to_ticks(&map, 480, 0.75).unwrap(), 960);
        // Partway into the first segment.
        assert_eq!(seconds_to_ticks(&map, 480, 0.3).unwrap(), 288);
    }

    #[test]
    fn boundary_tick_belongs_to_the_new_segment() {
        let map = map_of(&[(480, 250_000)]);
        // Exactly 0.5 s is the segment boundary at tick 480.
        assert_eq!(seconds_to_ticks(&map, 480, 0.5).unwrap(), 480);
    }

    #[test]
    fn negative_and_non_finite_seconds_are_refused() {
        let map = TempoMap::default();
        assert!(matches!(
            seconds_to_ticks(&map, 480, -0.001),
            Err(EngineError::InvalidArgument { .. })
        ));
        assert!(matches!(
            seconds_to_ticks(&map, 480, f64::NAN),
            Err(EngineError::InvalidArgument { .. })
        ));
        assert!(matches!(
            seconds_to_ticks(&map, 480, f64::INFINITY),
            Err(EngineError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn zero_resolution_is_refused() {
        let map = TempoMap::default();
        assert!(matches!(
            ticks_to_seconds(&map, 0, 10),
            Err(EngineError::InvalidArgument { .. })
        ));
        assert!(matches!(
            seconds_to_ticks(&map, 0, 1.0),
            Err(EngineError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn forward_conversion_is_monotonic() {
        let map = map_of(&[(0, 377_911), (481, 122_503), (997, 903_107), (2_461, 45_019)]);
        let mut prev = 0.0;
        for tick in (0..6000).step_by(13) {
            let secs = ticks_to_seconds(&map, 384, tick).unwrap();
            assert!(secs >= prev, "time went backwards at tick {tick}");
            prev = secs;
        }
    }

    #[test]
    fn round_trip_lands_within_one_tick() {
        let maps = [
            TempoMap::default(),
            map_of(&[(0, 377_911), (481, 122_503), (997, 903_107), (2_461, 45_019)]),
            map_of(&[(1, 1_000_003), (7, 999_983), (5_000, 60_000_000)]),
        ];
        for map in &maps {
            for ticks_per_beat in [96u16, 384, 480, 960] {
                for tick in (0..7000).step_by(7) {
                    let secs = ticks_to_seconds(map, ticks_per_beat, tick).unwrap();
                    let back = seconds_to_ticks(map, ticks_per_beat, secs).unwrap();
                    let drift = back.abs_diff(tick);
                    assert!(
                        drift <= 1,
                        "tick {tick} came back as {back} (tpb {ticks_per_beat})"
                    );
                }
            }
        }
    }

    #[test]
    fn repeated_round_trips_do_not_drift() {
        let map = map_of(&[(480, 250_000), (960, 750_000)]);
        let mut tick = 12_345;
        let first = ticks_to_seconds(&map, 480, tick).unwrap();
        for _ in 0..1000 {
            let secs = ticks_to_seconds(&map, 480, tick).unwrap();
            tick = seconds_to_ticks(&map, 480, secs).unwrap();
        }
        let last = ticks_to_seconds(&map, 480, tick).unwrap();
        assert!((last - first).abs() <= 1e-3);
        assert!(tick.abs_diff(12_345) <= 1);
    }
}
