pub mod backend;
pub mod clock;
pub mod engine;
pub mod error;
pub mod gap;
pub mod seek;
pub mod timeline;
pub mod timing;

pub use backend::{NullBackend, PlaybackBackend};
pub use clock::{PlaybackClock, SEEK_EPSILON, TransportState};
pub use engine::{
    PositionReader, TransportCommand, TransportHandle, TransportUpdate, spawn_transport,
};
pub use error::EngineError;
pub use gap::{GapReport, GapSettings, enforce_min_gaps};
pub use seek::substream_from;
pub use timeline::{Event, EventKind, Tick, Timeline, Track};
pub use timing::{
    DEFAULT_MICROS_PER_BEAT, TempoEntry, TempoMap, micros_to_ticks, seconds_to_ticks,
    ticks_to_micros, ticks_to_seconds,
};
