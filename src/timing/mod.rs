mod convert;
mod tempo_map;

pub use convert::{micros_to_ticks, seconds_to_ticks, ticks_to_micros, ticks_to_seconds};
pub use tempo_map::{DEFAULT_MICROS_PER_BEAT, TempoEntry, TempoMap};
