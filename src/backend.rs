//! Seam to the collaborator that turns event streams into sound.

use crate::timeline::Timeline;

/// What the transport needs from a playback collaborator. The collaborator
/// only ever plays a finished stream from its own first event; pause and
/// seek are expressed by stopping it and handing it a different stream.
pub trait PlaybackBackend: Send {
    /// Take ownership of a stream and start playing it from the top.
    fn play_from_start(&mut self, stream: Timeline) -> Result<(), String>;

    /// Stop playing and drop the current stream.
    fn stop(&mut self);

    /// Release every note still sounding, keeping the stream.
    fn all_notes_off(&mut self);
}

/// Backend that renders nothing. Useful headless and in tests.
#[derive(Debug, Default)]
pub struct NullBackend;

impl PlaybackBackend for NullBackend {
    fn play_from_start(&mut self, _stream: Timeline) -> Result<(), String> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn all_notes_off(&mut self) {}
}
