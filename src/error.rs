use thiserror::Error;

use crate::clock::TransportState;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The caller passed a value outside the operation's contract, such as
    /// a negative time or a zero resolution. Never clamped silently.
    #[error("invalid argument: {what}")]
    InvalidArgument { what: &'static str },

    /// A transport operation was requested in a state that does not allow
    /// it, for example resuming while stopped.
    #[error("cannot {op} while transport is {state:?}")]
    InvalidState {
        op: &'static str,
        state: TransportState,
    },

    /// Playback was requested before any timeline was loaded.
    #[error("no timeline is loaded")]
    NothingLoaded,

    /// The playback backend failed to act on a stream it was handed.
    #[error("playback backend error: {message}")]
    Backend { message: String },
}
