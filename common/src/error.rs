use crate::session::SessionState;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("pixel ({x}, {y}) is outside the {width}x{height} canvas")]
    OutOfBounds {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    },

    #[error("malformed message: {len} bytes is neither a snapshot nor a delta")]
    MalformedMessage { len: usize },

    #[error("snapshots are only sent by the hub")]
    UnexpectedSnapshot,

    #[error("pointer is outside the rendered canvas")]
    OffCanvas,

    #[error("operation not allowed while the session is {state:?}")]
    InvalidState { state: SessionState },

    #[error("connection is gone or not keeping up")]
    Disconnected,

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error(transparent)]
    Transport(#[from] io::Error),
}

impl Error {
    /// Whether the connection that produced this error has to be torn down.
    ///
    /// Everything else is scoped to a single message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::FrameTooLarge { .. } | Self::Transport(..)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
