use std::fmt;

use crate::codec::CodecError;

/// Broad failure category, used by callers that map errors onto runtime conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Mode,
    State,
    Transport,
    Capacity,
    Unsupported,
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// Open-mode token outside the recognised vocabulary.
    Mode(String),
    /// Operation not valid in the connection's current state.
    State(&'static str),
    /// The connection was destroyed; its descriptor is retired.
    InvalidConnection,
    /// Every descriptor slot is in use.
    AllConnectionsInUse,
    Unsupported(&'static str),
    UnseekableConnection,
    Codec(CodecError),
    Encoding(String),
    Transport(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Mode(_) => ErrorKind::Mode,
            Error::State(_) | Error::InvalidConnection => ErrorKind::State,
            Error::Io(_) | Error::Codec(_) | Error::Transport(_) => ErrorKind::Transport,
            Error::AllConnectionsInUse => ErrorKind::Capacity,
            Error::Unsupported(_) | Error::UnseekableConnection | Error::Encoding(_) => {
                ErrorKind::Unsupported
            }
        }
    }

    pub(crate) fn would_block(&self) -> bool {
        matches!(self, Error::Io(err) if err.kind() == std::io::ErrorKind::WouldBlock)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Mode(mode) => write!(f, "invalid '{mode}' argument"),
            Error::State(msg) => write!(f, "{msg}"),
            Error::InvalidConnection => write!(f, "invalid connection"),
            Error::AllConnectionsInUse => write!(f, "all connections are in use"),
            Error::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Error::UnseekableConnection => write!(f, "'seek' not enabled for this connection"),
            Error::Codec(err) => write!(f, "codec error: {err}"),
            Error::Encoding(name) => write!(f, "unsupported encoding '{name}'"),
            Error::Transport(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<CodecError> for Error {
    fn from(value: CodecError) -> Self {
        Error::Codec(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(Error::Mode("q".into()).kind(), ErrorKind::Mode);
        assert_eq!(Error::InvalidConnection.kind(), ErrorKind::State);
        assert_eq!(Error::AllConnectionsInUse.kind(), ErrorKind::Capacity);
        assert_eq!(Error::UnseekableConnection.kind(), ErrorKind::Unsupported);
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.kind(), ErrorKind::Transport);
    }

    #[test]
    fn would_block_detects_nonblocking_io() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::WouldBlock));
        assert!(err.would_block());
        assert!(!Error::InvalidConnection.would_block());
    }
}
