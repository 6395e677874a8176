use std::io;

use thiserror::Error;
use vc_reflect::SchemaError;

// -----------------------------------------------------------------------------
// StreamError

/// A failure of the byte stream under a codec call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError {
    #[error("i/o error: {0}")]
    Io(io::Error),
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error("payload of {needed} bytes exceeds the {available} bytes left in the stream")]
    Truncated { needed: u64, available: u64 },
    #[error("the flush callback did not provide a new buffer")]
    FlushRefused,
    #[error("object id {0} exceeds the 30-bit persistent id range")]
    ObjectIdOverflow(u64),
    #[error("{0} elements or bytes do not fit a 32-bit length")]
    LengthOverflow(u64),
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        // `FlushBuffer` reports its own failures through `io::Write`.
        match err.downcast::<StreamError>() {
            Ok(inner) => inner,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Self::UnexpectedEof,
            Err(err) => Self::Io(err),
        }
    }
}

// -----------------------------------------------------------------------------
// SerialError

/// The error returned by every serialization entry point.
///
/// Both kinds are fatal to the call. Recoverable conditions are reported as
/// [`Warning`](vc_reflect::Warning)s in the context instead.
#[derive(Debug, Error)]
pub enum SerialError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl From<io::Error> for SerialError {
    #[inline]
    fn from(err: io::Error) -> Self {
        Self::Stream(err.into())
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::io;

    use super::{SerialError, StreamError};

    #[test]
    fn stream_errors_survive_io_wrapping() {
        let wrapped = io::Error::other(StreamError::FlushRefused);
        assert!(matches!(StreamError::from(wrapped), StreamError::FlushRefused));

        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert!(matches!(
            SerialError::from(eof),
            SerialError::Stream(StreamError::UnexpectedEof)
        ));

        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(StreamError::from(other), StreamError::Io(_)));
    }
}
