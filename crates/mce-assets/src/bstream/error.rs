//! Error and state types for the binary codec.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Sticky soft-error bits carried by a reader or writer.
    ///
    /// Bits are raised by failed operations and stay set until
    /// [`BinaryReader::clear`](super::BinaryReader::clear) /
    /// [`BinaryWriter::clear`](super::BinaryWriter::clear) is called.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamState: u8 {
        /// A read or write could not complete fully.
        const EOF = 0b0000_0001;
        /// The data was semantically malformed.
        const INVALID = 0b0000_0010;
    }
}

/// Why a header or table was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    /// The magic number did not match the format's constant.
    BadMagic {
        /// Magic the reader was compiled against.
        expected: u64,
        /// Magic found in the data.
        found: u64,
    },

    /// The version tag did not match the format's constant.
    BadVersion {
        /// Version the reader was compiled against.
        expected: String,
        /// Version found in the data.
        found: String,
    },

    /// The data ended inside a header or table.
    Truncated,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::BadMagic { expected, found } => {
                write!(f, "bad magic number: expected {:#018x}, found {:#018x}", expected, found)
            }
            MalformedReason::BadVersion { expected, found } => {
                write!(f, "unsupported version: expected {}, found {}", expected, found)
            }
            MalformedReason::Truncated => write!(f, "truncated data"),
        }
    }
}

/// Coarse classification of a [`StreamError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// End of data / short write.
    Eof,
    /// Semantically malformed value.
    Invalid,
    /// Rejected header or table.
    Malformed,
    /// Underlying I/O failure.
    Io,
}

/// Errors produced by the binary codec.
#[derive(Debug)]
pub enum StreamError {
    /// A read or write could not complete fully.
    Eof,

    /// A value could not be represented (narrowing overflow, bad UTF-8,
    /// container larger than the configured limit).
    Invalid {
        /// Description of the problem.
        reason: String,
    },

    /// A header or table failed format validation.
    Malformed(MalformedReason),

    /// The underlying source or sink failed.
    Io(std::io::Error),
}

impl StreamError {
    /// Create an [`StreamError::Invalid`] with a reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        StreamError::Invalid {
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> StreamErrorKind {
        match self {
            StreamError::Eof => StreamErrorKind::Eof,
            StreamError::Invalid { .. } => StreamErrorKind::Invalid,
            StreamError::Malformed(_) => StreamErrorKind::Malformed,
            StreamError::Io(_) => StreamErrorKind::Io,
        }
    }

    /// The soft-error bits this error raises on the stream.
    pub fn state_bits(&self) -> StreamState {
        match self {
            StreamError::Eof => StreamState::EOF,
            StreamError::Invalid { .. } => StreamState::INVALID,
            StreamError::Malformed(MalformedReason::Truncated) => StreamState::EOF | StreamState::INVALID,
            StreamError::Malformed(_) => StreamState::INVALID,
            StreamError::Io(_) => StreamState::EOF,
        }
    }

    /// Returns the malformation reason, if any.
    pub fn malformed_reason(&self) -> Option<&MalformedReason> {
        match self {
            StreamError::Malformed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Eof => write!(f, "unexpected end of data"),
            StreamError::Invalid { reason } => write!(f, "invalid data: {}", reason),
            StreamError::Malformed(reason) => write!(f, "malformed data: {}", reason),
            StreamError::Io(err) => write!(f, "stream I/O error: {}", err),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::WriteZero => StreamError::Eof,
            _ => StreamError::Io(err),
        }
    }
}

impl From<MalformedReason> for StreamError {
    fn from(reason: MalformedReason) -> Self {
        StreamError::Malformed(reason)
    }
}

/// Result type alias for codec operations.
pub type StreamResult<T> = Result<T, StreamError>;
