//! Boundary error values.

use std::fmt;

/// Errors surfaced at the tokenizer/parser boundary.
///
/// `EndOfStream` is the ordinary termination marker: the tokenizer reports
/// it through its terminal `Error` token and the parse loop treats it as
/// completion. Every other variant is a genuine failure.
#[derive(Debug)]
pub enum Error {
    /// The byte reader reached the end of its stream.
    EndOfStream,
    /// A single token grew past the configured buffer cap.
    BufferExceeded,
    /// The byte reader kept reporting interrupted reads without ever
    /// producing a byte.
    NoProgress,
    /// A fragment context node whose atom disagrees with its tag name.
    InconsistentNode,
    /// The byte reader failed.
    Io(std::io::Error),
}

impl Error {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EndOfStream => f.write_str("end of stream"),
            Error::BufferExceeded => f.write_str("max buffer exceeded"),
            Error::NoProgress => {
                f.write_str("multiple interrupted reads with no progress")
            }
            Error::InconsistentNode => {
                f.write_str("inconsistent node: atom does not match tag name")
            }
            Error::Io(e) => write!(f, "read error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
