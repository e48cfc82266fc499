use std::io;

use thiserror::Error;

use crate::boxes::FourCC;

/// Failures while parsing or rewriting an MP4.
#[derive(Debug, Error)]
pub enum Error {
    /// Passthrough for I/O errors on the source or the emit sink.
    #[error("io: {0}")]
    Io(io::Error),

    /// The source ended in the middle of a box header or payload.
    #[error("unexpected end of input")]
    EndOfInput,

    /// The box tree or a sample table violates ISO-BMFF invariants.
    #[error("malformed mp4: {0}")]
    Malformed(&'static str),

    /// The requested start time is at or past the end of the movie.
    #[error("start time past end of movie")]
    StartOutOfRange,

    /// The sample tables needed for the rewrite were not all present in the
    /// parsed prefix. Retry with a longer prefix.
    #[error("sample tables incomplete; re-parse with a longer prefix")]
    IncorrectParse,

    /// Box type recognized but not handled (compressed movie headers).
    #[error("unsupported box: {0}")]
    Unsupported(FourCC),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::EndOfInput
        } else {
            Error::Io(e)
        }
    }
}

impl Error {
    /// The one failure worth retrying: widen the buffered metadata prefix
    /// and parse again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::IncorrectParse)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
