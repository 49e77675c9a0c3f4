//! Crate-wide error type.
//!
//! Recoverable failures (I/O, malformed input files) travel through
//! [`Error`]; violated invariants are programming errors and panic.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while reading or writing
/// cascades, label files, and score buffers.
#[derive(Debug)]
pub enum Error {
    /// An underlying I/O failure. Fatal for score-buffer paging.
    Io(io::Error),
    /// A cascade file that could not be parsed.
    /// No partial cascade is usable, so this aborts the load.
    MalformedCascade {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    /// A label file whose header or per-image framing is broken.
    /// (A single broken image record is skipped instead; see `labels`.)
    MalformedLabelFile {
        path: PathBuf,
        reason: String,
    },
    /// A configuration value outside its valid range.
    InvalidConfig(String),
    /// Calibration found no usable trace windows: no scan window
    /// matched a labeled object, or every match was rejected by the
    /// cascade's existing thresholds.
    NoCalibrationTraces,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::MalformedCascade { path, line, reason } => write!(
                f,
                "malformed cascade file {} (line {line}): {reason}",
                path.display(),
            ),
            Self::MalformedLabelFile { path, reason } => write!(
                f,
                "malformed label file {}: {reason}",
                path.display(),
            ),
            Self::InvalidConfig(reason) => {
                write!(f, "invalid configuration: {reason}")
            },
            Self::NoCalibrationTraces => {
                write!(f, "no calibration traces: no window matched and survived")
            },
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
