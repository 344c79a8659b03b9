//! Failure taxonomy of the sampling engine.
//!
//! None of these ever reach a caller of a snapshot method as an `Err`: the
//! assembler renders them into the record's `error` field and reports
//! sentinel values instead.

use std::path::Path;

use crate::collector::ParseError;

/// Why a metric could not be produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleError {
    /// Counter file, sensor or device absent or unreadable.
    MissingResource(String),
    /// Malformed counter content.
    Parse(String),
    /// No previous sample, or no time elapsed since it.
    StaleSample,
    /// Every candidate reading fell outside the plausible range.
    OutOfRange(String),
    /// The capability probe did not finish before its deadline.
    ProbeTimeout,
    /// The capability probe finished and reported a failure.
    ProbeFailure(String),
}

impl SampleError {
    /// Missing resource error carrying the path and the underlying reason.
    pub fn missing(path: &Path, reason: impl std::fmt::Display) -> Self {
        SampleError::MissingResource(format!("{}: {}", path.display(), reason))
    }
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::MissingResource(what) => write!(f, "missing resource: {}", what),
            SampleError::Parse(msg) => write!(f, "parse error: {}", msg),
            SampleError::StaleSample => write!(f, "no previous sample yet"),
            SampleError::OutOfRange(what) => write!(f, "out of range: {}", what),
            SampleError::ProbeTimeout => write!(f, "timeout"),
            SampleError::ProbeFailure(reason) => write!(f, "probe failed: {}", reason),
        }
    }
}

impl std::error::Error for SampleError {}

impl From<ParseError> for SampleError {
    fn from(e: ParseError) -> Self {
        SampleError::Parse(e.message)
    }
}

/// Joins error messages into one `error` field value.
pub(crate) fn join_errors(errors: &[SampleError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = SampleError::missing(Path::new("/proc/stat"), "file not found");
        assert_eq!(err.to_string(), "missing resource: /proc/stat: file not found");
        assert_eq!(SampleError::ProbeTimeout.to_string(), "timeout");
        assert_eq!(
            SampleError::from(ParseError::new("bad line")),
            SampleError::Parse("bad line".to_string())
        );
    }

    #[test]
    fn test_join_errors() {
        assert_eq!(join_errors(&[]), "");
        assert_eq!(
            join_errors(&[SampleError::StaleSample, SampleError::Parse("x".into())]),
            "no previous sample yet; parse error: x"
        );
    }
}
