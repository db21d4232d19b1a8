use thiserror::Error;

/// Why a manifest block was dropped.
///
/// Parsing never fails as a whole; each of these describes one block that
/// contributed nothing to the resulting track.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("line {line}: expected a timing line, found `{found}`")]
    MissingTiming { line: usize, found: String },

    #[error("line {line}: invalid timestamp `{value}`")]
    InvalidTimestamp { line: usize, value: String },

    #[error("line {line}: cue has no reference line")]
    MissingReference { line: usize },

    #[error("line {line}: cue ends at {end}s before it starts at {start}s")]
    InvertedRange { line: usize, start: f64, end: f64 },

    #[error("line {line}: cue starting at {start}s overlaps or precedes the previous cue ending at {previous_end}s")]
    OutOfOrder {
        line: usize,
        start: f64,
        previous_end: f64,
    },
}

impl ParseError {
    pub fn missing_timing(line: usize, found: impl Into<String>) -> Self {
        Self::MissingTiming {
            line,
            found: found.into(),
        }
    }

    pub fn invalid_timestamp(line: usize, value: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            line,
            value: value.into(),
        }
    }

    /// 1-based line number of the offending block's first line.
    pub fn line(&self) -> usize {
        match self {
            Self::MissingTiming { line, .. }
            | Self::InvalidTimestamp { line, .. }
            | Self::MissingReference { line }
            | Self::InvertedRange { line, .. }
            | Self::OutOfOrder { line, .. } => *line,
        }
    }
}
