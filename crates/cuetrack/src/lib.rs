//! Thumbnail cue tracks.
//!
//! A cue track maps half-open time ranges `[start, end)` of a video to preview
//! images. This crate parses the text manifest that describes such a track,
//! renders it back, and answers "which thumbnail is under the pointer" for
//! scrub previews.
//!
//! ```text
//! WEBVTT
//!
//! 00:00:00.000 --> 00:00:01.000
//! thumb-0001.jpg
//!
//! 00:00:01.000 --> 00:00:02.000
//! thumb-0002.jpg
//! ```

pub mod cue;
pub mod error;
pub mod parser;
pub mod scrub;
pub mod timestamp;

pub use cue::{Cue, CueTrack};
pub use error::ParseError;
pub use parser::{ParseReport, SkippedBlock, parse, parse_with_report, resolve_reference};
pub use scrub::{BoundingBox, PreviewGeometry, PreviewState, ScrubPreviewEngine};
pub use timestamp::{format_timestamp, parse_timestamp};
