//! Manifest parser.
//!
//! Grammar: an optional `WEBVTT` header line (plus any metadata lines before
//! the first blank or timing line), then blocks separated by blank
//! lines. Each block is a timing line `H:MM:SS.mmm --> H:MM:SS.mmm` followed by
//! one reference line. Anything after the reference line inside the same block
//! is ignored.
//!
//! A malformed block is dropped up to the next blank line and parsing carries
//! on, so a damaged manifest degrades the track instead of failing it.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};
use url::Url;

use crate::cue::{Cue, CueTrack};
use crate::error::ParseError;
use crate::timestamp::parse_timestamp;

static TIMING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+:\d{2}:\d{2}[.,]\d{3})\s*-->\s*(\d+:\d{2}:\d{2}[.,]\d{3})(?:\s|$)").unwrap()
});

static ABSOLUTE_URI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z][a-z0-9+.\-]*://").unwrap());

const HEADER: &str = "WEBVTT";

/// A block that was dropped while parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBlock {
    pub error: ParseError,
}

/// Parse result with diagnostics for every dropped block.
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub track: CueTrack,
    pub skipped: Vec<SkippedBlock>,
}

/// Parse a manifest into a cue track, resolving references against `base_ref`.
pub fn parse(raw: &str, base_ref: &str) -> CueTrack {
    parse_with_report(raw, base_ref).track
}

/// Like [`parse`], but also reports why each dropped block was dropped.
pub fn parse_with_report(raw: &str, base_ref: &str) -> ParseReport {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let lines: Vec<&str> = raw.lines().collect();
    let base = BaseRef::new(base_ref);

    let mut cues: Vec<Cue> = Vec::new();
    let mut skipped = Vec::new();
    let mut i = 0;

    skip_blank(&lines, &mut i);
    if i < lines.len() && lines[i].starts_with(HEADER) {
        i += 1;
        // Header metadata runs until a blank line or the first timing line.
        while i < lines.len()
            && !lines[i].trim().is_empty()
            && !TIMING_REGEX.is_match(lines[i].trim())
        {
            i += 1;
        }
    }

    loop {
        skip_blank(&lines, &mut i);
        if i >= lines.len() {
            break;
        }
        let block_line = i + 1;

        if is_comment_block(lines[i]) {
            skip_block(&lines, &mut i);
            continue;
        }

        match parse_block(&lines, &mut i, &base) {
            Ok(cue) => {
                if let Some(prev) = cues.last()
                    && cue.start < prev.end
                {
                    record(
                        &mut skipped,
                        ParseError::OutOfOrder {
                            line: block_line,
                            start: cue.start,
                            previous_end: prev.end,
                        },
                    );
                } else {
                    trace!(start = cue.start, end = cue.end, image = %cue.image, "Parsed cue");
                    cues.push(cue);
                }
            }
            Err(error) => record(&mut skipped, error),
        }
        skip_block(&lines, &mut i);
    }

    ParseReport {
        track: CueTrack::from_validated(cues),
        skipped,
    }
}

fn record(skipped: &mut Vec<SkippedBlock>, error: ParseError) {
    debug!(line = error.line(), %error, "Dropping cue block");
    skipped.push(SkippedBlock { error });
}

/// Parse the block starting at `lines[*i]`, advancing `i` past the lines consumed.
fn parse_block(lines: &[&str], i: &mut usize, base: &BaseRef) -> Result<Cue, ParseError> {
    let line_no = *i + 1;
    let timing = lines[*i].trim();
    *i += 1;

    let caps = TIMING_REGEX
        .captures(timing)
        .ok_or_else(|| ParseError::missing_timing(line_no, timing))?;
    let start = parse_timestamp(&caps[1])
        .ok_or_else(|| ParseError::invalid_timestamp(line_no, &caps[1]))?;
    let end = parse_timestamp(&caps[2])
        .ok_or_else(|| ParseError::invalid_timestamp(line_no, &caps[2]))?;
    if end <= start {
        return Err(ParseError::InvertedRange {
            line: line_no,
            start,
            end,
        });
    }

    let reference = lines
        .get(*i)
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .ok_or(ParseError::MissingReference { line: line_no })?;
    *i += 1;

    Ok(Cue::new(start, end, base.resolve(reference)))
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn skip_blank(lines: &[&str], i: &mut usize) {
    while *i < lines.len() && is_blank(lines[*i]) {
        *i += 1;
    }
}

fn skip_block(lines: &[&str], i: &mut usize) {
    while *i < lines.len() && !is_blank(lines[*i]) {
        *i += 1;
    }
}

fn is_comment_block(line: &str) -> bool {
    let line = line.trim_end();
    ["NOTE", "STYLE", "REGION"].into_iter().any(|kw| {
        line == kw
            || line
                .strip_prefix(kw)
                .is_some_and(|rest| rest.starts_with([' ', '\t']))
    })
}

/// Resolve one reference line against the manifest location.
///
/// Absolute URIs are kept verbatim; anything else is joined onto the directory
/// that contains `base_ref`.
pub fn resolve_reference(reference: &str, base_ref: &str) -> String {
    BaseRef::new(base_ref).resolve(reference.trim())
}

enum BaseRef<'a> {
    Url(Url),
    Path(&'a str),
}

impl<'a> BaseRef<'a> {
    fn new(base_ref: &'a str) -> Self {
        match Url::parse(base_ref) {
            Ok(url) if !url.cannot_be_a_base() => Self::Url(url),
            _ => Self::Path(base_ref),
        }
    }

    fn resolve(&self, reference: &str) -> String {
        if ABSOLUTE_URI_REGEX.is_match(reference) {
            return reference.to_string();
        }
        match self {
            Self::Url(base) => match base.join(reference) {
                Ok(joined) => joined.to_string(),
                Err(_) => reference.to_string(),
            },
            Self::Path(base) => {
                if reference.starts_with('/') {
                    return reference.to_string();
                }
                match base.rfind('/') {
                    Some(idx) => format!("{}/{}", &base[..idx], reference),
                    None => reference.to_string(),
                }
            }
        }
    }
}
