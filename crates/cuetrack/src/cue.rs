use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::timestamp::format_timestamp;

/// A half-open interval `[start, end)` in seconds bound to a preview image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    /// Resolved image reference (absolute URL or path).
    pub image: Arc<str>,
}

impl Cue {
    pub fn new(start: f64, end: f64, image: impl Into<Arc<str>>) -> Self {
        Self {
            start,
            end,
            image: image.into(),
        }
    }

    #[inline]
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// An ordered, non-overlapping sequence of cues.
///
/// Starts are strictly increasing and every cue ends no later than the next one
/// starts. Gaps between cues are allowed. The track is immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CueTrack {
    cues: Vec<Cue>,
}

impl CueTrack {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a track from cues that must already be sorted and non-overlapping.
    pub fn try_from_cues(cues: Vec<Cue>) -> Result<Self, ParseError> {
        let mut previous_end: Option<f64> = None;
        for (idx, cue) in cues.iter().enumerate() {
            if !(cue.end > cue.start) {
                return Err(ParseError::InvertedRange {
                    line: idx + 1,
                    start: cue.start,
                    end: cue.end,
                });
            }
            if let Some(prev) = previous_end
                && cue.start < prev
            {
                return Err(ParseError::OutOfOrder {
                    line: idx + 1,
                    start: cue.start,
                    previous_end: prev,
                });
            }
            previous_end = Some(cue.end);
        }
        Ok(Self { cues })
    }

    /// Evenly spaced cues of `step` seconds each, named by `name(index)`.
    ///
    /// This is the layout the generation backend produces (one thumbnail per
    /// second, `thumb-0001.jpg` onwards).
    pub fn uniform<F>(count: usize, step: f64, mut name: F) -> Self
    where
        F: FnMut(usize) -> String,
    {
        if !(step.is_finite() && step > 0.0) {
            return Self::empty();
        }
        let cues = (0..count)
            .map(|i| Cue::new(i as f64 * step, (i + 1) as f64 * step, name(i)))
            .collect();
        Self { cues }
    }

    pub(crate) fn from_validated(cues: Vec<Cue>) -> Self {
        Self { cues }
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cue> {
        self.cues.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cue> {
        self.cues.iter()
    }

    /// Image of the first cue, used as a poster thumbnail.
    pub fn poster(&self) -> Option<&Arc<str>> {
        self.cues.first().map(|c| &c.image)
    }

    /// End of the last cue, or zero for an empty track.
    pub fn span(&self) -> f64 {
        self.cues.last().map_or(0.0, |c| c.end)
    }

    /// Find the cue whose `[start, end)` contains `time`.
    ///
    /// Binary search over starts; `None` for times that fall into a gap or
    /// outside the track.
    pub fn find(&self, time: f64) -> Option<&Cue> {
        if !time.is_finite() {
            return None;
        }
        // Index of the first cue starting after `time`.
        let after = self.cues.partition_point(|c| c.start <= time);
        let candidate = self.cues.get(after.checked_sub(1)?)?;
        candidate.contains(time).then_some(candidate)
    }

    /// Render the track in manifest form.
    pub fn to_manifest(&self) -> String {
        let mut out = String::with_capacity(16 + self.cues.len() * 48);
        out.push_str("WEBVTT\n\n");
        for cue in &self.cues {
            let _ = writeln!(
                out,
                "{} --> {}\n{}\n",
                format_timestamp(cue.start),
                format_timestamp(cue.end),
                cue.image
            );
        }
        out
    }
}

impl<'a> IntoIterator for &'a CueTrack {
    type Item = &'a Cue;
    type IntoIter = std::slice::Iter<'a, Cue>;

    fn into_iter(self) -> Self::IntoIter {
        self.cues.iter()
    }
}
