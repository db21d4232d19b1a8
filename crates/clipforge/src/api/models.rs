// Wire types for the generation backend.
//
// Field names follow the backend's JSON; Rust names describe what the field is.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    #[serde(alias = "running")]
    Processing,
    Done,
    Error,
}

impl JobStatus {
    /// `done` and `error` end a job; nothing changes afterwards.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job as reported by the status and history endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// The status endpoint may omit this; the client fills it in from the
    /// requested id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    pub status: JobStatus,
    /// Percent complete in `[0, 100]`.
    #[serde(default, deserialize_with = "clamped_progress")]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(
        rename = "mp4_url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub progressive_url: Option<String>,
    #[serde(
        rename = "hls_url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub manifest_url: Option<String>,
    /// Thumbnail cue-track manifest.
    #[serde(
        rename = "thumb_vtt_url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cue_track_url: Option<String>,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
}

impl Job {
    /// A freshly submitted job before its first status report.
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            progress: 0.0,
            prompt: None,
            progressive_url: None,
            manifest_url: None,
            cue_track_url: None,
            error_message: None,
            created_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether there is anything to play.
    pub fn has_media(&self) -> bool {
        self.progressive_url.is_some() || self.manifest_url.is_some()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn clamped_progress<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    })
}

/// What to generate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub prompt: String,
    /// Replaces `prompt` on the backend when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composed_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Ask for a segmented-streaming rendition next to the progressive file.
    #[serde(rename = "hls", default)]
    pub want_segmented: bool,
}

impl JobSpec {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into()).filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_composed_prompt(mut self, composed: impl Into<String>) -> Self {
        self.composed_prompt = Some(composed.into()).filter(|s| !s.trim().is_empty());
        self
    }

    pub fn segmented(mut self, want: bool) -> Self {
        self.want_segmented = want;
        self
    }

    /// The prompt the backend will actually use.
    pub fn effective_prompt(&self) -> &str {
        self.composed_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.prompt)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

/// One page of generation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPage {
    #[serde(default)]
    pub items: Vec<Job>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
}

fn first_page() -> u32 {
    1
}

/// A suggested rewrite of a prompt, in two lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVariant {
    #[serde(default)]
    pub concise: String,
    #[serde(default)]
    pub expanded: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovedPrompt {
    pub auto_improved: String,
    #[serde(default)]
    pub variants: Vec<PromptVariant>,
}

/// How a chosen variant is combined with the improved base prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeMode {
    #[default]
    AutoRefine,
    Merge,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImproveRequest<'a> {
    pub prompt: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ComposeRequest<'a> {
    pub base_improved: &'a str,
    pub variant: &'a str,
    pub mode: ComposeMode,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ComposeResponse {
    pub composed: String,
}

/// Body of a non-success response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
}
