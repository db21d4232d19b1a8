use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api::models::{ComposeMode, ImprovedPrompt, Job, JobPage, JobSpec};
use crate::error::ClientError;

/// Text body plus the URL it was finally served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedText {
    /// Absolute URL after resolution and redirects; relative references in
    /// the body are resolved against it.
    pub url: String,
    pub body: String,
}

/// The backend contracts the client orchestration depends on.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Submit a generation job and return its id.
    async fn submit_job(&self, spec: &JobSpec) -> Result<String, ClientError>;

    /// Current status of a job.
    async fn job_status(&self, job_id: &str) -> Result<Job, ClientError>;

    /// One page of finished and in-flight jobs, newest first.
    async fn list_jobs(&self, page: u32, per_page: u32) -> Result<JobPage, ClientError>;

    /// Retrieve a text document such as a cue-track manifest.
    ///
    /// Resolves with [`ClientError::Cancelled`] as soon as `token` fires.
    async fn fetch_text(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<FetchedText, ClientError>;
}

/// Prompt helper endpoints.
#[async_trait]
pub trait PromptService: Send + Sync {
    async fn improve_prompt(&self, prompt: &str) -> Result<ImprovedPrompt, ClientError>;

    async fn compose_prompt(
        &self,
        base_improved: &str,
        variant: &str,
        mode: ComposeMode,
    ) -> Result<String, ClientError>;
}
