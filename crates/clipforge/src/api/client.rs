// Backend HTTP client: JSON endpoints plus plain-text manifest retrieval.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::api::models::{
    ComposeMode, ComposeRequest, ComposeResponse, ErrorBody, ImproveRequest, ImprovedPrompt, Job,
    JobPage, JobSpec, SubmitResponse,
};
use crate::api::service::{FetchedText, JobService, PromptService};
use crate::config::ClientConfig;
use crate::error::ClientError;

/// [`JobService`] and [`PromptService`] over HTTP.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = config.build_client()?;
        Ok(Self::with_client(http, config))
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            http,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Look up a single job from the history store.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_job(&self, job_id: &str) -> Result<Job, ClientError> {
        let url = self.job_endpoint("/api/videos", job_id)?;
        let mut job: Job = self
            .execute(self.http.get(url.clone()), &url, "get job")
            .await?;
        if job.id.is_empty() {
            job.id = job_id.to_owned();
        }
        Ok(job)
    }

    fn job_endpoint(&self, path: &str, job_id: &str) -> Result<Url, ClientError> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(ClientError::configuration("job id must not be empty"));
        }
        let mut url = self.config.endpoint(path)?;
        let input = url.to_string();
        url.path_segments_mut()
            .map_err(|_| ClientError::invalid_url(input, "URL cannot be a base"))?
            .pop_if_empty()
            .push(job_id);
        Ok(url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
        operation: &'static str,
    ) -> Result<T, ClientError> {
        debug!(url = %url, operation, "Sending request");
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error);
            debug!(url = %url, operation, %status, "Request rejected");
            return Err(ClientError::http_status(
                status,
                url.as_str(),
                operation,
                message,
            ));
        }

        serde_json::from_slice(&body).map_err(|e| ClientError::payload(operation, e.to_string()))
    }
}

#[async_trait]
impl JobService for ApiClient {
    async fn submit_job(&self, spec: &JobSpec) -> Result<String, ClientError> {
        let url = self.config.endpoint("/api/generate")?;
        let response: SubmitResponse = self
            .execute(self.http.post(url.clone()).json(spec), &url, "submit")
            .await?;
        if response.job_id.trim().is_empty() {
            return Err(ClientError::payload("submit", "empty job id"));
        }
        Ok(response.job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<Job, ClientError> {
        let url = self.job_endpoint("/api/status", job_id)?;
        let mut job: Job = self
            .execute(self.http.get(url.clone()), &url, "status")
            .await?;
        if job.id.is_empty() {
            job.id = job_id.to_owned();
        }
        Ok(job)
    }

    async fn list_jobs(&self, page: u32, per_page: u32) -> Result<JobPage, ClientError> {
        let url = self.config.endpoint("/api/videos")?;
        let request = self
            .http
            .get(url.clone())
            .query(&[("page", page.max(1)), ("per_page", per_page.max(1))]);
        self.execute(request, &url, "list").await
    }

    async fn fetch_text(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<FetchedText, ClientError> {
        let url = self.config.resolve_url(url)?;
        let fetch = async {
            let response = self
                .http
                .get(url.clone())
                .timeout(self.config.manifest_timeout)
                .send()
                .await?;
            let status = response.status();
            let final_url = response.url().to_string();
            if !status.is_success() {
                return Err(ClientError::http_status(status, final_url, "fetch", None));
            }
            let body = response.text().await?;
            Ok::<_, ClientError>(FetchedText {
                url: final_url,
                body,
            })
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(url = %url, "Fetch cancelled");
                Err(ClientError::Cancelled)
            }
            result = fetch => result,
        }
    }
}

#[async_trait]
impl PromptService for ApiClient {
    async fn improve_prompt(&self, prompt: &str) -> Result<ImprovedPrompt, ClientError> {
        if prompt.trim().is_empty() {
            return Err(ClientError::configuration("prompt must not be empty"));
        }
        let url = self.config.endpoint("/api/improve")?;
        let request = self.http.post(url.clone()).json(&ImproveRequest { prompt });
        self.execute(request, &url, "improve").await
    }

    async fn compose_prompt(
        &self,
        base_improved: &str,
        variant: &str,
        mode: ComposeMode,
    ) -> Result<String, ClientError> {
        let url = self.config.endpoint("/api/compose")?;
        let request = self.http.post(url.clone()).json(&ComposeRequest {
            base_improved,
            variant,
            mode,
        });
        let response: ComposeResponse = self.execute(request, &url, "compose").await?;
        Ok(response.composed)
    }
}
