use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clipforge::playback::{
    AdaptivePlaybackSelector, AttachOutcome, Capability, EngineFactory, EngineOptions,
    PlaybackError, PlaybackSession, PlaybackSources, PlaybackSurface, SEGMENTED_MIME,
    StaticCapability, StreamingEngine,
};
use clipforge::{
    ApiClient, ClientConfig, ComposeMode, CueTrackLoader, Job, JobPoller, JobService, JobSpec,
    JobStatus, PollerConfig, PromptService, poster_thumbnails,
};
use cuetrack::{BoundingBox, CueTrack, PreviewGeometry, ScrubPreviewEngine};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::TrackSource;
use crate::error::{AppError, Result};
use crate::output::OutputManager;

/// Pointer position and surface size for a scrub lookup.
#[derive(Debug, Clone, Copy)]
pub struct ScrubRequest {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub duration: Option<f64>,
}

pub struct CommandExecutor {
    client: Arc<ApiClient>,
    output: OutputManager,
}

impl CommandExecutor {
    pub fn new(config: ClientConfig, output: OutputManager) -> Result<Self> {
        Ok(Self {
            client: Arc::new(ApiClient::new(config)?),
            output,
        })
    }

    fn service(&self) -> Arc<dyn JobService> {
        Arc::clone(&self.client) as Arc<dyn JobService>
    }

    fn config(&self) -> &ClientConfig {
        self.client.config()
    }

    pub async fn generate(
        &self,
        spec: JobSpec,
        detach: bool,
        interval: Option<Duration>,
    ) -> Result<()> {
        let poller = JobPoller::new(self.service(), PollerConfig::from(self.config()));
        let job_id = poller.submit(&spec).await?;

        if detach {
            if self.output.format().is_json() {
                println!("{}", self.output.json(&serde_json::json!({ "job_id": job_id }))?);
            } else {
                println!("{job_id}");
            }
            return Ok(());
        }
        if !self.output.format().is_json() {
            eprintln!("Submitted job {job_id}");
        }
        self.follow(&poller, &job_id, interval).await
    }

    pub async fn watch(&self, job_id: &str, interval: Option<Duration>) -> Result<()> {
        let poller = JobPoller::new(self.service(), PollerConfig::from(self.config()));
        self.follow(&poller, job_id, interval).await
    }

    async fn follow(
        &self,
        poller: &JobPoller,
        job_id: &str,
        interval: Option<Duration>,
    ) -> Result<()> {
        let interval = interval.unwrap_or(poller.config().interval);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = poller.subscribe_every(job_id, interval, move |update| {
            let _ = tx.send(update);
        });

        let progress = self.progress_bar(job_id);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let job = loop {
            tokio::select! {
                update = rx.recv() => {
                    let Some(update) = update else {
                        progress.abandon();
                        return Err(AppError::JobFailed {
                            job_id: job_id.to_owned(),
                            message: "polling stopped before the job finished".into(),
                        });
                    };
                    match update.result {
                        Ok(job) => {
                            progress.set_position(job.progress.round() as u64);
                            progress.set_message(self.output.format_progress(&job));
                            if job.is_terminal() {
                                break job;
                            }
                        }
                        Err(error) => {
                            progress.abandon();
                            return Err(error.into());
                        }
                    }
                }
                _ = &mut ctrl_c => {
                    handle.cancel();
                    progress.abandon_with_message("interrupted");
                    return Err(AppError::Interrupted);
                }
            }
        };

        progress.finish_and_clear();
        println!("{}", self.output.format_job(&job)?);
        if job.status == JobStatus::Error {
            return Err(AppError::JobFailed {
                job_id: job.id.clone(),
                message: job
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown error".into()),
            });
        }
        info!(job_id = %job.id, "Job finished");
        Ok(())
    }

    fn progress_bar(&self, job_id: &str) -> ProgressBar {
        if self.output.format().is_json() {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(100);
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.blue} {prefix} [{bar:30.cyan/blue}] {pos:>3}% {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        pb.set_prefix(job_id.to_owned());
        pb.set_message("queued");
        pb
    }

    pub async fn status(&self, job_id: &str) -> Result<()> {
        let job = self.client.job_status(job_id).await?;
        println!("{}", self.output.format_job(&job)?);
        Ok(())
    }

    pub async fn history(&self, page: u32, per_page: u32, posters: bool) -> Result<()> {
        if page == 0 || per_page == 0 {
            return Err(AppError::InvalidInput(
                "page and per-page must be at least 1".into(),
            ));
        }
        let listing = self.client.list_jobs(page, per_page).await?;
        let posters = if posters {
            Some(
                poster_thumbnails(
                    self.client.as_ref(),
                    &listing.items,
                    self.config().manifest_timeout,
                )
                .await,
            )
        } else {
            None
        };
        println!("{}", self.output.format_page(&listing, posters.as_ref())?);
        Ok(())
    }

    pub async fn improve(&self, prompt: &str) -> Result<()> {
        let improved = self.client.improve_prompt(prompt).await?;
        println!("{}", self.output.format_improved(&improved)?);
        Ok(())
    }

    pub async fn compose(&self, base: &str, variant: &str, mode: ComposeMode) -> Result<()> {
        let composed = self.client.compose_prompt(base, variant, mode).await?;
        println!("{}", self.output.format_composed(&composed)?);
        Ok(())
    }

    pub async fn thumbs(&self, source: &TrackSource) -> Result<()> {
        let track = self.load_track(source).await?;
        println!("{}", self.output.format_track(&track)?);
        Ok(())
    }

    pub async fn scrub(&self, source: &TrackSource, request: ScrubRequest) -> Result<()> {
        if !(request.width.is_finite() && request.width > 0.0) {
            return Err(AppError::InvalidInput("width must be positive".into()));
        }
        let track = self.load_track(source).await?;
        let duration = request.duration.unwrap_or_else(|| track.span());
        let bounds = BoundingBox::new(0.0, 0.0, request.width, request.height);
        let engine = ScrubPreviewEngine::new(PreviewGeometry::default());
        let preview = engine.lookup(request.x, request.y, &bounds, duration, &track);

        let time = request.x.clamp(0.0, request.width) / request.width * duration;
        println!("{}", self.output.format_preview(time, &preview)?);
        Ok(())
    }

    async fn load_track(&self, source: &TrackSource) -> Result<CueTrack> {
        let url = match (&source.job, &source.url) {
            (_, Some(url)) => url.clone(),
            (Some(job_id), None) => {
                let job = self.client.get_job(job_id).await?;
                match job.cue_track_url {
                    Some(url) => url,
                    None => {
                        debug!(job_id = %job.id, "Job has no thumbnail track");
                        return Ok(CueTrack::empty());
                    }
                }
            }
            (None, None) => {
                return Err(AppError::InvalidInput("either --job or --url is required".into()));
            }
        };

        let loader = CueTrackLoader::new(self.service(), self.config().manifest_timeout);
        Ok(loader.load(&url).await.unwrap_or_default())
    }

    pub async fn sources(&self, job_id: &str, capability: Capability) -> Result<()> {
        let job: Job = self.client.job_status(job_id).await?;
        let sources = PlaybackSources::from_job(&job, self.config());

        let surface = ProbeSurface::new(capability == Capability::NativeOnly);
        let session = PlaybackSession::new(Box::new(surface), &StaticCapability(capability));
        let factory = Arc::new(ManifestProbeFactory {
            service: self.service(),
        });
        let options = EngineOptions {
            autoplay: false,
            ..EngineOptions::default()
        };
        let selector = AdaptivePlaybackSelector::new(session, factory, options);

        let active = match selector.attach(sources).await {
            AttachOutcome::Attached(active) => active,
            AttachOutcome::Superseded => return Err(AppError::Interrupted),
        };
        println!("{}", self.output.format_source(capability, &active)?);
        selector.close().await;
        Ok(())
    }
}

/// Surface that only records the source it was given.
struct ProbeSurface {
    native: bool,
    source: Option<String>,
}

impl ProbeSurface {
    fn new(native: bool) -> Self {
        Self {
            native,
            source: None,
        }
    }
}

impl PlaybackSurface for ProbeSurface {
    fn can_play_native(&self, mime: &str) -> bool {
        self.native && mime == SEGMENTED_MIME
    }

    fn set_source(&mut self, url: &str) -> std::result::Result<(), PlaybackError> {
        debug!(url, "Surface source set");
        self.source = Some(url.to_owned());
        Ok(())
    }

    fn clear_source(&mut self) {
        self.source = None;
    }

    fn pause(&mut self) {}

    fn reload(&mut self) {}

    fn play(&mut self) -> std::result::Result<(), PlaybackError> {
        Ok(())
    }
}

struct ManifestProbeFactory {
    service: Arc<dyn JobService>,
}

impl EngineFactory for ManifestProbeFactory {
    fn create(
        &self,
        _options: &EngineOptions,
    ) -> std::result::Result<Box<dyn StreamingEngine>, PlaybackError> {
        Ok(Box::new(ManifestProbeEngine {
            service: Arc::clone(&self.service),
            token: CancellationToken::new(),
            loaded: None,
        }))
    }
}

/// Checks that a manifest is reachable and well-formed before it is bound.
struct ManifestProbeEngine {
    service: Arc<dyn JobService>,
    token: CancellationToken,
    loaded: Option<String>,
}

#[async_trait]
impl StreamingEngine for ManifestProbeEngine {
    async fn load_source(&mut self, url: &str) -> std::result::Result<(), PlaybackError> {
        let fetched = self
            .service
            .fetch_text(url, &self.token)
            .await
            .map_err(|e| PlaybackError::engine_load(url, e.to_string()))?;
        if !fetched.body.trim_start().starts_with("#EXTM3U") {
            return Err(PlaybackError::engine_load(url, "not a playlist"));
        }
        self.loaded = Some(fetched.url);
        Ok(())
    }

    async fn attach(
        &mut self,
        surface: &mut dyn PlaybackSurface,
    ) -> std::result::Result<(), PlaybackError> {
        let url = self
            .loaded
            .as_deref()
            .ok_or_else(|| PlaybackError::engine_attach("no manifest loaded"))?;
        surface.set_source(url)
    }

    fn destroy(&mut self) -> std::result::Result<(), PlaybackError> {
        self.token.cancel();
        self.loaded = None;
        Ok(())
    }
}
