// Playback Session: one surface, at most one streaming engine bound to it.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::models::Job;
use crate::config::ClientConfig;
use crate::playback::capability::{Capability, CapabilityDetector, SEGMENTED_MIME};
use crate::playback::error::PlaybackError;

/// Where decoded media ends up, e.g. a video element or a player window.
pub trait PlaybackSurface: Send {
    /// Whether the surface can play `mime` without a streaming engine.
    fn can_play_native(&self, mime: &str) -> bool;

    fn set_source(&mut self, url: &str) -> Result<(), PlaybackError>;

    fn clear_source(&mut self);

    fn pause(&mut self);

    /// Reset the surface after its source changed.
    fn reload(&mut self);

    /// Start playback. May be refused, e.g. by an autoplay policy.
    fn play(&mut self) -> Result<(), PlaybackError>;
}

/// A segmented-streaming engine that feeds a surface.
#[async_trait]
pub trait StreamingEngine: Send {
    async fn load_source(&mut self, url: &str) -> Result<(), PlaybackError>;

    async fn attach(&mut self, surface: &mut dyn PlaybackSurface) -> Result<(), PlaybackError>;

    /// Release the engine and everything it holds.
    fn destroy(&mut self) -> Result<(), PlaybackError>;
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, options: &EngineOptions) -> Result<Box<dyn StreamingEngine>, PlaybackError>;
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How far ahead the engine may buffer.
    pub max_buffer_length: Duration,
    /// Start playing as soon as a source is bound.
    pub autoplay: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_buffer_length: Duration::from_secs(30),
            autoplay: true,
        }
    }
}

/// Candidate sources for one piece of media.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackSources {
    pub manifest_url: Option<String>,
    pub progressive_url: Option<String>,
}

impl PlaybackSources {
    pub fn new(manifest_url: Option<String>, progressive_url: Option<String>) -> Self {
        Self {
            manifest_url,
            progressive_url,
        }
    }

    /// Sources of a job, resolved against the backend. References that do not
    /// resolve are dropped.
    pub fn from_job(job: &Job, config: &ClientConfig) -> Self {
        let resolve = |raw: Option<&str>| {
            let raw = raw?;
            match config.resolve_url(raw) {
                Ok(url) => Some(url.to_string()),
                Err(error) => {
                    warn!(job_id = %job.id, error = %error, "Ignoring unusable media reference");
                    None
                }
            }
        };
        Self {
            manifest_url: resolve(job.manifest_url.as_deref()),
            progressive_url: resolve(job.progressive_url.as_deref()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.manifest_url.is_none() && self.progressive_url.is_none()
    }
}

/// The source currently bound to the surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum ActiveSource {
    /// Nothing playable. A valid state, not an error.
    #[default]
    None,
    /// Manifest played through a streaming engine.
    Segmented(String),
    /// Manifest handed straight to a surface that understands it.
    NativeSegmented(String),
    /// A single file played directly.
    Progressive(String),
}

impl ActiveSource {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Segmented(url) | Self::NativeSegmented(url) | Self::Progressive(url) => {
                Some(url)
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Segmented(_) => "segmented",
            Self::NativeSegmented(_) => "native_segmented",
            Self::Progressive(_) => "progressive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Attaching,
    Playing,
    /// Attached, but neither source was usable.
    NoSource,
    TornDown,
}

/// Binds one surface to at most one engine.
///
/// Dropping the session tears it down.
pub struct PlaybackSession {
    surface: Box<dyn PlaybackSurface>,
    engine: Option<Box<dyn StreamingEngine>>,
    capability: Capability,
    state: PlaybackState,
    active: ActiveSource,
}

impl PlaybackSession {
    /// Capability is probed once, here.
    pub fn new(surface: Box<dyn PlaybackSurface>, detector: &dyn CapabilityDetector) -> Self {
        let capability = detector.detect();
        debug!(?capability, "Playback capability detected");
        Self {
            surface,
            engine: None,
            capability,
            state: PlaybackState::Idle,
            active: ActiveSource::None,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn active_source(&self) -> &ActiveSource {
        &self.active
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn surface(&self) -> &dyn PlaybackSurface {
        self.surface.as_ref()
    }

    /// Tear down whatever is bound, then bind the best usable source.
    ///
    /// Prefers segmented streaming through an engine, then a surface that
    /// plays manifests natively, then the progressive file. Engine failures
    /// degrade to the progressive file; they are logged, never returned.
    pub async fn attach(
        &mut self,
        sources: &PlaybackSources,
        factory: &dyn EngineFactory,
        options: &EngineOptions,
    ) -> ActiveSource {
        self.teardown();
        self.state = PlaybackState::Attaching;

        let active = self.bind(sources, factory, options).await;
        self.state = if active.is_none() {
            PlaybackState::NoSource
        } else {
            PlaybackState::Playing
        };

        if options.autoplay
            && !active.is_none()
            && let Err(error) = self.surface.play()
        {
            debug!(error = %error, "Autoplay refused");
        }

        info!(source = active.kind(), url = active.url(), "Playback source bound");
        self.active = active.clone();
        active
    }

    async fn bind(
        &mut self,
        sources: &PlaybackSources,
        factory: &dyn EngineFactory,
        options: &EngineOptions,
    ) -> ActiveSource {
        if let Some(manifest) = sources.manifest_url.as_deref() {
            if self.capability.engine_available() {
                match self.attach_engine(manifest, factory, options).await {
                    Ok(()) => return ActiveSource::Segmented(manifest.to_owned()),
                    Err(error) => warn!(
                        url = manifest,
                        error = %error,
                        "Streaming engine failed, falling back to progressive source"
                    ),
                }
            } else if self.surface.can_play_native(SEGMENTED_MIME) {
                match self.surface.set_source(manifest) {
                    Ok(()) => return ActiveSource::NativeSegmented(manifest.to_owned()),
                    Err(error) => warn!(url = manifest, error = %error, "Native manifest playback failed"),
                }
            }
        }

        if let Some(progressive) = sources.progressive_url.as_deref() {
            match self.surface.set_source(progressive) {
                Ok(()) => return ActiveSource::Progressive(progressive.to_owned()),
                Err(error) => warn!(url = progressive, error = %error, "Progressive source rejected"),
            }
        }

        ActiveSource::None
    }

    async fn attach_engine(
        &mut self,
        url: &str,
        factory: &dyn EngineFactory,
        options: &EngineOptions,
    ) -> Result<(), PlaybackError> {
        // Owned by the session before the first await so teardown can reach
        // it if this future is dropped mid-load.
        self.engine = Some(factory.create(options)?);
        let bound = match self.engine.as_mut() {
            Some(engine) => match engine.load_source(url).await {
                Ok(()) => engine.attach(self.surface.as_mut()).await,
                Err(error) => Err(error),
            },
            None => Err(PlaybackError::EngineUnavailable),
        };
        if bound.is_err()
            && let Some(mut engine) = self.engine.take()
            && let Err(destroy_error) = engine.destroy()
        {
            warn!(error = %destroy_error, "Failed to release engine after attach failure");
        }
        bound
    }

    /// Release the engine and stop the surface. Safe to call any number of
    /// times; errors are logged and swallowed.
    pub fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if let Err(error) = engine.destroy() {
                warn!(error = %error, "Engine teardown failed");
            }
        }

        match self.state {
            PlaybackState::Idle | PlaybackState::TornDown => {}
            PlaybackState::Attaching | PlaybackState::Playing | PlaybackState::NoSource => {
                self.surface.pause();
                self.surface.clear_source();
                self.surface.reload();
                debug!(source = self.active.kind(), "Playback session torn down");
                self.state = PlaybackState::TornDown;
            }
        }
        self.active = ActiveSource::None;
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("capability", &self.capability)
            .field("state", &self.state)
            .field("active", &self.active)
            .field("has_engine", &self.engine.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::capability::StaticCapability;
    use crate::testing::playback::{FakeFactory, FakeSurface};

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let surface = FakeSurface::new(false);
        let log = surface.log();
        let mut session =
            PlaybackSession::new(Box::new(surface), &StaticCapability(Capability::Unsupported));

        session.teardown();
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(log.lock().clears, 0);

        let sources = PlaybackSources::new(None, Some("http://media/a.mp4".into()));
        let factory = FakeFactory::default();
        let active = session
            .attach(&sources, &factory, &EngineOptions::default())
            .await;
        assert_eq!(active, ActiveSource::Progressive("http://media/a.mp4".into()));
        assert_eq!(log.lock().plays, 1);

        session.teardown();
        session.teardown();
        assert_eq!(session.state(), PlaybackState::TornDown);
        assert_eq!(session.active_source(), &ActiveSource::None);
        let log = log.lock();
        assert_eq!(log.clears, 1);
        assert_eq!(log.source, None);
    }

    #[test]
    fn sources_from_job_are_resolved() {
        let config = ClientConfig::with_base_url("http://backend:5000").unwrap();
        let job = Job {
            manifest_url: Some("/hls/j/index.m3u8".into()),
            progressive_url: Some("https://cdn.example.com/j.mp4".into()),
            ..Job::queued("j")
        };
        let sources = PlaybackSources::from_job(&job, &config);
        assert_eq!(
            sources.manifest_url.as_deref(),
            Some("http://backend:5000/hls/j/index.m3u8")
        );
        assert_eq!(
            sources.progressive_url.as_deref(),
            Some("https://cdn.example.com/j.mp4")
        );
        assert!(PlaybackSources::from_job(&Job::queued("k"), &config).is_empty());
    }

    #[test]
    fn active_source_serializes_with_kind() {
        let value = serde_json::to_value(ActiveSource::Progressive("u".into())).unwrap();
        assert_eq!(value, serde_json::json!({"kind": "progressive", "url": "u"}));
        let none = serde_json::to_value(ActiveSource::None).unwrap();
        assert_eq!(none, serde_json::json!({"kind": "none"}));
    }
}
