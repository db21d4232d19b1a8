use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

use crate::playback::session::{
    ActiveSource, EngineFactory, EngineOptions, PlaybackSession, PlaybackSources, PlaybackState,
};

/// Result of an [`AdaptivePlaybackSelector::attach`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached(ActiveSource),
    /// A newer attach or a close was requested before this one finished.
    Superseded,
}

/// Owns a [`PlaybackSession`] and serializes every change to it.
///
/// Attaches queue behind one another; each one tears the session down before
/// binding, so two engines are never bound to the surface at once.
pub struct AdaptivePlaybackSelector {
    session: Mutex<PlaybackSession>,
    factory: Arc<dyn EngineFactory>,
    options: EngineOptions,
    generation: AtomicU64,
}

impl AdaptivePlaybackSelector {
    pub fn new(
        session: PlaybackSession,
        factory: Arc<dyn EngineFactory>,
        options: EngineOptions,
    ) -> Self {
        Self {
            session: Mutex::new(session),
            factory,
            options,
            generation: AtomicU64::new(0),
        }
    }

    /// Switch to `sources`.
    ///
    /// Waits for any attach in progress. If another attach or a close is
    /// requested meanwhile, this one is skipped or reported as superseded.
    pub async fn attach(&self, sources: PlaybackSources) -> AttachOutcome {
        let generation = self.next_generation();
        let mut session = self.session.lock().await;
        if !self.is_current(generation) {
            debug!(generation, "Attach superseded before it started");
            return AttachOutcome::Superseded;
        }

        let active = session
            .attach(&sources, self.factory.as_ref(), &self.options)
            .await;

        if self.is_current(generation) {
            AttachOutcome::Attached(active)
        } else {
            debug!(generation, source = active.kind(), "Attach superseded while binding");
            AttachOutcome::Superseded
        }
    }

    /// Tear the session down. Pending attaches are cancelled.
    pub async fn close(&self) {
        let generation = self.next_generation();
        self.session.lock().await.teardown();
        debug!(generation, "Playback closed");
    }

    pub async fn active_source(&self) -> ActiveSource {
        self.session.lock().await.active_source().clone()
    }

    pub async fn state(&self) -> PlaybackState {
        self.session.lock().await.state()
    }

    /// Hand the session back to the caller.
    pub fn into_session(self) -> PlaybackSession {
        self.session.into_inner()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}
