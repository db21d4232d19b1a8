//! Thumbnail track loading for scrub previews and history posters.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cuetrack::CueTrack;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::models::Job;
use crate::api::service::JobService;
use crate::error::ClientError;

/// Loads the cue track for whatever media is currently shown.
///
/// Each load captures a generation number. Starting a new load, or calling
/// [`cancel`](Self::cancel), makes every earlier load stale: its fetch is
/// cancelled and its result discarded.
pub struct CueTrackLoader {
    service: Arc<dyn JobService>,
    timeout: Duration,
    generation: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
}

impl CueTrackLoader {
    pub fn new(service: Arc<dyn JobService>, timeout: Duration) -> Self {
        Self {
            service,
            timeout,
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    /// Fetch and parse the manifest at `url`.
    ///
    /// Returns `None` when the load was superseded. A failed fetch is not an
    /// error: it yields an empty track, meaning "no preview".
    pub async fn load(&self, url: &str) -> Option<CueTrack> {
        let token = CancellationToken::new();
        let generation = {
            let mut current = self.current.lock();
            if let Some(previous) = current.replace(token.clone()) {
                previous.cancel();
            }
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let fetched = tokio::time::timeout(self.timeout, self.service.fetch_text(url, &token)).await;

        if self.is_stale(generation, &token) {
            debug!(url, generation, "Discarding superseded cue track");
            return None;
        }

        let track = match fetched {
            Ok(Ok(text)) => {
                let report = cuetrack::parse_with_report(&text.body, &text.url);
                if !report.skipped.is_empty() {
                    debug!(
                        url = %text.url,
                        skipped = report.skipped.len(),
                        "Dropped malformed cue blocks"
                    );
                }
                report.track
            }
            Ok(Err(ClientError::Cancelled)) => return None,
            Ok(Err(error)) => {
                warn!(url, error = %error, "Cue track unavailable");
                CueTrack::empty()
            }
            Err(_) => {
                warn!(url, timeout_ms = self.timeout.as_millis() as u64, "Cue track fetch timed out");
                CueTrack::empty()
            }
        };
        debug!(url, generation, cues = track.len(), "Cue track loaded");
        Some(track)
    }

    /// Invalidate the load in progress, if any.
    pub fn cancel(&self) {
        let mut current = self.current.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = current.take() {
            token.cancel();
        }
    }

    fn is_stale(&self, generation: u64, token: &CancellationToken) -> bool {
        token.is_cancelled() || self.generation.load(Ordering::SeqCst) != generation
    }
}

impl Drop for CueTrackLoader {
    fn drop(&mut self) {
        if let Some(token) = self.current.get_mut().take() {
            token.cancel();
        }
    }
}

/// First thumbnail of every item that has a cue track, keyed by job id.
///
/// Manifests are fetched concurrently; an item whose manifest is missing,
/// unreachable or empty simply has no poster.
pub async fn poster_thumbnails(
    service: &dyn JobService,
    items: &[Job],
    timeout: Duration,
) -> HashMap<String, Arc<str>> {
    let token = CancellationToken::new();
    let fetches = items.iter().filter_map(|job| {
        let url = job.cue_track_url.as_deref()?;
        let token = &token;
        Some(async move {
            let fetched = tokio::time::timeout(timeout, service.fetch_text(url, token)).await;
            let poster = match fetched {
                Ok(Ok(text)) => cuetrack::parse(&text.body, &text.url).poster().cloned(),
                Ok(Err(error)) => {
                    debug!(job_id = %job.id, url, error = %error, "No poster");
                    None
                }
                Err(_) => {
                    debug!(job_id = %job.id, url, "Poster fetch timed out");
                    None
                }
            };
            poster.map(|image| (job.id.clone(), image))
        })
    });

    join_all(fetches).await.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::JobStatus;
    use crate::testing::{ScriptedService, job};

    const MANIFEST: &str = "WEBVTT\n\n\
        00:00:00.000 --> 00:00:01.000\nthumb-0001.jpg\n\n\
        00:00:01.000 --> 00:00:02.000\nthumb-0002.jpg\n";

    fn loader(service: ScriptedService) -> (Arc<ScriptedService>, Arc<CueTrackLoader>) {
        let service = Arc::new(service);
        let loader = Arc::new(CueTrackLoader::new(
            Arc::clone(&service) as Arc<dyn JobService>,
            Duration::from_secs(10),
        ));
        (service, loader)
    }

    #[tokio::test(start_paused = true)]
    async fn loads_and_resolves_against_manifest_url() {
        let url = "http://media/thumbs/j/thumbs.vtt";
        let (_, loader) = loader(ScriptedService::new().text(url, 10, Ok(MANIFEST)));

        let track = loader.load(url).await.unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(
            track.poster().map(|s| &**s),
            Some("http://media/thumbs/j/thumb-0001.jpg")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_means_no_preview() {
        let (_, loader) = loader(ScriptedService::new());
        let track = loader.load("http://media/missing.vtt").await.unwrap();
        assert!(track.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out_to_empty() {
        let url = "http://media/slow.vtt";
        let (_, loader) = loader(ScriptedService::new().text(url, 60_000, Ok(MANIFEST)));
        let track = loader.load(url).await.unwrap();
        assert!(track.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_load_supersedes_older() {
        let slow = "http://media/old.vtt";
        let fast = "http://media/new.vtt";
        let (_, loader) = loader(
            ScriptedService::new()
                .text(slow, 500, Ok(MANIFEST))
                .text(fast, 10, Ok("WEBVTT\n\n00:00:00.000 --> 00:00:05.000\nonly.jpg\n")),
        );

        let first = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.load(slow).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = loader.load(fast).await.unwrap();

        assert!(first.await.unwrap().is_none());
        assert_eq!(second.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_loads_leave_exactly_one_winner() {
        let url = "http://media/thumbs.vtt";
        let (_, loader) = loader(ScriptedService::new().text(url, 500, Ok(MANIFEST)));

        for _ in 0..5 {
            let loads: Vec<_> = (0..8)
                .map(|_| {
                    let loader = Arc::clone(&loader);
                    tokio::spawn(async move { loader.load(url).await })
                })
                .collect();

            let mut winners = 0;
            for load in loads {
                if load.await.unwrap().is_some() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_load() {
        let url = "http://media/thumbs.vtt";
        let (_, loader) = loader(ScriptedService::new().text(url, 500, Ok(MANIFEST)));

        let pending = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.load(url).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        loader.cancel();
        assert!(pending.await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn posters_are_fetched_per_item() {
        let service = ScriptedService::new()
            .text("http://media/a.vtt", 50, Ok(MANIFEST))
            .text("http://media/b.vtt", 10, Ok("WEBVTT\n\nnot a cue\n"));
        let items = vec![
            Job {
                cue_track_url: Some("http://media/a.vtt".into()),
                ..job("a", JobStatus::Done, 100.0)
            },
            Job {
                cue_track_url: Some("http://media/b.vtt".into()),
                ..job("b", JobStatus::Done, 100.0)
            },
            Job {
                cue_track_url: Some("http://media/gone.vtt".into()),
                ..job("c", JobStatus::Done, 100.0)
            },
            job("d", JobStatus::Processing, 20.0),
        ];

        let posters = poster_thumbnails(&service, &items, Duration::from_secs(5)).await;
        assert_eq!(posters.len(), 1);
        assert_eq!(posters["a"].as_ref(), "http://media/thumb-0001.jpg");
        assert_eq!(service.fetch_calls(), 3);
    }
}
