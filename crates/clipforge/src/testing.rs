// Scripted service double shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::api::models::{Job, JobPage, JobSpec, JobStatus};
use crate::api::service::{FetchedText, JobService};
use crate::error::ClientError;

type Step = (Duration, Result<Job, ClientError>);

/// Answers status queries from a per-job script of `(delay, result)` steps.
///
/// Once a job's script is exhausted further queries never resolve.
#[derive(Default)]
pub(crate) struct ScriptedService {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    texts: Mutex<HashMap<String, (Duration, Result<String, ClientError>)>>,
    status_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    submitted: Mutex<Vec<JobSpec>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, job_id: &str, steps: Vec<(u64, Result<Job, ClientError>)>) -> Self {
        self.scripts.lock().insert(
            job_id.to_owned(),
            steps
                .into_iter()
                .map(|(ms, result)| (Duration::from_millis(ms), result))
                .collect(),
        );
        self
    }

    pub fn text(self, url: &str, delay_ms: u64, body: Result<&str, ClientError>) -> Self {
        self.texts.lock().insert(
            url.to_owned(),
            (Duration::from_millis(delay_ms), body.map(str::to_owned)),
        );
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<JobSpec> {
        self.submitted.lock().clone()
    }
}

pub(crate) fn job(id: &str, status: JobStatus, progress: f64) -> Job {
    Job {
        status,
        progress,
        ..Job::queued(id)
    }
}

pub(crate) fn server_error() -> ClientError {
    ClientError::http_status(
        reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        "http://backend/api/status",
        "status",
        Some("boom".into()),
    )
}

#[async_trait]
impl JobService for ScriptedService {
    async fn submit_job(&self, spec: &JobSpec) -> Result<String, ClientError> {
        let mut submitted = self.submitted.lock();
        submitted.push(spec.clone());
        Ok(format!("job-{}", submitted.len()))
    }

    async fn job_status(&self, job_id: &str) -> Result<Job, ClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .scripts
            .lock()
            .get_mut(job_id)
            .and_then(|steps| steps.pop_front());
        match step {
            Some((delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            None => std::future::pending().await,
        }
    }

    async fn list_jobs(&self, page: u32, per_page: u32) -> Result<JobPage, ClientError> {
        Ok(JobPage {
            items: Vec::new(),
            page,
            per_page: Some(per_page),
            total: Some(0),
        })
    }

    async fn fetch_text(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<FetchedText, ClientError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let entry = self.texts.lock().get(url).cloned();
        let Some((delay, body)) = entry else {
            return Err(ClientError::http_status(
                reqwest::StatusCode::NOT_FOUND,
                url,
                "fetch",
                None,
            ));
        };
        tokio::select! {
            _ = token.cancelled() => Err(ClientError::Cancelled),
            _ = tokio::time::sleep(delay) => body.map(|body| FetchedText {
                url: url.to_owned(),
                body,
            }),
        }
    }
}

pub(crate) mod playback {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::playback::{
        EngineFactory, EngineOptions, PlaybackError, PlaybackSurface, StreamingEngine,
    };

    #[derive(Debug, Default)]
    pub struct SurfaceLog {
        pub source: Option<String>,
        pub plays: usize,
        pub clears: usize,
    }

    pub struct FakeSurface {
        native: bool,
        log: Arc<Mutex<SurfaceLog>>,
    }

    impl FakeSurface {
        pub fn new(native: bool) -> Self {
            Self {
                native,
                log: Arc::default(),
            }
        }

        pub fn log(&self) -> Arc<Mutex<SurfaceLog>> {
            Arc::clone(&self.log)
        }
    }

    impl PlaybackSurface for FakeSurface {
        fn can_play_native(&self, mime: &str) -> bool {
            self.native && mime == crate::playback::SEGMENTED_MIME
        }

        fn set_source(&mut self, url: &str) -> Result<(), PlaybackError> {
            self.log.lock().source = Some(url.to_owned());
            Ok(())
        }

        fn clear_source(&mut self) {
            let mut log = self.log.lock();
            log.source = None;
            log.clears += 1;
        }

        fn pause(&mut self) {}

        fn reload(&mut self) {}

        fn play(&mut self) -> Result<(), PlaybackError> {
            self.log.lock().plays += 1;
            Ok(())
        }
    }

    /// Counts engines that were created but not yet destroyed.
    #[derive(Default)]
    pub struct FakeFactory {
        pub live: Arc<AtomicIsize>,
        pub peak: Arc<AtomicIsize>,
        pub created: AtomicUsize,
        pub fail_load: bool,
        pub load_delay: Duration,
    }

    impl FakeFactory {
        pub fn live(&self) -> isize {
            self.live.load(Ordering::SeqCst)
        }

        pub fn peak(&self) -> isize {
            self.peak.load(Ordering::SeqCst)
        }

        pub fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }
    }

    impl EngineFactory for FakeFactory {
        fn create(
            &self,
            _options: &EngineOptions,
        ) -> Result<Box<dyn StreamingEngine>, PlaybackError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);
            Ok(Box::new(FakeEngine {
                live: Arc::clone(&self.live),
                fail_load: self.fail_load,
                load_delay: self.load_delay,
                url: None,
                destroyed: false,
            }))
        }
    }

    struct FakeEngine {
        live: Arc<AtomicIsize>,
        fail_load: bool,
        load_delay: Duration,
        url: Option<String>,
        destroyed: bool,
    }

    #[async_trait]
    impl StreamingEngine for FakeEngine {
        async fn load_source(&mut self, url: &str) -> Result<(), PlaybackError> {
            tokio::time::sleep(self.load_delay).await;
            if self.fail_load {
                return Err(PlaybackError::engine_load(url, "manifest unreachable"));
            }
            self.url = Some(url.to_owned());
            Ok(())
        }

        async fn attach(
            &mut self,
            surface: &mut dyn PlaybackSurface,
        ) -> Result<(), PlaybackError> {
            let url = self
                .url
                .as_deref()
                .ok_or_else(|| PlaybackError::engine_attach("nothing loaded"))?;
            surface.set_source(&format!("engine:{url}"))
        }

        fn destroy(&mut self) -> Result<(), PlaybackError> {
            if !self.destroyed {
                self.destroyed = true;
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }
}
