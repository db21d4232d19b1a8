// Job Poller: submits generation jobs and watches their status on a fixed schedule.
//
// Every subscription owns its timer, its cancellation token and its delivery
// gate, so subscriptions for different jobs never share cancellation state.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::ReentrantMutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::api::models::{Job, JobSpec};
use crate::api::service::JobService;
use crate::config::ClientConfig;
use crate::error::ClientError;

/// Shortest accepted polling period.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for status polling.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Period between status queries. The first query fires one period after
    /// subscribing. Ticks missed while the runtime was busy are skipped.
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1500),
        }
    }
}

impl From<&ClientConfig> for PollerConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One status response, delivered in arrival order.
#[derive(Debug, Clone)]
pub struct PollUpdate {
    pub job_id: Arc<str>,
    /// Which tick issued the request (1-based). Responses may arrive out of
    /// order; a lower sequence after a higher one means an older request was
    /// slower.
    pub request_seq: u64,
    pub result: Result<Job, ClientError>,
}

impl PollUpdate {
    /// `done`, `error` and failed queries all end the subscription.
    pub fn is_terminal(&self) -> bool {
        match &self.result {
            Ok(job) => job.is_terminal(),
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Open,
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Delivery gate shared between a subscription task and its handles.
///
/// Callbacks run while the gate is held. Closing the gate therefore waits for
/// an in-progress callback, and nothing is delivered once `close` returns. The
/// lock is reentrant so a callback may cancel its own subscription.
struct Shared {
    gate: ReentrantMutex<Cell<Gate>>,
    token: CancellationToken,
}

impl Shared {
    fn new() -> Self {
        Self {
            gate: ReentrantMutex::new(Cell::new(Gate::Open)),
            token: CancellationToken::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.gate.lock().get() == Gate::Open
    }

    /// Returns `true` if this call closed an open gate.
    fn close(&self) -> bool {
        let closed = {
            let gate = self.gate.lock();
            let open = gate.get() == Gate::Open;
            if open {
                gate.set(Gate::Cancelled);
            }
            open
        };
        self.token.cancel();
        closed
    }

    fn deliver<F>(&self, update: PollUpdate, on_update: &mut F) -> Flow
    where
        F: FnMut(PollUpdate),
    {
        let gate = self.gate.lock();
        if gate.get() != Gate::Open {
            trace!(
                job_id = %update.job_id,
                request_seq = update.request_seq,
                "Dropping response for closed subscription"
            );
            return Flow::Stop;
        }

        let terminal = update.is_terminal();
        if terminal {
            gate.set(Gate::Finished);
        }
        on_update(update);

        let flow = if gate.get() == Gate::Open {
            Flow::Continue
        } else {
            Flow::Stop
        };
        drop(gate);
        if flow == Flow::Stop {
            self.token.cancel();
        }
        flow
    }
}

/// Handle to a running subscription. Clones refer to the same subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    job_id: Arc<str>,
    shared: Arc<Shared>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Stop polling. Idempotent; once this returns no further update is
    /// delivered, even for requests already in flight.
    pub fn cancel(&self) {
        if self.shared.close() {
            debug!(job_id = %self.job_id, subscription = %self.id, "Subscription cancelled");
        }
    }

    /// `false` once cancelled or after the terminal update was delivered.
    pub fn is_active(&self) -> bool {
        self.shared.is_open()
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("job_id", &self.job_id)
            .field("active", &self.is_active())
            .finish()
    }
}

struct Entry {
    job_id: Arc<str>,
    shared: Arc<Shared>,
}

/// Submits jobs and polls their status.
///
/// Dropping the poller cancels all of its subscriptions.
pub struct JobPoller {
    service: Arc<dyn JobService>,
    config: PollerConfig,
    subscriptions: Arc<DashMap<SubscriptionId, Entry>>,
    next_id: AtomicU64,
}

impl JobPoller {
    pub fn new(service: Arc<dyn JobService>, config: PollerConfig) -> Self {
        Self {
            service,
            config,
            subscriptions: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Submit a job. Fails with [`ClientError::Configuration`] before any I/O
    /// when there is no prompt to send.
    pub async fn submit(&self, spec: &JobSpec) -> Result<String, ClientError> {
        if spec.effective_prompt().trim().is_empty() {
            return Err(ClientError::configuration("prompt must not be empty"));
        }
        let job_id = self.service.submit_job(spec).await?;
        info!(job_id = %job_id, segmented = spec.want_segmented, "Job submitted");
        Ok(job_id)
    }

    /// Watch `job_id` at the configured interval.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<F>(&self, job_id: &str, on_update: F) -> SubscriptionHandle
    where
        F: FnMut(PollUpdate) + Send + 'static,
    {
        self.subscribe_every(job_id, self.config.interval, on_update)
    }

    /// Watch `job_id`, querying its status every `interval`.
    ///
    /// Every response is passed to `on_update` in arrival order. The first
    /// terminal result (`done`, `error`, or a failed query) is delivered exactly
    /// once and ends the subscription; responses still in flight are dropped.
    /// `on_update` runs on the runtime and should not block.
    pub fn subscribe_every<F>(
        &self,
        job_id: &str,
        interval: Duration,
        on_update: F,
    ) -> SubscriptionHandle
    where
        F: FnMut(PollUpdate) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let job_id: Arc<str> = Arc::from(job_id);
        let shared = Arc::new(Shared::new());

        self.subscriptions.insert(
            id,
            Entry {
                job_id: Arc::clone(&job_id),
                shared: Arc::clone(&shared),
            },
        );

        let task = PollTask {
            id,
            job_id: Arc::clone(&job_id),
            interval: interval.max(MIN_INTERVAL),
            service: Arc::clone(&self.service),
            shared: Arc::clone(&shared),
            subscriptions: Arc::clone(&self.subscriptions),
        };
        tokio::spawn(task.run(on_update));

        SubscriptionHandle { id, job_id, shared }
    }

    /// Cancel one subscription. Idempotent.
    pub fn cancel(&self, handle: &SubscriptionHandle) {
        handle.cancel();
        self.subscriptions.remove(&handle.id);
    }

    /// Cancel every subscription watching `job_id`; returns how many were open.
    pub fn cancel_job(&self, job_id: &str) -> usize {
        let matching: Vec<(SubscriptionId, Arc<Shared>)> = self
            .subscriptions
            .iter()
            .filter(|entry| &*entry.job_id == job_id)
            .map(|entry| (*entry.key(), Arc::clone(&entry.shared)))
            .collect();
        self.close_all(matching)
    }

    /// Cancel everything this poller is watching.
    pub fn cancel_all(&self) -> usize {
        let all: Vec<(SubscriptionId, Arc<Shared>)> = self
            .subscriptions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(&entry.shared)))
            .collect();
        self.close_all(all)
    }

    /// Subscriptions that have neither finished nor been cancelled.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions
            .iter()
            .filter(|entry| entry.shared.is_open())
            .count()
    }

    fn close_all(&self, targets: Vec<(SubscriptionId, Arc<Shared>)>) -> usize {
        let mut closed = 0;
        for (id, shared) in targets {
            if shared.close() {
                closed += 1;
            }
            self.subscriptions.remove(&id);
        }
        closed
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        let closed = self.cancel_all();
        if closed > 0 {
            debug!(closed, "Poller dropped with active subscriptions");
        }
    }
}

struct PollTask {
    id: SubscriptionId,
    job_id: Arc<str>,
    interval: Duration,
    service: Arc<dyn JobService>,
    shared: Arc<Shared>,
    subscriptions: Arc<DashMap<SubscriptionId, Entry>>,
}

impl PollTask {
    async fn run<F>(self, mut on_update: F)
    where
        F: FnMut(PollUpdate) + Send + 'static,
    {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Requests are not serialized: a slow response may arrive after a
        // later, faster one and is delivered as-is.
        let mut in_flight: FuturesUnordered<BoxFuture<'static, StatusReply>> =
            FuturesUnordered::new();
        let mut seq: u64 = 0;

        debug!(
            job_id = %self.job_id,
            subscription = %self.id,
            interval_ms = self.interval.as_millis() as u64,
            "Polling started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shared.token.cancelled() => {
                    break;
                }
                Some((request_seq, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    let update = PollUpdate {
                        job_id: Arc::clone(&self.job_id),
                        request_seq,
                        result,
                    };
                    self.log_update(&update);
                    if self.shared.deliver(update, &mut on_update) == Flow::Stop {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    seq += 1;
                    trace!(job_id = %self.job_id, request_seq = seq, "Querying job status");
                    in_flight.push(
                        query_status(Arc::clone(&self.service), Arc::clone(&self.job_id), seq)
                            .boxed(),
                    );
                }
            }
        }

        if !in_flight.is_empty() {
            debug!(
                job_id = %self.job_id,
                subscription = %self.id,
                dropped = in_flight.len(),
                "Discarding in-flight status requests"
            );
        }
        self.subscriptions.remove(&self.id);
        debug!(job_id = %self.job_id, subscription = %self.id, "Polling stopped");
    }

    fn log_update(&self, update: &PollUpdate) {
        match &update.result {
            Ok(job) if job.is_terminal() => info!(
                job_id = %self.job_id,
                status = %job.status,
                request_seq = update.request_seq,
                "Job reached terminal status"
            ),
            Ok(job) => debug!(
                job_id = %self.job_id,
                status = %job.status,
                progress = job.progress,
                request_seq = update.request_seq,
                "Job status"
            ),
            Err(error) => warn!(
                job_id = %self.job_id,
                request_seq = update.request_seq,
                error = %error,
                "Status query failed, polling stops"
            ),
        }
    }
}

type StatusReply = (u64, Result<Job, ClientError>);

async fn query_status(service: Arc<dyn JobService>, job_id: Arc<str>, seq: u64) -> StatusReply {
    (seq, service.job_status(&job_id).await)
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use parking_lot::Mutex;

    use super::*;
    use crate::api::models::JobStatus;
    use crate::testing::{ScriptedService, job, server_error};

    type Log = Arc<Mutex<Vec<PollUpdate>>>;

    fn recorder() -> (Log, impl FnMut(PollUpdate) + Send + 'static) {
        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        (log, move |update| sink.lock().push(update))
    }

    fn statuses(log: &Log) -> Vec<(JobStatus, f64)> {
        log.lock()
            .iter()
            .map(|u| {
                let job = u.result.as_ref().unwrap();
                (job.status, job.progress)
            })
            .collect()
    }

    fn poller(service: &Arc<ScriptedService>) -> JobPoller {
        JobPoller::new(Arc::clone(service) as Arc<dyn JobService>, PollerConfig::default())
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_is_delivered_exactly_once() {
        let done = Job {
            progressive_url: Some("X".into()),
            ..job("j", JobStatus::Done, 100.0)
        };
        // The done response is slow; a later request is still in flight when it lands.
        let service = Arc::new(ScriptedService::new().script(
            "j",
            vec![
                (0, Ok(job("j", JobStatus::Queued, 0.0))),
                (0, Ok(job("j", JobStatus::Processing, 40.0))),
                (2000, Ok(done)),
                (1000, Ok(job("j", JobStatus::Processing, 60.0))),
            ],
        ));
        let poller = poller(&service);
        let (log, sink) = recorder();
        let handle = poller.subscribe("j", sink);

        settle().await;

        assert_eq!(
            statuses(&log),
            vec![
                (JobStatus::Queued, 0.0),
                (JobStatus::Processing, 40.0),
                (JobStatus::Done, 100.0),
            ]
        );
        let terminal = log.lock()[2].clone();
        assert_eq!(
            terminal.result.unwrap().progressive_url.as_deref(),
            Some("X")
        );
        assert_eq!(service.status_calls(), 4);
        assert!(!handle.is_active());
        assert_eq!(poller.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn last_arrival_wins() {
        let service = Arc::new(ScriptedService::new().script(
            "j",
            vec![
                (3000, Ok(job("j", JobStatus::Processing, 10.0))),
                (0, Ok(job("j", JobStatus::Processing, 40.0))),
            ],
        ));
        let poller = poller(&service);
        let (log, sink) = recorder();
        let handle = poller.subscribe("j", sink);

        tokio::time::sleep(Duration::from_millis(5000)).await;
        handle.cancel();

        let seqs: Vec<u64> = log.lock().iter().map(|u| u.request_seq).collect();
        assert_eq!(seqs, vec![2, 1]);
        assert_eq!(
            statuses(&log),
            vec![(JobStatus::Processing, 40.0), (JobStatus::Processing, 10.0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_query_fires_after_one_interval() {
        let service = Arc::new(ScriptedService::new());
        let poller = poller(&service);
        let handle = poller.subscribe("j", |_| {});

        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(service.status_calls(), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(service.status_calls(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(service.status_calls(), 2);
        poller.cancel(&handle);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_in_flight_response() {
        let service = Arc::new(
            ScriptedService::new().script("j", vec![(2000, Ok(job("j", JobStatus::Done, 100.0)))]),
        );
        let poller = poller(&service);
        let (log, sink) = recorder();
        let handle = poller.subscribe("j", sink);

        // Request issued at 1.5s, answered at 3.5s.
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(service.status_calls(), 1);
        poller.cancel(&handle);
        poller.cancel(&handle);
        handle.cancel();

        settle().await;
        assert!(log.lock().is_empty());
        assert_eq!(service.status_calls(), 1);
        assert_eq!(poller.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn subscriptions_for_different_jobs_are_independent() {
        let service = Arc::new(
            ScriptedService::new()
                .script("a", vec![(0, Ok(job("a", JobStatus::Processing, 10.0)))])
                .script(
                    "b",
                    vec![
                        (0, Ok(job("b", JobStatus::Processing, 50.0))),
                        (0, Ok(job("b", JobStatus::Done, 100.0))),
                    ],
                ),
        );
        let poller = poller(&service);
        let (log_a, sink_a) = recorder();
        let (log_b, sink_b) = recorder();
        let a = poller.subscribe("a", sink_a);
        let b = poller.subscribe("b", sink_b);
        assert_ne!(a.id(), b.id());

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(poller.cancel_job("a"), 1);
        assert!(!a.is_active());
        assert!(b.is_active());

        settle().await;
        assert_eq!(statuses(&log_a), vec![(JobStatus::Processing, 10.0)]);
        assert_eq!(
            statuses(&log_b),
            vec![(JobStatus::Processing, 50.0), (JobStatus::Done, 100.0)]
        );
        assert_eq!(poller.cancel_job("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_subscription_to_same_job_does_not_cancel_first() {
        let service = Arc::new(ScriptedService::new().script(
            "j",
            vec![
                (0, Ok(job("j", JobStatus::Processing, 10.0))),
                (0, Ok(job("j", JobStatus::Processing, 20.0))),
            ],
        ));
        let poller = poller(&service);
        let (log_first, sink_first) = recorder();
        let first = poller.subscribe("j", sink_first);
        let second = poller.subscribe("j", |_| {});
        poller.cancel(&second);

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(first.is_active());
        assert_eq!(log_first.lock().len(), 1);
        poller.cancel(&first);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_delivered_once_and_stops_polling() {
        let service = Arc::new(ScriptedService::new().script(
            "j",
            vec![
                (0, Err(server_error())),
                (0, Ok(job("j", JobStatus::Processing, 10.0))),
            ],
        ));
        let poller = poller(&service);
        let (log, sink) = recorder();
        poller.subscribe("j", sink);

        settle().await;
        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert!(log[0].is_terminal());
        assert!(log[0].result.as_ref().unwrap_err().is_protocol());
        assert_eq!(service.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_may_cancel_its_own_subscription() {
        let service = Arc::new(ScriptedService::new().script(
            "j",
            vec![
                (0, Ok(job("j", JobStatus::Processing, 10.0))),
                (0, Ok(job("j", JobStatus::Processing, 20.0))),
            ],
        ));
        let poller = poller(&service);
        let slot: Arc<OnceLock<SubscriptionHandle>> = Arc::default();
        let (log, mut sink) = recorder();
        let own = Arc::clone(&slot);
        let handle = poller.subscribe("j", move |update| {
            sink(update);
            if let Some(handle) = own.get() {
                handle.cancel();
            }
        });
        slot.set(handle.clone()).unwrap();

        settle().await;
        assert_eq!(log.lock().len(), 1);
        assert_eq!(service.status_calls(), 1);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_poller_cancels_everything() {
        let service = Arc::new(
            ScriptedService::new().script("j", vec![(0, Ok(job("j", JobStatus::Done, 100.0)))]),
        );
        let (log, sink) = recorder();
        let handle = {
            let poller = poller(&service);
            poller.subscribe("j", sink)
        };
        assert!(!handle.is_active());
        settle().await;
        assert!(log.lock().is_empty());
        assert_eq!(service.status_calls(), 0);
    }

    #[tokio::test]
    async fn submit_rejects_empty_prompt() {
        let service = Arc::new(ScriptedService::new());
        let poller = poller(&service);

        let err = poller.submit(&JobSpec::new("   ")).await.unwrap_err();
        assert!(matches!(err, ClientError::Configuration { .. }));
        assert!(service.submitted().is_empty());

        let composed = JobSpec::new("").with_composed_prompt("a cat at dusk");
        assert_eq!(poller.submit(&composed).await.unwrap(), "job-1");
        assert_eq!(service.submitted().len(), 1);
    }
}
