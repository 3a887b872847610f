// src/orchestrator/mod.rs
//! Fallback orchestrator: walks a capability's adapter chain in priority order until one
//! adapter produces a result. First success wins. Every attempt lands in the job's log.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use tokio::sync::Semaphore;

use crate::error::{AttemptFailure, GenerationError, PollError, ProviderError};
use crate::jobs::{AttemptRecord, JobStore, JobStoreError};
use crate::providers::poller::poll_until_complete;
use crate::providers::{PollPolicy, ProviderAdapter, ProviderRegistry, Submission};
use crate::types::{Capability, GenerationRequest, GenerationResult, PriorityMode};

/// The winning adapter and its result
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub provider: String,
    pub result: GenerationResult,
}

/// Why one adapter did not produce a result
enum AttemptError {
    /// Configuration problem surfaced at submit time; the adapter counts as unavailable
    Unavailable(ProviderError),
    Failed(AttemptFailure),
}

pub struct FallbackOrchestrator {
    registry: Arc<ProviderRegistry>,
    /// One semaphore per adapter name, created on first use
    limiters: Mutex<HashMap<String, Arc<Semaphore>>>,
    /// Adapters that reported a configuration error at submit time; never tried again
    disabled: Mutex<HashSet<(Capability, String)>>,
    max_concurrency: usize,
    poll_override: Option<PollPolicy>,
    store_retry_window: Duration,
}

impl FallbackOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, max_concurrency: usize) -> Self {
        Self {
            registry,
            limiters: Mutex::new(HashMap::new()),
            disabled: Mutex::new(HashSet::new()),
            max_concurrency: max_concurrency.max(1),
            poll_override: None,
            store_retry_window: Duration::from_secs(30),
        }
    }

    /// Use one poll policy for every adapter instead of each adapter's own
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_override = Some(policy);
        self
    }

    /// Total time spent retrying job-store writes that fail with a database error
    pub fn with_store_retry_window(mut self, window: Duration) -> Self {
        self.store_retry_window = window;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn is_disabled(&self, capability: Capability, provider: &str) -> bool {
        lock(&self.disabled).contains(&(capability, provider.to_string()))
    }

    fn disable(&self, capability: Capability, provider: &str) {
        lock(&self.disabled).insert((capability, provider.to_string()));
    }

    fn limiter(&self, provider: &str) -> Arc<Semaphore> {
        lock(&self.limiters)
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_concurrency)))
            .clone()
    }

    /// Run a job-store write, retrying database errors within the retry window.
    /// Transition and lookup errors are returned immediately.
    async fn persist<F, Fut>(&self, job_id: &str, action: &'static str, mut op: F) -> Result<(), JobStoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), JobStoreError>>,
    {
        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_elapsed_time: Some(self.store_retry_window),
            ..Default::default()
        };

        retry(backoff_config, || {
            let write = op();
            async move {
                write.await.map_err(|e| match e {
                    JobStoreError::Database(_) => {
                        tracing::warn!(job_id = %job_id, action, "Job store write failed (retrying): {}", e);
                        backoff::Error::transient(e)
                    }
                    other => backoff::Error::permanent(other),
                })
            }
        })
        .await
    }

    /// Drive one job to a terminal state.
    ///
    /// The job must exist in `store` in `pending` (or `processing`). A job that is already
    /// terminal is rejected before any adapter is called, so re-running never double-submits.
    pub async fn run(
        &self,
        job_id: &str,
        request: &GenerationRequest,
        mode: PriorityMode,
        store: &dyn JobStore,
    ) -> Result<GenerationOutcome, GenerationError> {
        // A terminal job is rejected here, before any adapter is called
        self.persist(job_id, "mark_processing", || store.mark_processing(job_id))
            .await
            .map_err(store_error)?;

        if let Err(e) = request.validate() {
            let message = e.to_string();
            self.persist(job_id, "fail", || store.fail(job_id, &message))
                .await
                .map_err(store_error)?;
            return Err(e.into());
        }

        let capability = request.capability;
        let chain = self.registry.chain(capability, mode);
        let mut failures: Vec<AttemptFailure> = Vec::new();

        tracing::info!(
            job_id = %job_id,
            capability = %capability,
            mode = %mode.as_str(),
            chain_len = chain.len(),
            "🚀 Starting generation"
        );

        for adapter in chain {
            let name = adapter.name().to_string();

            if self.is_disabled(capability, &name) {
                tracing::debug!(job_id = %job_id, provider = %name, "Skipping disabled provider");
                continue;
            }
            if let Err(e) = adapter.check_configured() {
                tracing::warn!(job_id = %job_id, provider = %name, "Skipping unconfigured provider: {}", e);
                continue;
            }

            match self.attempt(adapter.as_ref(), request).await {
                Ok(result) => {
                    log_attempt(store, job_id, AttemptRecord::succeeded(&name)).await;

                    let stored = self
                        .persist(job_id, "complete", || store.complete(job_id, &name, result.clone()))
                        .await;
                    if let Err(e) = stored {
                        let error = GenerationError::Store(format!("result from {} could not be stored: {}", name, e));
                        self.fail_best_effort(store, job_id, &error).await;
                        return Err(error);
                    }

                    tracing::info!(job_id = %job_id, provider = %name, url = %result.url, "✅ Generation succeeded");
                    return Ok(GenerationOutcome { provider: name, result });
                }
                Err(AttemptError::Unavailable(e)) => {
                    tracing::warn!(
                        job_id = %job_id,
                        provider = %name,
                        "Provider disabled for the rest of the process: {}",
                        e
                    );
                    self.disable(capability, &name);
                }
                Err(AttemptError::Failed(failure)) => {
                    tracing::warn!(
                        job_id = %job_id,
                        provider = %name,
                        timed_out = failure.timed_out,
                        "Provider attempt failed: {}",
                        failure.reason
                    );
                    log_attempt(
                        store,
                        job_id,
                        AttemptRecord::failed(&name, failure.reason.clone(), failure.timed_out),
                    )
                    .await;
                    failures.push(failure);
                }
            }
        }

        let error = if failures.is_empty() {
            GenerationError::NoProviderAvailable { capability }
        } else {
            GenerationError::Exhausted { capability, failures }
        };

        tracing::error!(job_id = %job_id, "❌ Generation failed: {}", error);
        let message = error.to_string();
        self.persist(job_id, "fail", || store.fail(job_id, &message))
            .await
            .map_err(store_error)?;
        Err(error)
    }

    /// Last try at leaving the job terminal after a store failure
    async fn fail_best_effort(&self, store: &dyn JobStore, job_id: &str, error: &GenerationError) {
        let message = error.to_string();
        if let Err(e) = self.persist(job_id, "fail", || store.fail(job_id, &message)).await {
            tracing::error!(job_id = %job_id, "Job could not be marked failed: {}", e);
        }
    }

    /// Submit to one adapter and, for asynchronous providers, poll to completion.
    /// The provider's permit is held for the whole span.
    async fn attempt(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, AttemptError> {
        let name = adapter.name();
        let limiter = self.limiter(name);
        let _permit = limiter.acquire().await.map_err(|e| {
            AttemptError::Failed(AttemptFailure {
                provider: name.to_string(),
                reason: format!("concurrency limiter closed: {}", e),
                timed_out: false,
            })
        })?;

        let submission = match adapter.submit(request).await {
            Ok(submission) => submission,
            Err(e) if e.is_configuration() => return Err(AttemptError::Unavailable(e)),
            Err(e) => {
                return Err(AttemptError::Failed(AttemptFailure {
                    provider: name.to_string(),
                    reason: e.to_string(),
                    timed_out: false,
                }))
            }
        };

        match submission {
            Submission::Completed(result) => Ok(result),
            Submission::Pending(handle) => {
                tracing::info!(provider = %name, external_id = %handle.external_id, "⏳ Polling external job");
                let policy = self
                    .poll_override
                    .clone()
                    .unwrap_or_else(|| adapter.poll_policy());

                poll_until_complete(adapter, &handle, &policy)
                    .await
                    .map_err(|e| {
                        AttemptError::Failed(AttemptFailure {
                            provider: name.to_string(),
                            timed_out: matches!(e, PollError::Timeout { .. }),
                            reason: e.to_string(),
                        })
                    })
            }
        }
    }
}

fn store_error(err: JobStoreError) -> GenerationError {
    GenerationError::Store(err.to_string())
}

/// Attempt log entries are not worth aborting a job over
async fn log_attempt(store: &dyn JobStore, job_id: &str, attempt: AttemptRecord) {
    let provider = attempt.provider.clone();
    if let Err(e) = store.record_attempt(job_id, attempt).await {
        tracing::warn!(job_id = %job_id, provider = %provider, "Failed to record attempt: {}", e);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{AttemptOutcome, InMemoryJobStore, Job, JobId, JobStatus};
    use crate::providers::{PollOutcome, SubmissionHandle};
    use crate::types::{Capability, CostClass};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    enum Behaviour {
        SubmitFails(&'static str),
        /// Reports running `n - 1` times, then succeeds
        SucceedsAfterPolls(u32, GenerationResult),
        FailsOnPoll(&'static str),
        NeverFinishes,
        Sync(GenerationResult),
        Unconfigured,
        /// Passes the startup check but reports a configuration error on submit
        SubmitUnconfigured,
    }

    struct FakeAdapter {
        name: &'static str,
        behaviour: Behaviour,
        submits: AtomicU32,
        polls: AtomicU32,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeAdapter {
        fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name,
                behaviour,
                submits: AtomicU32::new(0),
                polls: AtomicU32::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn name(&self) -> &str {
            self.name
        }

        fn capability(&self) -> Capability {
            Capability::Video
        }

        fn cost_class(&self) -> CostClass {
            CostClass::Free
        }

        fn check_configured(&self) -> Result<(), ProviderError> {
            match self.behaviour {
                Behaviour::Unconfigured => Err(ProviderError::not_configured(self.name, "no key")),
                _ => Ok(()),
            }
        }

        async fn submit(&self, _request: &GenerationRequest) -> Result<Submission, ProviderError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;

            let submission = match &self.behaviour {
                Behaviour::SubmitFails(reason) => Err(ProviderError::Request(reason.to_string())),
                Behaviour::Sync(result) => Ok(Submission::Completed(result.clone())),
                Behaviour::Unconfigured => Err(ProviderError::not_configured(self.name, "no key")),
                Behaviour::SubmitUnconfigured => Err(ProviderError::not_configured(self.name, "key revoked")),
                _ => Ok(Submission::Pending(SubmissionHandle::new(self.name, "ext-1"))),
            };
            if !matches!(submission, Ok(Submission::Pending(_))) {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            submission
        }

        async fn poll_status(&self, _handle: &SubmissionHandle) -> Result<PollOutcome, ProviderError> {
            let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            let outcome = match &self.behaviour {
                Behaviour::SucceedsAfterPolls(n, result) if polls >= *n => PollOutcome::Succeeded(result.clone()),
                Behaviour::FailsOnPoll(reason) => PollOutcome::Failed(reason.to_string()),
                _ => PollOutcome::Running,
            };
            if !matches!(outcome, PollOutcome::Running) {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(outcome)
        }
    }

    fn orchestrator(adapters: &[Arc<FakeAdapter>], max_concurrency: usize) -> FallbackOrchestrator {
        let mut registry = ProviderRegistry::new();
        for adapter in adapters {
            registry.register(adapter.clone());
        }
        let names: Vec<&str> = adapters.iter().map(|a| a.name).collect();
        registry.set_chain(Capability::Video, PriorityMode::QualityFirst, &names);

        FallbackOrchestrator::new(Arc::new(registry), max_concurrency)
            .with_poll_policy(PollPolicy::new(Duration::from_millis(1), 60).with_jitter(Duration::ZERO))
    }

    async fn new_job(store: &InMemoryJobStore) -> (String, GenerationRequest) {
        let request = GenerationRequest::new(Capability::Video, "a paper boat in the rain");
        let job_id = store
            .create(Job::new(&request, PriorityMode::QualityFirst))
            .await
            .unwrap();
        (job_id, request)
    }

    fn video_result() -> GenerationResult {
        GenerationResult::new("https://x/video.mp4").with_duration(5.0)
    }

    #[tokio::test]
    async fn test_falls_back_to_next_provider_after_error() {
        let svc_a = FakeAdapter::new("svcA", Behaviour::SubmitFails("network"));
        let svc_b = FakeAdapter::new("svcB", Behaviour::SucceedsAfterPolls(2, video_result()));
        let orchestrator = orchestrator(&[svc_a.clone(), svc_b.clone()], 4);
        let store = InMemoryJobStore::new();
        let (job_id, request) = new_job(&store).await;

        let outcome = orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap();
        assert_eq!(outcome.provider, "svcB");

        let job = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.provider.as_deref(), Some("svcB"));
        let result = job.result.unwrap();
        assert_eq!(result.url, "https://x/video.mp4");
        assert_eq!(result.duration, Some(5.0));

        assert_eq!(job.attempts.len(), 2);
        assert_eq!(job.attempts[0].provider, "svcA");
        assert!(job.attempts[0].error.as_deref().unwrap().contains("network"));
        assert_eq!(job.attempts[1].outcome, AttemptOutcome::Succeeded);
        assert_eq!(svc_b.polls.load(Ordering::SeqCst), 2);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_chain_lists_reasons_in_attempt_order() {
        let svc_a = FakeAdapter::new("svcA", Behaviour::SubmitFails("network"));
        let svc_b = FakeAdapter::new("svcB", Behaviour::FailsOnPoll("nsfw content"));
        let orchestrator = orchestrator(&[svc_a, svc_b], 4);
        let store = InMemoryJobStore::new();
        let (job_id, request) = new_job(&store).await;

        let err = orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Exhausted { ref failures, .. } if failures.len() == 2));

        let job = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let message = job.error.unwrap();
        let first = message.find("svcA: Request error: network").unwrap();
        let second = message.find("svcB: Generation failed: nsfw content").unwrap();
        assert!(first < second);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_poller_exhaustion_fails_job_with_timeout() {
        let stuck = FakeAdapter::new("svcA", Behaviour::NeverFinishes);
        let orchestrator = orchestrator(&[stuck.clone()], 4);
        let store = InMemoryJobStore::new();
        let (job_id, request) = new_job(&store).await;

        let err = orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(stuck.polls.load(Ordering::SeqCst), 60);

        let job = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("timed out after 60 polls"));
        assert_eq!(job.attempts[0].outcome, AttemptOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_unconfigured_providers_are_skipped_silently() {
        let missing = FakeAdapter::new("svcA", Behaviour::Unconfigured);
        let sync = FakeAdapter::new("svcB", Behaviour::Sync(video_result()));
        let orchestrator = orchestrator(&[missing.clone(), sync], 4);
        let store = InMemoryJobStore::new();
        let (job_id, request) = new_job(&store).await;

        orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap();

        let job = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.attempts.len(), 1);
        assert_eq!(job.attempts[0].provider, "svcB");
        assert_eq!(missing.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_configured_provider_is_distinct_from_exhaustion() {
        let missing = FakeAdapter::new("svcA", Behaviour::Unconfigured);
        let orchestrator = orchestrator(&[missing], 4);
        let store = InMemoryJobStore::new();
        let (job_id, request) = new_job(&store).await;

        let err = orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::NoProviderAvailable { capability: Capability::Video }));

        let job = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_rerun_of_finished_job_does_not_resubmit() {
        let sync = FakeAdapter::new("svcA", Behaviour::Sync(video_result()));
        let orchestrator = orchestrator(&[sync.clone()], 4);
        let store = InMemoryJobStore::new();
        let (job_id, request) = new_job(&store).await;

        orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap();
        let err = orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Store(_)));
        assert_eq!(sync.submits.load(Ordering::SeqCst), 1);
        let job = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_without_calling_providers() {
        let sync = FakeAdapter::new("svcA", Behaviour::Sync(video_result()));
        let orchestrator = orchestrator(&[sync.clone()], 4);
        let store = InMemoryJobStore::new();
        let request = GenerationRequest::new(Capability::Video, " ");
        let job_id = store
            .create(Job::new(&request, PriorityMode::QualityFirst))
            .await
            .unwrap();

        let err = orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
        assert_eq!(sync.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_concurrency_is_limited() {
        let slow = FakeAdapter::new("svcA", Behaviour::SucceedsAfterPolls(3, video_result()));
        let orchestrator = orchestrator(&[slow.clone()], 1);
        let store = InMemoryJobStore::new();
        let (first, request) = new_job(&store).await;
        let (second, _) = new_job(&store).await;

        let (a, b) = futures::join!(
            orchestrator.run(&first, &request, PriorityMode::QualityFirst, &store),
            orchestrator.run(&second, &request, PriorityMode::QualityFirst, &store),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(slow.submits.load(Ordering::SeqCst), 2);
        assert_eq!(slow.max_in_flight.load(Ordering::SeqCst), 1);
    }

    /// Delegates to an in-memory store, failing the first N calls of selected writes
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryJobStore,
        record_failures: AtomicU32,
        complete_failures: AtomicU32,
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn connection_reset() -> JobStoreError {
        JobStoreError::Database("connection reset".into())
    }

    #[async_trait]
    impl JobStore for FlakyStore {
        async fn create(&self, job: Job) -> Result<JobId, JobStoreError> {
            self.inner.create(job).await
        }

        async fn get(&self, job_id: &str) -> Result<Option<Job>, JobStoreError> {
            self.inner.get(job_id).await
        }

        async fn mark_processing(&self, job_id: &str) -> Result<(), JobStoreError> {
            self.inner.mark_processing(job_id).await
        }

        async fn record_attempt(&self, job_id: &str, attempt: AttemptRecord) -> Result<(), JobStoreError> {
            if take_failure(&self.record_failures) {
                return Err(connection_reset());
            }
            self.inner.record_attempt(job_id, attempt).await
        }

        async fn complete(&self, job_id: &str, provider: &str, result: GenerationResult) -> Result<(), JobStoreError> {
            if take_failure(&self.complete_failures) {
                return Err(connection_reset());
            }
            self.inner.complete(job_id, provider, result).await
        }

        async fn fail(&self, job_id: &str, error: &str) -> Result<(), JobStoreError> {
            self.inner.fail(job_id, error).await
        }

        async fn list_recent(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
            self.inner.list_recent(limit).await
        }
    }

    async fn flaky_job(store: &FlakyStore) -> (String, GenerationRequest) {
        let request = GenerationRequest::new(Capability::Video, "a paper boat in the rain");
        let job_id = store
            .create(Job::new(&request, PriorityMode::QualityFirst))
            .await
            .unwrap();
        (job_id, request)
    }

    #[tokio::test]
    async fn test_attempt_log_failure_does_not_lose_the_result() {
        let sync = FakeAdapter::new("svcA", Behaviour::Sync(video_result()));
        let orchestrator = orchestrator(&[sync], 4);
        let store = FlakyStore {
            record_failures: AtomicU32::new(1),
            ..Default::default()
        };
        let (job_id, request) = flaky_job(&store).await;

        let outcome = orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap();
        assert_eq!(outcome.provider, "svcA");

        let job = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.result.unwrap().url, "https://x/video.mp4");
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_completion_is_retried_after_database_error() {
        let sync = FakeAdapter::new("svcA", Behaviour::Sync(video_result()));
        let orchestrator = orchestrator(&[sync], 4).with_store_retry_window(Duration::from_secs(5));
        let store = FlakyStore {
            complete_failures: AtomicU32::new(2),
            ..Default::default()
        };
        let (job_id, request) = flaky_job(&store).await;

        orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap();

        let job = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.provider.as_deref(), Some("svcA"));
    }

    #[tokio::test]
    async fn test_unstorable_result_still_leaves_job_terminal() {
        let sync = FakeAdapter::new("svcA", Behaviour::Sync(video_result()));
        let orchestrator = orchestrator(&[sync], 4).with_store_retry_window(Duration::from_millis(300));
        let store = FlakyStore {
            complete_failures: AtomicU32::new(u32::MAX),
            ..Default::default()
        };
        let (job_id, request) = flaky_job(&store).await;

        let err = orchestrator
            .run(&job_id, &request, PriorityMode::QualityFirst, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Store(_)));

        let job = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("could not be stored"));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_configuration_error_on_submit_disables_provider() {
        let revoked = FakeAdapter::new("svcA", Behaviour::SubmitUnconfigured);
        let sync = FakeAdapter::new("svcB", Behaviour::Sync(video_result()));
        let orchestrator = orchestrator(&[revoked.clone(), sync], 4);
        let store = InMemoryJobStore::new();

        for _ in 0..2 {
            let (job_id, request) = new_job(&store).await;
            let outcome = orchestrator
                .run(&job_id, &request, PriorityMode::QualityFirst, &store)
                .await
                .unwrap();
            assert_eq!(outcome.provider, "svcB");

            let job = store.get(&job_id).await.unwrap().unwrap();
            assert_eq!(job.attempts.len(), 1);
        }

        assert_eq!(revoked.submits.load(Ordering::SeqCst), 1);
        assert!(orchestrator.is_disabled(Capability::Video, "svcA"));
        assert!(!orchestrator.is_disabled(Capability::Video, "svcB"));
    }
}
