// src/providers/poller.rs
//! Bounded completion polling for asynchronous providers.
//!
//! Fixed interval, no backoff growth. Optional jitter spreads out polls when many jobs
//! target the same provider. The loop only suspends on `tokio::time::sleep` and on the
//! provider call itself, so dropping the future cancels it.

use std::time::{Duration, Instant};

use rand::Rng;

use super::{PollOutcome, ProviderAdapter, SubmissionHandle};
use crate::error::PollError;
use crate::types::GenerationResult;

#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Upper bound of the random delay added to each sleep
    pub jitter: Duration,
    /// Wall-clock cap on the whole loop, in addition to the attempt bound
    pub max_elapsed: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
            jitter: Duration::from_millis(250),
            max_elapsed: None,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.interval;
        }
        let extra_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        self.interval + Duration::from_millis(extra_ms)
    }
}

/// Sleep, poll, repeat until the provider reports a terminal state or the bounds run out
pub async fn poll_until_complete(
    adapter: &dyn ProviderAdapter,
    handle: &SubmissionHandle,
    policy: &PollPolicy,
) -> Result<GenerationResult, PollError> {
    let started = Instant::now();

    for attempt in 1..=policy.max_attempts {
        if let Some(max_elapsed) = policy.max_elapsed {
            if started.elapsed() >= max_elapsed {
                tracing::warn!(
                    provider = %adapter.name(),
                    external_id = %handle.external_id,
                    attempt,
                    "Polling wall-clock limit reached"
                );
                return Err(PollError::Timeout { attempts: attempt - 1 });
            }
        }

        tokio::time::sleep(policy.next_delay()).await;

        match adapter.poll_status(handle).await? {
            PollOutcome::Running => {
                tracing::debug!(
                    provider = %adapter.name(),
                    external_id = %handle.external_id,
                    attempt,
                    "Still running"
                );
            }
            PollOutcome::Succeeded(result) => {
                tracing::info!(
                    provider = %adapter.name(),
                    external_id = %handle.external_id,
                    attempt,
                    "External job succeeded"
                );
                return Ok(result);
            }
            PollOutcome::Failed(detail) => {
                return Err(PollError::Provider(crate::error::ProviderError::Failed(detail)));
            }
        }
    }

    Err(PollError::Timeout {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::Submission;
    use crate::types::{Capability, CostClass, GenerationRequest};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed script of poll outcomes
    struct Scripted {
        outcomes: Mutex<Vec<PollOutcome>>,
        polls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<PollOutcome>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                polls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn capability(&self) -> Capability {
            Capability::Video
        }
        fn cost_class(&self) -> CostClass {
            CostClass::Free
        }
        fn check_configured(&self) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn submit(&self, _request: &GenerationRequest) -> Result<Submission, ProviderError> {
            Ok(Submission::Pending(SubmissionHandle::new("scripted", "job-1")))
        }
        async fn poll_status(&self, _handle: &SubmissionHandle) -> Result<PollOutcome, ProviderError> {
            *self.polls.lock().unwrap() += 1;
            Ok(self.outcomes.lock().unwrap().pop().unwrap_or(PollOutcome::Running))
        }
    }

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), max_attempts).with_jitter(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_returns_result_once_succeeded() {
        let adapter = Scripted::new(vec![
            PollOutcome::Running,
            PollOutcome::Succeeded(GenerationResult::new("https://x/video.mp4")),
        ]);
        let handle = SubmissionHandle::new("scripted", "job-1");

        let result = poll_until_complete(&adapter, &handle, &fast(10)).await.unwrap();
        assert_eq!(result.url, "https://x/video.mp4");
        assert_eq!(*adapter.polls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_carries_detail() {
        let adapter = Scripted::new(vec![PollOutcome::Failed("content policy".into())]);
        let handle = SubmissionHandle::new("scripted", "job-1");

        let err = poll_until_complete(&adapter, &handle, &fast(10)).await.unwrap_err();
        match err {
            PollError::Provider(ProviderError::Failed(detail)) => assert_eq!(detail, "content policy"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_times_out_after_max_attempts() {
        let adapter = Scripted::new(vec![]);
        let handle = SubmissionHandle::new("scripted", "job-1");

        let err = poll_until_complete(&adapter, &handle, &fast(5)).await.unwrap_err();
        assert!(matches!(err, PollError::Timeout { attempts: 5 }));
        assert_eq!(*adapter.polls.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_wall_clock_limit_stops_early() {
        let adapter = Scripted::new(vec![]);
        let handle = SubmissionHandle::new("scripted", "job-1");
        let policy = PollPolicy::new(Duration::from_millis(20), 1_000)
            .with_jitter(Duration::ZERO)
            .with_max_elapsed(Duration::from_millis(50));

        let err = poll_until_complete(&adapter, &handle, &policy).await.unwrap_err();
        match err {
            PollError::Timeout { attempts } => assert!(attempts < 1_000),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = PollPolicy::new(Duration::from_millis(100), 1).with_jitter(Duration::from_millis(50));
        for _ in 0..100 {
            let delay = policy.next_delay();
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(150));
        }
    }
}
