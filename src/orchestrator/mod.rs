use crate::config::{ConfigError, PipelineConfig};
use crate::segment::{Manifest, SegmentDescriptor};
use crate::worker::{SegmentResult, SegmentStatus, Transcriber, WorkerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub mod retry;

use retry::RetryPolicy;

/// Job-level outcome once every segment is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Succeeded,
    Partial,
    Failed,
}

/// Everything the orchestrator hands to the reconciler: one result per
/// segment (Failed placeholders included) plus the aggregate status.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: JobStatus,
    pub results: BTreeMap<u32, SegmentResult>,
}

/// The only shared mutable state in the pipeline. Every completion
/// notification serializes its update through the owning mutex; results are
/// index-addressable so reconciliation can restore manifest order no matter
/// which order completions arrived in.
struct StatusTable {
    statuses: Vec<SegmentStatus>,
    results: BTreeMap<u32, SegmentResult>,
}

impl StatusTable {
    fn new(segment_count: usize) -> Self {
        Self {
            statuses: vec![SegmentStatus::Pending; segment_count],
            results: BTreeMap::new(),
        }
    }

    fn transition(&mut self, index: u32, status: SegmentStatus) {
        self.statuses[index as usize] = status;
    }

    /// Record a terminal result. Last write wins on retry, but a segment
    /// already marked terminal is never overwritten.
    fn record(&mut self, result: SegmentResult) {
        let index = result.index;
        if self.statuses[index as usize].is_terminal() {
            return;
        }
        self.statuses[index as usize] = if result.is_succeeded() {
            SegmentStatus::Succeeded
        } else {
            SegmentStatus::Failed
        };
        self.results.insert(index, result);
    }
}

/// Drives every segment of a manifest to a terminal state against the
/// injected worker capability, with at most `max_concurrency` segments in
/// flight. Submission follows manifest order; completion order is
/// unconstrained.
pub struct Orchestrator {
    worker: Arc<dyn Transcriber>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(worker: Arc<dyn Transcriber>, config: PipelineConfig) -> Self {
        Self { worker, config }
    }

    pub async fn run(&self, manifest: &Manifest) -> Result<RunOutcome, ConfigError> {
        self.run_with_cancellation(manifest, CancellationToken::new())
            .await
    }

    /// Run the manifest to quiescence. Cancelling the token stops new
    /// submissions and best-effort-cancels in-flight segments; segments that
    /// already succeeded keep their results.
    pub async fn run_with_cancellation(
        &self,
        manifest: &Manifest,
        cancellation: CancellationToken,
    ) -> Result<RunOutcome, ConfigError> {
        if manifest.is_empty() {
            return Err(ConfigError::EmptyManifest);
        }

        let segment_count = manifest.len();
        let table = Arc::new(Mutex::new(StatusTable::new(segment_count)));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();

        tracing::info!(
            job_id = %manifest.job_id,
            segments = segment_count,
            concurrency = self.config.max_concurrency,
            worker = self.worker.name(),
            "Dispatching manifest"
        );

        for descriptor in manifest.segments.iter().cloned() {
            let worker = Arc::clone(&self.worker);
            let table = Arc::clone(&table);
            let semaphore = Arc::clone(&semaphore);
            let cancellation = cancellation.clone();
            let policy = RetryPolicy::new(self.config.max_retries, self.config.retry_base_delay());
            let timeout = self.config.segment_timeout();

            tasks.spawn(async move {
                drive_segment(descriptor, worker, table, semaphore, cancellation, policy, timeout)
                    .await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Segment task aborted: {e}");
            }
        }

        let mut table = table.lock().await;
        // A task that aborted before reaching a terminal state leaves its
        // segment without a result; close it out as Failed.
        for index in 0..segment_count as u32 {
            if !table.statuses[index as usize].is_terminal() {
                table.record(SegmentResult::failed(index));
            }
        }

        let results = std::mem::take(&mut table.results);
        let failed = results.values().filter(|r| !r.is_succeeded()).count();
        let status = job_status(failed, segment_count, self.config.failure_ratio_threshold);

        tracing::info!(
            job_id = %manifest.job_id,
            failed,
            total = segment_count,
            ?status,
            "Manifest drained"
        );

        Ok(RunOutcome { status, results })
    }
}

pub(crate) fn job_status(failed: usize, total: usize, threshold: f64) -> JobStatus {
    if failed as f64 / total as f64 > threshold {
        JobStatus::Failed
    } else if failed == 0 {
        JobStatus::Succeeded
    } else {
        JobStatus::Partial
    }
}

/// Private state machine for one segment:
/// `Pending -> Submitted -> Running -> {Succeeded | Retrying -> Submitted | Failed}`.
async fn drive_segment(
    descriptor: SegmentDescriptor,
    worker: Arc<dyn Transcriber>,
    table: Arc<Mutex<StatusTable>>,
    semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
    policy: RetryPolicy,
    timeout: std::time::Duration,
) {
    let index = descriptor.index;

    let _permit = tokio::select! {
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                table.lock().await.record(SegmentResult::failed(index));
                return;
            }
        },
        _ = cancellation.cancelled() => {
            tracing::debug!(segment = index, "Cancelled before submission");
            table.lock().await.record(SegmentResult::failed(index));
            return;
        }
    };

    table.lock().await.transition(index, SegmentStatus::Submitted);

    let mut attempt = 0u8;
    loop {
        table.lock().await.transition(index, SegmentStatus::Running);

        let outcome = tokio::select! {
            attempted = tokio::time::timeout(timeout, worker.transcribe(&descriptor)) => {
                match attempted {
                    Ok(result) => result,
                    Err(_) => Err(WorkerError::Transient("attempt timed out".to_string())),
                }
            }
            _ = cancellation.cancelled() => {
                tracing::debug!(segment = index, "Cancelled in flight");
                table.lock().await.record(SegmentResult::failed(index));
                return;
            }
        };

        match outcome {
            Ok(utterances) => {
                tracing::info!(
                    segment = index,
                    utterances = utterances.len(),
                    "Segment succeeded"
                );
                table
                    .lock()
                    .await
                    .record(SegmentResult::succeeded(index, utterances));
                return;
            }
            Err(e) => {
                tracing::warn!(
                    segment = index,
                    attempt = attempt + 1,
                    "Segment attempt failed: {e}"
                );

                if policy.should_retry(attempt, &e) {
                    table.lock().await.transition(index, SegmentStatus::Retrying);
                    policy.wait_before_retry(attempt).await;
                    attempt += 1;
                    table.lock().await.transition(index, SegmentStatus::Submitted);
                    continue;
                }

                table.lock().await.record(SegmentResult::failed(index));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{plan_manifest, Asset};
    use crate::worker::Utterance;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            segment_len_secs: 600.0,
            overlap_secs: 1.0,
            max_concurrency: 4,
            max_retries: 2,
            retry_base_secs: 0,
            segment_timeout_secs: 30,
            failure_ratio_threshold: 0.5,
        }
    }

    fn manifest(duration: f64) -> Manifest {
        plan_manifest(
            "job-test",
            &Asset::new("media/input.mp3", duration),
            &test_config(),
        )
        .unwrap()
    }

    /// Succeeds every segment with one utterance, counting attempts.
    struct HappyWorker {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transcriber for HappyWorker {
        async fn transcribe(
            &self,
            segment: &SegmentDescriptor,
        ) -> Result<Vec<Utterance>, WorkerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Utterance::new(0.5, 2.0, format!("segment {}", segment.index))])
        }

        fn name(&self) -> &str {
            "happy-stub"
        }
    }

    /// Fails each segment transiently a fixed number of times, then succeeds.
    struct FlakyWorker {
        failures_before_success: u32,
        attempts: Mutex<BTreeMap<u32, u32>>,
    }

    #[async_trait]
    impl Transcriber for FlakyWorker {
        async fn transcribe(
            &self,
            segment: &SegmentDescriptor,
        ) -> Result<Vec<Utterance>, WorkerError> {
            let mut attempts = self.attempts.lock().await;
            let seen = attempts.entry(segment.index).or_insert(0);
            *seen += 1;
            if *seen <= self.failures_before_success {
                Err(WorkerError::Transient("infra blip".to_string()))
            } else {
                Ok(vec![Utterance::new(0.0, 1.0, "ok")])
            }
        }

        fn name(&self) -> &str {
            "flaky-stub"
        }
    }

    struct FailingWorker {
        error: fn() -> WorkerError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transcriber for FailingWorker {
        async fn transcribe(
            &self,
            _segment: &SegmentDescriptor,
        ) -> Result<Vec<Utterance>, WorkerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }

        fn name(&self) -> &str {
            "failing-stub"
        }
    }

    #[tokio::test]
    async fn all_segments_reach_terminal_success() {
        let worker = Arc::new(HappyWorker {
            calls: AtomicU32::new(0),
        });
        let orchestrator = Orchestrator::new(worker.clone(), test_config());
        let outcome = orchestrator.run(&manifest(5400.0)).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Succeeded);
        assert_eq!(outcome.results.len(), 9);
        assert!(outcome.results.values().all(|r| r.is_succeeded()));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_success() {
        // max_retries = 2 allows 3 attempts; 2 transient failures then success.
        let worker = Arc::new(FlakyWorker {
            failures_before_success: 2,
            attempts: Mutex::new(BTreeMap::new()),
        });
        let orchestrator = Orchestrator::new(worker.clone(), test_config());
        let outcome = orchestrator.run(&manifest(600.0)).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Succeeded);
        assert_eq!(*worker.attempts.lock().await.get(&0).unwrap(), 3);
    }

    #[tokio::test]
    async fn retry_budget_is_exhausted_without_extra_attempts() {
        let worker = Arc::new(FailingWorker {
            error: || WorkerError::Transient("infra blip".to_string()),
            calls: AtomicU32::new(0),
        });
        let orchestrator = Orchestrator::new(worker.clone(), test_config());
        let outcome = orchestrator.run(&manifest(600.0)).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(!outcome.results.get(&0).unwrap().is_succeeded());
        // max_retries = 2, so exactly 3 attempts.
        assert_eq!(worker.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let worker = Arc::new(FailingWorker {
            error: || WorkerError::Permanent("corrupt audio".to_string()),
            calls: AtomicU32::new(0),
        });
        let orchestrator = Orchestrator::new(worker.clone(), test_config());
        let outcome = orchestrator.run(&manifest(600.0)).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_counts_as_transient_and_is_retried() {
        struct SlowWorker {
            calls: AtomicU32,
        }

        #[async_trait]
        impl Transcriber for SlowWorker {
            async fn transcribe(
                &self,
                _segment: &SegmentDescriptor,
            ) -> Result<Vec<Utterance>, WorkerError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }

            fn name(&self) -> &str {
                "slow-stub"
            }
        }

        let worker = Arc::new(SlowWorker {
            calls: AtomicU32::new(0),
        });
        let config = PipelineConfig {
            segment_timeout_secs: 0,
            max_retries: 1,
            ..test_config()
        };
        let orchestrator = Orchestrator::new(worker.clone(), config);
        let outcome = orchestrator.run(&manifest(600.0)).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(worker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrency_bound_is_never_exceeded() {
        struct GaugedWorker {
            in_flight: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait]
        impl Transcriber for GaugedWorker {
            async fn transcribe(
                &self,
                _segment: &SegmentDescriptor,
            ) -> Result<Vec<Utterance>, WorkerError> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(vec![Utterance::new(0.0, 1.0, "ok")])
            }

            fn name(&self) -> &str {
                "gauged-stub"
            }
        }

        let worker = Arc::new(GaugedWorker {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = PipelineConfig {
            max_concurrency: 2,
            ..test_config()
        };
        let orchestrator = Orchestrator::new(worker.clone(), config);
        let outcome = orchestrator.run(&manifest(5400.0)).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Succeeded);
        assert!(worker.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn partial_failure_is_isolated_from_sibling_segments() {
        struct OneBadSegment;

        #[async_trait]
        impl Transcriber for OneBadSegment {
            async fn transcribe(
                &self,
                segment: &SegmentDescriptor,
            ) -> Result<Vec<Utterance>, WorkerError> {
                if segment.index == 3 {
                    Err(WorkerError::Permanent("unreadable".to_string()))
                } else {
                    Ok(vec![Utterance::new(0.0, 1.0, "ok")])
                }
            }

            fn name(&self) -> &str {
                "one-bad-stub"
            }
        }

        let orchestrator = Orchestrator::new(Arc::new(OneBadSegment), test_config());
        let outcome = orchestrator.run(&manifest(5400.0)).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Partial);
        assert_eq!(outcome.results.len(), 9);
        assert!(!outcome.results.get(&3).unwrap().is_succeeded());
        let succeeded = outcome.results.values().filter(|r| r.is_succeeded()).count();
        assert_eq!(succeeded, 8);
    }

    #[tokio::test]
    async fn failure_ratio_escalates_to_job_failure() {
        struct MostlyBad;

        #[async_trait]
        impl Transcriber for MostlyBad {
            async fn transcribe(
                &self,
                segment: &SegmentDescriptor,
            ) -> Result<Vec<Utterance>, WorkerError> {
                if segment.index < 2 {
                    Ok(vec![Utterance::new(0.0, 1.0, "ok")])
                } else {
                    Err(WorkerError::Permanent("unreadable".to_string()))
                }
            }

            fn name(&self) -> &str {
                "mostly-bad-stub"
            }
        }

        // 7 of 9 failed > 0.5 threshold.
        let orchestrator = Orchestrator::new(Arc::new(MostlyBad), test_config());
        let outcome = orchestrator.run(&manifest(5400.0)).await.unwrap();
        assert_eq!(outcome.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn cancellation_preserves_completed_results() {
        struct FirstFastThenHang;

        #[async_trait]
        impl Transcriber for FirstFastThenHang {
            async fn transcribe(
                &self,
                segment: &SegmentDescriptor,
            ) -> Result<Vec<Utterance>, WorkerError> {
                if segment.index == 0 {
                    Ok(vec![Utterance::new(0.0, 1.0, "first")])
                } else {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
            }

            fn name(&self) -> &str {
                "hang-stub"
            }
        }

        let orchestrator = Orchestrator::new(Arc::new(FirstFastThenHang), test_config());
        let token = CancellationToken::new();
        let manifest = manifest(5400.0);

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let outcome = orchestrator
            .run_with_cancellation(&manifest, token)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 9);
        assert!(outcome.results.get(&0).unwrap().is_succeeded());
        assert!(outcome
            .results
            .values()
            .filter(|r| r.index != 0)
            .all(|r| !r.is_succeeded()));
    }

    #[tokio::test]
    async fn empty_manifest_is_rejected() {
        let orchestrator = Orchestrator::new(
            Arc::new(HappyWorker {
                calls: AtomicU32::new(0),
            }),
            test_config(),
        );
        let empty = Manifest {
            job_id: "job-test".to_string(),
            asset: Asset::new("media/input.mp3", 1.0),
            segments: Vec::new(),
        };
        assert!(matches!(
            orchestrator.run(&empty).await,
            Err(ConfigError::EmptyManifest)
        ));
    }
}
