//! End-to-end job runner: plan, persist, dispatch, reconcile, render.

use crate::config::{ConfigError, PipelineConfig};
use crate::export;
use crate::orchestrator::{JobStatus, Orchestrator};
use crate::reconcile::{reconcile, ReconcileError};
use crate::segment::{plan_manifest, Asset, Manifest};
use crate::storage::{ArtifactStore, FinalArtifacts, StorageError};
use crate::worker::{SegmentResult, Transcriber};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Completion signal surfaced to the caller once reconciliation finishes.
#[derive(Debug, Clone, Serialize)]
pub struct JobCompletion {
    pub job_id: String,
    pub status: JobStatus,
    pub artifacts: FinalArtifacts,
    pub completed_at: String,
}

/// Drives one asset from the "new asset available" trigger to the completion
/// signal. Holds no job state of its own; everything per-job lives in the
/// manifest and the persisted results.
pub struct TranscriptionPipeline {
    worker: Arc<dyn Transcriber>,
    store: Arc<dyn ArtifactStore>,
    config: PipelineConfig,
}

impl TranscriptionPipeline {
    pub fn new(
        worker: Arc<dyn Transcriber>,
        store: Arc<dyn ArtifactStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            worker,
            store,
            config,
        }
    }

    /// Run a fresh job for `asset` under a generated job id.
    pub async fn run(&self, asset: &Asset) -> Result<JobCompletion, PipelineError> {
        let job_id = Uuid::new_v4().to_string();
        self.run_job(&job_id, asset, CancellationToken::new()).await
    }

    /// Run a job under a caller-chosen id. Cancelling the token stops new
    /// submissions; results already persisted stay valid, so a later
    /// [`reconcile_persisted`](Self::reconcile_persisted) pass can still
    /// deliver a best-effort transcript.
    pub async fn run_job(
        &self,
        job_id: &str,
        asset: &Asset,
        cancellation: CancellationToken,
    ) -> Result<JobCompletion, PipelineError> {
        self.config.validate()?;

        let manifest = plan_manifest(job_id, asset, &self.config)?;
        self.store.save_manifest(&manifest)?;

        tracing::info!(
            job_id,
            source = %asset.source_location,
            duration_secs = asset.duration_secs,
            segments = manifest.len(),
            "Job triggered"
        );

        let orchestrator = Orchestrator::new(Arc::clone(&self.worker), self.config.clone());
        let outcome = orchestrator
            .run_with_cancellation(&manifest, cancellation)
            .await?;

        for result in outcome.results.values() {
            self.store.save_segment_result(job_id, result)?;
        }

        self.finish(&manifest, &outcome.results)
    }

    /// Re-run reconciliation from persisted state only. The manifest and the
    /// per-segment results are immutable once written, so this is idempotent
    /// and safe after a crash or cancellation.
    pub fn reconcile_persisted(&self, job_id: &str) -> Result<JobCompletion, PipelineError> {
        let manifest = self.store.load_manifest(job_id)?;
        let results = self.store.load_segment_results(job_id)?;
        self.finish(&manifest, &results)
    }

    fn finish(
        &self,
        manifest: &Manifest,
        results: &BTreeMap<u32, SegmentResult>,
    ) -> Result<JobCompletion, PipelineError> {
        let (transcript, _meta) =
            reconcile(manifest, results, self.config.failure_ratio_threshold)?;

        let document = export::to_document(&transcript).map_err(StorageError::from)?;
        let plain_text = export::to_plain_text(&transcript);
        let vtt = export::vtt::render(&transcript);
        let srt = export::srt::render(&transcript);

        let artifacts = self.store.save_transcript_artifacts(
            &transcript.job_id,
            &document,
            &plain_text,
            &vtt,
            &srt,
        )?;

        tracing::info!(
            job_id = %transcript.job_id,
            status = ?transcript.status,
            utterances = transcript.utterances.len(),
            gaps = transcript.gaps.len(),
            "Job completed"
        );

        Ok(JobCompletion {
            job_id: transcript.job_id.clone(),
            status: transcript.status,
            artifacts,
            completed_at: Utc::now().to_rfc3339(),
        })
    }
}
