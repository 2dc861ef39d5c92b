//! Split/dispatch/reconcile pipeline for long-form audio transcription.
//!
//! A long asset is partitioned into overlapping segments, each segment is
//! transcribed independently by an injected worker capability under a
//! bounded-concurrency orchestrator with retries, and the per-segment
//! results are reconciled into one global, time-ordered transcript with
//! boundary duplication removed and missing intervals marked explicitly.

pub mod config;
pub mod export;
pub mod orchestrator;
pub mod pipeline;
pub mod reconcile;
pub mod segment;
pub mod storage;
pub mod worker;

pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{JobStatus, Orchestrator, RunOutcome};
pub use pipeline::{JobCompletion, PipelineError, TranscriptionPipeline};
pub use reconcile::{reconcile, FinalTranscript, GapMarker, ReconcileError, ReconcileMeta};
pub use segment::{plan_manifest, Asset, Manifest, SegmentDescriptor};
pub use storage::{ArtifactStore, FinalArtifacts, FsArtifactStore, StorageError};
pub use worker::{ResultStatus, SegmentResult, SegmentStatus, Transcriber, Utterance, WorkerError};
