// Transcription worker capability.
//
// The pipeline never runs speech-to-text itself; it consumes an injected
// implementation of this trait, so a deterministic stub can stand in for
// the real worker fleet in tests.

mod types;

pub use types::{ResultStatus, SegmentResult, SegmentStatus, Utterance, WorkerError};

use crate::segment::SegmentDescriptor;
use async_trait::async_trait;

/// One call transcribes one segment and completes with the segment-relative
/// utterances or one typed failure. No assumptions are made about the
/// implementation's internal concurrency or resource usage.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, segment: &SegmentDescriptor)
        -> Result<Vec<Utterance>, WorkerError>;

    /// Worker name, for logs.
    fn name(&self) -> &str;
}
