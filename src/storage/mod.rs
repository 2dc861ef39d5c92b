//! Job-keyed artifact persistence.
//!
//! Layout under the store root, one directory per job:
//!
//! ```text
//! <root>/<job_id>/manifest.json
//! <root>/<job_id>/segments/NNN.json
//! <root>/<job_id>/final/transcript.{json,txt,vtt,srt}
//! ```
//!
//! Everything is write-once: the manifest after planning, each segment
//! result once it is terminal, the final artifacts after reconciliation.
//! Reconciliation can be re-run from storage alone.

use crate::segment::Manifest;
use crate::worker::SegmentResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failure: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("No manifest stored for job {0}")]
    ManifestNotFound(String),
}

/// Locations of the rendered transcript artifacts for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalArtifacts {
    pub document: String,
    pub plain_text: String,
    pub vtt: String,
    pub srt: String,
}

pub trait ArtifactStore: Send + Sync {
    fn save_manifest(&self, manifest: &Manifest) -> Result<(), StorageError>;
    fn load_manifest(&self, job_id: &str) -> Result<Manifest, StorageError>;

    fn save_segment_result(&self, job_id: &str, result: &SegmentResult)
        -> Result<(), StorageError>;
    fn load_segment_results(&self, job_id: &str)
        -> Result<BTreeMap<u32, SegmentResult>, StorageError>;

    fn save_transcript_artifacts(
        &self,
        job_id: &str,
        document: &str,
        plain_text: &str,
        vtt: &str,
        srt: &str,
    ) -> Result<FinalArtifacts, StorageError>;
}

/// Filesystem-backed store.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    fn manifest_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join("manifest.json")
    }

    fn segment_path(&self, job_id: &str, index: u32) -> PathBuf {
        self.job_dir(job_id)
            .join("segments")
            .join(format!("{:03}.json", index))
    }

    fn write_file(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save_manifest(&self, manifest: &Manifest) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(manifest)?;
        Self::write_file(&self.manifest_path(&manifest.job_id), json.as_bytes())?;
        tracing::debug!(job_id = %manifest.job_id, "Persisted manifest");
        Ok(())
    }

    fn load_manifest(&self, job_id: &str) -> Result<Manifest, StorageError> {
        let path = self.manifest_path(job_id);
        if !path.exists() {
            return Err(StorageError::ManifestNotFound(job_id.to_string()));
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save_segment_result(
        &self,
        job_id: &str,
        result: &SegmentResult,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(result)?;
        Self::write_file(&self.segment_path(job_id, result.index), json.as_bytes())
    }

    fn load_segment_results(
        &self,
        job_id: &str,
    ) -> Result<BTreeMap<u32, SegmentResult>, StorageError> {
        let dir = self.job_dir(job_id).join("segments");
        let mut results = BTreeMap::new();
        if !dir.exists() {
            return Ok(results);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path)?;
            let result: SegmentResult = serde_json::from_str(&raw)?;
            results.insert(result.index, result);
        }
        Ok(results)
    }

    fn save_transcript_artifacts(
        &self,
        job_id: &str,
        document: &str,
        plain_text: &str,
        vtt: &str,
        srt: &str,
    ) -> Result<FinalArtifacts, StorageError> {
        let final_dir = self.job_dir(job_id).join("final");
        let artifacts = FinalArtifacts {
            document: final_dir.join("transcript.json").display().to_string(),
            plain_text: final_dir.join("transcript.txt").display().to_string(),
            vtt: final_dir.join("transcript.vtt").display().to_string(),
            srt: final_dir.join("transcript.srt").display().to_string(),
        };

        Self::write_file(Path::new(&artifacts.document), document.as_bytes())?;
        Self::write_file(Path::new(&artifacts.plain_text), plain_text.as_bytes())?;
        Self::write_file(Path::new(&artifacts.vtt), vtt.as_bytes())?;
        Self::write_file(Path::new(&artifacts.srt), srt.as_bytes())?;

        tracing::info!(job_id, "Persisted final transcript artifacts");
        Ok(artifacts)
    }
}
