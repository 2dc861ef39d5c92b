//! Merges per-segment results into one global, deduplicated transcript.
//!
//! Adjacent segments both transcribe the shared overlap window at their
//! boundary; duplication is resolved with a midpoint cutover: content
//! before the overlap midpoint belongs to the earlier segment, content
//! after it to the later one, and an utterance spanning the midpoint stays
//! with whichever side holds the larger share of its duration.

use crate::config::ConfigError;
use crate::orchestrator::JobStatus;
use crate::segment::Manifest;
use crate::worker::{SegmentResult, Utterance};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Epsilon for floating-point timestamp comparisons.
const EPS: f64 = 1e-6;

/// Two reconciled utterances may overlap by at most this much before the
/// post-dedup invariant is considered violated.
const MATERIAL_OVERLAP_SECS: f64 = 0.05;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Ordering invariant violated near {at:.3}s: utterances overlap by {overlap:.3}s")]
    OrderingInvariant { at: f64, overlap: f64 },
}

/// Explicit placeholder for an interval with no available transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapMarker {
    pub index: u32,
    pub start: f64,
    pub end: f64,
}

/// The reconciled, asset-global transcript. Derived once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalTranscript {
    pub job_id: String,
    pub status: JobStatus,
    pub duration_secs: f64,
    pub utterances: Vec<Utterance>,
    pub gaps: Vec<GapMarker>,
}

/// Counters describing what reconciliation dropped or demoted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileMeta {
    pub segments_merged: usize,
    pub segments_demoted: usize,
    pub dropped_overlap: usize,
    pub dropped_empty: usize,
}

/// Reconcile the full result set against the manifest.
///
/// Results are re-indexed by segment index, never by arrival order, so the
/// outcome is independent of completion order. Failed or missing segments
/// become gap markers; a Succeeded segment carrying malformed timestamps is
/// demoted to a gap as well. The job status is re-evaluated against the
/// failure-ratio threshold after demotions.
pub fn reconcile(
    manifest: &Manifest,
    results: &BTreeMap<u32, SegmentResult>,
    failure_ratio_threshold: f64,
) -> Result<(FinalTranscript, ReconcileMeta), ReconcileError> {
    if manifest.is_empty() {
        return Err(ConfigError::EmptyManifest.into());
    }

    let mut meta = ReconcileMeta::default();

    // Segments contributing utterances: Succeeded, present, and well-formed.
    let mut alive: BTreeSet<u32> = BTreeSet::new();
    for descriptor in &manifest.segments {
        match results.get(&descriptor.index) {
            Some(result) if result.is_succeeded() => {
                if utterances_well_formed(&result.utterances, descriptor.span_secs()) {
                    alive.insert(descriptor.index);
                } else {
                    tracing::warn!(
                        segment = descriptor.index,
                        "Malformed utterance timestamps, demoting segment to a gap"
                    );
                    meta.segments_demoted += 1;
                }
            }
            _ => {}
        }
    }

    let mut merged: Vec<Utterance> = Vec::new();
    let mut gaps: Vec<GapMarker> = Vec::new();

    for descriptor in &manifest.segments {
        let index = descriptor.index;
        if !alive.contains(&index) {
            let (start, end) = descriptor.exclusive_interval();
            gaps.push(GapMarker { index, start, end });
            continue;
        }

        let utterances = &results
            .get(&index)
            .expect("alive segment has a result")
            .utterances;

        // Cutover midpoints toward whichever neighbors carry content for
        // the shared window. A failed neighbor contributes nothing, so this
        // segment keeps its whole side of that boundary.
        let left_midpoint = if index > 0 && alive.contains(&(index - 1)) {
            manifest.get(index - 1).map(|previous| {
                (descriptor.start_offset + previous.end_offset) / 2.0
            })
        } else {
            None
        };
        let right_midpoint = if alive.contains(&(index + 1)) {
            manifest.get(index + 1).map(|next| {
                (next.start_offset + descriptor.end_offset) / 2.0
            })
        } else {
            None
        };

        for utterance in utterances {
            let start = utterance.start + descriptor.start_offset;
            let end = utterance.end + descriptor.start_offset;

            if utterance.text.trim().is_empty() {
                meta.dropped_empty += 1;
                continue;
            }

            if let Some(m) = left_midpoint {
                // The earlier segment owns everything up to the midpoint.
                if end <= m + EPS {
                    meta.dropped_overlap += 1;
                    continue;
                }
                // Spanning utterance: the later segment keeps it only when
                // the larger share of its duration lies after the midpoint.
                if start < m && (end - m) <= (m - start) {
                    meta.dropped_overlap += 1;
                    continue;
                }
            }

            if let Some(m) = right_midpoint {
                if start >= m - EPS {
                    meta.dropped_overlap += 1;
                    continue;
                }
                // Spanning utterance: kept here when at least half of it
                // lies before the midpoint (ties go to the earlier segment).
                if end > m && (end - m) > (m - start) {
                    meta.dropped_overlap += 1;
                    continue;
                }
            }

            merged.push(Utterance {
                start,
                end,
                text: utterance.text.clone(),
                confidence: utterance.confidence,
            });
        }

        meta.segments_merged += 1;
    }

    merged.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.end
                    .partial_cmp(&b.end)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    assert_ordering(&merged)?;

    let failed = manifest.len() - alive.len();
    let status = crate::orchestrator::job_status(failed, manifest.len(), failure_ratio_threshold);

    tracing::info!(
        job_id = %manifest.job_id,
        utterances = merged.len(),
        gaps = gaps.len(),
        demoted = meta.segments_demoted,
        dropped_overlap = meta.dropped_overlap,
        "Reconciled transcript"
    );

    Ok((
        FinalTranscript {
            job_id: manifest.job_id.clone(),
            status,
            duration_secs: manifest.asset.duration_secs,
            utterances: merged,
            gaps,
        },
        meta,
    ))
}

fn utterances_well_formed(utterances: &[Utterance], span_secs: f64) -> bool {
    utterances.iter().all(|u| {
        u.start.is_finite()
            && u.end.is_finite()
            && u.start >= -EPS
            && u.end > u.start
            && u.end <= span_secs + EPS
    })
}

fn assert_ordering(merged: &[Utterance]) -> Result<(), ReconcileError> {
    for pair in merged.windows(2) {
        let overlap = pair[0].end - pair[1].start;
        if overlap > MATERIAL_OVERLAP_SECS {
            return Err(ReconcileError::OrderingInvariant {
                at: pair[1].start,
                overlap,
            });
        }
    }
    Ok(())
}
