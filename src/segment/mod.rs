use crate::config::{ConfigError, PipelineConfig};
use serde::{Deserialize, Serialize};

/// Source media for one job. Immutable once the job starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub source_location: String,
    pub duration_secs: f64,
}

impl Asset {
    pub fn new(source_location: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            source_location: source_location.into(),
            duration_secs,
        }
    }
}

/// One bounded time-slice of the asset, submitted as an independent unit of
/// work. Offsets are asset-global seconds; overlaps record how far this
/// segment reaches past its nominal boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub index: u32,
    pub start_offset: f64,
    pub end_offset: f64,
    pub overlap_left: f64,
    pub overlap_right: f64,
    pub source_location: String,
    pub segment_location: String,
}

impl SegmentDescriptor {
    /// Segment span in seconds, overlaps included.
    pub fn span_secs(&self) -> f64 {
        self.end_offset - self.start_offset
    }

    /// The interval this segment covers exclusively, with the overlapped
    /// edges removed. Used for gap markers when the segment fails.
    pub fn exclusive_interval(&self) -> (f64, f64) {
        (
            self.start_offset + self.overlap_left,
            self.end_offset - self.overlap_right,
        )
    }
}

/// Ordered declaration of all segments for one job. The single source of
/// truth for segment identity and boundaries; read-only after planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub job_id: String,
    pub asset: Asset,
    pub segments: Vec<SegmentDescriptor>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&SegmentDescriptor> {
        self.segments.get(index as usize)
    }
}

/// Plan the overlap-aware partition of `asset` into `ceil(D / L)` segments.
///
/// Segment 0 starts at 0 with no left overlap and the last segment ends
/// exactly at the asset duration with no right overlap. Every internal
/// boundary at `i * L` is extended by the configured overlap on both sides,
/// clamped to `[0, D]`; the recorded overlaps are the actual extensions
/// after clamping.
///
/// Purely a function of `(duration, segment_len, overlap)` — replanning the
/// same inputs always yields an identical manifest.
pub fn plan_manifest(
    job_id: &str,
    asset: &Asset,
    config: &PipelineConfig,
) -> Result<Manifest, ConfigError> {
    config.validate()?;

    let duration = asset.duration_secs;
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ConfigError::InvalidDuration(duration));
    }

    let len = config.segment_len_secs;
    let overlap = config.overlap_secs;
    let count = (duration / len).ceil() as u32;

    let mut segments = Vec::with_capacity(count as usize);
    for index in 0..count {
        let nominal_start = index as f64 * len;
        let nominal_end = if index == count - 1 {
            duration
        } else {
            (index + 1) as f64 * len
        };

        let start_offset = if index == 0 {
            0.0
        } else {
            (nominal_start - overlap).max(0.0)
        };
        let end_offset = if index == count - 1 {
            duration
        } else {
            (nominal_end + overlap).min(duration)
        };

        segments.push(SegmentDescriptor {
            index,
            start_offset,
            end_offset,
            overlap_left: nominal_start - start_offset,
            overlap_right: end_offset - nominal_end,
            source_location: asset.source_location.clone(),
            segment_location: format!("segments/{}/{:03}.wav", job_id, index),
        });
    }

    tracing::debug!(
        job_id,
        segment_count = segments.len(),
        duration_secs = duration,
        "Planned manifest"
    );

    Ok(Manifest {
        job_id: job_id.to_string(),
        asset: asset.clone(),
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn config(len: f64, overlap: f64) -> PipelineConfig {
        PipelineConfig {
            segment_len_secs: len,
            overlap_secs: overlap,
            ..Default::default()
        }
    }

    fn plan(duration: f64, len: f64, overlap: f64) -> Manifest {
        plan_manifest(
            "job-a",
            &Asset::new("media/input.mp3", duration),
            &config(len, overlap),
        )
        .unwrap()
    }

    #[test]
    fn worked_example_5400s() {
        let manifest = plan(5400.0, 600.0, 1.0);
        assert_eq!(manifest.len(), 9);

        let first = &manifest.segments[0];
        assert!((first.start_offset - 0.0).abs() < EPS);
        assert!((first.end_offset - 601.0).abs() < EPS);
        assert!((first.overlap_left).abs() < EPS);
        assert!((first.overlap_right - 1.0).abs() < EPS);

        let second = &manifest.segments[1];
        assert!((second.start_offset - 599.0).abs() < EPS);
        assert!((second.end_offset - 1201.0).abs() < EPS);

        let last = &manifest.segments[8];
        assert!((last.end_offset - 5400.0).abs() < EPS);
        assert!((last.overlap_right).abs() < EPS);
    }

    #[test]
    fn short_asset_yields_single_segment_without_overlap() {
        let manifest = plan(120.0, 600.0, 1.0);
        assert_eq!(manifest.len(), 1);
        let only = &manifest.segments[0];
        assert!((only.start_offset).abs() < EPS);
        assert!((only.end_offset - 120.0).abs() < EPS);
        assert!((only.overlap_left).abs() < EPS);
        assert!((only.overlap_right).abs() < EPS);
    }

    #[test]
    fn nominal_windows_partition_the_duration() {
        for &(duration, len, overlap) in &[
            (5400.0, 600.0, 1.0),
            (1801.5, 600.0, 2.5),
            (90.0, 30.0, 5.0),
            (100.0, 33.0, 0.0),
        ] {
            let manifest = plan(duration, len, overlap);
            let mut cursor = 0.0;
            for segment in &manifest.segments {
                let nominal_start = segment.start_offset + segment.overlap_left;
                let nominal_end = segment.end_offset - segment.overlap_right;
                assert!(
                    (nominal_start - cursor).abs() < EPS,
                    "gap before segment {} for D={duration}",
                    segment.index
                );
                assert!(nominal_end > nominal_start);
                cursor = nominal_end;
            }
            assert!((cursor - duration).abs() < EPS);
        }
    }

    #[test]
    fn overlaps_clamp_at_the_asset_end() {
        // Last nominal boundary at 1200 sits only 10s before the end, so the
        // right extension of segment 1 is clamped from 20 down to 10.
        let manifest = plan(1210.0, 600.0, 20.0);
        assert_eq!(manifest.len(), 3);
        let middle = &manifest.segments[1];
        assert!((middle.end_offset - 1210.0).abs() < EPS);
        assert!((middle.overlap_right - 10.0).abs() < EPS);
        let last = &manifest.segments[2];
        assert!((last.start_offset - 1180.0).abs() < EPS);
        assert!(last.overlap_left < last.span_secs());
    }

    #[test]
    fn replanning_is_deterministic() {
        let a = plan(5400.0, 600.0, 1.0);
        let b = plan(5400.0, 600.0, 1.0);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn indices_are_contiguous_and_sorted() {
        let manifest = plan(5400.0, 600.0, 1.0);
        for (position, segment) in manifest.segments.iter().enumerate() {
            assert_eq!(segment.index as usize, position);
            assert!(segment.end_offset > segment.start_offset);
        }
    }

    #[test]
    fn rejects_invalid_parameters_before_planning() {
        let asset = Asset::new("media/input.mp3", 100.0);
        assert!(matches!(
            plan_manifest("job-a", &asset, &config(0.0, 0.0)),
            Err(ConfigError::InvalidSegmentLength(_))
        ));
        assert!(matches!(
            plan_manifest("job-a", &asset, &config(60.0, 60.0)),
            Err(ConfigError::InvalidOverlap { .. })
        ));
        let empty = Asset::new("media/input.mp3", 0.0);
        assert!(matches!(
            plan_manifest("job-a", &empty, &config(60.0, 1.0)),
            Err(ConfigError::InvalidDuration(_))
        ));
    }
}
