//! Deterministic renderings of a reconciled transcript.
//!
//! Every format is derived from the same time-ordered cue sequence, so two
//! reconciliation passes over identical results produce byte-identical
//! artifacts.

pub mod srt;
pub mod vtt;

use crate::reconcile::FinalTranscript;

/// Cue text standing in for a gap interval in caption output.
pub const GAP_TEXT: &str = "[transcript unavailable]";

pub(crate) struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Utterances and gap markers merged into one time-ordered cue list.
pub(crate) fn timeline(transcript: &FinalTranscript) -> Vec<Cue> {
    let mut cues: Vec<Cue> = transcript
        .utterances
        .iter()
        .map(|u| Cue {
            start: u.start,
            end: u.end,
            text: u.text.clone(),
        })
        .collect();

    cues.extend(transcript.gaps.iter().map(|gap| Cue {
        start: gap.start,
        end: gap.end,
        text: GAP_TEXT.to_string(),
    }));

    cues.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.end
                    .partial_cmp(&b.end)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });
    cues
}

/// Structured JSON document: the full utterance list with metadata and the
/// gap list, pretty-printed.
pub fn to_document(transcript: &FinalTranscript) -> serde_json::Result<String> {
    serde_json::to_string_pretty(transcript)
}

/// Plain-text rendering, one line per cue. Gap intervals are spelled out
/// with their timestamps so missing audio is never silently elided.
pub fn to_plain_text(transcript: &FinalTranscript) -> String {
    let cues = timeline(transcript);
    let mut out = String::new();
    for cue in &cues {
        if cue.text == GAP_TEXT {
            out.push_str(&format!(
                "[no transcript {} - {}]\n",
                vtt::format_timestamp(cue.start),
                vtt::format_timestamp(cue.end)
            ));
        } else {
            out.push_str(&cue.text);
            out.push('\n');
        }
    }
    out
}
