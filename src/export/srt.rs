//! SRT (SubRip) caption rendering.

use super::timeline;
use crate::reconcile::FinalTranscript;

/// Format seconds as `HH:MM:SS,mmm` for SubRip.
pub fn format_timestamp(secs: f64) -> String {
    let mut ms = (secs * 1000.0).round() as u64;
    let hours = ms / 3_600_000;
    ms -= hours * 3_600_000;
    let mins = ms / 60_000;
    ms -= mins * 60_000;
    let seconds = ms / 1_000;
    ms -= seconds * 1_000;
    format!("{:02}:{:02}:{:02},{:03}", hours, mins, seconds, ms)
}

pub fn render(transcript: &FinalTranscript) -> String {
    let mut out = String::new();
    for (i, cue) in timeline(transcript).iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start),
            format_timestamp(cue.end),
            cue.text
        ));
    }
    out
}
