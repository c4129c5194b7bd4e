// Domain rules - Clip classification and export path selection

use std::fmt;

use crate::domain::model::*;

/// Why a clip cannot be stream-copied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReencodeReason {
    Effects,
    Adjustments,
    Transitions,
    Transform,
    Audio,
    Trimmed,
    TextOverlay,
    Speed,
}

impl fmt::Display for ReencodeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReencodeReason::Effects => "has effects",
            ReencodeReason::Adjustments => "has colour or opacity adjustments",
            ReencodeReason::Transitions => "has transitions",
            ReencodeReason::Transform => "has a transform",
            ReencodeReason::Audio => "changes audio level",
            ReencodeReason::Trimmed => "is trimmed",
            ReencodeReason::TextOverlay => "is a text overlay",
            ReencodeReason::Speed => "changes playback speed",
        };
        f.write_str(s)
    }
}

/// Partition of a job's clips into re-encode and stream-copy sets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipClassification {
    pub needs_reencode: Vec<Clip>,
    pub stream_copy_eligible: Vec<Clip>,
}

impl ClipClassification {
    /// True when no clip needs rendering
    pub fn is_fast_path(&self) -> bool {
        self.needs_reencode.is_empty()
    }

    pub fn total(&self) -> usize {
        self.needs_reencode.len() + self.stream_copy_eligible.len()
    }
}

/// Decides per clip whether a re-encode is required
pub struct ClipClassifier;

impl ClipClassifier {
    /// Partition clips preserving their relative order; never fails
    pub fn classify(clips: &[Clip]) -> ClipClassification {
        let mut classification = ClipClassification::default();
        for clip in clips {
            match Self::reencode_reason(clip) {
                Some(reason) => {
                    tracing::debug!(clip_id = %clip.id, %reason, "Clip needs re-encoding");
                    classification.needs_reencode.push(clip.clone());
                }
                None => classification.stream_copy_eligible.push(clip.clone()),
            }
        }
        classification
    }

    /// True when the clip cannot be produced by a remux
    pub fn needs_reencode(clip: &Clip) -> bool {
        Self::reencode_reason(clip).is_some()
    }

    /// First rule that forces a re-encode, if any
    pub fn reencode_reason(clip: &Clip) -> Option<ReencodeReason> {
        if clip.is_text_overlay() {
            return Some(ReencodeReason::TextOverlay);
        }
        if !clip.effects.is_empty() {
            return Some(ReencodeReason::Effects);
        }
        if Self::has_adjustments(clip) {
            return Some(ReencodeReason::Adjustments);
        }
        if clip.transitions.any() {
            return Some(ReencodeReason::Transitions);
        }
        if clip.transform.is_some() {
            return Some(ReencodeReason::Transform);
        }
        if clip.volume != 1.0 || clip.muted {
            return Some(ReencodeReason::Audio);
        }
        if !clip.is_untrimmed() {
            return Some(ReencodeReason::Trimmed);
        }
        if clip.speed != 1.0 {
            return Some(ReencodeReason::Speed);
        }
        None
    }

    /// Clip-level adjustments that produce a filter fragment
    fn has_adjustments(clip: &Clip) -> bool {
        !clip.grading.is_neutral()
            || matches!(
                clip.filter,
                StyleFilter::Blur | StyleFilter::Sharpen | StyleFilter::Vintage | StyleFilter::Sepia
            )
            || clip.opacity != 100.0
            || clip.fade_in > 0.0
            || clip.fade_out > 0.0
            || clip.chroma_key.as_ref().map_or(false, |key| key.enabled)
    }
}
