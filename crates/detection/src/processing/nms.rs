use super::decode::Candidate;
use std::{cmp::Ordering, collections::BTreeMap};

/// Overlap ratio at or above which two same-class candidates are duplicates.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Per-class non-maximum suppression.
///
/// Candidates of different classes never suppress each other. Output is
/// ordered by class id, then by descending score; equal scores keep their
/// emission order.
pub fn suppress(candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    let mut groups: BTreeMap<u32, Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
        groups.entry(candidate.class_id).or_default().push(candidate);
    }

    let mut kept = Vec::new();
    for (class_id, mut group) in groups {
        // Stable sort: ties (including 0.0 vs -0.0) stay in emission order
        group.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let before = kept.len();
        let mut suppressed = vec![false; group.len()];
        for i in 0..group.len() {
            if suppressed[i] {
                continue;
            }
            let best = group[i];
            for (j, other) in group.iter().enumerate().skip(i + 1) {
                if !suppressed[j] && best.rect.iou(&other.rect) >= iou_threshold {
                    suppressed[j] = true;
                }
            }
            kept.push(best);
        }

        tracing::trace!(
            class_id,
            candidates = group.len(),
            kept = kept.len() - before,
            "Suppressed class group"
        );
    }

    kept
}
