use super::decode::Candidate;
use crate::{
    backend::{DetectronOutput, MASK_SIDE, NUM_KEYPOINTS},
    geometry::{Rect, ScaleFactors},
    labels::LabelTable,
};
use serde::{Deserialize, Serialize};

/// Mask probabilities at or above this value belong to the instance.
const MASK_THRESHOLD: f32 = 0.5;

/// A detected object in original-image pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Mask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Vec<Keypoint>>,
}

/// Binary instance mask relative to the detection's box, row-major, 1 = inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Mask {
    fn from_probabilities(probabilities: impl Iterator<Item = f32>) -> Self {
        Self {
            width: MASK_SIDE as u32,
            height: MASK_SIDE as u32,
            data: probabilities
                .map(|p| u8::from(p >= MASK_THRESHOLD))
                .collect(),
        }
    }

    /// `false` outside the mask, or when `data` is shorter than `width * height`.
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.data.get(idx).is_some_and(|&v| v != 0)
    }

    /// `data` holds exactly `width * height` pixels.
    pub fn is_consistent(&self) -> bool {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .is_some_and(|len| len == self.data.len())
    }

    /// Number of pixels inside the instance.
    pub fn coverage(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// Attach the class label. `None` when the class id is outside the table.
pub fn assemble(candidate: &Candidate, labels: &LabelTable) -> Option<Detection> {
    let Some(label) = labels.get(candidate.class_id) else {
        tracing::debug!(
            class_id = candidate.class_id,
            num_labels = labels.len(),
            "Dropping candidate with invalid class index"
        );
        return None;
    };

    Some(Detection {
        label: label.to_string(),
        confidence: candidate.score,
        rect: candidate.rect,
        mask: None,
        keypoints: None,
    })
}

/// Copy the mask and keypoints for `slot` out of a Detectron output.
/// Keypoints are mapped into original-image space with `scale`.
pub fn attach_instance_extras(
    detection: &mut Detection,
    output: &DetectronOutput,
    slot: usize,
    scale: ScaleFactors,
) {
    if let Some(masks) = &output.masks {
        let len = MASK_SIDE * MASK_SIDE;
        detection.mask = Some(Mask::from_probabilities(
            masks.iter().skip(slot * len).take(len).copied(),
        ));
    }

    if let Some(keypoints) = &output.keypoints {
        let values: Vec<f32> = keypoints
            .iter()
            .skip(slot * NUM_KEYPOINTS * 3)
            .take(NUM_KEYPOINTS * 3)
            .copied()
            .collect();
        detection.keypoints = Some(
            values
                .chunks_exact(3)
                .map(|kp| Keypoint {
                    x: kp[0] * scale.width,
                    y: kp[1] * scale.height,
                    score: kp[2],
                })
                .collect(),
        );
    }
}
