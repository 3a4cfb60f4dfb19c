use crate::error::DetectError;
use ndarray::{ArrayD, ArrayViewD};

pub mod replay;

/// Side length of the per-instance mask emitted by Detectron heads.
pub const MASK_SIDE: usize = 28;
/// COCO keypoint count; each keypoint is (x, y, score).
pub const NUM_KEYPOINTS: usize = 17;

/// The tensor runtime that turns a pixel buffer into raw network output.
pub trait InferenceBackend {
    fn load_model(path: &str) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run inference on a preprocessed pixel buffer (e.g. `[1, 3, H, W]`).
    fn infer(
        &mut self,
        pixels: &ArrayViewD<'_, f32>,
        input_size: (u32, u32),
    ) -> anyhow::Result<RawOutput>;
}

/// Raw network output, read-only for the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    /// One tensor of prediction slots (YOLO-style heads).
    Dense(ArrayD<f32>),
    /// Split boxes / scores / labels tensors (Detectron2 / D2Go export).
    Detectron(DetectronOutput),
}

impl RawOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            RawOutput::Dense(_) => "dense",
            RawOutput::Detectron(_) => "detectron",
        }
    }
}

/// Detectron2-style instance outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectronOutput {
    pub boxes: ArrayD<f32>,             // [N, 4] left, top, right, bottom in input pixels
    pub scores: ArrayD<f32>,            // [N]
    pub labels: ArrayD<i64>,            // [N], 1-based
    pub masks: Option<ArrayD<f32>>,     // [N, 1, 28, 28] probabilities, box-relative
    pub keypoints: Option<ArrayD<f32>>, // [N, 17, 3] x, y, score in input pixels
}

impl DetectronOutput {
    pub fn new(boxes: ArrayD<f32>, scores: ArrayD<f32>, labels: ArrayD<i64>) -> Self {
        Self {
            boxes,
            scores,
            labels,
            masks: None,
            keypoints: None,
        }
    }

    pub fn with_masks(mut self, masks: ArrayD<f32>) -> Self {
        self.masks = Some(masks);
        self
    }

    pub fn with_keypoints(mut self, keypoints: ArrayD<f32>) -> Self {
        self.keypoints = Some(keypoints);
        self
    }

    /// Number of instances, after checking every tensor agrees on it.
    pub fn instance_count(&self) -> Result<usize, DetectError> {
        let n = self.scores.len();

        check_len("boxes", self.boxes.len(), n * 4)?;
        check_len("labels", self.labels.len(), n)?;
        if let Some(masks) = &self.masks {
            check_len("masks", masks.len(), n * MASK_SIDE * MASK_SIDE)?;
        }
        if let Some(keypoints) = &self.keypoints {
            check_len("keypoints", keypoints.len(), n * NUM_KEYPOINTS * 3)?;
        }

        Ok(n)
    }
}

fn check_len(name: &str, actual: usize, expected: usize) -> Result<(), DetectError> {
    if actual != expected {
        return Err(DetectError::StructuralDecode(format!(
            "{} tensor has {} elements, expected {}",
            name, actual, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn detectron(n: usize) -> DetectronOutput {
        DetectronOutput::new(
            Array::zeros(IxDyn(&[n, 4])),
            Array::zeros(IxDyn(&[n])),
            Array::zeros(IxDyn(&[n])),
        )
    }

    #[test]
    fn test_instance_count() {
        assert_eq!(detectron(3).instance_count().unwrap(), 3);
        assert_eq!(detectron(0).instance_count().unwrap(), 0);

        let with_extras = detectron(2)
            .with_masks(Array::zeros(IxDyn(&[2, 1, MASK_SIDE, MASK_SIDE])))
            .with_keypoints(Array::zeros(IxDyn(&[2, NUM_KEYPOINTS, 3])));
        assert_eq!(with_extras.instance_count().unwrap(), 2);
    }

    /// Mismatched tensors are a structural error, not a partial decode
    #[test]
    fn test_instance_count_mismatch() {
        let mut output = detectron(3);
        output.labels = Array::zeros(IxDyn(&[2]));
        assert!(matches!(
            output.instance_count(),
            Err(DetectError::StructuralDecode(_))
        ));

        let output = detectron(2).with_keypoints(Array::zeros(IxDyn(&[1, NUM_KEYPOINTS, 3])));
        let err = output.instance_count().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Structural decode error: keypoints tensor has 51 elements, expected 102"
        );
    }
}
