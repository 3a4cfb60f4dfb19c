use crate::{
    backend::{DetectronOutput, RawOutput},
    error::DetectError,
    geometry::Rect,
};
use common::span;
use ndarray::{ArrayD, ArrayView1, CowArray, Ix2};

/// A detection proposal in model-input pixel space, before filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Emission index in the raw output.
    pub slot: usize,
    pub class_id: u32,
    pub score: f32,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxEncoding {
    /// cx, cy, w, h
    CenterSize,
    /// x1, y1, x2, y2
    Corners,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreEncoding {
    /// An objectness channel precedes the class scores; confidence is their product.
    ObjectnessTimesClass,
    /// Class scores are already probabilities.
    ClassProbability,
    /// Class scores are logits; confidence is the sigmoid of the best one.
    ClassLogit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[.., slots, values]`
    SlotMajor,
    /// `[.., values, slots]`
    ChannelMajor,
}

/// Single-tensor head: every slot is `[box | objectness? | skipped classes | class scores]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseHead {
    pub num_classes: usize,
    pub box_encoding: BoxEncoding,
    pub score_encoding: ScoreEncoding,
    pub layout: TensorLayout,
    /// Boxes are in [0, 1] and must be multiplied by the input size.
    pub normalized: bool,
    /// Leading class channels to ignore (e.g. a background class).
    pub class_offset: usize,
}

impl DenseHead {
    /// `[1, N, 5 + C]`, center boxes in input pixels, objectness times class probability.
    pub fn yolov5(num_classes: usize) -> Self {
        Self {
            num_classes,
            box_encoding: BoxEncoding::CenterSize,
            score_encoding: ScoreEncoding::ObjectnessTimesClass,
            layout: TensorLayout::SlotMajor,
            normalized: false,
            class_offset: 0,
        }
    }

    /// `[1, 4 + C, N]`, center boxes in input pixels, class probabilities.
    pub fn yolov8(num_classes: usize) -> Self {
        Self {
            num_classes,
            box_encoding: BoxEncoding::CenterSize,
            score_encoding: ScoreEncoding::ClassProbability,
            layout: TensorLayout::ChannelMajor,
            normalized: false,
            class_offset: 0,
        }
    }

    fn class_start(&self) -> usize {
        match self.score_encoding {
            ScoreEncoding::ObjectnessTimesClass => 5 + self.class_offset,
            ScoreEncoding::ClassProbability | ScoreEncoding::ClassLogit => 4 + self.class_offset,
        }
    }

    /// Number of values per prediction slot.
    pub fn slot_width(&self) -> usize {
        self.class_start() + self.num_classes
    }

    fn decode_slot(
        &self,
        slot: usize,
        row: ArrayView1<'_, f32>,
        input_width: f32,
        input_height: f32,
    ) -> Option<Candidate> {
        // Argmax over class scores, first maximum wins
        let mut max_score = f32::NEG_INFINITY;
        let mut class_idx = 0usize;
        for (c, &value) in row.iter().skip(self.class_start()).enumerate() {
            if value > max_score {
                max_score = value;
                class_idx = c;
            }
        }

        let score = match self.score_encoding {
            ScoreEncoding::ObjectnessTimesClass => row[4] * max_score,
            ScoreEncoding::ClassProbability => max_score,
            ScoreEncoding::ClassLogit => sigmoid(max_score),
        };

        let rect = match self.box_encoding {
            BoxEncoding::CenterSize => Rect::from_center(row[0], row[1], row[2], row[3]),
            BoxEncoding::Corners => Rect::from_corners(row[0], row[1], row[2], row[3]),
        };
        let rect = if self.normalized {
            rect.rescale(input_width, input_height)
        } else {
            rect
        };

        accept(slot, class_idx as u32, score, rect)
    }
}

/// Layout of the network head. Must match the exported model; it is never inferred.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadLayout {
    Dense(DenseHead),
    /// Labels are shifted down by `label_offset` (1 for Detectron's 1-based classes).
    Detectron { label_offset: i64 },
}

impl HeadLayout {
    pub fn detectron() -> Self {
        HeadLayout::Detectron { label_offset: 1 }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HeadLayout::Dense(_) => "dense",
            HeadLayout::Detectron { .. } => "detectron",
        }
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        match self {
            HeadLayout::Dense(head) if head.num_classes == 0 => Err(
                DetectError::InvalidConfiguration("dense head needs at least one class".into()),
            ),
            HeadLayout::Detectron { label_offset } if *label_offset < 0 => {
                Err(DetectError::InvalidConfiguration(format!(
                    "label offset must not be negative, got {}",
                    label_offset
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Decode raw network output into candidates in model-input pixel space.
///
/// Slots with a degenerate box or a non-finite score are dropped; a tensor
/// whose shape does not fit `head` fails the whole call.
pub fn decode(
    raw: &RawOutput,
    head: &HeadLayout,
    input_width: u32,
    input_height: u32,
) -> Result<Vec<Candidate>, DetectError> {
    match (head, raw) {
        (HeadLayout::Dense(dense), RawOutput::Dense(tensor)) => {
            decode_dense(dense, tensor, input_width as f32, input_height as f32)
        }
        (HeadLayout::Detectron { label_offset }, RawOutput::Detectron(output)) => {
            decode_detectron(output, *label_offset)
        }
        (head, raw) => Err(DetectError::StructuralDecode(format!(
            "{} head cannot decode {} output",
            head.name(),
            raw.kind()
        ))),
    }
}

fn decode_dense(
    head: &DenseHead,
    tensor: &ArrayD<f32>,
    input_width: f32,
    input_height: f32,
) -> Result<Vec<Candidate>, DetectError> {
    let rows = slot_rows(tensor, head.slot_width(), head.layout)?;

    let candidates: Vec<Candidate> = {
        let _s = span!(debug, "decode_slots");
        rows.outer_iter()
            .enumerate()
            .filter_map(|(slot, row)| head.decode_slot(slot, row, input_width, input_height))
            .collect()
    };

    tracing::trace!(
        slots = rows.nrows(),
        candidates = candidates.len(),
        "Decoded dense head"
    );

    Ok(candidates)
}

/// View the tensor as `[slots, slot_width]`.
fn slot_rows(
    tensor: &ArrayD<f32>,
    width: usize,
    layout: TensorLayout,
) -> Result<CowArray<'_, f32, Ix2>, DetectError> {
    let shape = tensor.shape();
    let ndim = shape.len();

    let mismatch = || {
        DetectError::StructuralDecode(format!(
            "tensor of shape {:?} does not fit a {:?} head with {} values per slot",
            shape, layout, width
        ))
    };

    // Anything in front of the last two axes is a batch of one
    if ndim > 2 && shape[..ndim - 2].iter().any(|&d| d != 1) {
        return Err(mismatch());
    }

    match layout {
        TensorLayout::SlotMajor => {
            if ndim == 0 || (ndim >= 2 && shape[ndim - 1] != width) {
                return Err(mismatch());
            }
            if tensor.len() % width != 0 {
                return Err(DetectError::StructuralDecode(format!(
                    "{} elements is not a multiple of the slot width {}",
                    tensor.len(),
                    width
                )));
            }
            let slots = tensor.len() / width;
            Ok(tensor.to_shape((slots, width))?)
        }
        TensorLayout::ChannelMajor => {
            if ndim < 2 || shape[ndim - 2] != width {
                return Err(mismatch());
            }
            let slots = shape[ndim - 1];
            Ok(tensor.to_shape((width, slots))?.reversed_axes())
        }
    }
}

fn decode_detectron(
    output: &DetectronOutput,
    label_offset: i64,
) -> Result<Vec<Candidate>, DetectError> {
    let n = output.instance_count()?;
    let boxes = output.boxes.to_shape((n, 4))?;

    let mut candidates = Vec::with_capacity(n);
    for (slot, ((bbox, &score), &label)) in boxes
        .outer_iter()
        .zip(output.scores.iter())
        .zip(output.labels.iter())
        .enumerate()
    {
        let Some(class_id) = label
            .checked_sub(label_offset)
            .and_then(|id| u32::try_from(id).ok())
        else {
            tracing::debug!(slot, label, "Dropping instance with invalid class index");
            continue;
        };

        let rect = Rect::from_corners(bbox[0], bbox[1], bbox[2], bbox[3]);
        candidates.extend(accept(slot, class_id, score, rect));
    }

    tracing::trace!(
        instances = n,
        candidates = candidates.len(),
        "Decoded detectron head"
    );

    Ok(candidates)
}

fn accept(slot: usize, class_id: u32, score: f32, rect: Rect) -> Option<Candidate> {
    if !score.is_finite() {
        tracing::trace!(slot, score, "Dropping slot with non-finite score");
        return None;
    }
    if !rect.is_well_formed() {
        tracing::trace!(slot, rect = ?rect, "Dropping degenerate box");
        return None;
    }

    Some(Candidate {
        slot,
        class_id,
        score: score.clamp(0.0, 1.0),
        rect,
    })
}

/// Sigmoid activation function
#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    /// Build a `[1, n, 5 + num_classes]` YOLOv5-style tensor.
    /// Each slot is (cx, cy, w, h, objectness, class_id, class_score).
    fn create_yolov5_test_data(
        slots: &[([f32; 4], f32, usize, f32)],
        num_classes: usize,
    ) -> Array<f32, IxDyn> {
        let width = 5 + num_classes;
        let mut data = vec![0.0f32; slots.len() * width];
        for (i, (bbox, objectness, class_id, class_score)) in slots.iter().enumerate() {
            let row = &mut data[i * width..(i + 1) * width];
            row[..4].copy_from_slice(bbox);
            row[4] = *objectness;
            row[5 + class_id] = *class_score;
        }
        Array::from_shape_vec(IxDyn(&[1, slots.len(), width]), data).unwrap()
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    /// Confidence is objectness times the best class score
    #[test]
    fn test_yolov5_decode() {
        let tensor = create_yolov5_test_data(
            &[
                ([50.0, 60.0, 20.0, 40.0], 0.9, 2, 0.8),
                ([100.0, 100.0, 10.0, 10.0], 0.5, 0, 0.4),
            ],
            3,
        );
        let head = HeadLayout::Dense(DenseHead::yolov5(3));

        let candidates = decode(&RawOutput::Dense(tensor), &head, 320, 320).unwrap();

        assert_eq!(candidates.len(), 2, "Every slot yields a candidate");
        assert_eq!(candidates[0].slot, 0);
        assert_eq!(candidates[0].class_id, 2);
        assert!((candidates[0].score - 0.72).abs() < 1e-6);
        assert_eq!(candidates[0].rect, Rect::new(40.0, 40.0, 20.0, 40.0));

        assert_eq!(candidates[1].class_id, 0);
        assert!((candidates[1].score - 0.2).abs() < 1e-6);
    }

    /// Normalized center boxes are scaled by the input size
    #[test]
    fn test_normalized_boxes() {
        let tensor = create_yolov5_test_data(&[([0.5, 0.5, 0.25, 0.5], 1.0, 0, 1.0)], 1);
        let mut head = DenseHead::yolov5(1);
        head.normalized = true;

        let candidates = decode(
            &RawOutput::Dense(tensor),
            &HeadLayout::Dense(head),
            320,
            240,
        )
        .unwrap();

        assert_eq!(candidates[0].rect, Rect::new(120.0, 60.0, 80.0, 120.0));
    }

    /// Channel-major `[1, 4 + C, N]` output decodes like its transpose
    #[test]
    fn test_yolov8_channel_major() {
        // 2 classes, 3 slots; values laid out per channel
        let data = vec![
            10.0, 50.0, 90.0, // cx
            10.0, 50.0, 90.0, // cy
            4.0, 8.0, 2.0, // w
            4.0, 8.0, 2.0, // h
            0.1, 0.7, 0.3, // class 0
            0.6, 0.2, 0.3, // class 1
        ];
        let tensor = Array::from_shape_vec(IxDyn(&[1, 6, 3]), data).unwrap();
        let head = HeadLayout::Dense(DenseHead::yolov8(2));

        let candidates = decode(&RawOutput::Dense(tensor), &head, 100, 100).unwrap();

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].class_id, 1);
        assert!((candidates[0].score - 0.6).abs() < 1e-6);
        assert_eq!(candidates[1].class_id, 0);
        assert_eq!(candidates[1].rect, Rect::new(46.0, 46.0, 8.0, 8.0));
        assert_eq!(
            candidates[2].class_id, 0,
            "Ties go to the lowest class index"
        );
    }

    /// Logit heads with a background channel: sigmoid of the best non-background logit
    #[test]
    fn test_class_logits_with_offset() {
        let head = DenseHead {
            num_classes: 2,
            box_encoding: BoxEncoding::Corners,
            score_encoding: ScoreEncoding::ClassLogit,
            layout: TensorLayout::SlotMajor,
            normalized: false,
            class_offset: 1,
        };
        assert_eq!(head.slot_width(), 7);

        // background logit is the largest but must be ignored
        let tensor = Array::from_shape_vec(
            IxDyn(&[1, 7]),
            vec![10.0, 20.0, 30.0, 60.0, 9.0, -1.0, 0.0],
        )
        .unwrap();

        let candidates = decode(
            &RawOutput::Dense(tensor),
            &HeadLayout::Dense(head),
            640,
            640,
        )
        .unwrap();

        assert_eq!(candidates[0].class_id, 1);
        assert!((candidates[0].score - 0.5).abs() < 1e-6);
        assert_eq!(candidates[0].rect, Rect::new(10.0, 20.0, 20.0, 40.0));
    }

    /// Degenerate boxes and non-finite scores are dropped, not fatal
    #[test]
    fn test_degenerate_slots_dropped() {
        let tensor = create_yolov5_test_data(
            &[
                ([50.0, 50.0, -10.0, 10.0], 0.9, 0, 0.9),
                ([f32::NAN, 50.0, 10.0, 10.0], 0.9, 0, 0.9),
                ([50.0, 50.0, 10.0, 10.0], f32::INFINITY, 0, 0.9),
                ([50.0, 50.0, 10.0, 10.0], 0.9, 0, 0.9),
            ],
            1,
        );
        let head = HeadLayout::Dense(DenseHead::yolov5(1));

        let candidates = decode(&RawOutput::Dense(tensor), &head, 320, 320).unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].slot, 3, "Slot index survives dropped neighbours");
    }

    /// Out-of-range probabilities are clamped into [0, 1]
    #[test]
    fn test_score_clamped() {
        let tensor = create_yolov5_test_data(&[([5.0, 5.0, 2.0, 2.0], 1.5, 0, 1.0)], 1);
        let head = HeadLayout::Dense(DenseHead::yolov5(1));

        let candidates = decode(&RawOutput::Dense(tensor), &head, 320, 320).unwrap();
        assert_eq!(candidates[0].score, 1.0);
    }

    #[test]
    fn test_wrong_element_count_is_structural_error() {
        let head = HeadLayout::Dense(DenseHead::yolov5(80));

        // last axis does not match the slot width
        let tensor = Array::zeros(IxDyn(&[1, 10, 84]));
        let result = decode(&RawOutput::Dense(tensor), &head, 320, 320);
        assert!(matches!(result, Err(DetectError::StructuralDecode(_))));

        // flat buffer that is not a whole number of slots
        let tensor = Array::zeros(IxDyn(&[85 * 2 + 1]));
        let result = decode(&RawOutput::Dense(tensor), &head, 320, 320);
        assert!(matches!(result, Err(DetectError::StructuralDecode(_))));

        // batch larger than one
        let tensor = Array::zeros(IxDyn(&[2, 10, 85]));
        let result = decode(&RawOutput::Dense(tensor), &head, 320, 320);
        assert!(matches!(result, Err(DetectError::StructuralDecode(_))));
    }

    #[test]
    fn test_flat_buffer_accepted() {
        let head = HeadLayout::Dense(DenseHead::yolov5(1));
        let tensor = Array::from_shape_vec(
            IxDyn(&[12]),
            vec![5.0, 5.0, 2.0, 2.0, 0.5, 1.0, 9.0, 9.0, 2.0, 2.0, 0.5, 1.0],
        )
        .unwrap();

        let candidates = decode(&RawOutput::Dense(tensor), &head, 10, 10).unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        let head = HeadLayout::Dense(DenseHead::yolov5(80));
        let tensor = Array::zeros(IxDyn(&[1, 0, 85]));

        let candidates = decode(&RawOutput::Dense(tensor), &head, 320, 320).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_head_and_output_mismatch() {
        let tensor = Array::zeros(IxDyn(&[1, 0, 85]));
        let result = decode(&RawOutput::Dense(tensor), &HeadLayout::detectron(), 320, 320);
        assert!(matches!(result, Err(DetectError::StructuralDecode(_))));
    }

    /// Detectron labels are 1-based; boxes are corners in input pixels
    #[test]
    fn test_detectron_decode() {
        let output = DetectronOutput::new(
            Array::from_shape_vec(
                IxDyn(&[3, 4]),
                vec![
                    10.0, 20.0, 30.0, 60.0, //
                    0.0, 0.0, 5.0, 5.0, //
                    1.0, 1.0, 2.0, 2.0,
                ],
            )
            .unwrap(),
            Array::from_shape_vec(IxDyn(&[3]), vec![0.9, 0.8, 0.7]).unwrap(),
            Array::from_shape_vec(IxDyn(&[3]), vec![1i64, 0, 18]).unwrap(),
        );

        let candidates = decode(
            &RawOutput::Detectron(output),
            &HeadLayout::detectron(),
            320,
            320,
        )
        .unwrap();

        assert_eq!(candidates.len(), 2, "Label 0 maps below the first class");
        assert_eq!(candidates[0].class_id, 0);
        assert_eq!(candidates[0].rect, Rect::new(10.0, 20.0, 20.0, 40.0));
        assert_eq!(candidates[1].slot, 2);
        assert_eq!(candidates[1].class_id, 17);
    }

    #[test]
    fn test_head_validation() {
        assert!(HeadLayout::Dense(DenseHead::yolov5(0)).validate().is_err());
        assert!(
            HeadLayout::Detectron { label_offset: -1 }
                .validate()
                .is_err()
        );
        assert!(HeadLayout::detectron().validate().is_ok());
        assert!(HeadLayout::Dense(DenseHead::yolov8(80)).validate().is_ok());
    }
}
