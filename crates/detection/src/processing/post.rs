use super::{
    assemble::{Detection, assemble, attach_instance_extras},
    decode::{Candidate, HeadLayout, decode},
    filter::filter,
    nms::{DEFAULT_IOU_THRESHOLD, suppress},
};
use crate::{
    backend::RawOutput, error::DetectError, labels::LabelTable, params::PredictParams,
};
use common::span;

/// Turns raw network output into labelled detections in original-image space.
///
/// Immutable once built, so one instance can serve concurrent callers that
/// each own their raw output.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    head: HeadLayout,
    labels: LabelTable,
    iou_threshold: f32,
}

impl PostProcessor {
    pub fn new(
        head: HeadLayout,
        labels: LabelTable,
        iou_threshold: f32,
    ) -> Result<Self, DetectError> {
        head.validate()?;

        if !(iou_threshold > 0.0 && iou_threshold <= 1.0) {
            return Err(DetectError::InvalidConfiguration(format!(
                "IoU threshold {} outside (0, 1]",
                iou_threshold
            )));
        }

        if labels.is_empty() {
            tracing::warn!("Label table is empty, every detection will be dropped");
        }

        Ok(Self {
            head,
            labels,
            iou_threshold,
        })
    }

    pub fn with_default_iou(head: HeadLayout, labels: LabelTable) -> Result<Self, DetectError> {
        Self::new(head, labels, DEFAULT_IOU_THRESHOLD)
    }

    pub fn head(&self) -> &HeadLayout {
        &self.head
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    /// decode -> filter -> suppress -> rescale -> assemble
    #[tracing::instrument(skip_all, fields(head = self.head.name(), threshold = params.threshold))]
    pub fn process(
        &self,
        raw: &RawOutput,
        params: &PredictParams,
    ) -> Result<Vec<Detection>, DetectError> {
        params.validate()?;

        let candidates = {
            let _s = span!("decode");
            decode(raw, &self.head, params.input_width, params.input_height)?
        };
        let decoded = candidates.len();

        let candidates = filter(candidates, params.threshold);
        let confident = candidates.len();

        let candidates = {
            let _s = span!("suppress");
            suppress(candidates, self.iou_threshold)
        };
        let kept = candidates.len();

        let detections: Vec<Detection> = candidates
            .iter()
            .filter_map(|candidate| self.finish(candidate, raw, params))
            .collect();

        tracing::debug!(
            decoded,
            confident,
            kept,
            detections = detections.len(),
            "Post-processing complete"
        );

        Ok(detections)
    }

    fn finish(
        &self,
        candidate: &Candidate,
        raw: &RawOutput,
        params: &PredictParams,
    ) -> Option<Detection> {
        let rect = params.scale.apply(&candidate.rect);
        if !rect.is_well_formed() {
            tracing::debug!(slot = candidate.slot, rect = ?rect, "Dropping degenerate rescaled box");
            return None;
        }

        let mut detection = assemble(&Candidate { rect, ..*candidate }, &self.labels)?;

        if let RawOutput::Detectron(output) = raw {
            attach_instance_extras(&mut detection, output, candidate.slot, params.scale);
        }

        Some(detection)
    }
}
