use super::{DetectronOutput, InferenceBackend, MASK_SIDE, NUM_KEYPOINTS, RawOutput};
use anyhow::Context;
use ndarray::{Array, ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw output captured from a real model, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recording {
    Dense {
        shape: Vec<usize>,
        data: Vec<f32>,
    },
    Detectron {
        boxes: Vec<f32>,
        scores: Vec<f32>,
        labels: Vec<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        masks: Option<Vec<f32>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keypoints: Option<Vec<f32>>,
    },
}

impl Recording {
    pub fn capture(output: &RawOutput) -> Self {
        match output {
            RawOutput::Dense(tensor) => Recording::Dense {
                shape: tensor.shape().to_vec(),
                data: tensor.iter().copied().collect(),
            },
            RawOutput::Detectron(output) => Recording::Detectron {
                boxes: output.boxes.iter().copied().collect(),
                scores: output.scores.iter().copied().collect(),
                labels: output.labels.iter().copied().collect(),
                masks: output.masks.as_ref().map(|m| m.iter().copied().collect()),
                keypoints: output.keypoints.as_ref().map(|k| k.iter().copied().collect()),
            },
        }
    }

    pub fn into_output(self) -> anyhow::Result<RawOutput> {
        match self {
            Recording::Dense { shape, data } => Ok(RawOutput::Dense(
                Array::from_shape_vec(IxDyn(&shape), data)
                    .with_context(|| format!("dense data does not fit shape {:?}", shape))?,
            )),
            Recording::Detectron {
                boxes,
                scores,
                labels,
                masks,
                keypoints,
            } => {
                let n = scores.len();
                let mut output = DetectronOutput::new(
                    tensor("boxes", &[n, 4], boxes)?,
                    tensor("scores", &[n], scores)?,
                    tensor("labels", &[n], labels)?,
                );
                if let Some(masks) = masks {
                    output = output.with_masks(tensor("masks", &[n, 1, MASK_SIDE, MASK_SIDE], masks)?);
                }
                if let Some(keypoints) = keypoints {
                    output = output
                        .with_keypoints(tensor("keypoints", &[n, NUM_KEYPOINTS, 3], keypoints)?);
                }
                Ok(RawOutput::Detectron(output))
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write recording {}", path.display()))
    }
}

fn tensor<T>(name: &str, shape: &[usize], data: Vec<T>) -> anyhow::Result<ArrayD<T>> {
    Array::from_shape_vec(IxDyn(shape), data)
        .with_context(|| format!("{} does not fit shape {:?}", name, shape))
}

/// Serves the same recorded output for every call. Stands in for a tensor
/// runtime when replaying captured sessions, in tests and in benchmarks.
pub struct ReplayBackend {
    output: RawOutput,
    calls: u64,
}

impl ReplayBackend {
    pub fn new(output: RawOutput) -> Self {
        Self { output, calls: 0 }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl InferenceBackend for ReplayBackend {
    fn load_model(path: &str) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read recording {}", path))?;
        let recording: Recording = serde_json::from_str(&json)
            .with_context(|| format!("{} is not a valid recording", path))?;
        let output = recording.into_output()?;

        tracing::info!(path, kind = output.kind(), "Recording loaded");
        Ok(Self::new(output))
    }

    fn infer(
        &mut self,
        pixels: &ArrayViewD<'_, f32>,
        input_size: (u32, u32),
    ) -> anyhow::Result<RawOutput> {
        let shape = pixels.shape();
        // Pixel buffers end in (height, width)
        if shape.len() >= 2
            && (shape[shape.len() - 2], shape[shape.len() - 1])
                != (input_size.1 as usize, input_size.0 as usize)
        {
            anyhow::bail!(
                "pixel buffer of shape {:?} does not match input size {}x{}",
                shape,
                input_size.0,
                input_size.1
            );
        }

        self.calls += 1;
        tracing::trace!(calls = self.calls, "Replaying recorded output");
        Ok(self.output.clone())
    }
}
