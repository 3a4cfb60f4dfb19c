use crate::{
    backend::InferenceBackend,
    error::DetectError,
    params::PredictParams,
    processing::{Detection, PostProcessor},
};
use common::span;
use ndarray::ArrayViewD;
use std::time::Instant;

/// Prediction entry point: runs the backend, then post-processes its output.
pub struct Detector<B: InferenceBackend> {
    backend: B,
    postprocessor: PostProcessor,
}

impl<B: InferenceBackend> Detector<B> {
    pub fn new(backend: B, postprocessor: PostProcessor) -> Self {
        Self {
            backend,
            postprocessor,
        }
    }

    /// Load the model through the backend. A failure here is reported as
    /// [`DetectError::ModelLoad`], never as an inference error.
    pub fn load(model_path: &str, postprocessor: PostProcessor) -> Result<Self, DetectError> {
        tracing::info!(model_path, "Loading inference model");

        let backend = B::load_model(model_path)
            .map_err(|e| DetectError::ModelLoad(format!("{}: {:#}", model_path, e)))?;

        tracing::info!("Model loaded successfully");
        Ok(Self::new(backend, postprocessor))
    }

    pub fn postprocessor(&self) -> &PostProcessor {
        &self.postprocessor
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one prediction. Parameters are checked before the backend runs.
    pub fn predict(
        &mut self,
        pixels: &ArrayViewD<'_, f32>,
        params: &PredictParams,
    ) -> Result<Vec<Detection>, DetectError> {
        params.validate()?;

        let start = Instant::now();
        let raw = {
            let _s = span!("model_inference");
            self.backend.infer(pixels, params.input_size())?
        };

        let detections = self.postprocessor.process(&raw, params)?;

        tracing::debug!(
            detections = detections.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Prediction complete"
        );

        Ok(detections)
    }
}
