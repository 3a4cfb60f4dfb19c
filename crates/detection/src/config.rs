use crate::{
    params::PredictParams,
    processing::{DEFAULT_IOU_THRESHOLD, DenseHead, HeadLayout},
};
use common::{env_or, env_string_or};

pub use common::Environment;

pub const DEFAULT_INPUT_SIZE: (u32, u32) = (320, 320);
pub const DEFAULT_NUM_CLASSES: usize = 80;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub environment: Environment,
    pub log_level: String,
    pub model_path: String,
    pub label_path: String,
    pub input_size: (u32, u32),
    pub original_size: (u32, u32),
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub head: HeadLayout,
}

impl DetectorConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();
        let log_level = env_string_or("LOG_LEVEL", "info");

        let model_path = env_string_or("MODEL_PATH", "models/recording.json");
        let label_path = env_string_or("LABEL_PATH", "models/labels.txt");

        let input_size = (
            env_or("INPUT_WIDTH", DEFAULT_INPUT_SIZE.0),
            env_or("INPUT_HEIGHT", DEFAULT_INPUT_SIZE.1),
        );
        let original_size = (
            env_or("ORIGINAL_WIDTH", input_size.0),
            env_or("ORIGINAL_HEIGHT", input_size.1),
        );

        let confidence_threshold = env_or("CONFIDENCE_THRESHOLD", 0.5);
        let iou_threshold = env_or("IOU_THRESHOLD", DEFAULT_IOU_THRESHOLD);

        let head = parse_head_layout(
            &env_string_or("HEAD_LAYOUT", "detectron"),
            env_or("NUM_CLASSES", DEFAULT_NUM_CLASSES),
        )?;

        Ok(Self {
            environment,
            log_level,
            model_path,
            label_path,
            input_size,
            original_size,
            confidence_threshold,
            iou_threshold,
            head,
        })
    }

    pub fn predict_params(&self) -> PredictParams {
        PredictParams::new(
            self.input_size,
            self.original_size,
            self.confidence_threshold,
        )
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "debug".to_string(),
            model_path: "/models/recording.json".to_string(),
            label_path: "/models/labels.txt".to_string(),
            input_size: DEFAULT_INPUT_SIZE,
            original_size: (640, 480),
            confidence_threshold: 0.5,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            head: HeadLayout::detectron(),
        }
    }
}

/// `detectron`, `yolov5` or `yolov8`. `num_classes` only applies to dense heads.
pub fn parse_head_layout(name: &str, num_classes: usize) -> anyhow::Result<HeadLayout> {
    match name.trim().to_lowercase().as_str() {
        "detectron" | "d2go" => Ok(HeadLayout::detectron()),
        "yolov5" => Ok(HeadLayout::Dense(DenseHead::yolov5(num_classes))),
        "yolov8" => Ok(HeadLayout::Dense(DenseHead::yolov8(num_classes))),
        other => anyhow::bail!(
            "Unknown head layout '{}', expected detectron, yolov5 or yolov8",
            other
        ),
    }
}
