pub mod backend;
pub mod config;
pub mod detector;
pub mod error;
pub mod geometry;
pub mod labels;
pub mod logging;
pub mod params;
pub mod processing;
pub mod serialization;

// Re-export commonly used types for convenience
pub use backend::{InferenceBackend, RawOutput, replay::ReplayBackend};
pub use config::DetectorConfig;
pub use detector::Detector;
pub use error::DetectError;
pub use geometry::{Rect, ScaleFactors};
pub use labels::LabelTable;
pub use params::PredictParams;
pub use processing::{Detection, HeadLayout, PostProcessor};
