use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    /// Raw tensor layout does not match the configured head.
    #[error("Structural decode error: {0}")]
    StructuralDecode(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<ndarray::ShapeError> for DetectError {
    fn from(err: ndarray::ShapeError) -> Self {
        DetectError::StructuralDecode(err.to_string())
    }
}
