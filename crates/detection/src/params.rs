use crate::{error::DetectError, geometry::ScaleFactors};

/// Per-call prediction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictParams {
    /// Width of the buffer fed to the network.
    pub input_width: u32,
    /// Height of the buffer fed to the network.
    pub input_height: u32,
    /// Model-input to original-image scale.
    pub scale: ScaleFactors,
    /// Minimum confidence, inclusive.
    pub threshold: f32,
}

impl PredictParams {
    /// Derive the scale factors from the original image size.
    pub fn new(input_size: (u32, u32), original_size: (u32, u32), threshold: f32) -> Self {
        Self {
            input_width: input_size.0,
            input_height: input_size.1,
            scale: ScaleFactors::between(original_size, input_size),
            threshold,
        }
    }

    pub fn with_scale(input_size: (u32, u32), scale: ScaleFactors, threshold: f32) -> Self {
        Self {
            input_width: input_size.0,
            input_height: input_size.1,
            scale,
            threshold,
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(DetectError::InvalidParameter(format!(
                "input size must be positive, got {}x{}",
                self.input_width, self.input_height
            )));
        }

        if !self.scale.is_valid() {
            return Err(DetectError::InvalidParameter(format!(
                "scale factors must be finite and positive, got {}x{}",
                self.scale.width, self.scale.height
            )));
        }

        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(DetectError::InvalidParameter(format!(
                "threshold {} outside [0, 1]",
                self.threshold
            )));
        }

        Ok(())
    }
}
