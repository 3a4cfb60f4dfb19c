use serde::{Deserialize, Serialize};

/// Axis-aligned box with the top-left corner at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from corner format (left, top, right, bottom).
    #[inline]
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Build from center-width-height format.
    #[inline]
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Finite coordinates and non-negative extent.
    pub fn is_well_formed(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }

    pub fn intersection_area(&self, other: &Rect) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    /// Overlap ratio: intersection area over union area. Zero when the union is empty.
    pub fn iou(&self, other: &Rect) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Scale x/width and y/height independently. No clamping is applied.
    pub fn rescale(&self, width_scale: f32, height_scale: f32) -> Rect {
        Rect {
            x: self.x * width_scale,
            y: self.y * height_scale,
            width: self.width * width_scale,
            height: self.height * height_scale,
        }
    }
}

/// Ratio between original-image pixels and model-input pixels, per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub width: f32,
    pub height: f32,
}

impl ScaleFactors {
    pub const IDENTITY: ScaleFactors = ScaleFactors {
        width: 1.0,
        height: 1.0,
    };

    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// `original / input` for each axis.
    pub fn between(original: (u32, u32), input: (u32, u32)) -> Self {
        Self {
            width: original.0 as f32 / input.0 as f32,
            height: original.1 as f32 / input.1 as f32,
        }
    }

    /// Camera stream frames arrive rotated by 90 degrees relative to the
    /// model input, so the stream's height maps onto the input width.
    pub fn for_rotated_stream(stream: (u32, u32), input: (u32, u32)) -> Self {
        Self::between((stream.1, stream.0), input)
    }

    pub fn inverse(&self) -> Self {
        Self {
            width: 1.0 / self.width,
            height: 1.0 / self.height,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn apply(&self, rect: &Rect) -> Rect {
        rect.rescale(self.width, self.height)
    }
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self::IDENTITY
    }
}
