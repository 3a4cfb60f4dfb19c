pub mod assemble;
pub mod decode;
pub mod filter;
pub mod nms;
pub mod post;

pub use assemble::{Detection, Keypoint, Mask, assemble};
pub use decode::{BoxEncoding, Candidate, DenseHead, HeadLayout, ScoreEncoding, TensorLayout, decode};
pub use filter::filter;
pub use nms::{DEFAULT_IOU_THRESHOLD, suppress};
pub use post::PostProcessor;
