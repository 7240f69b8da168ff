pub mod analyzer;
pub mod blur;
pub mod color;
pub mod depth;
pub mod transparency;

pub use analyzer::ImageAnalyzer;
pub use color::ColorAdjustments;
pub use depth::{DepthAlgorithm, DepthOptions};
pub use transparency::StripError;
