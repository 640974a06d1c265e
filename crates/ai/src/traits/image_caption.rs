use super::AIModel;
use ndarray::Array3;

/// One captioning request: an RGB pixel array shaped `(height, width, 3)`
/// and the maximum caption sequence length in tokens, BOS included.
#[derive(Debug, Clone)]
pub struct ImageCaptionInput {
    pub image: Array3<u8>,
    pub max_length: usize,
}

pub type ImageCaptionOutput = String;
pub type ImageCaptionModel = AIModel<ImageCaptionInput, ImageCaptionOutput>;
