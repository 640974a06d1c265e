use crate::ai::ModelRegistry;
use ai::{image::rgb_array_from_bytes, ImageCaptionInput};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("invalid image: {0}")]
    InvalidImage(anyhow::Error),
    #[error("caption generation failed: {0}")]
    Inference(anyhow::Error),
}

/// Clamp a client supplied length into `[1, max]`.
pub fn clamp_length(length: i64, max: usize) -> usize {
    let max = max.max(1);
    if length < 1 {
        1
    } else {
        usize::try_from(length).map_or(max, |v| v.min(max))
    }
}

/// Decode `raw` as an image and caption it with the named model.
///
/// The model is looked up before any decoding work happens. Decoding runs on
/// the blocking pool; inference is queued on the model's own worker.
pub async fn generate_caption(
    registry: &ModelRegistry,
    raw: impl AsRef<[u8]> + Send + 'static,
    model_name: &str,
    max_length: usize,
) -> Result<String, CaptionError> {
    let model = registry
        .get(model_name)
        .ok_or_else(|| CaptionError::ModelNotFound(model_name.to_string()))?;

    let image = tokio::task::spawn_blocking(move || rgb_array_from_bytes(raw.as_ref()))
        .await
        .map_err(|e| CaptionError::InvalidImage(anyhow::anyhow!("decode task failed: {}", e)))?
        .map_err(CaptionError::InvalidImage)?;

    tracing::debug!(model_name, shape = ?image.dim(), max_length, "image decoded");

    model
        .process_single(ImageCaptionInput {
            image,
            max_length: max_length.max(1),
        })
        .await
        .map_err(CaptionError::Inference)
}
