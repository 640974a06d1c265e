//! Conversions between encoded images and the pixel arrays models consume.

use anyhow::anyhow;
use image::{DynamicImage, RgbImage};
use ndarray::Array3;

/// Decode an encoded image (png, jpeg, gif, webp, ...) into an RGB array
/// shaped `(height, width, 3)`.
///
/// Grayscale, paletted and alpha sources are all flattened to three 8-bit
/// channels; alpha is dropped. Pixel values are left unnormalized.
pub fn rgb_array_from_bytes(bytes: &[u8]) -> anyhow::Result<Array3<u8>> {
    let image = image::load_from_memory(bytes)?;
    rgb_array_from_image(image)
}

pub fn rgb_array_from_image(image: DynamicImage) -> anyhow::Result<Array3<u8>> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let array = Array3::from_shape_vec((height as usize, width as usize, 3), rgb.into_raw())?;
    Ok(array)
}

/// Inverse of [`rgb_array_from_image`].
pub fn rgb_image_from_array(array: &Array3<u8>) -> anyhow::Result<RgbImage> {
    let (height, width, channels) = array.dim();
    if channels != 3 {
        anyhow::bail!("expected 3 channels, got {}", channels);
    }

    let raw = array.iter().copied().collect::<Vec<_>>();
    RgbImage::from_raw(width as u32, height as u32, raw)
        .ok_or(anyhow!("pixel buffer does not match {}x{}", width, height))
}
