use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use ndarray::Array4;

/// Model input laid out as `(batch = 1, height, width, channels = 3)`.
pub type InputTensor = Array4<f32>;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Unreadable image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Unreadable image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid target size {0}x{1}")]
    InvalidSize(u32, u32),
}

pub struct Preprocessed {
    pub tensor: InputTensor,
    pub resized: RgbImage,
}

/// Decodes `bytes`, honouring any embedded EXIF orientation.
pub fn decode_oriented(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Turns an encoded upload into a normalized `(1, height, width, 3)` tensor.
pub fn preprocess_bytes(bytes: &[u8], target: (u32, u32)) -> Result<Preprocessed, PreprocessError> {
    let image = decode_oriented(bytes)?;
    preprocess_image(&image, target)
}

/// Normalizes an already decoded (and oriented) image.
///
/// Any color mode is accepted and flattened to 8-bit RGB, then resized
/// straight to `target` (height, width) with Lanczos3. Aspect ratio is not
/// kept; the classifier was trained on direct resizes.
pub fn preprocess_image(
    image: &DynamicImage,
    target: (u32, u32),
) -> Result<Preprocessed, PreprocessError> {
    let (height, width) = target;
    if height == 0 || width == 0 {
        return Err(PreprocessError::InvalidSize(height, width));
    }

    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let resized = rgb.resize_exact(width, height, FilterType::Lanczos3).to_rgb8();
    let tensor = to_tensor(&resized);

    Ok(Preprocessed { tensor, resized })
}

fn to_tensor(rgb: &RgbImage) -> InputTensor {
    let (width, height) = rgb.dimensions();
    Array4::from_shape_fn(
        (1, height as usize, width as usize, 3),
        |(_, y, x, c)| rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
    )
}
