//! Prediction maps to images
//!
//! Converts predicted maps to host buffers and 8-bit images, and pastes a
//! foreground over a background image using the map as alpha.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

use crate::utils::error::{Result, SaliencyError};

/// A foreground to paste over the background
#[derive(Debug, Clone)]
pub enum Foreground {
    /// Gray level doubles as alpha
    Luma(GrayImage),
    /// Color image with the saliency map in the alpha channel
    Rgba(RgbaImage),
}

impl Foreground {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Luma(img) => img.dimensions(),
            Self::Rgba(img) => img.dimensions(),
        }
    }

    /// `(color, alpha)` at a pixel
    fn pixel(&self, x: u32, y: u32) -> ([u8; 3], u8) {
        match self {
            Self::Luma(img) => {
                let v = img.get_pixel(x, y)[0];
                ([v, v, v], v)
            }
            Self::Rgba(img) => {
                let Rgba([r, g, b, a]) = *img.get_pixel(x, y);
                ([r, g, b], a)
            }
        }
    }
}

/// Copy a `[1, 1, H, W]` map to the host as `(values, height, width)`
pub fn tensor_to_map<B: Backend>(map: Tensor<B, 4>) -> Result<(Vec<f32>, usize, usize)> {
    let [batch, channels, height, width] = map.dims();
    if batch != 1 || channels != 1 {
        return Err(SaliencyError::Inference(format!(
            "expected a single map, got shape [{}, {}, {}, {}]",
            batch, channels, height, width
        )));
    }

    let values = map
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| SaliencyError::Inference(format!("failed to read map: {:?}", e)))?;
    Ok((values, height, width))
}

/// Scale a `[0, 1]` map to 8-bit gray
pub fn map_to_luma(values: &[f32], width: u32, height: u32) -> Result<GrayImage> {
    let pixels: Vec<u8> = values
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0) as u8)
        .collect();

    GrayImage::from_raw(width, height, pixels).ok_or_else(|| {
        SaliencyError::Inference(format!(
            "map of {} values does not fit {}x{}",
            values.len(),
            width,
            height
        ))
    })
}

/// Original image with the map as its alpha channel
pub fn attach_alpha(image: &RgbImage, alpha: &GrayImage) -> Result<RgbaImage> {
    if image.dimensions() != alpha.dimensions() {
        return Err(SaliencyError::Inference(format!(
            "image is {:?} but map is {:?}",
            image.dimensions(),
            alpha.dimensions()
        )));
    }

    let (width, height) = image.dimensions();
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        let Luma([a]) = *alpha.get_pixel(x, y);
        Rgba([r, g, b, a])
    }))
}

/// Alpha-blend `foreground` over `background` resized to `width x height`.
///
/// Without a background the foreground is blended over black.
pub fn compose_over_background(
    foreground: &Foreground,
    background: Option<&RgbImage>,
    width: u32,
    height: u32,
) -> Result<RgbImage> {
    if foreground.dimensions() != (width, height) {
        return Err(SaliencyError::Inference(format!(
            "foreground is {:?}, expected {}x{}",
            foreground.dimensions(),
            width,
            height
        )));
    }

    let mut canvas = match background {
        Some(bg) if bg.dimensions() == (width, height) => bg.clone(),
        Some(bg) => imageops::resize(bg, width, height, FilterType::Triangle),
        None => RgbImage::new(width, height),
    };

    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let (color, alpha) = foreground.pixel(x, y);
        let a = alpha as u32;
        for c in 0..3 {
            let blended = (color[c] as u32 * a + pixel[c] as u32 * (255 - a) + 127) / 255;
            pixel[c] = blended as u8;
        }
    }

    Ok(canvas)
}
