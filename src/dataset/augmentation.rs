//! Data Augmentation Module
//!
//! Builds the per-phase transform chains applied after the synchronized
//! geometric stage:
//!
//! - **Version 1**: resize to the network input size
//! - **Version 2**: random horizontal flip (all channels), one random
//!   photometric jitter (image only), then resize
//!
//! Both versions finish with ImageNet normalization of the image into CHW
//! layout and rescaling of the label channels from `[0, 255]` to `[0, 1]`.

use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::geometric::RasterTriplet;
use crate::utils::error::{Result, SaliencyError};

/// ImageNet normalization constants
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Augmentation chain selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AugmentationVersion {
    V1,
    V2,
}

impl AugmentationVersion {
    pub fn from_number(ver: u8) -> Result<Self> {
        match ver {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(SaliencyError::Configuration(format!(
                "aug_ver must be 1 or 2, got {}",
                other
            ))),
        }
    }
}

/// Pixel-space jitter applied to the image channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhotometricOp {
    /// Multiply intensities by `alpha`
    Contrast(f32),
    /// `255 * (x / 255) ^ gamma`
    Gamma(f32),
    /// Add `beta * 255`
    Brightness(f32),
}

impl PhotometricOp {
    pub fn apply(&self, img: &RgbImage) -> RgbImage {
        let lut: Vec<u8> = (0..=255u32)
            .map(|v| {
                let x = v as f32;
                let out = match *self {
                    PhotometricOp::Contrast(alpha) => x * alpha,
                    PhotometricOp::Gamma(gamma) => 255.0 * (x / 255.0).powf(gamma),
                    PhotometricOp::Brightness(beta) => x + beta * 255.0,
                };
                out.round().clamp(0.0, 255.0) as u8
            })
            .collect();

        let mut output = img.clone();
        for pixel in output.pixels_mut() {
            let Rgb([r, g, b]) = *pixel;
            *pixel = Rgb([lut[r as usize], lut[g as usize], lut[b as usize]]);
        }
        output
    }
}

/// Probabilities and ranges of the version 2 chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Probability of the flip group firing
    pub flip_prob: f32,
    /// Probability of the photometric group firing
    pub color_prob: f32,
    /// Contrast factor drawn from `1 ± contrast_limit`
    pub contrast_limit: f32,
    /// Gamma drawn from this range
    pub gamma_range: (f32, f32),
    /// Brightness shift drawn from `± brightness_limit` (fraction of 255)
    pub brightness_limit: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            flip_prob: 0.5,
            color_prob: 0.5,
            contrast_limit: 0.2,
            gamma_range: (0.8, 1.2),
            brightness_limit: 0.2,
        }
    }
}

/// Network-ready tensors of one sample, still on the host
#[derive(Debug, Clone)]
pub struct PreparedSample {
    /// Normalized image, CHW
    pub image: Vec<f32>,
    /// Mask in `[0, 1]`, HW
    pub mask: Vec<f32>,
    /// Edge map in `[0, 1]`, HW
    pub edge: Vec<f32>,
    pub size: usize,
}

/// Per-phase transform chain
#[derive(Debug, Clone)]
pub struct AugmentationPipeline {
    version: AugmentationVersion,
    img_size: u32,
    config: AugmentationConfig,
}

impl AugmentationPipeline {
    pub fn new(version: AugmentationVersion, img_size: usize) -> Self {
        Self {
            version,
            img_size: img_size as u32,
            config: AugmentationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AugmentationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn version(&self) -> AugmentationVersion {
        self.version
    }

    pub fn img_size(&self) -> usize {
        self.img_size as usize
    }

    /// Training chain: random stage (version 2 only), resize, normalize
    pub fn train<R: Rng + ?Sized>(&self, triplet: RasterTriplet, rng: &mut R) -> PreparedSample {
        let triplet = match self.version {
            AugmentationVersion::V1 => triplet,
            AugmentationVersion::V2 => self.randomize(triplet, rng),
        };
        self.finish(&triplet.resize(self.img_size, self.img_size))
    }

    /// Deterministic chain used for validation
    pub fn eval(&self, triplet: &RasterTriplet) -> PreparedSample {
        self.finish(&triplet.resize(self.img_size, self.img_size))
    }

    /// Deterministic image-only chain used for testing
    pub fn test_image(&self, image: &RgbImage) -> Vec<f32> {
        let resized = imageops::resize(image, self.img_size, self.img_size, FilterType::Triangle);
        normalize_image(&resized)
    }

    /// Draw the photometric jitter for one sample, if its gate fires
    pub fn draw_photometric<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<PhotometricOp> {
        if rng.gen::<f32>() >= self.config.color_prob {
            return None;
        }
        let c = &self.config;
        let op = match rng.gen_range(0..3) {
            0 => PhotometricOp::Contrast(1.0 + rng.gen_range(-c.contrast_limit..=c.contrast_limit)),
            1 => PhotometricOp::Gamma(rng.gen_range(c.gamma_range.0..=c.gamma_range.1)),
            _ => PhotometricOp::Brightness(rng.gen_range(-c.brightness_limit..=c.brightness_limit)),
        };
        Some(op)
    }

    fn randomize<R: Rng + ?Sized>(&self, triplet: RasterTriplet, rng: &mut R) -> RasterTriplet {
        // The flip is geometric and moves the labels with the image
        let mut triplet = if rng.gen::<f32>() < self.config.flip_prob {
            triplet.flip_horizontal()
        } else {
            triplet
        };

        if let Some(op) = self.draw_photometric(rng) {
            triplet.image = op.apply(&triplet.image);
        }
        triplet
    }

    fn finish(&self, triplet: &RasterTriplet) -> PreparedSample {
        PreparedSample {
            image: normalize_image(&triplet.image),
            mask: label_to_unit(&triplet.mask),
            edge: label_to_unit(&triplet.edge),
            size: self.img_size as usize,
        }
    }
}

/// ImageNet-normalize an RGB image into CHW layout
pub fn normalize_image(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            data[c * plane + offset] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    data
}

/// Rescale a label channel from `[0, 255]` to `[0, 1]` without binarizing
pub fn label_to_unit(label: &GrayImage) -> Vec<f32> {
    label.pixels().map(|p| p[0] as f32 / 255.0).collect()
}

/// Binarize evaluation ground truth with a 0.5 threshold
pub fn binarize_ground_truth(gt: &GrayImage) -> Vec<f32> {
    gt.pixels()
        .map(|p| if p[0] as f32 / 255.0 > 0.5 { 1.0 } else { 0.0 })
        .collect()
}
