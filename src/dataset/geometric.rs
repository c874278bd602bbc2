//! Synchronized geometric augmentation
//!
//! One random decision per sample, applied identically to the image and its
//! two label channels. The image is resampled bilinearly; mask and edge use
//! nearest-neighbour so their pixel values stay within the original set.

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::config::CropConfig;

/// Image, mask and edge rasters of one sample
#[derive(Debug, Clone)]
pub struct RasterTriplet {
    pub image: RgbImage,
    pub mask: GrayImage,
    pub edge: GrayImage,
}

impl RasterTriplet {
    /// Whether all three channels share the same dimensions
    pub fn is_aligned(&self) -> bool {
        let dims = self.image.dimensions();
        self.mask.dimensions() == dims && self.edge.dimensions() == dims
    }

    /// Resize every channel to `width x height` with the per-channel filter
    pub fn resize(&self, width: u32, height: u32) -> Self {
        Self {
            image: imageops::resize(&self.image, width, height, FilterType::Triangle),
            mask: imageops::resize(&self.mask, width, height, FilterType::Nearest),
            edge: imageops::resize(&self.edge, width, height, FilterType::Nearest),
        }
    }

    /// Cut the same window out of every channel
    pub fn crop(&self, window: CropWindow) -> Self {
        let CropWindow {
            top,
            left,
            height,
            width,
        } = window;
        Self {
            image: imageops::crop_imm(&self.image, left, top, width, height).to_image(),
            mask: imageops::crop_imm(&self.mask, left, top, width, height).to_image(),
            edge: imageops::crop_imm(&self.edge, left, top, width, height).to_image(),
        }
    }

    /// Mirror every channel left to right
    pub fn flip_horizontal(&self) -> Self {
        Self {
            image: imageops::flip_horizontal(&self.image),
            mask: imageops::flip_horizontal(&self.mask),
            edge: imageops::flip_horizontal(&self.edge),
        }
    }
}

/// Crop rectangle; `top` is the row origin (i), `left` the column origin (j)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropWindow {
    pub top: u32,
    pub left: u32,
    pub height: u32,
    pub width: u32,
}

/// The geometric operation chosen for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometricDecision {
    /// Resize all channels to `size x size`
    Resize { size: u32 },
    /// Resize all channels to `canvas x canvas`, then crop `window`
    ResizeCrop { canvas: u32, window: CropWindow },
}

/// Draws and applies synchronized resize/crop decisions
#[derive(Debug, Clone)]
pub struct SynchronizedAugmentor {
    config: CropConfig,
}

impl SynchronizedAugmentor {
    pub fn new(config: CropConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CropConfig {
        &self.config
    }

    /// Draw one decision: plain resize when the draw exceeds the threshold,
    /// otherwise a random crop from the enlarged canvas
    pub fn decide<R: Rng + ?Sized>(&self, rng: &mut R) -> GeometricDecision {
        let r: f32 = rng.gen();
        if r > self.config.crop_threshold {
            return GeometricDecision::Resize {
                size: self.config.base_size,
            };
        }

        let size = self.config.base_size;
        let canvas = self.config.canvas_size.max(size);
        let slack = canvas - size;
        GeometricDecision::ResizeCrop {
            canvas,
            window: CropWindow {
                top: rng.gen_range(0..=slack),
                left: rng.gen_range(0..=slack),
                height: size,
                width: size,
            },
        }
    }

    /// Apply a decision to every channel of `triplet`
    pub fn apply(&self, triplet: &RasterTriplet, decision: GeometricDecision) -> RasterTriplet {
        match decision {
            GeometricDecision::Resize { size } => triplet.resize(size, size),
            GeometricDecision::ResizeCrop { canvas, window } => {
                let resized = if triplet.image.dimensions() == (canvas, canvas) {
                    triplet.clone()
                } else {
                    triplet.resize(canvas, canvas)
                };
                resized.crop(window)
            }
        }
    }

    /// Draw a decision and apply it
    pub fn augment<R: Rng + ?Sized>(&self, triplet: &RasterTriplet, rng: &mut R) -> RasterTriplet {
        let decision = self.decide(rng);
        self.apply(triplet, decision)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Triplet whose mask and edge encode pixel coordinates
    pub(crate) fn coordinate_triplet(width: u32, height: u32) -> RasterTriplet {
        RasterTriplet {
            image: RgbImage::from_fn(width, height, |x, y| {
                Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
            }),
            mask: GrayImage::from_fn(width, height, |x, _| Luma([(x % 256) as u8])),
            edge: GrayImage::from_fn(width, height, |_, y| Luma([(y % 256) as u8])),
        }
    }

    fn small_config() -> CropConfig {
        CropConfig {
            base_size: 32,
            canvas_size: 48,
            crop_threshold: 0.3,
        }
    }

    #[test]
    fn test_forced_crop_window_on_960_sample() {
        let augmentor = SynchronizedAugmentor::new(CropConfig::default());
        let triplet = coordinate_triplet(960, 960);
        let window = CropWindow {
            top: 100,
            left: 50,
            height: 640,
            width: 640,
        };

        let out = augmentor.apply(
            &triplet,
            GeometricDecision::ResizeCrop {
                canvas: 960,
                window,
            },
        );

        assert_eq!(out.image.dimensions(), (640, 640));
        assert_eq!(out.mask.dimensions(), (640, 640));
        assert_eq!(out.edge.dimensions(), (640, 640));

        // mask encodes the column, edge the row: both must start at the window origin
        assert_eq!(out.mask.get_pixel(0, 0)[0], 50);
        assert_eq!(out.edge.get_pixel(0, 0)[0], 100);
        assert_eq!(out.image.get_pixel(0, 0)[0], 50);
        assert_eq!(out.image.get_pixel(0, 0)[1], 100);
        assert_eq!(out.mask.get_pixel(10, 20)[0], 60);
        assert_eq!(out.edge.get_pixel(10, 20)[0], 120);
    }

    #[test]
    fn test_resize_branch_alignment() {
        let augmentor = SynchronizedAugmentor::new(small_config());
        let out = augmentor.apply(
            &coordinate_triplet(50, 70),
            GeometricDecision::Resize { size: 32 },
        );
        assert!(out.is_aligned());
        assert_eq!(out.image.dimensions(), (32, 32));
    }

    #[test]
    fn test_random_decisions_stay_aligned() {
        let augmentor = SynchronizedAugmentor::new(small_config());
        let triplet = coordinate_triplet(40, 30);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut crops = 0;

        for _ in 0..64 {
            let decision = augmentor.decide(&mut rng);
            if let GeometricDecision::ResizeCrop { canvas, window } = decision {
                crops += 1;
                assert!(window.top + window.height <= canvas);
                assert!(window.left + window.width <= canvas);
            }
            let out = augmentor.apply(&triplet, decision);
            assert!(out.is_aligned());
            assert_eq!(out.image.dimensions(), (32, 32));
        }

        assert!(crops > 0 && crops < 64);
    }

    #[test]
    fn test_labels_stay_binary_after_resize() {
        let mut triplet = coordinate_triplet(37, 37);
        triplet.mask = GrayImage::from_fn(37, 37, |x, _| Luma([if x < 18 { 0 } else { 255 }]));

        let out = SynchronizedAugmentor::new(small_config())
            .apply(&triplet, GeometricDecision::Resize { size: 32 });
        assert!(out.mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_flip_is_synchronized() {
        let triplet = coordinate_triplet(8, 4);
        let flipped = triplet.flip_horizontal();
        assert_eq!(flipped.mask.get_pixel(0, 0)[0], 7);
        assert_eq!(flipped.image.get_pixel(0, 0)[0], 7);
        assert_eq!(flipped.edge.get_pixel(0, 3)[0], 3);
    }
}
