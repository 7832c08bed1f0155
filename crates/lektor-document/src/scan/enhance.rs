// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan enhancement pipeline: tiered contrast boosting, denoising, sharpening,
// and adaptive or global binarization ahead of character recognition.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::filter::separable_filter_equal;
use imageproc::integral_image::{integral_image, sum_image_pixels};
use lektor_core::EnhancementTier;
use lektor_core::config::{AdaptiveMethod, EnhancerConfig};
use tracing::{debug, info, instrument};

use crate::image::processor::ImageProcessor;

type SumTable = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Cleans up a grayscale page according to its [`EnhancementTier`].
///
/// Every operation keeps the page dimensions and produces valid 8-bit
/// intensities. Like [`ImageProcessor`], each method consumes `self`.
pub struct ScanEnhancer {
    /// The working page.
    image: GrayImage,
    config: EnhancerConfig,
}

impl ScanEnhancer {
    // -- Construction ---------------------------------------------------------

    /// Create an enhancer wrapping an existing grayscale page.
    pub fn from_gray(image: GrayImage, config: EnhancerConfig) -> Self {
        Self { image, config }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn into_gray(self) -> GrayImage {
        self.image
    }

    // -- Tier chains ----------------------------------------------------------

    /// Run the transform chain for `tier`.
    #[instrument(skip(self), fields(width = self.image.width(), height = self.image.height()))]
    pub fn apply_tier(self, tier: EnhancementTier) -> Self {
        info!(?tier, "Enhancing page");
        match tier {
            EnhancementTier::Low => self.enhance_light(),
            EnhancementTier::Medium => self.enhance_moderate(),
            EnhancementTier::High => self.enhance_aggressive(),
        }
    }

    /// Gentle contrast lift followed by smoothing.
    pub fn enhance_light(self) -> Self {
        let gain = self.config.low_gain;
        self.map_pixels(|p| p.scale_intensity(gain, 0.0).smooth())
    }

    /// Contrast boost, smoothing, then local adaptive thresholding.
    pub fn enhance_moderate(self) -> Self {
        let (gain, offset) = (self.config.medium_gain, self.config.medium_offset);
        self.map_pixels(|p| p.scale_intensity(gain, offset).smooth())
            .binarize_adaptive()
    }

    /// Denoise, strong contrast boost, sharpen, then global Otsu threshold.
    pub fn enhance_aggressive(self) -> Self {
        let (gain, offset) = (self.config.high_gain, self.config.high_offset);
        self.denoise()
            .map_pixels(|p| p.scale_intensity(gain, offset).sharpen())
            .binarize_otsu()
    }

    fn map_pixels(self, chain: impl FnOnce(ImageProcessor) -> ImageProcessor) -> Self {
        let image = chain(ImageProcessor::from_gray(self.image)).into_gray();
        Self {
            image,
            config: self.config,
        }
    }

    // -- Denoising ------------------------------------------------------------

    /// Non-local means denoising with the configured strength and windows.
    #[instrument(skip(self))]
    pub fn denoise(self) -> Self {
        let image = non_local_means(
            &self.image,
            self.config.nlm_strength,
            self.config.nlm_template_window,
            self.config.nlm_search_window,
        );
        debug!("Non-local means denoising complete");
        Self {
            image,
            config: self.config,
        }
    }

    // -- Binarization ---------------------------------------------------------

    /// Local adaptive thresholding.
    ///
    /// For each pixel the threshold is the weighted mean of its
    /// `adaptive_window` neighbourhood minus `adaptive_constant`. Pixels
    /// strictly above the threshold become white; all others black.
    #[instrument(skip(self))]
    pub fn binarize_adaptive(self) -> Self {
        let window = self.config.adaptive_window.max(1);
        let c = self.config.adaptive_constant as f64;
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 {
            return self;
        }

        let output = match self.config.adaptive_method {
            AdaptiveMethod::Gaussian => {
                let kernel = gaussian_kernel(window);
                let local: GrayImage = separable_filter_equal(&self.image, &kernel);
                GrayImage::from_fn(width, height, |x, y| {
                    let mean = local.get_pixel(x, y).0[0] as f64;
                    binary(self.image.get_pixel(x, y).0[0] as f64 > mean - c)
                })
            }
            AdaptiveMethod::Mean => {
                let sums = integral_image::<_, u64>(&self.image);
                let radius = window / 2;
                GrayImage::from_fn(width, height, |x, y| {
                    let mean = window_mean(&sums, x, y, radius).round();
                    binary(self.image.get_pixel(x, y).0[0] as f64 > mean - c)
                })
            }
        };

        debug!(window, method = ?self.config.adaptive_method, "Adaptive binarization complete");
        Self {
            image: output,
            config: self.config,
        }
    }

    /// Global binarization at the Otsu threshold.
    #[instrument(skip(self))]
    pub fn binarize_otsu(self) -> Self {
        let (level, image) = otsu_binarize(&self.image, false);
        debug!(level, "Otsu threshold computed");
        Self {
            image,
            config: self.config,
        }
    }
}

fn binary(white: bool) -> Luma<u8> {
    Luma([if white { 255 } else { 0 }])
}

/// Global Otsu binarization, returning the level alongside the page.
///
/// Pixels strictly above the level turn white. With `ink_foreground` the
/// polarity flips so dark strokes are white on black, as contour tracing
/// expects.
pub(crate) fn otsu_binarize(gray: &GrayImage, ink_foreground: bool) -> (u8, GrayImage) {
    let level = otsu_level(gray);
    let polarity = if ink_foreground {
        ThresholdType::BinaryInverted
    } else {
        ThresholdType::Binary
    };
    (level, threshold(gray, level, polarity))
}

/// Normalised 1-D Gaussian kernel of length `window`. The sigma follows the
/// usual size-derived default, giving 2.0 for an 11-tap window.
fn gaussian_kernel(window: u32) -> Vec<f32> {
    let sigma = 0.3 * ((window as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let centre = (window / 2) as f32;
    let raw: Vec<f32> = (0..window)
        .map(|i| {
            let d = i as f32 - centre;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Mean of the `(2r + 1)²` window centred on `(x, y)`. Near the border the
/// window shrinks to the part that lies on the page.
fn window_mean(sums: &SumTable, x: u32, y: u32, radius: u32) -> f64 {
    // The summed-area table is one pixel larger than the page on each axis.
    let (last_x, last_y) = (sums.width() - 2, sums.height() - 2);
    let (left, top) = (x.saturating_sub(radius), y.saturating_sub(radius));
    let right = x.saturating_add(radius).min(last_x);
    let bottom = y.saturating_add(radius).min(last_y);

    let [total] = sum_image_pixels(sums, left, top, right, bottom);
    let cells = f64::from(right - left + 1) * f64::from(bottom - top + 1);
    total as f64 / cells
}

// -- Non-local means ----------------------------------------------------------

/// Mirror an out-of-range index back into `0..len` without repeating the edge
/// sample (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(mut i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * len - 2 - i;
        } else {
            return i;
        }
    }
}

/// Non-local means denoising.
///
/// Every output pixel is a weighted average of the pixels in its search
/// window, weighted by `exp(-mean_sq_patch_distance / h²)`. Patch distances
/// for one displacement at a time are read from a summed-area table of
/// squared differences.
fn non_local_means(image: &GrayImage, h: f32, template_window: u32, search_window: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || h <= 0.0 {
        return image.clone();
    }

    let (w, ht) = (width as i64, height as i64);
    let tr = (template_window / 2) as i64;
    let sr = (search_window / 2) as i64;
    let pad = tr + sr;
    let pw = w + 2 * pad;
    let ph = ht + 2 * pad;

    let padded: Vec<i64> = (0..ph)
        .flat_map(|y| {
            (0..pw).map(move |x| {
                let sx = reflect_101(x - pad, w) as u32;
                let sy = reflect_101(y - pad, ht) as u32;
                image.get_pixel(sx, sy).0[0] as i64
            })
        })
        .collect();
    let at = |x: i64, y: i64| padded[(y * pw + x) as usize];

    // Region covering every template centred on an output pixel, in padded
    // coordinates starting at (sr, sr).
    let rw = w + 2 * tr;
    let rh = ht + 2 * tr;
    let stride = (rw + 1) as usize;
    let side = 2 * tr + 1;
    let area = (side * side) as f64;
    let h2 = (h as f64) * (h as f64);

    let pixels = (w * ht) as usize;
    let mut weight_sum = vec![0.0f64; pixels];
    let mut value_sum = vec![0.0f64; pixels];
    let mut integral = vec![0u64; stride * (rh + 1) as usize];

    for dy in -sr..=sr {
        for dx in -sr..=sr {
            for ry in 0..rh {
                let mut row: u64 = 0;
                for rx in 0..rw {
                    let diff = at(sr + rx, sr + ry) - at(sr + rx + dx, sr + ry + dy);
                    row += (diff * diff) as u64;
                    let idx = (ry + 1) as usize * stride + (rx + 1) as usize;
                    integral[idx] = row + integral[idx - stride];
                }
            }

            for y in 0..ht {
                for x in 0..w {
                    let (x1, y1) = (x as usize, y as usize);
                    let (x2, y2) = (x1 + side as usize, y1 + side as usize);
                    let ssd = integral[y2 * stride + x2] + integral[y1 * stride + x1]
                        - integral[y1 * stride + x2]
                        - integral[y2 * stride + x1];
                    let weight = (-(ssd as f64 / area) / h2).exp();
                    let i = (y * w + x) as usize;
                    weight_sum[i] += weight;
                    value_sum[i] += weight * at(x + pad + dx, y + pad + dy) as f64;
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let i = (y as i64 * w + x as i64) as usize;
        let value = value_sum[i] / weight_sum[i];
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

// -- Tests --------------------------------------------------------------------
