// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: grayscale decoding, intensity scaling, smoothing,
// sharpening, and replicate-border rotation. Operates on in-memory luma
// images using the `image` and `imageproc` crates.

use image::{GrayImage, Luma};
use imageproc::filter::{filter3x3, separable_filter_equal};
use lektor_core::error::LektorError;
use tracing::{debug, info, instrument};

/// Binomial 3-tap kernel; applied along both axes it gives a 3x3 Gaussian.
const SMOOTHING_KERNEL: [f32; 3] = [0.25, 0.5, 0.25];

/// High-boost sharpening kernel (row-major 3x3).
pub const SHARPEN_KERNEL: [i32; 9] = [-1, -1, -1, -1, 9, -1, -1, -1, -1];

/// Bicubic coefficient matching the common `INTER_CUBIC` convention.
const CUBIC_A: f32 = -0.75;

/// Grayscale processing pipeline operating on a single in-memory page.
///
/// Each method consumes `self` and returns a new `ImageProcessor` wrapping the
/// transformed image, enabling method chaining.
///
/// ```ignore
/// let page = ImageProcessor::open("scan.png")?
///     .scale_intensity(1.3, 10.0)
///     .smooth()
///     .into_gray();
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: GrayImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image file and convert it to grayscale.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, LektorError> {
        let img = image::open(path.as_ref()).map_err(|err| {
            LektorError::ImageError(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        info!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self {
            image: img.to_luma8(),
        })
    }

    /// Decode encoded bytes (PNG, JPEG, TIFF, ...) into a grayscale page.
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, LektorError> {
        let img = image::load_from_memory(data).map_err(|err| {
            LektorError::ImageError(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self {
            image: img.to_luma8(),
        })
    }

    /// Wrap an already-decoded grayscale image.
    pub fn from_gray(image: GrayImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying image.
    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }

    /// Consume the processor and return the underlying image.
    pub fn into_gray(self) -> GrayImage {
        self.image
    }

    // -- Transformations (consume self, return new Self) -----------------------

    /// Map every pixel to `|gain * p + offset|`, rounded and saturated to 0..=255.
    #[instrument(skip(self))]
    pub fn scale_intensity(self, gain: f32, offset: f32) -> Self {
        debug!(gain, offset, "Scaling intensity");
        let mut image = self.image;
        for pixel in image.pixels_mut() {
            let scaled = (gain * pixel.0[0] as f32 + offset).abs().round();
            pixel.0[0] = scaled.clamp(0.0, 255.0) as u8;
        }
        Self { image }
    }

    /// 3x3 Gaussian smoothing.
    #[instrument(skip(self))]
    pub fn smooth(self) -> Self {
        if self.is_empty() {
            return self;
        }
        let smoothed: GrayImage = separable_filter_equal(&self.image, &SMOOTHING_KERNEL);
        Self { image: smoothed }
    }

    /// Sharpen with [`SHARPEN_KERNEL`]. Borders replicate the edge pixels.
    #[instrument(skip(self))]
    pub fn sharpen(self) -> Self {
        Self {
            image: filter3x3::<_, i32, u8>(&self.image, &SHARPEN_KERNEL),
        }
    }

    /// Rotate about the image centre by `degrees` (counter-clockwise for
    /// positive angles). The canvas keeps its size; samples falling outside the
    /// source are taken from the nearest edge pixel. Uses bicubic resampling.
    #[instrument(skip(self), fields(degrees))]
    pub fn rotate_about_center(self, degrees: f64) -> Self {
        if degrees.abs() < 1e-6 || self.is_empty() {
            return self;
        }

        let (width, height) = self.image.dimensions();
        let centre_x = (width / 2) as f32;
        let centre_y = (height / 2) as f32;
        let radians = degrees.to_radians() as f32;
        let (sin, cos) = radians.sin_cos();

        let source = &self.image;
        let rotated = GrayImage::from_fn(width, height, |x, y| {
            let u = x as f32 - centre_x;
            let v = y as f32 - centre_y;
            // Inverse map: where in the source does this output pixel come from?
            let src_x = u * cos - v * sin + centre_x;
            let src_y = u * sin + v * cos + centre_y;
            Luma([sample_bicubic(source, src_x, src_y)])
        });

        info!(degrees, width, height, "Rotation applied");
        Self { image: rotated }
    }

    fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

fn cubic_weight(t: f32) -> f32 {
    let t = t.abs();
    if t <= 1.0 {
        ((CUBIC_A + 2.0) * t - (CUBIC_A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((CUBIC_A * t - 5.0 * CUBIC_A) * t + 8.0 * CUBIC_A) * t - 4.0 * CUBIC_A
    } else {
        0.0
    }
}

/// Bicubic sample at a fractional position with replicated borders.
fn sample_bicubic(image: &GrayImage, x: f32, y: f32) -> u8 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let mut acc = 0.0f32;
    for j in -1..=2i64 {
        let wy = cubic_weight(j as f32 - fy);
        if wy == 0.0 {
            continue;
        }
        for i in -1..=2i64 {
            let wx = cubic_weight(i as f32 - fx);
            if wx == 0.0 {
                continue;
            }
            acc += wx * wy * clamped_pixel(image, x0 as i64 + i, y0 as i64 + j);
        }
    }
    acc.round().clamp(0.0, 255.0) as u8
}

/// Pixel value with clamp-to-edge (replicated) borders.
fn clamped_pixel(image: &GrayImage, x: i64, y: i64) -> f32 {
    let cx = x.clamp(0, image.width() as i64 - 1) as u32;
    let cy = y.clamp(0, image.height() as i64 - 1) as u32;
    image.get_pixel(cx, cy).0[0] as f32
}
