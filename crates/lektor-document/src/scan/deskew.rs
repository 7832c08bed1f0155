// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Skew detection and correction from foreground contour geometry.

use std::panic::{AssertUnwindSafe, catch_unwind};

use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::geometry::{contour_area, min_area_rect};
use imageproc::point::Point;
use lektor_core::config::DeskewConfig;
use lektor_core::error::LektorError;
use lektor_core::{Stage, Staged};
use tracing::{debug, info, instrument, warn};

use crate::image::processor::ImageProcessor;
use crate::scan::enhance::otsu_binarize;

/// A deskewed page and the rotation that was applied to it, in degrees
/// (counter-clockwise positive).
#[derive(Debug, Clone, PartialEq)]
pub struct DeskewOutcome {
    pub image: GrayImage,
    pub angle: f64,
}

/// Detects page rotation from the orientation of foreground blobs and
/// rotates the page back to upright.
#[derive(Debug, Clone, Default)]
pub struct Deskewer {
    config: DeskewConfig,
}

impl Deskewer {
    pub fn new(config: DeskewConfig) -> Self {
        Self { config }
    }

    /// Estimate the skew of `image` in degrees.
    ///
    /// The page is binarized (Otsu, inverted so ink is foreground), contours
    /// smaller than `min_contour_area` are dropped, and the median orientation
    /// of the remaining contours' minimum-area rectangles is returned. A page
    /// with no usable contours is assumed upright (0°).
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect_angle(&self, image: &GrayImage) -> Result<f64, LektorError> {
        let min_area = self.config.min_contour_area;
        catch_unwind(AssertUnwindSafe(|| skew_angle(image, min_area))).map_err(|panic| {
            LektorError::Geometry(format!("skew detection panicked: {}", panic_message(&*panic)))
        })
    }

    /// Detect the skew and rotate the page to undo it.
    ///
    /// Never fails: on any error the input page comes back untouched with the
    /// fault attached.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn deskew(&self, image: GrayImage) -> Staged<DeskewOutcome> {
        if !self.config.enabled {
            debug!("Deskew disabled; page left as-is");
            return Staged::clean(DeskewOutcome { image, angle: 0.0 });
        }

        let angle = match self.detect_angle(&image) {
            Ok(angle) => angle,
            Err(err) => {
                warn!(error = %err, "Deskew failed; continuing with original page");
                return Staged::fell_back(DeskewOutcome { image, angle: 0.0 }, Stage::Deskew, &err);
            }
        };

        if angle == 0.0 {
            debug!("Page is upright");
            return Staged::clean(DeskewOutcome { image, angle });
        }

        let rotated = catch_unwind(AssertUnwindSafe(|| {
            ImageProcessor::from_gray(image.clone())
                .rotate_about_center(angle)
                .into_gray()
        }));

        match rotated {
            Ok(rotated) => {
                info!(angle, "Page deskewed");
                Staged::clean(DeskewOutcome {
                    image: rotated,
                    angle,
                })
            }
            Err(panic) => {
                let err = LektorError::Geometry(format!(
                    "rotation panicked: {}",
                    panic_message(&*panic)
                ));
                warn!(error = %err, "Deskew failed; continuing with original page");
                Staged::fell_back(DeskewOutcome { image, angle: 0.0 }, Stage::Deskew, &err)
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn skew_angle(image: &GrayImage, min_area: f64) -> f64 {
    if image.width() == 0 || image.height() == 0 {
        return 0.0;
    }

    let (_, binary) = otsu_binarize(image, true);
    let contours = find_contours::<i32>(&binary);

    let mut angles: Vec<f64> = contours
        .iter()
        .filter(|contour| contour_area(&contour.points) >= min_area)
        .filter_map(|contour| rect_edge_angle(&contour.points))
        .map(normalize_rect_angle)
        .collect();

    debug!(
        contours = contours.len(),
        usable = angles.len(),
        "Contour orientations collected"
    );
    median(&mut angles).unwrap_or(0.0)
}

/// Express a rectangle edge direction in `[-90, 0)`, then fold angles below
/// -45° up by 90° so the result lies in `[-45, 45)`.
fn normalize_rect_angle(edge_degrees: f64) -> f64 {
    let angle = edge_degrees.rem_euclid(90.0) - 90.0;
    if angle < -45.0 { angle + 90.0 } else { angle }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Direction in degrees (image coordinates) of the longest side of the
/// minimum-area rectangle around `points`. The corners come back snapped to
/// whole pixels, so the long side gives the steadiest reading.
fn rect_edge_angle(points: &[Point<i32>]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    let corners = min_area_rect(points);
    (0..4)
        .map(|i| {
            let (from, to) = (corners[i], corners[(i + 1) % 4]);
            (f64::from(to.x - from.x), f64::from(to.y - from.y))
        })
        .filter(|&(dx, dy)| dx != 0.0 || dy != 0.0)
        .max_by(|a, b| a.0.hypot(a.1).total_cmp(&b.0.hypot(b.1)))
        .map(|(dx, dy)| dy.atan2(dx).to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
    use imageproc::rect::Rect;

    /// White page with dark horizontal "text lines".
    fn upright_page() -> GrayImage {
        let mut img = GrayImage::from_pixel(240, 200, Luma([235u8]));
        for row in 0..6 {
            draw_filled_rect_mut(
                &mut img,
                Rect::at(30, 25 + row * 28).of_size(180, 10),
                Luma([25u8]),
            );
        }
        img
    }

    /// Same page with every line tilted by `degrees` (clockwise on screen
    /// for positive values).
    fn skewed_page(degrees: f64) -> GrayImage {
        let mut img = GrayImage::from_pixel(300, 260, Luma([235u8]));
        let (sin, cos) = degrees.to_radians().sin_cos();
        for row in 0..6 {
            let (cx, cy) = (150.0, 50.0 + row as f64 * 32.0);
            let corners: Vec<Point<i32>> = [(-90.0, -5.0), (90.0, -5.0), (90.0, 5.0), (-90.0, 5.0)]
                .iter()
                .map(|&(u, v): &(f64, f64)| {
                    Point::new(
                        (cx + u * cos - v * sin).round() as i32,
                        (cy + u * sin + v * cos).round() as i32,
                    )
                })
                .collect();
            draw_polygon_mut(&mut img, &corners, Luma([25u8]));
        }
        img
    }

    #[test]
    fn upright_page_detects_zero_twice() {
        let deskewer = Deskewer::default();
        let first = deskewer.deskew(upright_page());
        assert!(first.is_clean());
        assert!(first.output.angle.abs() < 0.5, "first {}", first.output.angle);

        let second = deskewer.deskew(first.output.image);
        assert!(second.output.angle.abs() < 0.5, "second {}", second.output.angle);
    }

    #[test]
    fn blank_page_is_assumed_upright() {
        let page = GrayImage::from_pixel(64, 64, Luma([250u8]));
        let outcome = Deskewer::default().deskew(page.clone());
        assert!(outcome.is_clean());
        assert_eq!(outcome.output.angle, 0.0);
        assert_eq!(outcome.output.image, page);
    }

    #[test]
    fn detects_and_corrects_skew() {
        let deskewer = Deskewer::default();
        let page = skewed_page(5.0);
        let angle = deskewer.detect_angle(&page).expect("detect");
        assert!((angle - 5.0).abs() < 1.0, "detected {angle}");

        let outcome = deskewer.deskew(page);
        assert_eq!(outcome.output.image.dimensions(), (300, 260));
        let residual = deskewer.detect_angle(&outcome.output.image).expect("re-detect");
        assert!(residual.abs() < 1.0, "residual {residual}");
    }

    #[test]
    fn disabled_deskew_is_identity() {
        let deskewer = Deskewer::new(DeskewConfig {
            enabled: false,
            ..DeskewConfig::default()
        });
        let page = skewed_page(4.0);
        let outcome = deskewer.deskew(page.clone());
        assert_eq!(outcome.output.angle, 0.0);
        assert_eq!(outcome.output.image, page);
    }

    #[test]
    fn small_contours_are_ignored() {
        let mut img = GrayImage::from_pixel(80, 80, Luma([240u8]));
        // 6x6 specks enclose well under 100 px².
        for i in 0..4 {
            draw_filled_rect_mut(&mut img, Rect::at(10 + i * 15, 30).of_size(6, 6), Luma([10u8]));
        }
        let angle = Deskewer::default().detect_angle(&img).expect("detect");
        assert_eq!(angle, 0.0);
    }

    #[test]
    fn rect_angle_normalisation() {
        assert_eq!(normalize_rect_angle(0.0), 0.0);
        assert!((normalize_rect_angle(5.0) - 5.0).abs() < 1e-9);
        assert!((normalize_rect_angle(-85.0) - 5.0).abs() < 1e-9);
        assert!((normalize_rect_angle(185.0) - 5.0).abs() < 1e-9);
        assert!((normalize_rect_angle(-30.0) + 30.0).abs() < 1e-9);
        assert!((normalize_rect_angle(60.0) + 30.0).abs() < 1e-9);
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn min_rect_of_axis_aligned_box_is_axis_aligned() {
        let points = [
            Point::new(0, 0),
            Point::new(20, 0),
            Point::new(20, 6),
            Point::new(0, 6),
        ];
        let angle = rect_edge_angle(&points).expect("angle");
        assert_eq!(normalize_rect_angle(angle), 0.0);
    }

    #[test]
    fn min_rect_of_tilted_box_follows_its_long_side() {
        // 50 x 10 box whose long side runs along (4, 3): 36.87 degrees.
        let points = [
            Point::new(0, 0),
            Point::new(40, 30),
            Point::new(34, 38),
            Point::new(-6, 8),
        ];
        let angle = normalize_rect_angle(rect_edge_angle(&points).expect("angle"));
        assert!((angle - 36.87).abs() < 2.0, "angle {angle}");
    }

    #[test]
    fn single_point_has_no_orientation() {
        assert_eq!(rect_edge_angle(&[Point::new(3, 4)]), None);
        assert_eq!(rect_edge_angle(&[]), None);
    }
}
