// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page quality assessment: sharpness and contrast metrics that decide how
// much enhancement a page receives.

use image::GrayImage;
use imageproc::filter::laplacian_filter;
use lektor_core::config::QualityThresholds;
use lektor_core::{EnhancementTier, QualityMetrics};
use tracing::{debug, instrument};

/// Measures a page and maps the measurements onto an [`EnhancementTier`].
#[derive(Debug, Clone, Default)]
pub struct QualityAssessor {
    thresholds: QualityThresholds,
}

impl QualityAssessor {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    /// Compute blur (Laplacian variance) and contrast (intensity standard
    /// deviation). An empty image measures as `(0, 0)`.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn measure(&self, image: &GrayImage) -> QualityMetrics {
        if image.width() == 0 || image.height() == 0 {
            return QualityMetrics {
                blur: 0.0,
                contrast: 0.0,
            };
        }

        let laplacian = laplacian_filter(image);
        let blur = population_variance(laplacian.pixels().map(|p| p.0[0] as f64));
        let contrast = population_variance(image.pixels().map(|p| p.0[0] as f64)).sqrt();

        debug!(blur, contrast, "Page quality measured");
        QualityMetrics { blur, contrast }
    }

    /// Measure the page and pick its tier. The tier is decided here once and
    /// carried through the rest of the pipeline.
    pub fn assess(&self, image: &GrayImage) -> (QualityMetrics, EnhancementTier) {
        let metrics = self.measure(image);
        let tier = metrics.select_tier(&self.thresholds);
        debug!(?tier, "Enhancement tier selected");
        (metrics, tier)
    }
}

/// Two-pass population variance.
fn population_variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (count, sum) = values
        .clone()
        .fold((0usize, 0.0f64), |(n, s), v| (n + 1, s + v));
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64
}
