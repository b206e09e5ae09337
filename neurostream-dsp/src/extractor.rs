//! Window -> metric extraction

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spectrum::{PeriodogramAnalyzer, SpectralAnalyzer};

/// Guard against division by near-zero denominators.
const EPS: f64 = 1e-6;

/// Per-window summary metrics. Scores are clamped to [0, 100] before this
/// struct ever leaves the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub alpha: f64,
    pub beta: f64,
    pub theta: f64,
    pub gamma: f64,
    pub focus_score: f64,
    pub load_score: f64,
    pub anomaly_score: f64,
}

/// Band edges in Hz.
#[derive(Debug, Clone, Copy)]
pub struct BandRanges {
    pub theta: (f32, f32),
    pub alpha: (f32, f32),
    pub beta: (f32, f32),
    pub gamma: (f32, f32),
}

impl Default for BandRanges {
    fn default() -> Self {
        Self {
            theta: (4.0, 8.0),
            alpha: (8.0, 13.0),
            beta: (13.0, 30.0),
            gamma: (30.0, 100.0),
        }
    }
}

/// Turns a raw sample window into a `MetricSample`, or `None` when the
/// window carries no usable signal (zero total band power).
pub struct MetricExtractor {
    analyzer: Box<dyn SpectralAnalyzer>,
    bands: BandRanges,
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self::new(Box::new(PeriodogramAnalyzer::new()), BandRanges::default())
    }
}

impl MetricExtractor {
    pub fn new(analyzer: Box<dyn SpectralAnalyzer>, bands: BandRanges) -> Self {
        Self { analyzer, bands }
    }

    pub fn compute(&self, window: &[f32], sample_rate: u32) -> Option<MetricSample> {
        if window.is_empty() {
            return None;
        }

        let band = |range: (f32, f32)| {
            self.analyzer
                .band_power(window, range.0, range.1, sample_rate)
                .max(0.0)
        };

        let theta = band(self.bands.theta);
        let alpha = band(self.bands.alpha);
        let beta = band(self.bands.beta);
        let gamma = band(self.bands.gamma);

        let total = alpha + beta + theta + gamma;
        if total == 0.0 {
            tracing::debug!("window carries no band power, skipping");
            return None;
        }

        // Score formulas carried over from the reference pipeline; the
        // clamping and the zero-total guard above are the invariants.
        let focus_score = clamp_score(alpha / (theta + EPS) * 50.0);
        let load_score = clamp_score(beta / (total + EPS) * 100.0);
        let anomaly_score = clamp_score((beta - alpha).abs() / (total + EPS) * 100.0);

        Some(MetricSample {
            timestamp: Utc::now(),
            alpha,
            beta,
            theta,
            gamma,
            focus_score,
            load_score,
            anomaly_score,
        })
    }
}

fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}
