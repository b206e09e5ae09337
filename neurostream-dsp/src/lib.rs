//! NeuroStream metric extraction
//!
//! Turns raw sample windows into per-window summary metrics: four band
//! powers (theta, alpha, beta, gamma) and three derived scores, each
//! clamped to [0, 100]. The spectral estimate sits behind the
//! [`SpectralAnalyzer`] trait so the DSP backend stays replaceable.

pub mod extractor;
pub mod spectrum;

pub use extractor::{BandRanges, MetricExtractor, MetricSample};
pub use spectrum::{PeriodogramAnalyzer, SpectralAnalyzer};
