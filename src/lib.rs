//! Wavelet-based dimensionality reduction for one-dimensional spectra.
//!
//! ```text
//!  file ──► data::loader ──► data::model::normalize ──► wavelet::TransformEngine
//!                                                              │
//!                     spectrum::Spectrum ◄─────────────────────┘
//!                      (window, cached reconstruction)
//!                              │
//!                              ▼
//!                       render::Renderer ──► PNG bytes
//! ```

pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod render;
pub mod session;
pub mod spectrum;
pub mod wavelet;

pub use error::{AnalysisError, MissingFile, RenderError};
pub use spectrum::{Spectrum, Window};
