use std::path::PathBuf;

use thiserror::Error;

use crate::data::model::NormalizeError;

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// Why a file could not be turned into a [`Spectrum`](crate::spectrum::Spectrum).
///
/// Only [`AnalysisError::MissingFile`] is a caller error; every other
/// variant means "this file is not analyzable" and is collapsed to `None`
/// by [`Spectrum::read_spectrum`](crate::spectrum::Spectrum::read_spectrum).
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("spectrum file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("no reader for file extension '{0}'")]
    UnsupportedFormat(String),

    #[error("could not read {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    #[error(transparent)]
    DegenerateSignal(#[from] NormalizeError),
}

/// The path handed to the analyzer does not reference an existing file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("spectrum file does not exist: {}", .0.display())]
pub struct MissingFile(pub PathBuf);

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("nothing to plot")]
    Empty,

    #[error("encoding PNG: {0}")]
    Encode(#[from] image::ImageError),
}
