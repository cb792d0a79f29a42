use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "SPECTRA_ANALYZER_CONFIG";

// ---------------------------------------------------------------------------
// Render layout
// ---------------------------------------------------------------------------

/// Pixel size of one rendered image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotSize {
    pub width: u32,
    pub height: u32,
}

impl PlotSize {
    pub const fn new(width: u32, height: u32) -> Self {
        PlotSize { width, height }
    }
}

/// Layout hints for the three renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub spectrum: PlotSize,
    pub transform: PlotSize,
    pub reconstruction: PlotSize,
    /// Blank border around line plots, in pixels.
    pub margin: u32,
    /// RGB colour of each line series; missing entries are generated.
    pub line_colors: Vec<[u8; 3]>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            spectrum: PlotSize::new(1500, 200),
            transform: PlotSize::new(1500, 400),
            reconstruction: PlotSize::new(1500, 500),
            margin: 20,
            line_colors: vec![[31, 119, 180], [255, 127, 14]],
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub render: RenderConfig,
    /// Directory the open dialog starts in.
    pub start_directory: Option<PathBuf>,
}

impl AnalyzerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Config from `$SPECTRA_ANALYZER_CONFIG`, or the defaults when unset.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}
