use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use spectra_analyzer::config::AnalyzerConfig;
use spectra_analyzer::render::Renderer;
use spectra_analyzer::session::{SessionId, SessionTable};
use spectra_analyzer::{RenderError, Spectrum};

// ---------------------------------------------------------------------------
// Rendered images
// ---------------------------------------------------------------------------

/// PNG bytes of the three views, shared cheaply with egui's loaders.
pub struct Images {
    pub spectrum: Arc<[u8]>,
    pub transform: Arc<[u8]>,
    pub reconstruction: Arc<[u8]>,
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    pub config: AnalyzerConfig,

    /// The viewer is a single client: one session for its whole lifetime.
    sessions: SessionTable,
    session: SessionId,

    /// Renders of the current spectrum (None until a file is analyzed).
    pub images: Option<Images>,

    /// Bumped on every image change so each render gets a fresh URI.
    pub generation: u64,

    /// URIs egui should drop from its image cache.
    pub stale_uris: Vec<String>,

    /// Draw the original signal over the reconstruction.
    pub overlay_original: bool,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn new(config: AnalyzerConfig) -> Self {
        let mut sessions = SessionTable::new(Renderer::new(config.render.clone()));
        let session = sessions.create_session();
        Self {
            config,
            sessions,
            session,
            images: None,
            generation: 0,
            stale_uris: Vec::new(),
            overlay_original: true,
            status_message: None,
        }
    }

    pub fn spectrum(&self) -> Option<&Spectrum> {
        self.sessions.spectrum(self.session)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.sessions.file_name(self.session)
    }

    /// `bytes://` URI of one view for the current generation.
    pub fn image_uri(&self, view: &str) -> String {
        Self::uri(view, self.generation)
    }

    fn uri(view: &str, generation: u64) -> String {
        format!("bytes://{view}-{generation}.png")
    }

    fn bump_generation(&mut self) {
        for view in ["spectrum", "transform", "reconstruction"] {
            self.stale_uris.push(Self::uri(view, self.generation));
        }
        self.generation += 1;
    }

    /// Analyze a newly picked file and render all three views.
    pub fn open_file(&mut self, path: &Path) {
        match self.sessions.analyze(self.session, path) {
            Ok(true) => match self.render_all() {
                Ok(images) => {
                    self.bump_generation();
                    self.images = Some(images);
                    self.status_message = None;
                }
                Err(e) => self.fail(format!("Rendering failed: {e}")),
            },
            Ok(false) => self.fail(format!(
                "Could not analyze {}",
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            )),
            Err(e) => self.fail(format!("Error: {e}")),
        }
    }

    fn fail(&mut self, message: String) {
        log::error!("{message}");
        self.bump_generation();
        self.images = None;
        self.status_message = Some(message);
    }

    fn render_all(&mut self) -> Result<Images, RenderError> {
        let renderer = self.sessions.renderer().clone();
        let overlay = self.overlay_original;
        let spectrum = self
            .sessions
            .spectrum_mut(self.session)
            .ok_or(RenderError::Empty)?;
        Ok(Images {
            spectrum: spectrum.render_spectrum(&renderer)?.into(),
            transform: spectrum.render_transform_magnitude(&renderer)?.into(),
            reconstruction: spectrum.render_reconstruction(&renderer, overlay)?.into(),
        })
    }

    /// Move the suppression window and re-render the reconstruction.
    pub fn set_window(&mut self, freq0: i64, w_size: i64) {
        match self
            .sessions
            .set_window(self.session, freq0, w_size, self.overlay_original)
        {
            Ok(png) => self.replace_reconstruction(png),
            Err(e) => self.status_message = Some(format!("Error: {e}")),
        }
    }

    /// Toggle the overlay; the cached reconstruction is reused.
    pub fn set_overlay(&mut self, overlay: bool) {
        self.overlay_original = overlay;
        let renderer = self.sessions.renderer().clone();
        let Some(spectrum) = self.sessions.spectrum_mut(self.session) else {
            return;
        };
        match spectrum.render_reconstruction(&renderer, overlay) {
            Ok(png) => self.replace_reconstruction(png),
            Err(e) => self.status_message = Some(format!("Error: {e}")),
        }
    }

    fn replace_reconstruction(&mut self, png: Vec<u8>) {
        if self.images.is_some() {
            self.bump_generation();
        }
        if let Some(images) = self.images.as_mut() {
            images.reconstruction = png.into();
        }
    }

    /// Write the JSON analysis report of the current spectrum to `path`.
    pub fn export_report(&mut self, path: &Path) -> Result<()> {
        let report = self
            .sessions
            .report(self.session, self.overlay_original)
            .context("building report")?;
        let json = serde_json::to_string_pretty(&report).context("serializing report")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        log::info!("Report written to {}", path.display());
        Ok(())
    }
}
