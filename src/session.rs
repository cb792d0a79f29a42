use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::error::{MissingFile, RenderError};
use crate::render::{Renderer, to_base64};
use crate::spectrum::Spectrum;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opaque handle of one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("session {0} has no analyzed spectrum")]
    NoSpectrum(SessionId),

    #[error(transparent)]
    MissingFile(#[from] MissingFile),

    #[error(transparent)]
    Render(#[from] RenderError),
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Everything a remote client needs to show an analyzed file: the window
/// controls' state and the three renders as base64 PNG.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub invalid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freq0: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scales: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectrum_img: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwt_img: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformation_img: Option<String>,
}

impl AnalysisReport {
    pub fn invalid() -> Self {
        AnalysisReport {
            invalid: true,
            file_name: None,
            freq0: None,
            w_size: None,
            scales: None,
            spectrum_img: None,
            cwt_img: None,
            transformation_img: None,
        }
    }

    pub fn build(
        spectrum: &mut Spectrum,
        renderer: &Renderer,
        file_name: Option<String>,
        overlay_original: bool,
    ) -> Result<Self, RenderError> {
        Ok(AnalysisReport {
            invalid: false,
            file_name,
            freq0: Some(spectrum.freq0()),
            w_size: Some(spectrum.w_size()),
            scales: Some(spectrum.scale_count()),
            spectrum_img: Some(to_base64(&spectrum.render_spectrum(renderer)?)),
            cwt_img: Some(to_base64(&spectrum.render_transform_magnitude(renderer)?)),
            transformation_img: Some(to_base64(
                &spectrum.render_reconstruction(renderer, overlay_original)?,
            )),
        })
    }
}

// ---------------------------------------------------------------------------
// SessionTable
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Session {
    spectrum: Option<Spectrum>,
    file_name: Option<String>,
}

/// Server-side table of sessions, each owning at most one [`Spectrum`].
///
/// A spectrum lives exactly as long as its session entry: analyzing another
/// file replaces it and [`close`](Self::close) drops it. Not synchronized;
/// wrap the table in a lock to share it between threads.
#[derive(Debug, Default)]
pub struct SessionTable {
    renderer: Renderer,
    next_id: u64,
    sessions: BTreeMap<SessionId, Session>,
}

impl SessionTable {
    pub fn new(renderer: Renderer) -> Self {
        SessionTable {
            renderer,
            next_id: 0,
            sessions: BTreeMap::new(),
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn create_session(&mut self) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(id, Session::default());
        log::debug!("session {id} opened");
        id
    }

    /// Drop a session and its spectrum. Returns whether it existed.
    pub fn close(&mut self, id: SessionId) -> bool {
        let existed = self.sessions.remove(&id).is_some();
        if existed {
            log::debug!("session {id} closed");
        }
        existed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))
    }

    pub fn spectrum(&self, id: SessionId) -> Option<&Spectrum> {
        self.sessions.get(&id)?.spectrum.as_ref()
    }

    pub fn spectrum_mut(&mut self, id: SessionId) -> Option<&mut Spectrum> {
        self.sessions.get_mut(&id)?.spectrum.as_mut()
    }

    pub fn file_name(&self, id: SessionId) -> Option<&str> {
        self.sessions.get(&id)?.file_name.as_deref()
    }

    /// Analyze `path` into the session, replacing its previous spectrum.
    /// Returns whether the file was analyzable; on `false` the session is
    /// left without a spectrum.
    pub fn analyze(&mut self, id: SessionId, path: &Path) -> Result<bool, SessionError> {
        let session = self.session_mut(id)?;
        session.spectrum = None;
        session.file_name = None;

        let spectrum = Spectrum::read_spectrum(path)?;
        let analyzable = spectrum.is_some();
        session.spectrum = spectrum;
        if analyzable {
            session.file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
        }
        Ok(analyzable)
    }

    /// Report for the session's current spectrum, or an `invalid` report
    /// when it has none.
    pub fn report(
        &mut self,
        id: SessionId,
        overlay_original: bool,
    ) -> Result<AnalysisReport, SessionError> {
        let renderer = self.renderer.clone();
        let session = self.session_mut(id)?;
        match session.spectrum.as_mut() {
            Some(spectrum) => Ok(AnalysisReport::build(
                spectrum,
                &renderer,
                session.file_name.clone(),
                overlay_original,
            )?),
            None => Ok(AnalysisReport::invalid()),
        }
    }

    /// Move the session's window and return the new reconstruction PNG.
    pub fn set_window(
        &mut self,
        id: SessionId,
        freq0: i64,
        w_size: i64,
        overlay_original: bool,
    ) -> Result<Vec<u8>, SessionError> {
        let renderer = self.renderer.clone();
        let spectrum = self
            .session_mut(id)?
            .spectrum
            .as_mut()
            .ok_or(SessionError::NoSpectrum(id))?;
        spectrum.set_window(freq0, w_size);
        Ok(spectrum.render_reconstruction(&renderer, overlay_original)?)
    }
}
