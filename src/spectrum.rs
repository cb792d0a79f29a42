use std::ops::Range;
use std::path::Path;

use crate::data::loader::SpectrumFormat;
use crate::data::model::{NormalizedSignal, normalize};
use crate::error::{AnalysisError, MissingFile, RenderError};
use crate::render::{Renderer, Series};
use crate::wavelet::{Transform, TransformEngine};

/// Opacity of the original signal drawn over a reconstruction.
const OVERLAY_ALPHA: f32 = 0.8;

// ---------------------------------------------------------------------------
// Window – the suppressed band of scale rows
// ---------------------------------------------------------------------------

/// Rows `[freq0, freq0 + w_size)` of the transform that are zeroed before
/// reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    freq0: usize,
    w_size: usize,
}

impl Window {
    /// Starting window for a transform with `scale_count` rows.
    pub fn initial(scale_count: usize) -> Self {
        Window {
            freq0: 0,
            w_size: 5.min(scale_count.saturating_sub(1)),
        }
    }

    /// Saturate a requested window into range. `freq0` is clamped first,
    /// then `w_size` against the rows left after `freq0`, so the last
    /// scale row is never suppressed.
    pub fn clamped(scale_count: usize, freq0: i64, w_size: i64) -> Self {
        let last = scale_count.saturating_sub(1) as i64;
        let freq0 = freq0.clamp(0, last);
        let w_size = w_size.clamp(0, last - freq0);
        Window {
            freq0: freq0 as usize,
            w_size: w_size as usize,
        }
    }

    pub fn freq0(&self) -> usize {
        self.freq0
    }

    pub fn w_size(&self) -> usize {
        self.w_size
    }

    pub fn rows(&self) -> Range<usize> {
        self.freq0..self.freq0 + self.w_size
    }
}

// ---------------------------------------------------------------------------
// Spectrum
// ---------------------------------------------------------------------------

/// One analyzed spectrum: normalized signal, its wavelet transform, the
/// current suppression window and the cached reconstruction.
#[derive(Debug, Clone)]
pub struct Spectrum {
    signal: NormalizedSignal,
    transform: Transform,
    window: Window,
    /// Normalized reconstruction for `window`; cleared by every
    /// [`set_window`](Self::set_window).
    reconstruction: Option<Vec<f64>>,
}

impl Spectrum {
    /// Read, normalize and transform the spectrum stored at `path`.
    pub fn create(path: &Path) -> Result<Self, AnalysisError> {
        if !path.is_file() {
            return Err(AnalysisError::MissingFile(path.to_path_buf()));
        }
        let format = SpectrumFormat::from_path(path).ok_or_else(|| {
            AnalysisError::UnsupportedFormat(
                path.extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
        })?;
        let raw = format
            .read(path)
            .map_err(|e| AnalysisError::MalformedInput {
                path: path.to_path_buf(),
                reason: format!("{e:#}"),
            })?;

        let spectrum = Self::from_samples(&raw)?;
        log::info!(
            "Analyzed {} as {format:?}: {} samples, {} scales",
            path.display(),
            spectrum.len(),
            spectrum.scale_count()
        );
        Ok(spectrum)
    }

    /// Like [`create`](Self::create), but every failure other than a missing
    /// file becomes `None`. The cause is logged.
    pub fn read_spectrum(path: &Path) -> Result<Option<Self>, MissingFile> {
        match Self::create(path) {
            Ok(spectrum) => Ok(Some(spectrum)),
            Err(AnalysisError::MissingFile(p)) => Err(MissingFile(p)),
            Err(e) => {
                log::warn!("Spectrum {} is not analyzable: {e}", path.display());
                Ok(None)
            }
        }
    }

    /// Build a spectrum from raw in-memory amplitudes.
    pub fn from_samples(raw: &[f64]) -> Result<Self, AnalysisError> {
        let signal = normalize(raw)?;
        let transform = TransformEngine::SPECTRUM.forward(&signal);
        let window = Window::initial(transform.scale_count());
        Ok(Spectrum {
            signal,
            transform,
            window,
            reconstruction: None,
        })
    }

    // -- accessors --

    pub fn signal(&self) -> &NormalizedSignal {
        &self.signal
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn scales(&self) -> &[f64] {
        self.transform.scales()
    }

    pub fn scale_count(&self) -> usize {
        self.transform.scale_count()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn freq0(&self) -> usize {
        self.window.freq0
    }

    pub fn w_size(&self) -> usize {
        self.window.w_size
    }

    pub fn cached_reconstruction(&self) -> Option<&[f64]> {
        self.reconstruction.as_deref()
    }

    // -- mutation --

    /// Move the suppression window, clamping out-of-range requests.
    /// Always drops the cached reconstruction.
    pub fn set_window(&mut self, freq0: i64, w_size: i64) {
        let window = Window::clamped(self.scale_count(), freq0, w_size);
        if (window.freq0 as i64, window.w_size as i64) != (freq0, w_size) {
            log::debug!(
                "window ({freq0}, {w_size}) clamped to ({}, {})",
                window.freq0,
                window.w_size
            );
        }
        self.window = window;
        self.reconstruction = None;
    }

    /// The normalized reconstruction for the current window, computed on
    /// first use after a window change.
    pub fn reconstruction(&mut self) -> &[f64] {
        let rows = self.window.rows();
        let transform = &self.transform;
        self.reconstruction
            .get_or_insert_with(|| {
                log::debug!("reconstructing without scale rows {rows:?}");
                let raw = transform.inverse_without(rows.clone());
                match normalize(&raw) {
                    Ok(signal) => signal.into_inner(),
                    Err(e) => {
                        log::warn!("reconstruction without rows {rows:?} is flat: {e}");
                        vec![0.0; raw.len()]
                    }
                }
            })
            .as_slice()
    }

    // -- rendering --

    pub fn render_spectrum(&self, renderer: &Renderer) -> Result<Vec<u8>, RenderError> {
        renderer.line_plot(renderer.config().spectrum, &[Series::new(&self.signal)])
    }

    /// `|W|` as an image, scale index down, sample index across.
    pub fn render_transform_magnitude(&self, renderer: &Renderer) -> Result<Vec<u8>, RenderError> {
        renderer.heatmap(
            renderer.config().transform,
            &self.transform.magnitude(),
            self.transform.scale_count(),
            self.transform.len(),
        )
    }

    pub fn render_reconstruction(
        &mut self,
        renderer: &Renderer,
        overlay_original: bool,
    ) -> Result<Vec<u8>, RenderError> {
        self.reconstruction();
        let reconstruction = self.reconstruction.as_deref().unwrap_or_default();
        let mut series = vec![Series::new(reconstruction)];
        if overlay_original {
            series.push(Series::new(&self.signal).with_alpha(OVERLAY_ALPHA));
        }
        renderer.line_plot(renderer.config().reconstruction, &series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smooth synthetic spectrum: continuum, one emission and one absorption line.
    fn synthetic(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                1.0 + 0.8 * (-(x - 0.3 * n as f64).powi(2) / 3200.0).exp()
                    - 0.5 * (-(x - 0.7 * n as f64).powi(2) / 1250.0).exp()
                    + 0.05 * (x * 0.7).sin()
            })
            .collect()
    }

    fn window_of(s: &Spectrum) -> (usize, usize) {
        (s.freq0(), s.w_size())
    }

    #[test]
    fn initial_window() {
        let s = Spectrum::from_samples(&synthetic(2000)).unwrap();
        assert_eq!(s.scale_count(), 48);
        assert_eq!(window_of(&s), (0, 5));
        assert!(s.cached_reconstruction().is_none());
    }

    #[test]
    fn initial_window_is_capped_by_scale_count() {
        assert_eq!(Window::initial(3), Window::clamped(3, 0, 2));
        assert_eq!(Window::initial(1).w_size(), 0);
    }

    #[test]
    fn set_window_clamps() {
        let mut s = Spectrum::from_samples(&synthetic(2000)).unwrap();
        let cases = [
            ((48, 0), (47, 0)),
            ((48, 10), (47, 0)),
            ((48, 1), (47, 0)),
            ((47, 1), (47, 0)),
            ((46, 2), (46, 1)),
            ((0, 48), (0, 47)),
            ((0, 47), (0, 47)),
            ((1, 47), (1, 46)),
            ((-3, -1), (0, 0)),
        ];
        for ((f, w), expected) in cases {
            s.set_window(f, w);
            assert_eq!(window_of(&s), expected, "set_window({f}, {w})");
        }
    }

    #[test]
    fn window_invariant_holds_everywhere() {
        for m in [1usize, 2, 8, 48] {
            for f in -2..=(m as i64 + 2) {
                for w in -2..=(m as i64 + 2) {
                    let win = Window::clamped(m, f, w);
                    assert!(win.freq0() <= m);
                    assert!(win.freq0() + win.w_size() <= m.saturating_sub(1).max(win.freq0()));
                    assert_eq!(Window::clamped(m, win.freq0() as i64, win.w_size() as i64), win);
                }
            }
        }
    }

    #[test]
    fn cache_is_cleared_by_every_set_window() {
        let mut s = Spectrum::from_samples(&synthetic(600)).unwrap();
        let renderer = Renderer::default();

        s.render_reconstruction(&renderer, false).unwrap();
        assert!(s.cached_reconstruction().is_some());

        let (f, w) = (s.freq0() as i64, s.w_size() as i64);
        s.set_window(f, w);
        assert!(s.cached_reconstruction().is_none());

        s.render_reconstruction(&renderer, true).unwrap();
        assert!(s.cached_reconstruction().is_some());
    }

    #[test]
    fn reconstruction_is_memoized() {
        let mut s = Spectrum::from_samples(&synthetic(600)).unwrap();
        let first = s.reconstruction().to_vec();
        let ptr = s.cached_reconstruction().unwrap().as_ptr();
        assert_eq!(s.reconstruction(), first.as_slice());
        assert_eq!(s.reconstruction().as_ptr(), ptr);
    }

    #[test]
    fn empty_window_reconstructs_the_signal() {
        let mut s = Spectrum::from_samples(&synthetic(2000)).unwrap();
        s.set_window(10, 0);
        let rec = s.reconstruction().to_vec();

        let plain = normalize(&s.transform().inverse()).unwrap();
        assert_eq!(rec, plain.into_inner());

        let worst = rec
            .iter()
            .zip(s.signal().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(worst < 0.05, "max deviation {worst}");
    }

    #[test]
    fn reconstruction_is_normalized() {
        let mut s = Spectrum::from_samples(&synthetic(1000)).unwrap();
        s.set_window(3, 6);
        let rec = s.reconstruction();
        assert!(rec.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(rec.contains(&0.0));
        assert!(rec.contains(&1.0));
    }

    #[test]
    fn renders_produce_png() {
        let mut s = Spectrum::from_samples(&synthetic(300)).unwrap();
        let r = Renderer::default();
        for png in [
            s.render_spectrum(&r).unwrap(),
            s.render_transform_magnitude(&r).unwrap(),
            s.render_reconstruction(&r, true).unwrap(),
        ] {
            assert!(png.starts_with(b"\x89PNG"));
        }
    }

    #[test]
    fn flat_input_is_not_a_spectrum() {
        assert!(matches!(
            Spectrum::from_samples(&[4.0; 64]),
            Err(AnalysisError::DegenerateSignal(_))
        ));
    }
}
