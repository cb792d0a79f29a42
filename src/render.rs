//! Rasterizes signals and transform magnitudes into PNG bytes.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::color::{generate_palette, heat_color};
use crate::config::{PlotSize, RenderConfig};
use crate::error::RenderError;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const FRAME: Rgb<u8> = Rgb([170, 170, 170]);

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// One line of a line plot.
#[derive(Debug, Clone, Copy)]
pub struct Series<'a> {
    pub samples: &'a [f64],
    /// Opacity in [0, 1].
    pub alpha: f32,
}

impl<'a> Series<'a> {
    pub fn new(samples: &'a [f64]) -> Self {
        Series { samples, alpha: 1.0 }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Renderer { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    fn line_color(&self, index: usize, total: usize) -> Rgb<u8> {
        self.config
            .line_colors
            .get(index)
            .map(|&c| Rgb(c))
            .unwrap_or_else(|| generate_palette(total.max(1))[index % total.max(1)])
    }

    /// Draw every series over a shared y range, later series on top.
    pub fn line_plot(&self, size: PlotSize, series: &[Series<'_>]) -> Result<Vec<u8>, RenderError> {
        let finite = || {
            series
                .iter()
                .flat_map(|s| s.samples.iter().copied())
                .filter(|v| v.is_finite())
        };
        let lo = finite().fold(f64::INFINITY, f64::min);
        let hi = finite().fold(f64::NEG_INFINITY, f64::max);
        if !lo.is_finite() || size.width == 0 || size.height == 0 {
            return Err(RenderError::Empty);
        }
        let (lo, hi) = if hi > lo {
            let pad = (hi - lo) * 0.05;
            (lo - pad, hi + pad)
        } else {
            (lo - 0.5, hi + 0.5)
        };

        let mut img = RgbImage::from_pixel(size.width, size.height, BACKGROUND);
        let m = self.config.margin.min(size.width / 4).min(size.height / 4) as f64;
        let left = m;
        let right = size.width as f64 - 1.0 - m;
        let top = m;
        let bottom = size.height as f64 - 1.0 - m;
        draw_frame(&mut img, left, top, right, bottom);

        for (i, s) in series.iter().enumerate() {
            let color = self.line_color(i, series.len());
            let n = s.samples.len();
            let x_of = |j: usize| {
                if n > 1 {
                    left + (right - left) * j as f64 / (n - 1) as f64
                } else {
                    (left + right) / 2.0
                }
            };
            let y_of = |v: f64| bottom - (bottom - top) * (v - lo) / (hi - lo);

            let mut prev: Option<(f64, f64)> = None;
            for (j, &v) in s.samples.iter().enumerate() {
                if !v.is_finite() {
                    prev = None;
                    continue;
                }
                let p = (x_of(j), y_of(v));
                match prev {
                    Some(q) => draw_segment(&mut img, q, p, color, s.alpha),
                    None => blend(&mut img, p.0, p.1, color, s.alpha),
                }
                prev = Some(p);
            }
        }

        encode(img)
    }

    /// Colour-coded `rows × cols` grid, row 0 at the top.
    pub fn heatmap(
        &self,
        size: PlotSize,
        grid: &[f64],
        rows: usize,
        cols: usize,
    ) -> Result<Vec<u8>, RenderError> {
        if rows == 0 || cols == 0 || grid.len() < rows * cols || size.width == 0 || size.height == 0 {
            return Err(RenderError::Empty);
        }
        let max = grid[..rows * cols]
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0, f64::max);
        let scale = if max > 0.0 { 1.0 / max } else { 0.0 };

        let img = RgbImage::from_fn(size.width, size.height, |x, y| {
            let r = (y as usize * rows / size.height as usize).min(rows - 1);
            let c = (x as usize * cols / size.width as usize).min(cols - 1);
            heat_color(grid[r * cols + c] * scale)
        });
        encode(img)
    }
}

// ---------------------------------------------------------------------------
// Raster helpers
// ---------------------------------------------------------------------------

fn blend(img: &mut RgbImage, x: f64, y: f64, color: Rgb<u8>, alpha: f32) {
    let (x, y) = (x.round(), y.round());
    if x < 0.0 || y < 0.0 || x >= img.width() as f64 || y >= img.height() as f64 {
        return;
    }
    let px = img.get_pixel_mut(x as u32, y as u32);
    for (dst, src) in px.0.iter_mut().zip(color.0) {
        *dst = (src as f32 * alpha + *dst as f32 * (1.0 - alpha)).round() as u8;
    }
}

/// Two pixels thick, stepped along the longer axis.
fn draw_segment(img: &mut RgbImage, a: (f64, f64), b: (f64, f64), color: Rgb<u8>, alpha: f32) {
    let steps = (b.0 - a.0).abs().max((b.1 - a.1).abs()).ceil().max(1.0) as usize;
    for k in 1..=steps {
        let t = k as f64 / steps as f64;
        let x = a.0 + (b.0 - a.0) * t;
        let y = a.1 + (b.1 - a.1) * t;
        blend(img, x, y, color, alpha);
        blend(img, x, y + 1.0, color, alpha);
    }
}

fn draw_frame(img: &mut RgbImage, left: f64, top: f64, right: f64, bottom: f64) {
    let (l, t, r, b) = (left as u32, top as u32, right as u32, bottom as u32);
    for x in l..=r {
        img.put_pixel(x, t, FRAME);
        img.put_pixel(x, b, FRAME);
    }
    for y in t..=b {
        img.put_pixel(l, y, FRAME);
        img.put_pixel(r, y, FRAME);
    }
}

fn encode(img: RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// PNG bytes as base64 text, ready for JSON or a `data:` URI.
pub fn to_base64(png: &[u8]) -> String {
    STANDARD.encode(png)
}
