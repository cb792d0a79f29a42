use image::Rgb;
use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

fn hsl_to_rgb(hsl: Hsl) -> Rgb<u8> {
    let rgb: Srgb = hsl.into_color();
    Rgb([
        (rgb.red.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.green.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.blue.clamp(0.0, 1.0) * 255.0) as u8,
    ])
}

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Rgb<u8>> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            hsl_to_rgb(Hsl::new(hue, 0.75, 0.45))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Heat map colour scale
// ---------------------------------------------------------------------------

/// Map `t` in [0, 1] from dark blue (0) through green to red (1).
/// Values outside the range are clamped.
pub fn heat_color(t: f64) -> Rgb<u8> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) as f32 } else { 0.0 };
    let hue = 240.0 * (1.0 - t);
    let lightness = 0.2 + 0.35 * t.min(0.5) * 2.0;
    hsl_to_rgb(Hsl::new(hue, 0.9, lightness))
}
