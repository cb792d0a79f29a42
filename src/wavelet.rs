//! Continuous wavelet transform with a derivative-of-Gaussian (DOG) mother
//! wavelet, computed in the Fourier domain.
//!
//! The inverse is the approximate single-sum reconstruction
//! `x_n = Σ_i Re(W_{i,n}) / √s_i`; its overall gain is arbitrary, which is
//! why reconstructions are always renormalized by the caller.

use std::f64::consts::PI;
use std::ops::Range;

use rustfft::FftPlanner;
use rustfft::num_complex::Complex64;

use crate::data::model::RawSignal;

// ---------------------------------------------------------------------------
// TransformEngine – the hyperparameters
// ---------------------------------------------------------------------------

/// Hyperparameters shared by the forward and inverse transform.
///
/// A [`Transform`] keeps a copy of the engine that produced it and its
/// inverse always runs with that copy, so forward and inverse can never
/// disagree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformEngine {
    dt: f64,
    dj: f64,
    order: u32,
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::SPECTRUM
    }
}

impl TransformEngine {
    /// `dt = 1`, scale spacing `0.25`, DOG wavelet of order 2.
    pub const SPECTRUM: TransformEngine = TransformEngine {
        dt: 1.0,
        dj: 0.25,
        order: 2,
    };

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn dj(&self) -> f64 {
        self.dj
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    fn smallest_scale(&self) -> f64 {
        self.dt * (self.order as f64 + 0.5).sqrt() / PI
    }

    /// Geometric scale ladder `s0 · 2^(i·dj)` reaching up to the signal span.
    pub fn scales(&self, n: usize) -> Vec<f64> {
        let s0 = self.smallest_scale();
        let span = (n as f64 * self.dt / s0).log2() / self.dj;
        let count = if span.is_finite() && span > 0.0 {
            span.floor() as usize + 1
        } else {
            1
        };
        (0..count)
            .map(|i| s0 * 2f64.powf(i as f64 * self.dj))
            .collect()
    }

    /// Forward CWT of `signal` over [`scales`](Self::scales)`(signal.len())`.
    pub fn forward(&self, signal: &[f64]) -> Transform {
        let n = signal.len();
        let scales = self.scales(n);
        let mut coefficients = Vec::with_capacity(scales.len() * n);

        if n > 0 {
            let mean = signal.iter().sum::<f64>() / n as f64;
            let mut planner = FftPlanner::<f64>::new();
            let fft = planner.plan_fft_forward(n);
            let ifft = planner.plan_fft_inverse(n);

            let mut spectrum: Vec<Complex64> = signal
                .iter()
                .map(|&v| Complex64::new(v - mean, 0.0))
                .collect();
            fft.process(&mut spectrum);

            let omega = angular_frequencies(n, self.dt);
            let inv_n = 1.0 / n as f64;
            let mut row = vec![Complex64::new(0.0, 0.0); n];
            for &scale in &scales {
                let daughter = self.dog_fourier(scale, &omega);
                for ((out, x), w) in row.iter_mut().zip(&spectrum).zip(&daughter) {
                    *out = x * w;
                }
                ifft.process(&mut row);
                coefficients.extend(row.iter().map(|&c| c * inv_n));
            }
        }

        Transform {
            engine: *self,
            scales,
            len: n,
            coefficients,
        }
    }

    /// Fourier transform of the DOG daughter wavelet at `scale`, normalized
    /// to unit energy for every scale.
    fn dog_fourier(&self, scale: f64, omega: &[f64]) -> Vec<Complex64> {
        let p = self.order;
        let i_pow = match p % 4 {
            0 => Complex64::new(1.0, 0.0),
            1 => Complex64::new(0.0, 1.0),
            2 => Complex64::new(-1.0, 0.0),
            _ => Complex64::new(0.0, -1.0),
        };
        let norm = (2.0 * PI * scale / self.dt).sqrt();
        let coeff = -i_pow * (norm / gamma_half(p).sqrt());

        omega
            .iter()
            .map(|&w| {
                let h = scale * w;
                coeff * (h.powi(p as i32) * (-h * h / 2.0).exp())
            })
            .collect()
    }
}

/// `Γ(p + ½)` via the recurrence `Γ(x + 1) = x·Γ(x)` from `Γ(½) = √π`.
fn gamma_half(p: u32) -> f64 {
    (0..p).fold(PI.sqrt(), |g, k| g * (k as f64 + 0.5))
}

/// FFT bin → angular frequency, negative for the upper half.
fn angular_frequencies(n: usize, dt: f64) -> Vec<f64> {
    let half = n as f64 / 2.0;
    let base = 2.0 * PI / (n as f64 * dt);
    (0..n)
        .map(|k| {
            let k = k as f64;
            if k <= half { base * k } else { base * (k - n as f64) }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Transform – the coefficient matrix
// ---------------------------------------------------------------------------

/// `scales.len() × len` complex coefficients, row-major, row `i` holding
/// scale `i`.
#[derive(Debug, Clone)]
pub struct Transform {
    engine: TransformEngine,
    scales: Vec<f64>,
    len: usize,
    coefficients: Vec<Complex64>,
}

impl Transform {
    pub fn engine(&self) -> TransformEngine {
        self.engine
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Number of rows (`M`).
    pub fn scale_count(&self) -> usize {
        self.scales.len()
    }

    /// Number of samples per row (`N`).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn row(&self, i: usize) -> &[Complex64] {
        &self.coefficients[i * self.len..(i + 1) * self.len]
    }

    /// Elementwise `|W|`, row-major like the coefficients.
    pub fn magnitude(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.norm()).collect()
    }

    /// Inverse transform using every row.
    pub fn inverse(&self) -> RawSignal {
        self.inverse_without(0..0)
    }

    /// Inverse transform with the rows in `suppressed` treated as zero.
    /// The range is clipped to the available rows; an empty range
    /// suppresses nothing.
    pub fn inverse_without(&self, suppressed: Range<usize>) -> RawSignal {
        let mut out = vec![0.0; self.len];
        for (i, &scale) in self.scales.iter().enumerate() {
            if suppressed.contains(&i) {
                continue;
            }
            let weight = 1.0 / scale.sqrt();
            for (o, c) in out.iter_mut().zip(self.row(i)) {
                *o += c.re * weight;
            }
        }
        RawSignal::new(out)
    }
}
