use std::ops::Deref;

use thiserror::Error;

// ---------------------------------------------------------------------------
// RawSignal – amplitudes exactly as read from the file
// ---------------------------------------------------------------------------

/// Ordered Y amplitudes in whatever physical units the source file used.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignal(Vec<f64>);

impl RawSignal {
    pub fn new(samples: Vec<f64>) -> Self {
        RawSignal(samples)
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for RawSignal {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for RawSignal {
    fn from(samples: Vec<f64>) -> Self {
        RawSignal(samples)
    }
}

// ---------------------------------------------------------------------------
// NormalizedSignal – min-max scaled into [0, 1]
// ---------------------------------------------------------------------------

/// A signal whose minimum is exactly 0 and maximum exactly 1.
///
/// The only way to build one is [`normalize`], so holding a
/// `NormalizedSignal` is proof the range was non-degenerate.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSignal(Vec<f64>);

impl NormalizedSignal {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for NormalizedSignal {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("signal has {0} samples, at least 2 are required")]
    TooShort(usize),
    #[error("sample {index} is not finite ({value})")]
    NonFinite { index: usize, value: f64 },
    #[error("degenerate signal: all {len} samples equal {value}")]
    Degenerate { len: usize, value: f64 },
}

/// Rescale `samples` linearly so that min → 0 and max → 1.
pub fn normalize(samples: &[f64]) -> Result<NormalizedSignal, NormalizeError> {
    if samples.len() < 2 {
        return Err(NormalizeError::TooShort(samples.len()));
    }
    if let Some((index, &value)) = samples.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(NormalizeError::NonFinite { index, value });
    }

    let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range == 0.0 {
        return Err(NormalizeError::Degenerate {
            len: samples.len(),
            value: min,
        });
    }

    Ok(NormalizedSignal(
        samples.iter().map(|&v| (v - min) / range).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_extremes_to_unit_interval() {
        let n = normalize(&[3.0, -1.0, 7.0, 1.0]).unwrap();
        assert_eq!(n.as_slice(), &[0.5, 0.0, 1.0, 0.25]);
    }

    #[test]
    fn rejects_flat_signal() {
        assert_eq!(
            normalize(&[2.0, 2.0, 2.0]),
            Err(NormalizeError::Degenerate { len: 3, value: 2.0 })
        );
    }

    #[test]
    fn rejects_short_and_non_finite() {
        assert_eq!(normalize(&[1.0]), Err(NormalizeError::TooShort(1)));
        assert!(matches!(
            normalize(&[0.0, f64::NAN, 1.0]),
            Err(NormalizeError::NonFinite { index: 1, .. })
        ));
    }
}
