use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::Float64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use spectra_analyzer::data::{fits, votable};

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Continuum with emission (positive amplitude) and absorption (negative)
/// lines plus gaussian noise.
fn generate_spectrum(
    wavelengths: &[f64],
    lines: &[(f64, f64, f64)],
    noise_level: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    wavelengths
        .iter()
        .map(|&wl| {
            let continuum = 1.0 + 2e-5 * (wl - wavelengths[0]);
            let signal: f64 = lines
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(wl, mu, sigma, amp))
                .sum();
            continuum + signal + rng.gauss(0.0, noise_level)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn write_delimited(path: &Path, sep: &str, wavelengths: &[f64], flux: &[f64]) -> Result<()> {
    let body: String = wavelengths
        .iter()
        .zip(flux)
        .map(|(w, f)| format!("{w:.3}{sep}{f:.6}\n"))
        .collect();
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}

fn write_parquet(path: &Path, wavelengths: &[f64], flux: &[f64]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("wavelength", DataType::Float64, false),
        Field::new("flux", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Float64Array::from(wavelengths.to_vec())),
            Arc::new(Float64Array::from(flux.to_vec())),
        ],
    )?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_spectra"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);

    // 2000 samples over 6250..6750 Å: 48 wavelet scales.
    let wavelengths: Vec<f64> = (0..2000).map(|i| 6250.0 + i as f64 * 0.25).collect();
    let lines = [
        (6562.8, 1.8, 2.4),  // H-alpha emission
        (6678.2, 1.2, 0.6),  // He I emission
        (6347.1, 0.9, -0.35), // Si II absorption
        (6371.4, 0.9, -0.25), // Si II absorption
    ];
    let flux = generate_spectrum(&wavelengths, &lines, 0.02, &mut rng);

    let file = |name: &str| out_dir.join(name);

    fits::write_image(BufWriter::new(File::create(file("spectrum.fit"))?), &flux)?;
    fits::write_table(BufWriter::new(File::create(file("spectrum.fits"))?), &wavelengths, &flux)?;
    votable::write_tabledata(
        BufWriter::new(File::create(file("tabledata.vot"))?),
        &wavelengths,
        &flux,
    )?;
    votable::write_binary(
        BufWriter::new(File::create(file("binary.vot"))?),
        &wavelengths,
        &flux,
    )?;
    write_delimited(&file("spectrum.asc"), "  ", &wavelengths, &flux)?;
    write_delimited(&file("spectrum.csv"), ",", &wavelengths, &flux)?;
    write_delimited(&file("spectrum.txt"), "\t", &wavelengths, &flux)?;
    write_parquet(&file("spectrum.parquet"), &wavelengths, &flux)?;

    println!(
        "Wrote a {}-sample spectrum in 8 encodings to {}",
        flux.len(),
        out_dir.display()
    );
    Ok(())
}
