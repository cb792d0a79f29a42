use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Float64Array, Float64Builder, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use spectra_analyzer::data::loader::SpectrumFormat;
use spectra_analyzer::data::model::normalize;
use spectra_analyzer::data::{fits, votable};
use spectra_analyzer::{AnalysisError, MissingFile, Spectrum};

const N: usize = 2000;

fn wavelengths() -> Vec<f64> {
    (0..N).map(|i| 6250.0 + i as f64 * 0.25).collect()
}

fn flux() -> Vec<f64> {
    (0..N)
        .map(|i| {
            let x = i as f64;
            1e-14 * (1.0 + 0.8 * (-(x - 600.0).powi(2) / 3200.0).exp()
                - 0.5 * (-(x - 1400.0).powi(2) / 1250.0).exp()
                + 0.05 * (x * 0.7).sin())
        })
        .collect()
}

fn write_text(path: &Path, sep: &str) {
    let body: String = wavelengths()
        .iter()
        .zip(flux())
        .map(|(w, f)| format!("{w}{sep}{f:e}\n"))
        .collect();
    std::fs::write(path, body).unwrap();
}

fn write_parquet_flat(path: &Path) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("wavelength", DataType::Float64, false),
        Field::new("flux", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Float64Array::from(wavelengths())),
            Arc::new(Float64Array::from(flux())),
        ],
    )
    .unwrap();
    let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

fn write_parquet_list(path: &Path) {
    let mut y_builder = ListBuilder::new(Float64Builder::new());
    for v in flux() {
        y_builder.values().append_value(v);
    }
    y_builder.append(true);
    let y_array = y_builder.finish();

    let schema = Arc::new(Schema::new(vec![Field::new(
        "y",
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )]));
    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(y_array)]).unwrap();
    let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// One file per supported encoding, all holding the same spectrum.
fn fixtures(dir: &Path) -> Vec<PathBuf> {
    let wave = wavelengths();
    let flux = flux();
    let path = |name: &str| dir.join(name);

    fits::write_image(File::create(path("spectrum.fit")).unwrap(), &flux).unwrap();
    fits::write_table(File::create(path("spectrum.fits")).unwrap(), &wave, &flux).unwrap();
    votable::write_tabledata(File::create(path("tabledata.vot")).unwrap(), &wave, &flux).unwrap();
    votable::write_binary(File::create(path("binary.vot")).unwrap(), &wave, &flux).unwrap();
    write_text(&path("spectrum.asc"), "  ");
    write_text(&path("spectrum.csv"), ",");
    write_text(&path("spectrum.txt"), "\t");
    write_parquet_flat(&path("spectrum.parquet"));
    write_parquet_list(&path("listed.pq"));

    [
        "spectrum.fit",
        "spectrum.fits",
        "tabledata.vot",
        "binary.vot",
        "spectrum.asc",
        "spectrum.csv",
        "spectrum.txt",
        "spectrum.parquet",
        "listed.pq",
    ]
    .iter()
    .map(|n| path(n))
    .collect()
}

fn is_normalized(values: &[f64]) -> bool {
    values.iter().all(|v| (0.0..=1.0).contains(v))
        && values.contains(&0.0)
        && values.contains(&1.0)
}

#[test]
fn every_format_reads_the_same_amplitudes() {
    let dir = tempfile::tempdir().unwrap();
    let expected = flux();
    for path in fixtures(dir.path()) {
        let format = SpectrumFormat::from_path(&path).unwrap();
        let raw = format.read(&path).unwrap();
        assert_eq!(raw.len(), N, "{}", path.display());
        for (a, b) in raw.iter().zip(&expected) {
            assert!((a - b).abs() <= 1e-6 * b.abs(), "{}: {a} vs {b}", path.display());
        }
        assert!(is_normalized(&normalize(&raw).unwrap()), "{}", path.display());
    }
}

#[test]
fn every_format_analyzes_with_48_scales() {
    let dir = tempfile::tempdir().unwrap();
    for path in fixtures(dir.path()) {
        let spectrum = Spectrum::read_spectrum(&path)
            .unwrap()
            .unwrap_or_else(|| panic!("{} not analyzable", path.display()));
        assert!(is_normalized(spectrum.signal()), "{}", path.display());
        assert_eq!(spectrum.scale_count(), 48);
        assert_eq!((spectrum.freq0(), spectrum.w_size()), (0, 5));
    }
}

#[test]
fn empty_window_reconstruction_matches_input_for_every_format() {
    let dir = tempfile::tempdir().unwrap();
    for path in fixtures(dir.path()) {
        let mut spectrum = Spectrum::create(&path).unwrap();
        spectrum.set_window(0, 0);
        let original = spectrum.signal().to_vec();
        let worst = spectrum
            .reconstruction()
            .iter()
            .zip(&original)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(worst < 0.05, "{}: max deviation {worst}", path.display());
    }
}

#[test]
fn missing_file_is_reported_distinctly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.fits");

    assert!(matches!(
        Spectrum::create(&path),
        Err(AnalysisError::MissingFile(p)) if p == path
    ));
    assert_eq!(
        Spectrum::read_spectrum(&path).unwrap_err(),
        MissingFile(path.clone())
    );
}

#[test]
fn unknown_extension_is_not_analyzable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spectrum.xyz");
    // Valid CSV content: it must not be parsed anyway.
    write_text(&path, ",");

    assert!(matches!(
        Spectrum::create(&path),
        Err(AnalysisError::UnsupportedFormat(ext)) if ext == "xyz"
    ));
    assert!(Spectrum::read_spectrum(&path).unwrap().is_none());
}

#[test]
fn corrupt_files_are_not_analyzable() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["broken.fits", "broken.fit", "broken.vot", "broken.csv", "broken.parquet"] {
        let path = dir.path().join(name);
        std::fs::write(&path, "this is not a spectrum\n1,2\nnope,nope,nope\n").unwrap();
        assert!(
            matches!(
                Spectrum::create(&path),
                Err(AnalysisError::MalformedInput { .. })
            ),
            "{name}"
        );
        assert!(Spectrum::read_spectrum(&path).unwrap().is_none(), "{name}");
    }
}

#[test]
fn flat_file_is_degenerate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flat.txt");
    std::fs::write(&path, "1\t5\n2\t5\n3\t5\n").unwrap();
    assert!(matches!(
        Spectrum::create(&path),
        Err(AnalysisError::DegenerateSignal(_))
    ));
    assert!(Spectrum::read_spectrum(&path).unwrap().is_none());
}
