use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, LargeListArray, ListArray};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::fits;
use super::model::RawSignal;
use super::votable;

// ---------------------------------------------------------------------------
// Format registry
// ---------------------------------------------------------------------------

/// Field separator of the plain-text formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `.asc`: columns separated by (at least) two spaces.
    TwoSpace,
    /// `.csv`
    Comma,
    /// `.txt`
    Tab,
}

impl Separator {
    fn byte(self) -> u8 {
        match self {
            Separator::TwoSpace => b' ',
            Separator::Comma => b',',
            Separator::Tab => b'\t',
        }
    }
}

/// Every on-disk encoding a spectrum can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumFormat {
    /// Primary-HDU FITS image, no wavelength axis stored.
    Fit,
    /// FITS binary table in HDU 1.
    Fits,
    /// VOTable, TABLEDATA or BINARY serialization.
    VoTable,
    /// Plain text columns.
    Delimited(Separator),
    /// Parquet with a `flux` or `y` column.
    Parquet,
}

/// Extensions offered in file dialogs, in display order.
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["fit", "fits", "vot", "asc", "csv", "txt", "parquet", "pq"];

impl SpectrumFormat {
    /// Look up the reader for an extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "fit" => Some(SpectrumFormat::Fit),
            "fits" => Some(SpectrumFormat::Fits),
            "vot" => Some(SpectrumFormat::VoTable),
            "asc" => Some(SpectrumFormat::Delimited(Separator::TwoSpace)),
            "csv" => Some(SpectrumFormat::Delimited(Separator::Comma)),
            "txt" => Some(SpectrumFormat::Delimited(Separator::Tab)),
            "parquet" | "pq" => Some(SpectrumFormat::Parquet),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Read the amplitude column of `path`.
    pub fn read(self, path: &Path) -> Result<RawSignal> {
        let samples = match self {
            SpectrumFormat::Fit => load_fit(path),
            SpectrumFormat::Fits => load_fits(path),
            SpectrumFormat::VoTable => load_votable(path),
            SpectrumFormat::Delimited(sep) => load_delimited(path, sep),
            SpectrumFormat::Parquet => load_parquet(path),
        }?;
        Ok(RawSignal::new(samples))
    }
}

// ---------------------------------------------------------------------------
// FITS loaders
// ---------------------------------------------------------------------------

fn load_fit(path: &Path) -> Result<Vec<f64>> {
    let bytes = std::fs::read(path).context("reading FITS file")?;
    let hdus = fits::parse_hdus(&bytes).context("parsing FITS structure")?;
    fits::image_values(&hdus[0]).context("reading primary image")
}

fn load_fits(path: &Path) -> Result<Vec<f64>> {
    let bytes = std::fs::read(path).context("reading FITS file")?;
    let hdus = fits::parse_hdus(&bytes).context("parsing FITS structure")?;
    let table = hdus
        .get(1)
        .context("FITS file has no extension HDU with a data table")?;
    fits::table_flux(table).context("reading binary table")
}

// ---------------------------------------------------------------------------
// VOTable loader
// ---------------------------------------------------------------------------

fn load_votable(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path).context("reading VOTable file")?;
    votable::read_flux(&text).context("parsing VOTable")
}

// ---------------------------------------------------------------------------
// Delimited text loader
// ---------------------------------------------------------------------------

/// One sample per row. With two or more columns the second one is the
/// amplitude, a single column is the amplitude itself. Leading rows that
/// do not parse are treated as a header.
fn load_delimited(path: &Path, sep: Separator) -> Result<Vec<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(sep.byte())
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)
        .context("opening text spectrum")?;

    let mut samples = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("row {row_no}"))?;
        // Repeated spaces split into empty fields; drop them.
        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        let cell = match fields.len() {
            0 => continue,
            1 => fields[0],
            _ => fields[1],
        };
        match cell.parse::<f64>() {
            Ok(v) => samples.push(v),
            Err(_) if samples.is_empty() => {
                log::debug!("skipping header row {row_no}: {fields:?}");
            }
            Err(_) => bail!("row {row_no}: '{cell}' is not a number"),
        }
    }

    if samples.is_empty() {
        bail!("no numeric rows found");
    }
    Ok(samples)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load the `flux` (or `y`) column of a Parquet file.
///
/// Two layouts are understood:
/// - one row per sample with a flat Float64/Float32 column
/// - one row per spectrum with a List/LargeList column, the layout Pandas
///   and Polars write for array-valued cells; only the first row is used
fn load_parquet(path: &Path) -> Result<Vec<f64>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut samples = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let idx = schema
            .index_of("flux")
            .or_else(|_| schema.index_of("y"))
            .map_err(|_| anyhow::anyhow!("Parquet file has neither a 'flux' nor a 'y' column"))?;
        let col = batch.column(idx);

        match col.data_type() {
            DataType::List(_) | DataType::LargeList(_) => {
                if batch.num_rows() > 0 {
                    return extract_f64_list(col, 0).context("row 0: failed to read list cell");
                }
            }
            _ => samples.extend(extract_f64_column(col)?),
        }
    }

    Ok(samples)
}

// -- Parquet / Arrow helpers --

fn extract_f64_column(col: &Arc<dyn Array>) -> Result<Vec<f64>> {
    if let Some(f64_arr) = col.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = col.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "amplitude column is {:?}, expected Float64 or Float32",
            col.data_type()
        )
    }
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    extract_f64_column(&values_array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping() {
        assert_eq!(SpectrumFormat::from_extension("fit"), Some(SpectrumFormat::Fit));
        assert_eq!(SpectrumFormat::from_extension("FITS"), Some(SpectrumFormat::Fits));
        assert_eq!(
            SpectrumFormat::from_extension("asc"),
            Some(SpectrumFormat::Delimited(Separator::TwoSpace))
        );
        assert_eq!(
            SpectrumFormat::from_extension("txt"),
            Some(SpectrumFormat::Delimited(Separator::Tab))
        );
        assert_eq!(SpectrumFormat::from_extension("xyz"), None);
        assert_eq!(SpectrumFormat::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn every_listed_extension_has_a_reader() {
        for ext in SUPPORTED_EXTENSIONS {
            assert!(SpectrumFormat::from_extension(ext).is_some(), "{ext}");
        }
    }

    #[test]
    fn delimited_skips_header_and_takes_second_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.csv");
        std::fs::write(&path, "wavelength,flux\n# comment\n1.0,5.0\n2.0,7.5\n\n3.0,6.0\n").unwrap();
        let raw = SpectrumFormat::Delimited(Separator::Comma).read(&path).unwrap();
        assert_eq!(&*raw, &[5.0, 7.5, 6.0]);
    }

    #[test]
    fn two_space_columns_collapse_runs_of_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.asc");
        std::fs::write(&path, "  6500.0  1.25\n6501.0    2.5\n").unwrap();
        let raw = SpectrumFormat::Delimited(Separator::TwoSpace).read(&path).unwrap();
        assert_eq!(&*raw, &[1.25, 2.5]);
    }

    #[test]
    fn single_column_is_the_amplitude() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.txt");
        std::fs::write(&path, "0.5\n1.5\n-1\n").unwrap();
        let raw = SpectrumFormat::Delimited(Separator::Tab).read(&path).unwrap();
        assert_eq!(&*raw, &[0.5, 1.5, -1.0]);
    }

    #[test]
    fn garbage_after_data_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.txt");
        std::fs::write(&path, "1\t2\n3\toops\n").unwrap();
        assert!(SpectrumFormat::Delimited(Separator::Tab).read(&path).is_err());
    }
}
