//! Minimal FITS support: enough to pull one amplitude column out of a
//! primary image HDU or a BINTABLE extension, and to write both layouts
//! back out for fixtures and sample data.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result, bail};

const BLOCK: usize = 2880;
const CARD: usize = 80;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Keyword → raw value text of one header unit.
#[derive(Debug, Clone, Default)]
pub struct Header {
    cards: BTreeMap<String, String>,
}

impl Header {
    fn parse_card(&mut self, card: &[u8]) {
        if !card.is_ascii() {
            return;
        }
        let text = String::from_utf8_lossy(card);
        if text.len() < 10 || &text[8..10] != "= " {
            return;
        }
        let key = text[..8].trim().to_string();
        let mut value = text[10..].trim();
        if let Some(rest) = value.strip_prefix('\'') {
            // String value: ends at the next lone quote, '' escapes a quote.
            let mut out = String::new();
            let mut chars = rest.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\'' {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        out.push('\'');
                        continue;
                    }
                    break;
                }
                out.push(c);
            }
            self.cards.insert(key, out.trim_end().to_string());
            return;
        }
        if let Some(slash) = value.find('/') {
            value = value[..slash].trim();
        }
        self.cards.insert(key, value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.cards.get(key).map(|s| s.as_str())
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        let raw = self
            .get(key)
            .with_context(|| format!("missing header keyword {key}"))?;
        raw.parse::<i64>()
            .with_context(|| format!("keyword {key}: '{raw}' is not an integer"))
    }

    /// A non-negative integer keyword: a size, count or axis length.
    pub fn count(&self, key: &str) -> Result<usize> {
        let n = self.int(key)?;
        usize::try_from(n).with_context(|| format!("keyword {key} is negative ({n})"))
    }

    fn count_or(&self, key: &str, default: usize) -> Result<usize> {
        match self.get(key) {
            Some(_) => self.count(key),
            None => Ok(default),
        }
    }

    fn float_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            Some(raw) => raw
                .replace('D', "E")
                .parse::<f64>()
                .with_context(|| format!("keyword {key}: '{raw}' is not a number")),
            None => Ok(default),
        }
    }

    fn axes(&self) -> Result<Vec<usize>> {
        let naxis = self.count("NAXIS")?;
        if naxis > 999 {
            bail!("NAXIS = {naxis} exceeds the FITS limit of 999");
        }
        (1..=naxis).map(|i| self.count(&format!("NAXIS{i}"))).collect()
    }
}

// ---------------------------------------------------------------------------
// HDU splitting
// ---------------------------------------------------------------------------

/// One header-data unit, borrowing its data bytes from the file buffer.
pub struct Hdu<'a> {
    pub header: Header,
    pub data: &'a [u8],
}

/// Split a whole FITS file into its HDUs.
pub fn parse_hdus(bytes: &[u8]) -> Result<Vec<Hdu<'_>>> {
    let mut hdus = Vec::new();
    let mut offset = 0;

    while offset + BLOCK <= bytes.len() {
        let mut header = Header::default();
        let mut ended = false;
        while !ended {
            if offset + BLOCK > bytes.len() {
                bail!("header unit {} is not terminated by END", hdus.len());
            }
            for card in bytes[offset..offset + BLOCK].chunks(CARD) {
                if card.starts_with(b"END") && card[3..].iter().all(|&b| b == b' ') {
                    ended = true;
                    break;
                }
                header.parse_card(card);
            }
            offset += BLOCK;
        }

        let bitpix = header.int("BITPIX")?;
        let axes = header.axes()?;
        let pcount = header.count_or("PCOUNT", 0)?;
        let gcount = header.count_or("GCOUNT", 1)?;
        let size = data_size(bitpix, &axes, pcount, gcount)
            .with_context(|| format!("HDU {} data size overflows", hdus.len()))?;

        if size > bytes.len() - offset {
            bail!(
                "HDU {} declares {size} data bytes but only {} remain",
                hdus.len(),
                bytes.len() - offset
            );
        }
        hdus.push(Hdu {
            header,
            data: &bytes[offset..offset + size],
        });
        offset += size.div_ceil(BLOCK) * BLOCK;
    }

    if hdus.is_empty() {
        bail!("file is shorter than one FITS block");
    }
    Ok(hdus)
}

/// `|BITPIX|/8 · GCOUNT · (PCOUNT + NAXIS1 · … · NAXISn)`, `None` on overflow.
fn data_size(bitpix: i64, axes: &[usize], pcount: usize, gcount: usize) -> Option<usize> {
    let elements = if axes.is_empty() {
        0
    } else {
        axes.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))?
    };
    let width = usize::try_from(bitpix.unsigned_abs() / 8).ok()?;
    width
        .checked_mul(gcount)?
        .checked_mul(pcount.checked_add(elements)?)
}

// ---------------------------------------------------------------------------
// Primary image
// ---------------------------------------------------------------------------

/// Values of an image HDU. Multi-dimensional images yield their first row.
pub fn image_values(hdu: &Hdu<'_>) -> Result<Vec<f64>> {
    let axes = hdu.header.axes()?;
    let Some(&row_len) = axes.first() else {
        bail!("image HDU has no data axes");
    };
    let bitpix = hdu.header.int("BITPIX")?;
    let bscale = hdu.header.float_or("BSCALE", 1.0)?;
    let bzero = hdu.header.float_or("BZERO", 0.0)?;
    let width = match bitpix {
        8 => 1,
        16 => 2,
        32 | -32 => 4,
        64 | -64 => 8,
        other => bail!("unsupported BITPIX {other}"),
    };

    hdu.data
        .chunks_exact(width)
        .take(row_len)
        .map(|raw| -> Result<f64> { Ok(bzero + bscale * decode_bitpix(bitpix, raw)?) })
        .collect()
}

fn decode_bitpix(bitpix: i64, raw: &[u8]) -> Result<f64> {
    Ok(match bitpix {
        8 => raw[0] as f64,
        16 => i16::from_be_bytes([raw[0], raw[1]]) as f64,
        32 => i32::from_be_bytes(raw.try_into()?) as f64,
        64 => i64::from_be_bytes(raw.try_into()?) as f64,
        -32 => f32::from_be_bytes(raw.try_into()?) as f64,
        -64 => f64::from_be_bytes(raw.try_into()?),
        other => bail!("unsupported BITPIX {other}"),
    })
}

// ---------------------------------------------------------------------------
// Binary table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Column {
    name: String,
    repeat: usize,
    code: char,
    offset: usize,
    scale: f64,
    zero: f64,
}

fn element_width(code: char) -> Result<usize> {
    Ok(match code {
        'L' | 'B' | 'A' => 1,
        'I' => 2,
        'J' | 'E' => 4,
        'K' | 'D' | 'C' | 'P' => 8,
        'M' | 'Q' => 16,
        other => bail!("unsupported TFORM type '{other}'"),
    })
}

fn parse_tform(tform: &str) -> Result<(usize, char)> {
    let tform = tform.trim();
    let digits: String = tform.chars().take_while(|c| c.is_ascii_digit()).collect();
    let code = tform[digits.len()..]
        .chars()
        .next()
        .with_context(|| format!("TFORM '{tform}' has no type code"))?;
    let repeat = if digits.is_empty() { 1 } else { digits.parse()? };
    Ok((repeat, code))
}

fn table_columns(header: &Header) -> Result<Vec<Column>> {
    let tfields = header.count("TFIELDS")?;
    let mut offset = 0usize;
    let mut columns = Vec::new();
    for i in 1..=tfields {
        let tform = header
            .get(&format!("TFORM{i}"))
            .with_context(|| format!("missing TFORM{i}"))?;
        let (repeat, code) = parse_tform(tform)?;
        let width = if code == 'X' {
            repeat.div_ceil(8)
        } else {
            repeat
                .checked_mul(element_width(code)?)
                .with_context(|| format!("TFORM{i} '{tform}' is too wide"))?
        };
        columns.push(Column {
            name: header.get(&format!("TTYPE{i}")).unwrap_or("").to_string(),
            repeat,
            code,
            offset,
            scale: header.float_or(&format!("TSCAL{i}"), 1.0)?,
            zero: header.float_or(&format!("TZERO{i}"), 0.0)?,
        });
        offset = offset
            .checked_add(width)
            .context("table row width overflows")?;
    }
    Ok(columns)
}

/// Flux values of a BINTABLE HDU: the column named `flux` if there is one,
/// otherwise the second column (the first when the table has only one).
/// Array cells are flattened row after row.
pub fn table_flux(hdu: &Hdu<'_>) -> Result<Vec<f64>> {
    let xtension = hdu.header.get("XTENSION").unwrap_or("");
    if xtension != "BINTABLE" {
        bail!("expected a BINTABLE extension, found '{xtension}'");
    }
    let columns = table_columns(&hdu.header)?;
    let column = columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case("flux"))
        .or_else(|| columns.get(1))
        .or_else(|| columns.first())
        .context("binary table has no columns")?;

    let row_len = hdu.header.count("NAXIS1")?;
    let rows = hdu.header.count("NAXIS2")?;
    let width = element_width(column.code)?;
    let cell_end = column
        .repeat
        .checked_mul(width)
        .and_then(|n| n.checked_add(column.offset))
        .filter(|&end| row_len > 0 && end <= row_len)
        .with_context(|| format!("column '{}' does not fit in {row_len}-byte rows", column.name))?;
    log::debug!(
        "reading column '{}' ({}{}) from {rows} table rows",
        column.name,
        column.repeat,
        column.code
    );

    let mut values = Vec::new();
    for row in hdu.data.chunks_exact(row_len).take(rows) {
        let cell = &row[column.offset..cell_end];
        for raw in cell.chunks_exact(width) {
            let v = match column.code {
                'B' => raw[0] as f64,
                'I' => i16::from_be_bytes(raw.try_into()?) as f64,
                'J' => i32::from_be_bytes(raw.try_into()?) as f64,
                'K' => i64::from_be_bytes(raw.try_into()?) as f64,
                'E' => f32::from_be_bytes(raw.try_into()?) as f64,
                'D' => f64::from_be_bytes(raw.try_into()?),
                other => bail!("column '{}' has non-numeric type '{other}'", column.name),
            };
            values.push(column.zero + column.scale * v);
        }
    }
    Ok(values)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

struct HeaderWriter {
    buf: Vec<u8>,
}

impl HeaderWriter {
    fn new() -> Self {
        HeaderWriter { buf: Vec::new() }
    }

    fn card(&mut self, key: &str, value: &str) -> &mut Self {
        let line = format!("{key:<8}= {value:>20}");
        self.buf.extend_from_slice(format!("{line:<80}").as_bytes());
        self
    }

    fn string(&mut self, key: &str, value: &str) -> &mut Self {
        let quoted = format!("'{:<8}'", value.replace('\'', "''"));
        let line = format!("{key:<8}= {quoted}");
        self.buf.extend_from_slice(format!("{line:<80}").as_bytes());
        self
    }

    fn finish(&mut self) -> Vec<u8> {
        self.buf.extend_from_slice(format!("{:<80}", "END").as_bytes());
        pad(&mut self.buf, b' ');
        std::mem::take(&mut self.buf)
    }
}

fn pad(buf: &mut Vec<u8>, fill: u8) {
    let padded = buf.len().div_ceil(BLOCK) * BLOCK;
    buf.resize(padded, fill);
}

/// Write `values` as a 1-D BITPIX=-64 primary image (the `.fit` layout).
pub fn write_image<W: Write>(mut out: W, values: &[f64]) -> Result<()> {
    let header = HeaderWriter::new()
        .card("SIMPLE", "T")
        .card("BITPIX", "-64")
        .card("NAXIS", "1")
        .card("NAXIS1", &values.len().to_string())
        .finish();
    out.write_all(&header)?;

    let mut data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
    pad(&mut data, 0);
    out.write_all(&data)?;
    out.flush()?;
    Ok(())
}

/// Write an empty primary HDU followed by a two-column BINTABLE
/// (`wavelength`, `flux`, both double), the `.fits` layout.
pub fn write_table<W: Write>(mut out: W, wavelength: &[f64], flux: &[f64]) -> Result<()> {
    if wavelength.len() != flux.len() {
        bail!(
            "wavelength has {} values but flux has {}",
            wavelength.len(),
            flux.len()
        );
    }
    let primary = HeaderWriter::new()
        .card("SIMPLE", "T")
        .card("BITPIX", "8")
        .card("NAXIS", "0")
        .card("EXTEND", "T")
        .finish();
    out.write_all(&primary)?;

    let table = HeaderWriter::new()
        .string("XTENSION", "BINTABLE")
        .card("BITPIX", "8")
        .card("NAXIS", "2")
        .card("NAXIS1", "16")
        .card("NAXIS2", &flux.len().to_string())
        .card("PCOUNT", "0")
        .card("GCOUNT", "1")
        .card("TFIELDS", "2")
        .string("TTYPE1", "wavelength")
        .string("TFORM1", "D")
        .string("TTYPE2", "flux")
        .string("TFORM2", "D")
        .finish();
    out.write_all(&table)?;

    let mut data = Vec::with_capacity(flux.len() * 16);
    for (w, f) in wavelength.iter().zip(flux) {
        data.extend_from_slice(&w.to_be_bytes());
        data.extend_from_slice(&f.to_be_bytes());
    }
    pad(&mut data, 0);
    out.write_all(&data)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_roundtrip_keeps_values() {
        let values = vec![1.5, -2.0, 3.25, 8.0];
        let mut bytes = Vec::new();
        write_image(&mut bytes, &values).unwrap();
        assert_eq!(bytes.len() % BLOCK, 0);

        let hdus = parse_hdus(&bytes).unwrap();
        assert_eq!(hdus.len(), 1);
        assert_eq!(image_values(&hdus[0]).unwrap(), values);
    }

    #[test]
    fn table_picks_flux_column() {
        let wave = vec![4000.0, 4001.0, 4002.0];
        let flux = vec![0.1, 0.7, 0.3];
        let mut bytes = Vec::new();
        write_table(&mut bytes, &wave, &flux).unwrap();

        let hdus = parse_hdus(&bytes).unwrap();
        assert_eq!(hdus.len(), 2);
        assert_eq!(hdus[1].header.get("TTYPE2"), Some("flux"));
        assert_eq!(table_flux(&hdus[1]).unwrap(), flux);
    }

    #[test]
    fn tform_repeat_and_code() {
        assert_eq!(parse_tform("1D").unwrap(), (1, 'D'));
        assert_eq!(parse_tform("E").unwrap(), (1, 'E'));
        assert_eq!(parse_tform("3000E").unwrap(), (3000, 'E'));
    }

    #[test]
    fn truncated_file_is_an_error() {
        let mut bytes = Vec::new();
        write_image(&mut bytes, &[1.0; 500]).unwrap();
        bytes.truncate(BLOCK + 100);
        assert!(parse_hdus(&bytes).is_err());
    }

    fn bintable_header(tfields: &str, tform: &str) -> Vec<u8> {
        let mut bytes = HeaderWriter::new()
            .card("SIMPLE", "T")
            .card("BITPIX", "8")
            .card("NAXIS", "0")
            .finish();
        bytes.extend(
            HeaderWriter::new()
                .string("XTENSION", "BINTABLE")
                .card("BITPIX", "8")
                .card("NAXIS", "2")
                .card("NAXIS1", "8")
                .card("NAXIS2", "0")
                .card("PCOUNT", "0")
                .card("GCOUNT", "1")
                .card("TFIELDS", tfields)
                .string("TTYPE1", "flux")
                .string("TFORM1", tform)
                .finish(),
        );
        bytes
    }

    #[test]
    fn scaled_image_reads_first_row() {
        let mut bytes = HeaderWriter::new()
            .card("SIMPLE", "T")
            .card("BITPIX", "16")
            .card("NAXIS", "2")
            .card("NAXIS1", "3")
            .card("NAXIS2", "2")
            .card("BSCALE", "0.5")
            .card("BZERO", "100.0")
            .finish();
        let mut data: Vec<u8> = [1i16, 2, 3, 4, 5, 6]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        pad(&mut data, 0);
        bytes.extend(data);

        let hdus = parse_hdus(&bytes).unwrap();
        assert_eq!(image_values(&hdus[0]).unwrap(), vec![100.5, 101.0, 101.5]);
    }

    #[test]
    fn negative_pcount_is_an_error() {
        let bytes = HeaderWriter::new()
            .card("SIMPLE", "T")
            .card("BITPIX", "8")
            .card("NAXIS", "1")
            .card("NAXIS1", "10")
            .card("PCOUNT", "-1")
            .finish();
        let err = parse_hdus(&bytes).err().unwrap();
        assert!(format!("{err:#}").contains("PCOUNT"), "{err:#}");
    }

    #[test]
    fn overflowing_data_size_is_an_error() {
        for (naxis1, naxis2) in [("4294967296", "4294967296"), ("9223372036854775807", "1")] {
            let bytes = HeaderWriter::new()
                .card("SIMPLE", "T")
                .card("BITPIX", "-64")
                .card("NAXIS", "2")
                .card("NAXIS1", naxis1)
                .card("NAXIS2", naxis2)
                .finish();
            assert!(parse_hdus(&bytes).is_err(), "{naxis1} x {naxis2}");
        }
    }

    #[test]
    fn negative_tfields_is_an_error() {
        let bytes = bintable_header("-1", "1D");
        let hdus = parse_hdus(&bytes).unwrap();
        let err = table_flux(&hdus[1]).err().unwrap();
        assert!(format!("{err:#}").contains("TFIELDS"), "{err:#}");
    }

    #[test]
    fn oversized_tform_is_an_error() {
        for tform in ["4611686018427387904D", "99999999999999999999D", "2D"] {
            let bytes = bintable_header("1", tform);
            let hdus = parse_hdus(&bytes).unwrap();
            assert!(table_flux(&hdus[1]).is_err(), "{tform}");
        }
    }
}
