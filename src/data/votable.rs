//! VOTable reader for the two serializations spectra services hand out:
//! `TABLEDATA` (XML cells) and `BINARY` / `BINARY2` (base64 stream).

use std::io::Write;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

// ---------------------------------------------------------------------------
// FIELD metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Field {
    name: String,
    datatype: String,
    arraysize: Option<String>,
    ucd: String,
}

impl Field {
    fn from_element(e: &BytesStart<'_>) -> Result<Self> {
        let mut field = Field::default();
        for attr in e.attributes() {
            let attr = attr.context("malformed FIELD attribute")?;
            let value = attr.unescape_value()?.to_string();
            match attr.key.local_name().as_ref() {
                b"name" => field.name = value,
                b"datatype" => field.datatype = value,
                b"arraysize" => field.arraysize = Some(value),
                b"ucd" => field.ucd = value,
                _ => {}
            }
        }
        Ok(field)
    }

    fn is_flux(&self) -> bool {
        self.ucd.contains("phot.flux") || self.name.eq_ignore_ascii_case("flux")
    }

    /// `Ok(None)` for variable-length arrays, whose length prefixes each cell.
    fn fixed_count(&self) -> Result<Option<usize>> {
        let Some(size) = self.arraysize.as_deref() else {
            return Ok(Some(1));
        };
        if size.ends_with('*') {
            return Ok(None);
        }
        size.split('x')
            .map(|d| d.trim().parse::<usize>().unwrap_or(1))
            .try_fold(1usize, |acc, d| acc.checked_mul(d))
            .map(Some)
            .with_context(|| format!("field '{}' arraysize '{size}' overflows", self.name))
    }

    fn element_size(&self) -> Result<usize> {
        Ok(match self.datatype.as_str() {
            "boolean" | "unsignedByte" | "char" => 1,
            "short" | "unicodeChar" => 2,
            "int" | "float" => 4,
            "long" | "double" | "floatComplex" => 8,
            "doubleComplex" => 16,
            other => bail!("field '{}' has unsupported datatype '{other}'", self.name),
        })
    }

    fn decode(&self, raw: &[u8]) -> Result<f64> {
        Ok(match self.datatype.as_str() {
            "unsignedByte" => raw[0] as f64,
            "short" => i16::from_be_bytes(raw.try_into()?) as f64,
            "int" => i32::from_be_bytes(raw.try_into()?) as f64,
            "long" => i64::from_be_bytes(raw.try_into()?) as f64,
            "float" => f32::from_be_bytes(raw.try_into()?) as f64,
            "double" => f64::from_be_bytes(raw.try_into()?),
            other => bail!("field '{}' of type '{other}' is not numeric", self.name),
        })
    }
}

/// Index of the amplitude column: a flux field if one is declared,
/// otherwise the second field (the first when there is only one).
fn flux_index(fields: &[Field]) -> Result<usize> {
    if fields.is_empty() {
        bail!("VOTable declares no FIELD elements");
    }
    Ok(fields
        .iter()
        .position(Field::is_flux)
        .unwrap_or(if fields.len() > 1 { 1 } else { 0 }))
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Outside,
    Cell,
    Stream,
}

/// Extract the flux column of the first TABLE in `text`.
pub fn read_flux(text: &str) -> Result<Vec<f64>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut fields: Vec<Field> = Vec::new();
    let mut cells: Vec<Vec<String>> = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell = String::new();
    let mut stream = String::new();
    let mut binary2 = false;
    let mut section = Section::Outside;
    let mut tables = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"TABLE" => tables += 1,
                b"FIELD" => fields.push(Field::from_element(&e)?),
                b"TR" => row = Some(Vec::new()),
                b"TD" => {
                    cell.clear();
                    section = Section::Cell;
                }
                b"BINARY2" => binary2 = true,
                b"STREAM" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"encoding" {
                            let encoding = attr.unescape_value()?;
                            if encoding != "base64" {
                                bail!("unsupported STREAM encoding '{encoding}'");
                            }
                        }
                    }
                    section = Section::Stream;
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"FIELD" => fields.push(Field::from_element(&e)?),
                b"TD" => {
                    if let Some(r) = row.as_mut() {
                        r.push(String::new());
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) => match section {
                Section::Cell => cell.push_str(&t.unescape()?),
                Section::Stream => stream.push_str(&t.unescape()?),
                Section::Outside => {}
            },
            Ok(Event::CData(c)) => match section {
                Section::Cell => cell.push_str(&String::from_utf8_lossy(&c)),
                Section::Stream => stream.push_str(&String::from_utf8_lossy(&c)),
                Section::Outside => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"TD" => {
                    if let Some(r) = row.as_mut() {
                        r.push(std::mem::take(&mut cell));
                    }
                    section = Section::Outside;
                }
                b"TR" => {
                    if let Some(r) = row.take() {
                        cells.push(r);
                    }
                }
                b"STREAM" => section = Section::Outside,
                b"TABLE" => break,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => bail!(
                "XML error at position {}: {e}",
                reader.buffer_position()
            ),
            _ => {}
        }
    }

    if tables == 0 {
        bail!("document contains no TABLE element");
    }
    let index = flux_index(&fields)?;
    log::debug!(
        "VOTable flux column '{}' (#{index} of {})",
        fields[index].name,
        fields.len()
    );

    if !stream.is_empty() {
        decode_stream(&fields, index, &stream, binary2)
    } else if !cells.is_empty() {
        tabledata_values(&cells, index)
    } else {
        bail!("TABLE has neither TABLEDATA rows nor a BINARY stream")
    }
}

fn tabledata_values(rows: &[Vec<String>], index: usize) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(rows.len());
    for (row_no, row) in rows.iter().enumerate() {
        let cell = row
            .get(index)
            .with_context(|| format!("TR {row_no} has only {} cells", row.len()))?;
        if cell.trim().is_empty() {
            log::debug!("TR {row_no}: empty flux cell skipped");
            continue;
        }
        for tok in cell.split_whitespace() {
            values.push(
                tok.parse::<f64>()
                    .with_context(|| format!("TR {row_no}: '{tok}' is not a number"))?,
            );
        }
    }
    Ok(values)
}

fn decode_stream(fields: &[Field], index: usize, stream: &str, binary2: bool) -> Result<Vec<f64>> {
    let compact: String = stream.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .context("decoding base64 STREAM")?;

    let mask_len = if binary2 { fields.len().div_ceil(8) } else { 0 };
    let mut values = Vec::new();
    let mut pos = 0;

    let take = |pos: &mut usize, n: usize| -> Result<std::ops::Range<usize>> {
        if n > bytes.len() - *pos {
            bail!("binary stream truncated at byte {}", *pos);
        }
        let range = *pos..*pos + n;
        *pos += n;
        Ok(range)
    };

    while pos < bytes.len() {
        let row_start = pos;
        let mask = take(&mut pos, mask_len)?;
        let null = binary2 && (bytes[mask.start + index / 8] & (0x80 >> (index % 8))) != 0;

        for (i, field) in fields.iter().enumerate() {
            let count = match field.fixed_count()? {
                Some(n) => n,
                None => {
                    let len = take(&mut pos, 4)?;
                    u32::from_be_bytes(bytes[len].try_into()?) as usize
                }
            };
            let (width, span) = if field.datatype == "bit" {
                (0, count.div_ceil(8))
            } else {
                let width = field.element_size()?;
                let span = count
                    .checked_mul(width)
                    .with_context(|| format!("field '{}' cell size overflows", field.name))?;
                (width, span)
            };
            let cell = take(&mut pos, span)?;
            if i != index || null {
                continue;
            }
            if width == 0 {
                bail!("flux field '{}' is a bit field", field.name);
            }
            for raw in bytes[cell].chunks_exact(width) {
                values.push(field.decode(raw)?);
            }
        }
        if pos == row_start {
            bail!("zero-width row at byte {pos} of the binary stream");
        }
    }
    Ok(values)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VOTABLE version="1.3" xmlns="http://www.ivoa.net/xml/VOTable/v1.3">
<RESOURCE type="results">
<TABLE name="spectrum">
<FIELD name="wavelength" datatype="double" ucd="em.wl" unit="Angstrom"/>
<FIELD name="flux" datatype="double" ucd="phot.flux.density"/>
<DATA>
"#;

const FOOTER: &str = "</DATA>\n</TABLE>\n</RESOURCE>\n</VOTABLE>\n";

/// Write a two-column (`wavelength`, `flux`) VOTable with TABLEDATA rows.
pub fn write_tabledata<W: Write>(mut out: W, wavelength: &[f64], flux: &[f64]) -> Result<()> {
    out.write_all(HEADER.as_bytes())?;
    writeln!(out, "<TABLEDATA>")?;
    for (w, f) in wavelength.iter().zip(flux) {
        writeln!(out, "<TR><TD>{w}</TD><TD>{f}</TD></TR>")?;
    }
    writeln!(out, "</TABLEDATA>")?;
    out.write_all(FOOTER.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Write the same table as a base64 `BINARY` stream.
pub fn write_binary<W: Write>(mut out: W, wavelength: &[f64], flux: &[f64]) -> Result<()> {
    let mut raw = Vec::with_capacity(flux.len() * 16);
    for (w, f) in wavelength.iter().zip(flux) {
        raw.extend_from_slice(&w.to_be_bytes());
        raw.extend_from_slice(&f.to_be_bytes());
    }
    let encoded = STANDARD.encode(&raw);

    out.write_all(HEADER.as_bytes())?;
    writeln!(out, "<BINARY>\n<STREAM encoding=\"base64\">")?;
    for line in encoded.as_bytes().chunks(76) {
        out.write_all(line)?;
        out.write_all(b"\n")?;
    }
    writeln!(out, "</STREAM>\n</BINARY>")?;
    out.write_all(FOOTER.as_bytes())?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAVE: [f64; 4] = [6500.0, 6501.0, 6502.0, 6503.0];
    const FLUX: [f64; 4] = [1.0, 4.5, 2.25, -0.5];

    #[test]
    fn tabledata_flux_column() {
        let mut buf = Vec::new();
        write_tabledata(&mut buf, &WAVE, &FLUX).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(read_flux(&text).unwrap(), FLUX);
    }

    #[test]
    fn binary_stream_flux_column() {
        let mut buf = Vec::new();
        write_binary(&mut buf, &WAVE, &FLUX).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(read_flux(&text).unwrap(), FLUX);
    }

    #[test]
    fn binary2_skips_null_rows() {
        // Two rows of (int id, float flux); the second row's flux is null.
        let mut raw = Vec::new();
        raw.push(0u8);
        raw.extend_from_slice(&1i32.to_be_bytes());
        raw.extend_from_slice(&2.5f32.to_be_bytes());
        raw.push(0b0100_0000);
        raw.extend_from_slice(&2i32.to_be_bytes());
        raw.extend_from_slice(&0f32.to_be_bytes());
        let text = format!(
            r#"<VOTABLE><RESOURCE><TABLE>
<FIELD name="id" datatype="int"/>
<FIELD name="value" datatype="float"/>
<DATA><BINARY2><STREAM encoding="base64">{}</STREAM></BINARY2></DATA>
</TABLE></RESOURCE></VOTABLE>"#,
            STANDARD.encode(&raw)
        );
        assert_eq!(read_flux(&text).unwrap(), vec![2.5]);
    }

    #[test]
    fn variable_length_array_cell_is_flattened() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&3u32.to_be_bytes());
        for v in [0.5f64, 1.5, 2.5] {
            raw.extend_from_slice(&v.to_be_bytes());
        }
        let text = format!(
            r#"<VOTABLE><RESOURCE><TABLE>
<FIELD name="FLUX" datatype="double" arraysize="*"/>
<DATA><BINARY><STREAM encoding="base64">{}</STREAM></BINARY></DATA>
</TABLE></RESOURCE></VOTABLE>"#,
            STANDARD.encode(&raw)
        );
        assert_eq!(read_flux(&text).unwrap(), vec![0.5, 1.5, 2.5]);
    }

    #[test]
    fn missing_table_is_an_error() {
        assert!(read_flux("<VOTABLE><RESOURCE/></VOTABLE>").is_err());
    }

    fn binary_table(field: &str, raw: &[u8]) -> String {
        format!(
            r#"<VOTABLE><RESOURCE><TABLE>
{field}
<DATA><BINARY><STREAM encoding="base64">{}</STREAM></BINARY></DATA>
</TABLE></RESOURCE></VOTABLE>"#,
            STANDARD.encode(raw)
        )
    }

    #[test]
    fn zero_width_rows_are_an_error() {
        let text = binary_table(
            r#"<FIELD name="flux" datatype="double" arraysize="0"/>"#,
            &[1, 2, 3, 4],
        );
        let err = read_flux(&text).unwrap_err();
        assert!(err.to_string().contains("zero-width"), "{err:#}");
    }

    #[test]
    fn overflowing_arraysize_is_an_error() {
        let text = binary_table(
            r#"<FIELD name="flux" datatype="double" arraysize="4294967296x4294967296"/>"#,
            &[0; 16],
        );
        assert!(read_flux(&text).is_err());

        let text = binary_table(
            r#"<FIELD name="flux" datatype="double" arraysize="4611686018427387904"/>"#,
            &[0; 16],
        );
        assert!(read_flux(&text).is_err());
    }
}
