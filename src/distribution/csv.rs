//! CSV boundary for distributions.
//!
//! Input is a header row naming at least `password` and `probability`, one
//! record per line. Spaces after a delimiter are skipped and fields may be
//! double-quoted with `""` escapes. Extra columns are carried through and
//! written back in their original position.

use super::{ColumnLayout, Distribution, DistributionRow};
use crate::config::types::{FilterError, InputEncoding, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Load and sort a distribution from a CSV file.
pub fn read_distribution(path: &Path, encoding: InputEncoding) -> Result<Distribution> {
    let file = File::open(path).map_err(|e| {
        FilterError::Config(format!("Input file '{}' not found: {}", path.display(), e))
    })?;
    read_from(file, encoding)
}

/// Load and sort a distribution from any reader.
pub fn read_from<R: Read>(mut reader: R, encoding: InputEncoding) -> Result<Distribution> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    let text = decode(&bytes, encoding);
    let mut lines = records(&text)
        .into_iter()
        .filter(|(_, line)| !line.trim().is_empty());

    let (header_line, header) = lines.next().ok_or_else(|| FilterError::InvalidRow {
        line: 1,
        message: "missing header row".to_string(),
    })?;
    let header = split_record(&header).map_err(|message| FilterError::InvalidRow {
        line: header_line,
        message,
    })?;
    let layout = ColumnLayout::from_header(header.into_iter().map(|f| f.trim().to_string()).collect())?;

    let mut rows = Vec::new();
    for (line, text) in lines {
        let fields = split_record(&text).map_err(|message| FilterError::InvalidRow { line, message })?;
        if fields.len() != layout.header.len() {
            return Err(FilterError::InvalidRow {
                line,
                message: format!(
                    "expected {} fields, got {}",
                    layout.header.len(),
                    fields.len()
                ),
            });
        }
        rows.push(parse_row(&layout, fields, line)?);
    }

    Distribution::with_layout(layout, rows)
}

fn decode(raw: &[u8], encoding: InputEncoding) -> String {
    match encoding {
        InputEncoding::Latin1 => raw.iter().map(|&b| b as char).collect(),
        InputEncoding::Utf8 => String::from_utf8_lossy(raw).into_owned(),
    }
}

fn parse_row(layout: &ColumnLayout, fields: Vec<String>, line: usize) -> Result<DistributionRow> {
    let mut password = String::new();
    let mut probability = 0.0;
    let mut passthrough = Vec::with_capacity(layout.passthrough_width());

    for (i, field) in fields.into_iter().enumerate() {
        if i == layout.password {
            password = field;
        } else if i == layout.probability {
            probability = field.trim().parse::<f64>().map_err(|_| FilterError::InvalidRow {
                line,
                message: format!("invalid probability '{}'", field),
            })?;
            if !probability.is_finite() || probability < 0.0 {
                return Err(FilterError::InvalidRow {
                    line,
                    message: format!("probability must be finite and non-negative, got {}", field),
                });
            }
        } else {
            passthrough.push(field);
        }
    }

    Ok(DistributionRow {
        password,
        probability,
        passthrough,
    })
}

/// Split text into records tagged with their first line number. Line breaks
/// inside double quotes belong to the record.
fn records(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut start = 1;
    let mut line = 1;
    let mut quoted = false;

    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            '\n' => {
                line += 1;
                if quoted {
                    current.push(c);
                } else {
                    if current.ends_with('\r') {
                        current.pop();
                    }
                    out.push((start, std::mem::take(&mut current)));
                    start = line;
                }
            }
            _ => current.push(c),
        }
    }
    if current.ends_with('\r') {
        current.pop();
    }
    if !current.is_empty() {
        out.push((start, current));
    }
    out
}

/// Split one CSV record into fields.
fn split_record(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek() == Some(&' ') {
            chars.next();
        }

        let mut field = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    Some('"') => break,
                    Some(c) => field.push(c),
                    None => return Err("unterminated quoted field".to_string()),
                }
            }
        }

        let mut terminated = false;
        for c in chars.by_ref() {
            if c == ',' {
                terminated = true;
                break;
            }
            field.push(c);
        }
        fields.push(field);

        if !terminated {
            return Ok(fields);
        }
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) || field.starts_with(' ') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Write a distribution as CSV in its source column order.
///
/// Rows without passthrough values (synthetic rows) get empty fields.
pub fn write_distribution<W: Write>(writer: &mut W, distribution: &Distribution) -> Result<()> {
    let layout = distribution.layout();
    let header: Vec<String> = layout.header.iter().map(|h| escape(h)).collect();
    writeln!(writer, "{}", header.join(","))?;

    for row in distribution {
        let mut extra = row.passthrough.iter();
        let fields: Vec<String> = (0..layout.header.len())
            .map(|i| {
                if i == layout.password {
                    escape(&row.password)
                } else if i == layout.probability {
                    row.probability.to_string()
                } else {
                    extra.next().map(|v| escape(v)).unwrap_or_default()
                }
            })
            .collect();
        writeln!(writer, "{}", fields.join(","))?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_and_sorts_with_passthrough() {
        let input = "password, probability, count\nhunter, 0.2, 2\n123456, 0.5, 5\n\nmatrix, 0.3, 3\n";
        let d = read_from(input.as_bytes(), InputEncoding::Utf8).unwrap();

        assert_eq!(d.len(), 3);
        assert_eq!(d.rows()[0].password, "123456");
        assert_eq!(d.rows()[0].passthrough, vec!["5".to_string()]);
        assert_eq!(d.rows()[2].password, "hunter");
        assert_eq!(d.layout().header, vec!["password", "probability", "count"]);
    }

    #[test]
    fn quoted_fields_keep_commas_and_quotes() {
        let input = "password,probability\n\"a,b\",0.6\n\"say \"\"hi\"\"\",0.4\n";
        let d = read_from(input.as_bytes(), InputEncoding::Utf8).unwrap();
        assert_eq!(d.rows()[0].password, "a,b");
        assert_eq!(d.rows()[1].password, "say \"hi\"");
    }

    #[test]
    fn latin1_bytes_decode_one_to_one() {
        let mut input = b"password,probability\n".to_vec();
        input.extend_from_slice(&[b'c', b'a', b'f', 0xE9, b',', b'1', b'\n']);
        let d = read_from(input.as_slice(), InputEncoding::Latin1).unwrap();
        assert_eq!(d.rows()[0].password, "caf\u{e9}");
    }

    #[test]
    fn invalid_probability_reports_line() {
        let input = "password,probability\nabc,0.5\ndef,lots\n";
        let err = read_from(input.as_bytes(), InputEncoding::Utf8).unwrap_err();
        match err {
            FilterError::InvalidRow { line, .. } => assert_eq!(line, 3),
            other => panic!("Expected InvalidRow error, got {other:?}"),
        }
    }

    #[test]
    fn ragged_row_is_rejected() {
        let input = "password,probability,count\nabc,0.5\n";
        assert!(read_from(input.as_bytes(), InputEncoding::Utf8).is_err());
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(read_from("".as_bytes(), InputEncoding::Utf8).is_err());
    }

    #[test]
    fn write_preserves_column_order_and_fills_synthetic_rows() {
        let input = "rank,password,probability\n1,abc,0.7\n2,\"x,y\",0.3\n";
        let d = read_from(input.as_bytes(), InputEncoding::Utf8).unwrap();
        let d = d.extend(vec![DistributionRow::new("zzz", 0.3)]).unwrap();

        let mut out = Vec::new();
        write_distribution(&mut out, &d).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "rank,password,probability\n1,abc,0.7\n2,\"x,y\",0.3\n,zzz,0.3\n"
        );
    }

    #[test]
    fn written_line_breaks_read_back() {
        let d = Distribution::from_pairs(&[("two\nlines", 0.6), ("crlf\r\nkept", 0.4)]).unwrap();
        let mut out = Vec::new();
        write_distribution(&mut out, &d).unwrap();

        let back = read_from(out.as_slice(), InputEncoding::Utf8).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn line_numbers_count_embedded_breaks() {
        let input = "password,probability\n\"a\nb\",0.5\nc,oops\n";
        match read_from(input.as_bytes(), InputEncoding::Utf8).unwrap_err() {
            FilterError::InvalidRow { line, .. } => assert_eq!(line, 4),
            other => panic!("Expected InvalidRow error, got {other:?}"),
        }
    }

    #[test]
    fn read_distribution_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "password,probability").unwrap();
        writeln!(file, "abc,1.0").unwrap();
        file.flush().unwrap();

        let d = read_distribution(file.path(), InputEncoding::Latin1).unwrap();
        assert_eq!(d.len(), 1);
        assert!((d.total_mass() - 1.0).abs() < 1e-12);
    }
}
