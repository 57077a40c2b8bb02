//! Sheet reading with encoding sniffing.
//!
//! Turns a CSV file into a [`Sheet`] of header + rows. The encoding is guessed,
//! not detected: valid UTF-8 is read as UTF-8, everything else as Windows-1252.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{FlattenError, FlattenResult};

/// Text encodings the converter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "cp1252")]
    Windows1252,
}

impl TextEncoding {
    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Windows1252 => "cp1252",
        }
    }

    /// Decode bytes, failing on malformed input.
    ///
    /// Windows-1252 maps every byte, so only UTF-8 can fail.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => encoding_rs::UTF_8
                .decode_without_bom_handling_and_without_replacement(strip_bom(bytes))
                .map(|s| s.into_owned()),
            TextEncoding::Windows1252 => Some(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Pick the encoding to convert a CSV with.
///
/// UTF-8 if the whole file decodes cleanly, otherwise Windows-1252.
pub fn sniff_encoding(bytes: &[u8]) -> TextEncoding {
    match TextEncoding::Utf8.decode(bytes) {
        Some(_) => TextEncoding::Utf8,
        None => TextEncoding::Windows1252,
    }
}

/// Guess the encoding of a file on disk.
pub fn sniff_file_encoding<P: AsRef<Path>>(path: P) -> std::io::Result<TextEncoding> {
    let bytes = std::fs::read(path)?;
    Ok(sniff_encoding(&bytes))
}

/// One sheet of a spreadsheet: a header row and string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse CSV text into a sheet. Short rows are padded, blank rows skipped.
///
/// # Example
/// ```ignore
/// use cove::parser::parse_csv_sheet;
///
/// let sheet = parse_csv_sheet("grants", "id,title\n1,Roof\n").unwrap();
/// assert_eq!(sheet.headers, vec!["id", "title"]);
/// assert_eq!(sheet.rows[0], vec!["1", "Roof"]);
/// ```
pub fn parse_csv_sheet(name: &str, content: &str) -> FlattenResult<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len().max(row.len()), String::new());
        rows.push(row);
    }

    Ok(Sheet {
        name: name.to_string(),
        headers,
        rows,
    })
}

/// Read and parse a CSV file with an explicit encoding.
pub fn read_csv_sheet<P: AsRef<Path>>(path: P, encoding: TextEncoding) -> FlattenResult<Sheet> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let content = encoding.decode(&bytes).ok_or_else(|| FlattenError::Encoding {
        path: path.display().to_string(),
        encoding: encoding.label().to_string(),
    })?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    parse_csv_sheet(name, &content)
}

/// Write a sheet as UTF-8 CSV.
pub fn write_csv_sheet<P: AsRef<Path>>(path: P, sheet: &Sheet) -> FlattenResult<u64> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&sheet.headers)?;
    for row in &sheet.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(std::fs::metadata(path)?.len())
}
