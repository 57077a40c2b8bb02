//! Sheet → nested JSON.

use calamine::{open_workbook, Data, ExcelDateTime, Reader, Xlsx, XlsxError};
use chrono::NaiveTime;
use serde_json::{json, Map, Number, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use super::schema::{SchemaIndex, Segment};
use super::tree::Node;
use super::UnflattenOptions;
use crate::error::{FlattenError, FlattenResult};
use crate::models::FileType;
use crate::parser::{read_csv_sheet, Sheet};

/// Separator between values of a string array in a single cell.
const ARRAY_SEPARATOR: char = ';';

/// Load the sheet holding the root list.
pub(crate) fn read_main_sheet(input: &Path, options: &UnflattenOptions) -> FlattenResult<Sheet> {
    match options.input_format {
        FileType::Csv => {
            let path = input.join(format!("{}.csv", options.main_sheet_name));
            debug!(path = %path.display(), encoding = %options.encoding, "reading main sheet");
            read_csv_sheet(path, options.encoding)
        }
        FileType::Xlsx => read_xlsx_sheet(input, &options.main_sheet_name),
        FileType::Json => Err(FlattenError::Shape(
            "JSON input cannot be unflattened".to_string(),
        )),
    }
}

/// Read the sheet named `main_sheet_name`, or the first sheet of the workbook.
fn read_xlsx_sheet(path: &Path, main_sheet_name: &str) -> FlattenResult<Sheet> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e: XlsxError| FlattenError::Xlsx(e.to_string()))?;

    let names = workbook.sheet_names();
    let name = names
        .iter()
        .find(|n| n.as_str() == main_sheet_name)
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| FlattenError::Xlsx("workbook has no sheets".to_string()))?;
    debug!(sheet = %name, "reading workbook sheet");

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| FlattenError::Xlsx(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|r| r.iter().map(cell_text).collect())
        .unwrap_or_default();

    let rows = rows
        .map(|r| r.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(Sheet {
        name,
        headers,
        rows,
    })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_datetime_text(dt),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
    }
}

/// ISO-8601 text for a date-formatted cell: `2020-01-01` when there is no
/// time part, `2020-01-01T12:30:00` otherwise, `PT90S` for durations.
fn excel_datetime_text(dt: &ExcelDateTime) -> String {
    if dt.is_duration() {
        return match dt.as_duration() {
            Some(d) => format!("PT{}S", d.num_seconds()),
            None => dt.as_f64().to_string(),
        };
    }
    match dt.as_datetime() {
        Some(t) if t.time() == NaiveTime::MIN => t.format("%Y-%m-%d").to_string(),
        Some(t) => t.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => dt.as_f64().to_string(),
    }
}

/// Build `{"<main_sheet_name>": [items]}` from a sheet.
pub(crate) fn unflatten_sheet(sheet: &Sheet, options: &UnflattenOptions) -> FlattenResult<Value> {
    let index = options.schema.as_ref().map(SchemaIndex::new);
    let columns: Vec<Option<Vec<Segment>>> = sheet
        .headers
        .iter()
        .map(|h| column_path(h, index, options.convert_titles))
        .collect();

    let mut items: Vec<Node> = Vec::new();
    let mut by_id: HashMap<(Option<String>, Option<String>), usize> = HashMap::new();

    for (row_number, row) in sheet.rows.iter().enumerate() {
        let mut item = Node::object();
        for ((path, raw), header) in columns.iter().zip(row.iter()).zip(sheet.headers.iter()) {
            let Some(path) = path else { continue };
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let value = match index {
                Some(index) => cast_cell(index, path, raw),
                None => Value::String(raw.to_string()),
            };
            if item.insert(path, value).is_err() {
                warn!(
                    sheet = %sheet.name,
                    row = row_number + 2,
                    column = %header,
                    "column conflicts with an earlier column, cell skipped"
                );
            }
        }

        if item == Node::object() {
            continue;
        }

        match merge_key(&item, &options.root_id) {
            Some(key) => match by_id.get(&key) {
                Some(&i) => items[i].merge(item),
                None => {
                    by_id.insert(key, items.len());
                    items.push(item);
                }
            },
            None => items.push(item),
        }
    }

    debug!(rows = sheet.rows.len(), items = items.len(), "unflattened main sheet");

    let mut document = Map::new();
    document.insert(
        options.main_sheet_name.clone(),
        Value::Array(items.into_iter().map(Node::into_value).collect()),
    );
    Ok(Value::Object(document))
}

/// Rows sharing a root id and an `id` describe the same item.
fn merge_key(item: &Node, root_id: &str) -> Option<(Option<String>, Option<String>)> {
    let root = if root_id.is_empty() {
        None
    } else {
        item.leaf(root_id).map(value_key)
    };
    let id = item.leaf("id").map(value_key);
    match (&root, &id) {
        (None, None) => None,
        _ => Some((root, id)),
    }
}

fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Translate a column header into a path.
///
/// With a schema, headers may use titles (`Recipient Org:Identifier`), and
/// arrays of objects may be addressed without an index, meaning element 0.
fn column_path(header: &str, index: Option<SchemaIndex<'_>>, convert_titles: bool) -> Option<Vec<Segment>> {
    let separator = if convert_titles && !header.contains('/') && header.contains(':') {
        ':'
    } else {
        '/'
    };
    let parts: Vec<&str> = header
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }

    let mut path = Vec::with_capacity(parts.len());
    let mut current = index.map(|i| i.root());

    for (position, part) in parts.iter().enumerate() {
        if let Ok(n) = part.parse::<usize>() {
            current = index.zip(current).and_then(|(i, s)| i.items(s));
            path.push(Segment::Index(n));
            continue;
        }

        let (name, next) = match index.zip(current) {
            Some((i, s)) => match i.property(s, part) {
                Some(child) => (part.to_string(), Some(child)),
                None if convert_titles => match i.property_by_title(s, part) {
                    Some((name, child)) => (name.to_string(), Some(child)),
                    None => (part.to_string(), None),
                },
                None => (part.to_string(), None),
            },
            None => (part.to_string(), None),
        };
        path.push(Segment::Key(name));
        current = next;

        let next_is_key = parts
            .get(position + 1)
            .is_some_and(|p| p.parse::<usize>().is_err());
        if let Some((i, s)) = index.zip(current) {
            if next_is_key && i.has_type(s, "array") {
                path.push(Segment::Index(0));
                current = i.items(s);
            }
        }
    }

    Some(path)
}

/// Cast a cell to the type the schema declares for its column.
fn cast_cell(index: SchemaIndex<'_>, path: &[Segment], raw: &str) -> Value {
    let Some(schema) = index.walk(index.root(), path) else {
        return Value::String(raw.to_string());
    };
    let types = index.types(schema);

    if types.contains(&"string") || types.is_empty() {
        return Value::String(raw.to_string());
    }
    if types.contains(&"array") {
        return Value::Array(
            raw.split(ARRAY_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        );
    }
    if types.contains(&"integer") || types.contains(&"number") {
        if let Ok(i) = raw.parse::<i64>() {
            return json!(i);
        }
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            if types.contains(&"integer") && n.as_f64().is_some_and(|f| f.fract() == 0.0) {
                return json!(n.as_f64().map(|f| f as i64));
            }
            return Value::Number(n);
        }
    }
    if types.contains(&"boolean") {
        match raw.to_lowercase().as_str() {
            "true" | "yes" | "1" => return Value::Bool(true),
            "false" | "no" | "0" => return Value::Bool(false),
            _ => {}
        }
    }
    Value::String(raw.to_string())
}
