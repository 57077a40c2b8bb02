//! Nested JSON → sheet.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::schema::SchemaIndex;
use super::FlattenOptions;
use crate::error::{FlattenError, FlattenResult};
use crate::parser::Sheet;

/// Separator between values of a scalar array in a single cell.
const ARRAY_SEPARATOR: &str = ";";

/// Read a JSON document, reporting parse failures as badly formed JSON.
pub(crate) fn read_json(path: &Path) -> FlattenResult<Value> {
    let content = std::fs::read(path)?;
    serde_json::from_slice(&content).map_err(|e| FlattenError::BadlyFormedJson(e.to_string()))
}

/// Flatten the root list of `document` into one sheet.
///
/// Each item becomes a row; nested objects become `/`-joined columns in
/// first-seen order. A document that is itself an array is used as the list.
pub(crate) fn flatten_document(document: &Value, options: &FlattenOptions) -> Sheet {
    let items: &[Value] = match document {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get(&options.root_list_path)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    let mut headers: Vec<String> = Vec::new();
    let mut columns: HashMap<String, usize> = HashMap::new();
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(items.len());

    for item in items {
        let mut cells = Vec::new();
        flatten_value(item, String::new(), &mut cells);

        let mut row = vec![String::new(); headers.len()];
        for (path, cell) in cells {
            let column = *columns.entry(path.clone()).or_insert_with(|| {
                headers.push(path);
                headers.len() - 1
            });
            if row.len() <= column {
                row.resize(column + 1, String::new());
            }
            row[column] = cell;
        }
        rows.push(row);
    }

    for row in &mut rows {
        row.resize(headers.len(), String::new());
    }

    if options.use_titles {
        if let Some(schema) = &options.schema {
            let index = SchemaIndex::new(schema);
            headers = headers.iter().map(|h| title_header(index, h)).collect();
        }
    }

    debug!(items = items.len(), columns = headers.len(), "flattened root list");

    Sheet {
        name: options.main_sheet_name.clone(),
        headers,
        rows,
    }
}

fn flatten_value(value: &Value, prefix: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                flatten_value(child, join(&prefix, key), out);
            }
        }
        Value::Array(items) if items.iter().all(is_scalar) => {
            if !items.is_empty() {
                let joined: Vec<String> = items.iter().map(scalar_text).collect();
                out.push((prefix, joined.join(ARRAY_SEPARATOR)));
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_value(child, join(&prefix, &i.to_string()), out);
            }
        }
        scalar => out.push((prefix, scalar_text(scalar))),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `recipientOrganization/0/name` → `Recipient Org:Name`.
///
/// Segments without a schema title keep their field name. Array indexes
/// other than 0 are kept; index 0 is implied by the title form.
fn title_header(index: SchemaIndex<'_>, header: &str) -> String {
    let mut current = Some(index.root());
    let mut titles: Vec<String> = Vec::new();

    for part in header.split('/') {
        if let Ok(n) = part.parse::<usize>() {
            current = current.and_then(|s| index.items(s));
            if n != 0 {
                titles.push(part.to_string());
            }
            continue;
        }
        let title = current.and_then(|s| index.title_of(s, part));
        titles.push(title.unwrap_or(part).to_string());
        current = current.and_then(|s| index.property(s, part));
    }

    titles.join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(use_titles: bool, schema: Option<Value>) -> FlattenOptions {
        FlattenOptions {
            main_sheet_name: "grants".into(),
            root_list_path: "grants".into(),
            root_id: String::new(),
            schema,
            use_titles,
        }
    }

    #[test]
    fn test_nested_objects_become_paths() {
        let doc = json!({ "grants": [
            { "id": "1", "recipientOrganization": [{ "name": "Trust" }], "amountAwarded": 10 },
            { "id": "2", "plannedDates": [{ "duration": 3 }], "amountAwarded": 20.5 }
        ]});
        let sheet = flatten_document(&doc, &options(false, None));

        assert_eq!(sheet.name, "grants");
        assert_eq!(
            sheet.headers,
            vec!["id", "recipientOrganization/0/name", "amountAwarded", "plannedDates/0/duration"]
        );
        assert_eq!(sheet.rows[0], vec!["1", "Trust", "10", ""]);
        assert_eq!(sheet.rows[1], vec!["2", "", "20.5", "3"]);
    }

    #[test]
    fn test_scalar_arrays_join_and_nulls_skip() {
        let doc = json!({ "grants": [{ "id": "1", "tags": ["a", "b"], "note": null, "flag": true }] });
        let sheet = flatten_document(&doc, &options(false, None));
        assert_eq!(sheet.headers, vec!["id", "tags", "flag"]);
        assert_eq!(sheet.rows[0], vec!["1", "a;b", "true"]);
    }

    #[test]
    fn test_missing_root_list_gives_empty_sheet() {
        let sheet = flatten_document(&json!({ "other": [] }), &options(false, None));
        assert!(sheet.headers.is_empty());
        assert!(sheet.rows.is_empty());
    }

    #[test]
    fn test_top_level_array_is_the_list() {
        let sheet = flatten_document(&json!([{ "id": "x" }]), &options(false, None));
        assert_eq!(sheet.rows, vec![vec!["x".to_string()]]);
    }

    #[test]
    fn test_titles_replace_field_names() {
        let schema = json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "title": "Identifier" },
                "recipientOrganization": {
                    "type": "array",
                    "title": "Recipient Org",
                    "items": { "properties": { "name": { "title": "Name" } } }
                },
                "untitled": { "type": "string" }
            }
        });
        let doc = json!({ "grants": [{
            "id": "1",
            "recipientOrganization": [{ "name": "A" }, { "name": "B" }],
            "untitled": "u"
        }]});
        let sheet = flatten_document(&doc, &options(true, Some(schema)));
        assert_eq!(
            sheet.headers,
            vec!["Identifier", "Recipient Org:Name", "Recipient Org:1:Name", "untitled"]
        );
    }

    #[test]
    fn test_read_json_reports_parser_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"grants\": [}").unwrap();

        match read_json(&path).unwrap_err() {
            FlattenError::BadlyFormedJson(message) => assert!(message.contains("line 1")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
