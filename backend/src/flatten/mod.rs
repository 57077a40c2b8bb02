//! Tabular ⇄ nested JSON conversion engine.
//!
//! The conversion pipeline talks to the engine only through [`Flattener`].
//! [`SheetFlattener`] is the built-in implementation:
//!
//! ```text
//! unflatten:  <main>.csv / workbook.xlsx ──▶ {"<main>": [ {...}, {...} ]}
//! flatten:    {"<main>": [ {...}, {...} ]} ──▶ <main>.csv
//! ```
//!
//! Column headers are `/`-separated paths (`recipientOrganization/0/name`).
//! Numeric segments index into arrays.

pub mod schema;
mod sheet;
mod tree;
mod unflatten;

use serde_json::Value;
use std::path::Path;

use crate::error::FlattenResult;
use crate::models::FileType;
use crate::parser::TextEncoding;

pub use schema::{SchemaIndex, Segment};

/// Parameters for a tabular → JSON conversion.
#[derive(Debug, Clone)]
pub struct UnflattenOptions {
    /// Format of the input (`Csv` means a directory of sheets).
    pub input_format: FileType,
    /// Sheet holding the root list, also the output array key.
    pub main_sheet_name: String,
    /// Field identifying each root item; rows sharing it (and `id`) merge.
    pub root_id: String,
    /// Item schema used for typing cells and reading titles.
    pub schema: Option<Value>,
    /// Accept human-readable titles as column headers.
    pub convert_titles: bool,
    /// Encoding of CSV input.
    pub encoding: TextEncoding,
}

/// Parameters for a JSON → tabular conversion.
#[derive(Debug, Clone)]
pub struct FlattenOptions {
    /// Name of the sheet written.
    pub main_sheet_name: String,
    /// Key of the root list inside the JSON document.
    pub root_list_path: String,
    pub root_id: String,
    /// Item schema used for titles.
    pub schema: Option<Value>,
    /// Write schema titles instead of field names as headers.
    pub use_titles: bool,
}

/// A tabular ⇄ JSON conversion engine.
pub trait Flattener: Send + Sync {
    /// Convert `input` (sheet directory or workbook) into a JSON file at `output`.
    fn unflatten(&self, input: &Path, output: &Path, options: &UnflattenOptions) -> FlattenResult<()>;

    /// Convert the JSON file at `input` into a spreadsheet at `output`.
    ///
    /// Unparseable input fails with [`crate::error::FlattenError::BadlyFormedJson`].
    fn flatten(&self, input: &Path, output: &Path, options: &FlattenOptions) -> FlattenResult<()>;
}

/// Built-in engine over single main sheets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SheetFlattener;

impl Flattener for SheetFlattener {
    fn unflatten(&self, input: &Path, output: &Path, options: &UnflattenOptions) -> FlattenResult<()> {
        let sheet = unflatten::read_main_sheet(input, options)?;
        let document = unflatten::unflatten_sheet(&sheet, options)?;
        let content = serde_json::to_string_pretty(&document)?;
        std::fs::write(output, content)?;
        Ok(())
    }

    fn flatten(&self, input: &Path, output: &Path, options: &FlattenOptions) -> FlattenResult<()> {
        let document = sheet::read_json(input)?;
        let sheet = sheet::flatten_document(&document, options);
        crate::parser::write_csv_sheet(output, &sheet)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlattenError;

    fn unflatten_options(format: FileType) -> UnflattenOptions {
        UnflattenOptions {
            input_format: format,
            main_sheet_name: "releases".into(),
            root_id: "ocid".into(),
            schema: None,
            convert_titles: false,
            encoding: TextEncoding::Utf8,
        }
    }

    #[test]
    fn test_csv_directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let csv_dir = dir.path().join("csv_dir");
        std::fs::create_dir(&csv_dir).unwrap();
        std::fs::write(
            csv_dir.join("releases.csv"),
            "ocid,id,date,tender/title\nocds-1,r1,2020-01-01,Roads\nocds-2,r2,2019-06-15,Bridges\n",
        )
        .unwrap();

        let json_path = dir.path().join("unflattened.json");
        SheetFlattener
            .unflatten(&csv_dir, &json_path, &unflatten_options(FileType::Csv))
            .unwrap();

        let document: Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(document["releases"][0]["tender"]["title"], "Roads");
        assert_eq!(document["releases"][1]["ocid"], "ocds-2");

        let csv_path = dir.path().join("flattened.csv");
        let options = FlattenOptions {
            main_sheet_name: "releases".into(),
            root_list_path: "releases".into(),
            root_id: "ocid".into(),
            schema: None,
            use_titles: false,
        };
        SheetFlattener.flatten(&json_path, &csv_path, &options).unwrap();

        let flattened = std::fs::read_to_string(&csv_path).unwrap();
        assert!(flattened.starts_with("ocid,id,date,tender/title"));
        assert!(flattened.contains("ocds-1,r1,2020-01-01,Roads"));
    }

    #[test]
    fn test_flatten_badly_formed_json() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.json");
        std::fs::write(&input, "{\"releases\": [").unwrap();

        let options = FlattenOptions {
            main_sheet_name: "releases".into(),
            root_list_path: "releases".into(),
            root_id: String::new(),
            schema: None,
            use_titles: false,
        };
        let err = SheetFlattener
            .flatten(&input, &dir.path().join("out.csv"), &options)
            .unwrap_err();
        assert!(matches!(err, FlattenError::BadlyFormedJson(_)));
    }

    #[test]
    fn test_unflatten_missing_sheet_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = SheetFlattener
            .unflatten(dir.path(), &dir.path().join("out.json"), &unflatten_options(FileType::Csv))
            .unwrap_err();
        assert!(matches!(err, FlattenError::Io(_)));
    }

    #[test]
    fn test_unflatten_rejects_json_input_format() {
        let dir = tempfile::tempdir().unwrap();
        let err = SheetFlattener
            .unflatten(dir.path(), &dir.path().join("out.json"), &unflatten_options(FileType::Json))
            .unwrap_err();
        assert!(matches!(err, FlattenError::Shape(_)));
    }

    fn write_release_workbook(path: &Path, main_sheet: &str) {
        use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

        let mut workbook = Workbook::new();
        let notes = workbook.add_worksheet();
        notes.set_name("notes").unwrap();
        notes.write_string(0, 0, "ocid").unwrap();
        notes.write_string(1, 0, "not a release").unwrap();

        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let sheet = workbook.add_worksheet();
        sheet.set_name(main_sheet).unwrap();
        for (col, header) in ["ocid", "id", "date", "value/amount"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_string(1, 0, "ocds-1").unwrap();
        sheet.write_string(1, 1, "r1").unwrap();
        sheet
            .write_datetime_with_format(1, 2, ExcelDateTime::from_ymd(2020, 1, 1).unwrap(), &date_format)
            .unwrap();
        sheet.write_number(1, 3, 1500).unwrap();
        workbook.save(path).unwrap();
    }

    fn release_schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ocid": { "type": "string" },
                "id": { "type": "string" },
                "date": { "type": "string" },
                "value": {
                    "type": "object",
                    "properties": { "amount": { "type": "number" } }
                }
            }
        })
    }

    #[test]
    fn test_unflatten_workbook_main_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload.xlsx");
        write_release_workbook(&input, "releases");

        let mut options = unflatten_options(FileType::Xlsx);
        options.schema = Some(release_schema());
        let output = dir.path().join("unflattened.json");
        SheetFlattener.unflatten(&input, &output, &options).unwrap();

        let document: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(
            document,
            serde_json::json!({ "releases": [{
                "ocid": "ocds-1",
                "id": "r1",
                "date": "2020-01-01",
                "value": { "amount": 1500 }
            }]})
        );
    }

    #[test]
    fn test_unflatten_workbook_without_main_sheet_reads_first() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload.xlsx");
        write_release_workbook(&input, "data");

        let output = dir.path().join("unflattened.json");
        SheetFlattener
            .unflatten(&input, &output, &unflatten_options(FileType::Xlsx))
            .unwrap();

        let document: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(document, serde_json::json!({ "releases": [{ "ocid": "not a release" }] }));
    }

    #[test]
    fn test_unflatten_not_a_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload.xlsx");
        std::fs::write(&input, "not a zip file").unwrap();

        let err = SheetFlattener
            .unflatten(&input, &dir.path().join("out.json"), &unflatten_options(FileType::Xlsx))
            .unwrap_err();
        assert!(matches!(err, FlattenError::Xlsx(_)));
    }
}
