//! Raw table loading for bulk uploads (CSV and spreadsheets)

use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info};

use super::errors::{open_existing, ChurnError, ChurnResult};

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Csv,
    Spreadsheet,
}

impl UploadFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> ChurnResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(UploadFormat::Csv),
            "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => Ok(UploadFormat::Spreadsheet),
            other => Err(ChurnError::malformed(format!(
                "unsupported upload type '{}' (expected csv, xls or xlsx)",
                other
            ))),
        }
    }
}

/// Untyped table exactly as uploaded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse CSV text from any reader
    pub fn from_csv_reader<R: Read>(reader: R) -> ChurnResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = csv_reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(|v| v.to_string()).collect());
        }

        Ok(Self { headers, rows })
    }

    /// Load a CSV file
    pub fn from_csv_path(path: &Path) -> ChurnResult<Self> {
        let file = open_existing(path, "upload")?;
        Self::from_csv_reader(file)
    }

    /// Load the first worksheet of a spreadsheet; the first row is the header
    pub fn from_spreadsheet_path(path: &Path) -> ChurnResult<Self> {
        if !path.exists() {
            return Err(ChurnError::missing_resource("upload", path));
        }
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ChurnError::malformed("spreadsheet has no worksheets"))??;

        let mut rows_iter = range.rows();
        let headers = match rows_iter.next() {
            Some(header_row) => header_row.iter().map(cell_to_string).collect::<Vec<_>>(),
            None => return Ok(Self::default()),
        };
        let rows = rows_iter
            .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
            .collect::<Vec<_>>();

        debug!(rows = rows.len(), "Read spreadsheet worksheet");
        Ok(Self { headers, rows })
    }

    /// Load an upload, choosing the reader from the file extension
    pub fn from_path(path: &Path) -> ChurnResult<Self> {
        let table = match UploadFormat::from_path(path)? {
            UploadFormat::Csv => Self::from_csv_path(path)?,
            UploadFormat::Spreadsheet => Self::from_spreadsheet_path(path)?,
        };
        info!(
            path = %path.display(),
            rows = table.len(),
            columns = table.headers.len(),
            "Loaded upload"
        );
        Ok(table)
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(UploadFormat::from_path(Path::new("a.CSV")).unwrap(), UploadFormat::Csv);
        assert_eq!(
            UploadFormat::from_path(Path::new("batch.xlsx")).unwrap(),
            UploadFormat::Spreadsheet
        );
        assert!(UploadFormat::from_path(Path::new("batch.json")).is_err());
    }

    #[test]
    fn test_csv_reader() {
        let data = "customerID, gender ,tenure\nA-1,Male,3\nB-2,Female,\n";
        let table = RawTable::from_csv_reader(data.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["customerID", "gender", "tenure"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1][2], "");
    }

    #[test]
    fn test_spreadsheet_reader() {
        let table = RawTable::from_path(&fixture("bulk_upload.xlsx")).unwrap();
        assert_eq!(table.headers.len(), 21);
        assert_eq!(table.headers[0], "customerID");
        assert_eq!(table.headers[20], "Notes");
        assert_eq!(table.len(), 3);
        // Numeric cells render without a trailing ".0"
        assert_eq!(table.rows[0][5], "1");
        assert_eq!(table.rows[0][18], "70.35");
        assert_eq!(table.rows[1][19], "1889.5");
        // A skipped cell inside the used range reads as blank
        assert_eq!(table.rows[2][19], "");
        assert_eq!(table.rows[2][20], "new");
    }

    #[test]
    fn test_empty_worksheet_has_no_headers() {
        let table = RawTable::from_path(&fixture("empty.xlsx")).unwrap();
        assert!(table.headers.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_missing_upload() {
        let err = RawTable::from_path(Path::new("/no/such/upload.csv")).unwrap_err();
        assert!(matches!(err, ChurnError::MissingResource { .. }));
    }
}
