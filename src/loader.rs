use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use crate::record::{CellValue, Record, Sheet};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("no sheets found in workbook")]
    NoSheets,
    #[error("spreadsheet has no header row")]
    Empty,
    #[error("CSV file is not valid UTF-8")]
    Encoding,
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Spreadsheet formats accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    /// xlsx, xlsm, xlsb, xls or ods; the workbook kind is detected from the bytes
    Workbook,
}

impl SheetFormat {
    /// Pick the parser from a file name
    pub fn from_file_name(name: &str) -> Self {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());
        match extension.as_deref() {
            Some("csv") => SheetFormat::Csv,
            _ => SheetFormat::Workbook,
        }
    }
}

/// Read the first sheet of an uploaded file
///
/// The first non-blank row is the header row and names the fields of every
/// record. Columns with a blank header are ignored and fully blank data rows
/// are skipped. Every record carries every header, blank cells as `Empty`.
///
/// # Arguments
/// * `bytes` - Raw file contents
/// * `file_name` - Original file name, used to tell CSV from workbooks
///
/// # Returns
/// * `Result<Sheet, LoadError>` - The header row and data records, or an error
///
/// # Examples
/// ```
/// use orgchart::loader::read_sheet;
///
/// let sheet = read_sheet(b"Id,Nome\n1,Ana\n", "equipe.csv").unwrap();
/// assert_eq!(sheet.headers, vec!["Id", "Nome"]);
/// assert_eq!(sheet.rows.len(), 1);
/// ```
pub fn read_sheet(bytes: &[u8], file_name: &str) -> Result<Sheet, LoadError> {
    match SheetFormat::from_file_name(file_name) {
        SheetFormat::Csv => from_csv(bytes),
        SheetFormat::Workbook => from_workbook(bytes),
    }
}

/// Read the first worksheet of an Excel/ODS workbook held in memory
pub fn from_workbook(bytes: &[u8]) -> Result<Sheet, LoadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(LoadError::NoSheets)?;

    let range = workbook.worksheet_range(&sheet_name)?;
    sheet_from_range(&range)
}

fn sheet_from_range(range: &Range<Data>) -> Result<Sheet, LoadError> {
    build_sheet(
        range
            .rows()
            .map(|row| row.iter().map(cell_from_data).collect::<Vec<_>>()),
    )
}

fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}

/// Read a CSV file held in memory
///
/// Fields may be quoted, and a quoted field may span lines; a doubled quote
/// inside a quoted field is a literal quote. Rows may have differing lengths.
/// Cells that parse as numbers become numeric cells.
pub fn from_csv(bytes: &[u8]) -> Result<Sheet, LoadError> {
    let text = std::str::from_utf8(bytes).map_err(|_| LoadError::Encoding)?;
    let text = text.trim_start_matches('\u{feff}');

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let rows = reader
        .records()
        .map(|record| Ok(record?.iter().map(csv_cell).collect::<Vec<_>>()))
        .collect::<Result<Vec<_>, LoadError>>()?;
    build_sheet(rows.into_iter())
}

fn csv_cell(field: &str) -> CellValue {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => CellValue::Number(n),
        _ => CellValue::Text(field.to_string()),
    }
}

fn build_sheet<I>(mut rows: I) -> Result<Sheet, LoadError>
where
    I: Iterator<Item = Vec<CellValue>>,
{
    let header_cells = rows
        .by_ref()
        .find(|row| row.iter().any(|c| !c.is_blank()))
        .ok_or(LoadError::Empty)?;

    // (column position, header name)
    let columns: Vec<(usize, String)> = header_cells
        .iter()
        .enumerate()
        .filter_map(|(pos, cell)| cell.as_key().map(|name| (pos, name)))
        .collect();

    let records = rows
        .filter(|row| row.iter().any(|c| !c.is_blank()))
        .map(|row| {
            columns
                .iter()
                .map(|(pos, name)| (name.clone(), row.get(*pos).cloned().unwrap_or_default()))
                .collect::<Record>()
        })
        .collect();

    Ok(Sheet {
        headers: columns.into_iter().map(|(_, name)| name).collect(),
        rows: records,
    })
}
