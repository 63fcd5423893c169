use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};

use crate::record::{CellValue, Record};

/// Union of the field names of `records`, in first-seen order
///
/// Leading columns can be pinned with `preferred` (e.g. id, parent, name);
/// preferred names that no record has are left out.
pub fn collect_headers(records: &[Record], preferred: &[&str]) -> Vec<String> {
    let mut headers: Vec<String> = preferred
        .iter()
        .filter(|p| records.iter().any(|r| r.contains(p)))
        .map(|p| p.to_string())
        .collect();

    for record in records {
        for key in record.keys() {
            if !headers.iter().any(|h| h == key) {
                headers.push(key.to_string());
            }
        }
    }
    headers
}

/// Convert a chart view to CSV format
///
/// The first line holds the headers. Fields containing commas, quotes or
/// newlines are quoted, with inner quotes doubled.
///
/// # Examples
/// ```
/// use orgchart::downloader::to_csv;
/// use orgchart::record::{CellValue, Record};
///
/// let row: Record = [("Nome", CellValue::from("Silva, Ana"))].into_iter().collect();
/// assert_eq!(to_csv(&[row], &["Nome".to_string()]), "Nome\n\"Silva, Ana\"\n");
/// ```
pub fn to_csv(records: &[Record], headers: &[String]) -> String {
    let mut csv_content = String::new();

    push_csv_line(&mut csv_content, headers.iter().map(String::as_str));
    for record in records {
        let values: Vec<String> = headers.iter().map(|h| record.value(h).to_string()).collect();
        push_csv_line(&mut csv_content, values.iter().map(String::as_str));
    }

    csv_content
}

fn push_csv_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, value) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if value.contains(',') || value.contains('"') || value.contains('\n') {
            out.push('"');
            out.push_str(&value.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(value);
        }
    }
    out.push('\n');
}

/// Convert a chart view to XLSX format
///
/// Writes one worksheet with a header row followed by one row per record.
/// Numbers stay numeric so the file can be uploaded again unchanged.
///
/// # Returns
/// * `Result<Vec<u8>, XlsxError>` - XLSX file content as bytes or an error
pub fn to_xlsx(records: &[Record], headers: &[String]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Organograma")?;

    for (c, header) in headers.iter().enumerate() {
        worksheet.write_string(0, c as u16, header)?;
    }

    for (r, record) in records.iter().enumerate() {
        let row = (r + 1) as u32;
        for (c, header) in headers.iter().enumerate() {
            let col = c as u16;
            match record.value(header) {
                CellValue::Empty => {}
                CellValue::Number(n) => {
                    worksheet.write_number(row, col, *n)?;
                }
                CellValue::Text(s) => {
                    worksheet.write_string(row, col, s)?;
                }
                CellValue::Bool(b) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::from_workbook;

    fn records() -> Vec<Record> {
        vec![
            [("Id", CellValue::from(1i64)), ("Nome", CellValue::from("Ana"))]
                .into_iter()
                .collect(),
            [
                ("Id", CellValue::from(2i64)),
                ("Nome", CellValue::from("Bruno")),
                ("Ativo", CellValue::Bool(true)),
            ]
            .into_iter()
            .collect(),
        ]
    }

    #[test]
    fn headers_keep_preferred_columns_first() {
        let headers = collect_headers(&records(), &["Nome", "Ausente"]);
        assert_eq!(headers, vec!["Nome", "Id", "Ativo"]);
    }

    #[test]
    fn csv_writes_blank_for_missing_fields() {
        let headers = vec!["Id".to_string(), "Ativo".to_string()];
        assert_eq!(to_csv(&records(), &headers), "Id,Ativo\n1,\n2,true\n");
    }

    #[test]
    fn xlsx_export_reads_back() {
        let records = records();
        let headers = collect_headers(&records, &["Id"]);
        let bytes = to_xlsx(&records, &headers).unwrap();

        let sheet = from_workbook(&bytes).unwrap();
        assert_eq!(sheet.headers, headers);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1].value("Nome"), &CellValue::from("Bruno"));
        assert_eq!(sheet.rows[1].value("Ativo"), &CellValue::Bool(true));
        assert_eq!(sheet.rows[0].value("Ativo"), &CellValue::Empty);
    }
}
