//! Lazy row readers over stored uploads
//!
//! CSV/TSV rows are decoded one record at a time straight from the upload
//! buffer. Spreadsheets are opened with calamine, which materializes the
//! first worksheet, and rows are then handed out by index.

use bytes::Bytes;
use calamine::{Data, Range, Reader};
use chrono::NaiveDateTime;
use std::io::Cursor;
use thiserror::Error;

use crate::types::TabularFormat;

/// One raw cell before coercion
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    /// Spreadsheet error value such as `#DIV/0!`
    Error(String),
}

impl RawCell {
    pub fn is_blank(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// One raw row with its 1-based position in the source
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub row_number: u64,
    pub cells: Vec<RawCell>,
}

impl RawRow {
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(RawCell::is_blank)
    }
}

/// Read failures, split by whether the stream can continue
#[derive(Debug, Error)]
pub enum ReadError {
    /// The row could not be decoded; later rows are still readable
    #[error("row {row_number}: {message}")]
    Row { row_number: u64, message: String },

    /// The file itself is unreadable
    #[error("{0}")]
    Fatal(String),
}

/// Row stream over a stored upload
pub enum RowReader {
    Delimited(DelimitedRows),
    Sheet(SheetRows),
}

impl RowReader {
    /// Open a reader for `data` in the given format
    pub fn open(format: TabularFormat, data: Bytes) -> Result<Self, ReadError> {
        if format.is_spreadsheet() {
            SheetRows::open(data).map(RowReader::Sheet)
        } else {
            Ok(RowReader::Delimited(DelimitedRows::new(data, format.delimiter())))
        }
    }
}

impl Iterator for RowReader {
    type Item = Result<RawRow, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RowReader::Delimited(rows) => rows.next(),
            RowReader::Sheet(rows) => rows.next(),
        }
    }
}

/// CSV/TSV rows
pub struct DelimitedRows {
    records: csv::ByteRecordsIntoIter<Cursor<Bytes>>,
    read: u64,
    failed: bool,
}

impl DelimitedRows {
    fn new(data: Bytes, delimiter: u8) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(Cursor::new(data));

        Self {
            records: reader.into_byte_records(),
            read: 0,
            failed: false,
        }
    }
}

impl Iterator for DelimitedRows {
    type Item = Result<RawRow, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => {
                self.failed = true;
                return Some(Err(ReadError::Fatal(format!("Failed to read CSV: {}", e))));
            }
        };
        self.read += 1;

        let row_number = record.position().map(|p| p.line()).unwrap_or(self.read);
        let mut cells = Vec::with_capacity(record.len());

        for (column, field) in record.iter().enumerate() {
            match std::str::from_utf8(field) {
                Ok("") => cells.push(RawCell::Empty),
                Ok(text) => cells.push(RawCell::Text(text.to_string())),
                Err(_) => {
                    return Some(Err(ReadError::Row {
                        row_number,
                        message: format!("column {} is not valid UTF-8", column + 1),
                    }))
                }
            }
        }

        Some(Ok(RawRow { row_number, cells }))
    }
}

/// Rows of the first worksheet
pub struct SheetRows {
    range: Range<Data>,
    first_row: u64,
    height: usize,
    width: usize,
    next_row: usize,
}

impl SheetRows {
    fn open(data: Bytes) -> Result<Self, ReadError> {
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(data))
            .map_err(|e| ReadError::Fatal(format!("Failed to open workbook: {}", e)))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ReadError::Fatal("Workbook has no worksheets".to_string()))?
            .map_err(|e| ReadError::Fatal(format!("Failed to read worksheet: {}", e)))?;

        let (height, width) = range.get_size();
        let first_row = range.start().map(|(row, _)| row as u64).unwrap_or(0);

        Ok(Self {
            range,
            first_row,
            height,
            width,
            next_row: 0,
        })
    }
}

impl Iterator for SheetRows {
    type Item = Result<RawRow, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_row >= self.height {
            return None;
        }

        let row = self.next_row;
        self.next_row += 1;

        let cells = (0..self.width)
            .map(|col| {
                self.range
                    .get((row, col))
                    .map(convert_cell)
                    .unwrap_or(RawCell::Empty)
            })
            .collect();

        Some(Ok(RawRow {
            row_number: self.first_row + row as u64 + 1,
            cells,
        }))
    }
}

fn convert_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty => RawCell::Empty,
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Int(i) => RawCell::Int(*i),
        Data::Float(f) => RawCell::Float(*f),
        Data::Bool(b) => RawCell::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(RawCell::DateTime)
            .unwrap_or_else(|| RawCell::Float(dt.as_f64())),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(RawCell::DateTime)
            .unwrap_or_else(|_| RawCell::Text(s.clone())),
        Data::DurationIso(s) => RawCell::Text(s.clone()),
        Data::Error(e) => RawCell::Error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(format: TabularFormat, data: &'static [u8]) -> Vec<Result<RawRow, ReadError>> {
        RowReader::open(format, Bytes::from_static(data)).unwrap().collect()
    }

    #[test]
    fn test_csv_rows_are_lazy_and_numbered() {
        let mut reader =
            RowReader::open(TabularFormat::Csv, Bytes::from_static(b"a,b\n1,2\n\n3,4\n")).unwrap();

        let header = reader.next().unwrap().unwrap();
        assert_eq!(header.row_number, 1);
        assert_eq!(header.cells, vec![RawCell::Text("a".into()), RawCell::Text("b".into())]);

        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.row_number, 2);

        let rest: Vec<_> = reader.map(|r| r.unwrap().row_number).collect();
        assert_eq!(rest.last(), Some(&4));
    }

    #[test]
    fn test_csv_quoted_multiline_field() {
        let all = rows(TabularFormat::Csv, b"nome,obs\nAna,\"linha 1\nlinha 2\"\nBia,ok\n");
        let records: Vec<RawRow> = all.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].cells[1], RawCell::Text("linha 1\nlinha 2".into()));
        assert_eq!(records[2].row_number, 4);
    }

    #[test]
    fn test_invalid_utf8_is_row_level() {
        let all = rows(TabularFormat::Csv, b"a,b\n\xff\xfe,1\nok,2\n");
        assert!(all[0].is_ok());
        assert!(matches!(all[1], Err(ReadError::Row { row_number: 2, .. })));
        assert!(all[2].is_ok());
    }

    #[test]
    fn test_tsv_delimiter() {
        let all = rows(TabularFormat::Tsv, b"a\tb\n1\t2\n");
        let row = all[1].as_ref().unwrap();
        assert_eq!(row.cells, vec![RawCell::Text("1".into()), RawCell::Text("2".into())]);
    }

    #[test]
    fn test_blank_row_detection() {
        let row = RawRow {
            row_number: 1,
            cells: vec![RawCell::Empty, RawCell::Text("  ".into())],
        };
        assert!(row.is_blank());
    }

    /// Minimal single-sheet workbook with inline string cells
    fn xlsx(rows: &[&[&str]]) -> Bytes {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut sheet = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, row) in rows.iter().enumerate() {
            sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, value) in row.iter().enumerate() {
                let cell = format!("{}{}", (b'A' + c as u8) as char, r + 1);
                if value.parse::<f64>().is_ok() {
                    sheet.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, cell, value));
                } else {
                    sheet.push_str(&format!(
                        r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        cell, value
                    ));
                }
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");

        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
            ),
            (
                "_rels/.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
            ),
            (
                "xl/workbook.xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Plan1" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
            ),
            ("xl/worksheets/sheet1.xml", sheet),
        ];

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        Bytes::from(zip.finish().unwrap().into_inner())
    }

    #[test]
    fn test_xlsx_first_sheet() {
        let data = xlsx(&[&["nome", "qtd"], &["Ana", "3"], &["Bia", "4.5"]]);
        let rows: Vec<RawRow> = RowReader::open(TabularFormat::Xlsx, data)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].cells[0], RawCell::Text("nome".into()));
        assert_eq!(rows[1].row_number, 2);
        assert_eq!(rows[1].cells, vec![RawCell::Text("Ana".into()), RawCell::Float(3.0)]);
        assert_eq!(rows[2].cells[1], RawCell::Float(4.5));
    }

    #[test]
    fn test_corrupt_workbook_is_fatal() {
        let result = RowReader::open(TabularFormat::Xlsx, Bytes::from_static(b"PK\x03\x04garbage"));
        assert!(matches!(result, Err(ReadError::Fatal(_))));
    }
}
