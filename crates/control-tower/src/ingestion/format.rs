//! Tabular format detection from file extension and content

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::TabularFormat;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Bytes inspected when deciding whether content is text
const TEXT_SNIFF_LEN: usize = 8 * 1024;

/// Detect the tabular format of an upload
///
/// The extension selects the candidate format and the leading bytes must
/// agree with it. Files without an extension are classified by content alone.
pub fn detect_format(filename: &str, data: &[u8]) -> Result<TabularFormat> {
    if data.is_empty() {
        return Err(Error::UnsupportedFormat("empty file".to_string()));
    }

    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    let detected = match extension.as_deref() {
        Some("xlsx" | "xlsm") if data.starts_with(ZIP_MAGIC) => Some(TabularFormat::Xlsx),
        Some("ods") if data.starts_with(ZIP_MAGIC) => Some(TabularFormat::Ods),
        // Excel happily saves xlsx content under an .xls name
        Some("xls") if data.starts_with(OLE_MAGIC) => Some(TabularFormat::Xls),
        Some("xls") if data.starts_with(ZIP_MAGIC) => Some(TabularFormat::Xlsx),
        Some("csv" | "txt") if looks_like_text(data) => Some(TabularFormat::Csv),
        Some("tsv" | "tab") if looks_like_text(data) => Some(TabularFormat::Tsv),
        Some(_) => None,
        None => sniff(data),
    };

    detected.ok_or_else(|| {
        Error::UnsupportedFormat(match extension {
            Some(ext) => format!("'{}' is not a readable .{} file", filename, ext),
            None => format!("'{}' is not a recognized tabular file", filename),
        })
    })
}

fn sniff(data: &[u8]) -> Option<TabularFormat> {
    if data.starts_with(ZIP_MAGIC) {
        Some(TabularFormat::Xlsx)
    } else if data.starts_with(OLE_MAGIC) {
        Some(TabularFormat::Xls)
    } else if looks_like_text(data) {
        Some(TabularFormat::Csv)
    } else {
        None
    }
}

/// Text means no NUL bytes in the leading window
///
/// Encoding problems are handled per row by the reader, so legacy
/// single-byte encodings still pass here.
fn looks_like_text(data: &[u8]) -> bool {
    let window = &data[..data.len().min(TEXT_SNIFF_LEN)];
    !window.contains(&0)
}
