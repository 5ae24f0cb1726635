//! Row normalizer: raw rows in, typed records out
//!
//! The first non-blank row is the header. Every later non-blank row counts
//! toward `total` and ends up either as a [`Record`] or as a [`RowRejected`];
//! only an unreadable file stops the stream.

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

use super::profile::{ColumnKind, DatasetProfile};
use super::reader::{RawCell, RawRow, ReadError, RowReader};
use crate::error::{Error, Result};
use crate::types::{DatasetKind, Fields, Record, RowCounts, TabularFormat};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// A row that failed coercion; counted, never fatal
#[derive(Debug, Clone, Error, PartialEq)]
#[error("row {row_number} rejected: {reason}")]
pub struct RowRejected {
    pub row_number: u64,
    pub reason: String,
}

/// Outcome for one counted row
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRow {
    Accepted(Record),
    Rejected(RowRejected),
}

/// Streams normalized records out of a stored upload
pub struct RowNormalizer {
    rows: RowReader,
    job_id: Uuid,
    profile: DatasetProfile,
    headers: Vec<String>,
    kinds: Vec<ColumnKind>,
    required: Vec<bool>,
    counts: RowCounts,
    bases: BTreeSet<String>,
}

impl RowNormalizer {
    /// Open the upload and read its header row
    ///
    /// Fails with [`Error::JobFailed`] when the file is unreadable, has no
    /// header, or lacks a column the dataset profile requires.
    pub fn open(
        job_id: Uuid,
        format: TabularFormat,
        dataset: DatasetKind,
        data: Bytes,
    ) -> Result<Self> {
        let mut rows = RowReader::open(format, data).map_err(fatal)?;
        let profile = DatasetProfile::for_kind(dataset);

        let header_row = loop {
            match rows.next() {
                Some(Ok(row)) if row.is_blank() => continue,
                Some(Ok(row)) => break row,
                Some(Err(ReadError::Row { row_number, message })) => {
                    return Err(Error::job_failed(format!(
                        "Unreadable header row {}: {}",
                        row_number, message
                    )))
                }
                Some(Err(e)) => return Err(fatal(e)),
                None => return Err(Error::job_failed("File has no header row")),
            }
        };

        let headers = build_headers(&header_row.cells);

        for column in profile.required_columns() {
            let present = headers
                .iter()
                .any(|h| h.to_lowercase() == column.to_lowercase());
            if !present {
                return Err(Error::job_failed(format!(
                    "Missing required column '{}'",
                    column
                )));
            }
        }

        let (kinds, required) = headers
            .iter()
            .map(|h| match profile.rule_for(h) {
                Some(rule) => (rule.kind, rule.required),
                None => (ColumnKind::Auto, false),
            })
            .unzip();

        Ok(Self {
            rows,
            job_id,
            profile,
            headers,
            kinds,
            required,
            counts: RowCounts::default(),
            bases: BTreeSet::new(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Counters over the rows yielded so far
    pub fn counts(&self) -> RowCounts {
        self.counts
    }

    /// Sorted, distinct bases of the accepted rows so far
    pub fn bases(&self) -> Vec<String> {
        self.bases.iter().cloned().collect()
    }

    /// Skip rows already covered by a checkpoint
    ///
    /// Consumes `checkpoint.total` counted rows without emitting them, so the
    /// next accepted record gets ordinal `checkpoint.accepted`. Skipped rows
    /// still contribute their bases.
    pub fn resume_from(&mut self, checkpoint: RowCounts) -> Result<()> {
        let mut skipped = 0;
        while skipped < checkpoint.total {
            match self.rows.next() {
                Some(Ok(row)) if row.is_blank() => continue,
                Some(Ok(row)) => {
                    if let Ok(fields) = self.normalize(&row) {
                        self.collect_bases(&fields);
                    }
                    skipped += 1;
                }
                Some(Err(ReadError::Row { .. })) => skipped += 1,
                Some(Err(e)) => return Err(fatal(e)),
                None => {
                    return Err(Error::job_failed(format!(
                        "Checkpoint covers {} rows but the file has {}",
                        checkpoint.total, skipped
                    )))
                }
            }
        }
        self.counts = checkpoint;
        Ok(())
    }

    fn normalize(&self, row: &RawRow) -> std::result::Result<Fields, String> {
        let extra = row
            .cells
            .iter()
            .skip(self.headers.len())
            .filter(|c| !c.is_blank())
            .count();
        if extra > 0 {
            return Err(format!(
                "row has {} more field(s) than the {} header columns",
                extra,
                self.headers.len()
            ));
        }

        let mut fields = Fields::new();
        for (i, header) in self.headers.iter().enumerate() {
            let cell = row.cells.get(i).unwrap_or(&RawCell::Empty);
            let value = coerce(self.kinds[i], cell)
                .map_err(|reason| format!("column '{}': {}", header, reason))?;

            if self.required[i] && value.is_null() {
                return Err(format!("missing required field '{}'", header));
            }
            fields.insert(header.clone(), value);
        }

        self.profile.finish_record(&mut fields);
        Ok(fields)
    }

    fn collect_bases(&mut self, fields: &Fields) {
        for base in self.profile.bases(fields) {
            if !self.bases.contains(base) {
                self.bases.insert(base.to_string());
            }
        }
    }
}

impl Iterator for RowNormalizer {
    type Item = Result<NormalizedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.rows.next()? {
                Ok(row) if row.is_blank() => continue,
                Ok(row) => row,
                Err(ReadError::Row { row_number, message }) => {
                    self.counts.total += 1;
                    self.counts.rejected += 1;
                    return Some(Ok(NormalizedRow::Rejected(RowRejected {
                        row_number,
                        reason: message,
                    })));
                }
                Err(e) => return Some(Err(fatal(e))),
            };

            self.counts.total += 1;
            let outcome = match self.normalize(&row) {
                Ok(fields) => {
                    self.collect_bases(&fields);
                    let record = Record::new(self.job_id, self.counts.accepted, row.row_number, fields);
                    self.counts.accepted += 1;
                    NormalizedRow::Accepted(record)
                }
                Err(reason) => {
                    self.counts.rejected += 1;
                    NormalizedRow::Rejected(RowRejected {
                        row_number: row.row_number,
                        reason,
                    })
                }
            };
            return Some(Ok(outcome));
        }
    }
}

fn fatal(err: ReadError) -> Error {
    Error::job_failed(err.to_string())
}

/// Trimmed, unique header names; blanks become `Column_<n>`
fn build_headers(cells: &[RawCell]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(cells.len());

    for (i, cell) in cells.iter().enumerate() {
        let raw = match cell {
            RawCell::Text(s) => s.trim_start_matches('\u{feff}').trim().to_string(),
            RawCell::Empty | RawCell::Error(_) => String::new(),
            other => render_text(other).unwrap_or_default(),
        };
        let base = if raw.is_empty() {
            format!("Column_{}", i + 1)
        } else {
            raw
        };

        let mut name = base.clone();
        let mut suffix = 2;
        while headers.iter().any(|h| h == &name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        headers.push(name);
    }

    headers
}

fn is_null_text(s: &str) -> bool {
    s.is_empty() || matches!(s.to_lowercase().as_str(), "none" | "null" | "nan")
}

fn integral(f: f64) -> Option<i64> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0; // 2^53
    (f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT).then_some(f as i64)
}

fn float_value(f: f64) -> Value {
    match integral(f) {
        Some(i) => Value::from(i),
        None => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
    }
}

/// Text rendering used by the `Text` kind and for headers
fn render_text(cell: &RawCell) -> Option<String> {
    match cell {
        RawCell::Empty => None,
        RawCell::Text(s) => {
            let s = s.trim();
            (!is_null_text(s)).then(|| s.to_string())
        }
        RawCell::Int(i) => Some(i.to_string()),
        RawCell::Float(f) => match integral(*f) {
            Some(i) => Some(i.to_string()),
            None if f.is_nan() => None,
            None => Some(f.to_string()),
        },
        RawCell::Bool(b) => Some(b.to_string()),
        RawCell::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
        RawCell::Error(e) => Some(e.clone()),
    }
}

fn coerce(kind: ColumnKind, cell: &RawCell) -> std::result::Result<Value, String> {
    if let RawCell::Error(e) = cell {
        return Err(format!("cell error {}", e));
    }

    match kind {
        ColumnKind::Auto => Ok(match cell {
            RawCell::Int(i) => Value::from(*i),
            RawCell::Float(f) => float_value(*f),
            RawCell::Bool(b) => Value::Bool(*b),
            other => render_text(other).map(Value::String).unwrap_or(Value::Null),
        }),
        ColumnKind::Text => Ok(render_text(cell).map(Value::String).unwrap_or(Value::Null)),
        ColumnKind::Integer => match cell {
            RawCell::Int(i) => Ok(Value::from(*i)),
            RawCell::Float(f) => integral(*f)
                .map(Value::from)
                .ok_or_else(|| format!("{} is not an integer", f)),
            other => match render_text(other) {
                None => Ok(Value::Null),
                Some(text) => text
                    .parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().and_then(integral))
                    .map(Value::from)
                    .ok_or_else(|| format!("'{}' is not an integer", text)),
            },
        },
        ColumnKind::DateTime => match cell {
            RawCell::DateTime(dt) => Ok(Value::String(dt.format(DATETIME_FORMAT).to_string())),
            RawCell::Float(serial) => excel_serial(*serial)
                .map(|dt| Value::String(dt.format(DATETIME_FORMAT).to_string()))
                .ok_or_else(|| format!("{} is not a date", serial)),
            other => match render_text(other) {
                None => Ok(Value::Null),
                Some(text) => parse_datetime(&text)
                    .map(|dt| Value::String(dt.format(DATETIME_FORMAT).to_string()))
                    .ok_or_else(|| format!("'{}' is not a date", text)),
            },
        },
        ColumnKind::Phone => match render_text(cell) {
            None => Ok(Value::Null),
            Some(text) => {
                let digits: String = text.chars().filter(char::is_ascii_digit).collect();
                if digits.len() < 8 {
                    Err(format!("'{}' is not a phone number", text))
                } else {
                    Ok(Value::String(digits))
                }
            }
        },
        ColumnKind::Hub => Ok(render_text(cell)
            .map(|text| Value::String(super::profile::normalize_hub(&text)))
            .unwrap_or(Value::Null)),
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Excel serial day number (1900 date system)
fn excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(chrono::Duration::milliseconds(millis))
}
