//! Upload job model and its lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of an upload job
///
/// `received -> processing -> {completed | failed}`, plus `received -> failed`
/// when a job is cancelled before a worker picks it up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Received,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Received,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed jobs never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Processing)
                | (Self::Received, Self::Failed)
                // A restarted worker re-enters processing for an interrupted job
                | (Self::Processing, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "received" => Ok(Self::Received),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Normalization profile selected at upload time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Any tabular file, generic coercion only
    #[default]
    Generic,
    /// Driver phone contact list
    Telefones,
    /// Held orders list
    Retidos,
    /// SLA base
    Sla,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Telefones => "telefones",
            Self::Retidos => "retidos",
            Self::Sla => "sla",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "generic" => Ok(Self::Generic),
            "telefones" | "phones" => Ok(Self::Telefones),
            "retidos" => Ok(Self::Retidos),
            "sla" => Ok(Self::Sla),
            other => Err(format!("unknown dataset '{}'", other)),
        }
    }
}

/// Tabular formats accepted by the receiver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TabularFormat {
    /// Excel 2007+ workbook
    Xlsx,
    /// Legacy Excel workbook
    Xls,
    /// OpenDocument spreadsheet
    Ods,
    /// Comma separated values
    Csv,
    /// Tab separated values
    Tsv,
}

impl TabularFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Ods => "ods",
            Self::Csv => "csv",
            Self::Tsv => "tsv",
        }
    }

    /// Workbook formats read through calamine
    pub fn is_spreadsheet(&self) -> bool {
        matches!(self, Self::Xlsx | Self::Xls | Self::Ods)
    }

    /// Field delimiter for text formats
    pub fn delimiter(&self) -> u8 {
        match self {
            Self::Tsv => b'\t',
            _ => b',',
        }
    }
}

impl fmt::Display for TabularFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TabularFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "xls" => Ok(Self::Xls),
            "ods" => Ok(Self::Ods),
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            other => Err(format!("unknown format '{}'", other)),
        }
    }
}

/// Row counters of a job
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowCounts {
    /// Non-blank data rows read
    pub total: u64,
    /// Rows stored as records
    pub accepted: u64,
    /// Rows skipped by coercion
    pub rejected: u64,
}

impl RowCounts {
    pub fn is_balanced(&self) -> bool {
        self.accepted + self.rejected == self.total
    }
}

/// One tracked bulk-ingestion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadJob {
    pub id: Uuid,
    pub filename: String,
    pub dataset: DatasetKind,
    pub format: TabularFormat,
    pub size_bytes: u64,
    pub content_sha256: String,
    pub status: JobStatus,
    pub counts: RowCounts,
    pub chunks_committed: u64,
    /// Failure summary (failed jobs only)
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Distinct canonical bases seen in accepted rows (completed jobs only)
    #[serde(default)]
    pub bases: Vec<String>,
}

impl UploadJob {
    pub fn new(
        filename: impl Into<String>,
        dataset: DatasetKind,
        format: TabularFormat,
        size_bytes: u64,
        content_sha256: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            dataset,
            format,
            size_bytes,
            content_sha256: content_sha256.into(),
            status: JobStatus::Received,
            counts: RowCounts::default(),
            chunks_committed: 0,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
            bases: Vec::new(),
        }
    }
}
