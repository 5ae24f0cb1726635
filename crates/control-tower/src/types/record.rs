//! Normalized records and the chunks that group them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Column name to normalized value, in source column order
pub type Fields = Map<String, Value>;

/// One normalized row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Stable id derived from the job id and ordinal
    pub id: Uuid,
    pub job_id: Uuid,
    /// 0-based position among the job's accepted rows
    pub ordinal: u64,
    /// 1-based row number in the source file
    pub row_number: u64,
    pub fields: Fields,
}

impl Record {
    pub fn new(job_id: Uuid, ordinal: u64, row_number: u64, fields: Fields) -> Self {
        Self {
            id: Self::stable_id(job_id, ordinal),
            job_id,
            ordinal,
            row_number,
            fields,
        }
    }

    /// Re-processing a job reproduces the same ids
    pub fn stable_id(job_id: Uuid, ordinal: u64) -> Uuid {
        Uuid::new_v5(&job_id, &ordinal.to_be_bytes())
    }
}

/// A bounded, atomically committed group of records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub job_id: Uuid,
    /// 0-based, gapless within a job
    pub index: u64,
    pub first_ordinal: u64,
    pub records: Vec<Record>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Chunk metadata without its records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkSummary {
    pub index: u64,
    pub first_ordinal: u64,
    pub record_count: u64,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_id() {
        let job = Uuid::new_v4();
        assert_eq!(Record::stable_id(job, 7), Record::stable_id(job, 7));
        assert_ne!(Record::stable_id(job, 7), Record::stable_id(job, 8));
        assert_ne!(Record::stable_id(job, 7), Record::stable_id(Uuid::new_v4(), 7));
    }

    #[test]
    fn test_fields_keep_column_order() {
        let mut fields = Fields::new();
        fields.insert("Zona".into(), Value::from("Sul"));
        fields.insert("Motorista".into(), Value::from("Ana"));

        let record = Record::new(Uuid::nil(), 0, 2, fields);
        let json = serde_json::to_string(&record.fields).unwrap();
        assert_eq!(json, r#"{"Zona":"Sul","Motorista":"Ana"}"#);
    }
}
