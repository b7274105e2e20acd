//! Append-only response log
//!
//! The store is the one process-wide shared mutable resource. Backends
//! serialize appends internally and never expose a partially written row.

use crate::config::{StoreBackend, StoreConfig};
use crate::judgment::{Judgment, JudgmentKind};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub mod csv_log;
#[cfg(feature = "sqlx")]
pub mod sqlite;

pub use csv_log::CsvResponseLog;
#[cfg(feature = "sqlx")]
pub use sqlite::SqliteResponseStore;

/// One recorded judgment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub participant_id: String,
    pub item_id: String,
    pub judgment: Judgment,
    pub recorded_at: DateTime<Utc>,
}

impl Response {
    pub fn new(participant_id: &str, item_id: &str, judgment: Judgment) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            item_id: item_id.to_string(),
            judgment,
            // Millisecond precision, same as the written timestamp
            recorded_at: Utc::now().trunc_subsecs(3),
        }
    }

    /// Cells in the order of [`JudgmentKind::columns`]
    pub fn to_record(&self) -> Vec<String> {
        let mut record = Vec::with_capacity(6);
        record.push(self.participant_id.clone());
        record.push(self.item_id.clone());
        record.extend(self.judgment.to_cells());
        record.push(
            self.recorded_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        record
    }

    /// Parse a row produced by [`Response::to_record`]
    pub fn from_record(kind: &JudgmentKind, cells: &[&str]) -> Result<Self> {
        let expected = kind.columns().len();
        if cells.len() != expected {
            return Err(Error::Persistence(format!(
                "Row has {} cells, expected {}",
                cells.len(),
                expected
            )));
        }

        let last = expected - 1;
        let judgment = Judgment::from_cells(kind, &cells[2..last])?;
        let recorded_at = DateTime::parse_from_rfc3339(cells[last])
            .map_err(|e| Error::Persistence(format!("Bad timestamp '{}': {}", cells[last], e)))?
            .with_timezone(&Utc);

        Ok(Self {
            participant_id: cells[0].to_string(),
            item_id: cells[1].to_string(),
            judgment,
            recorded_at,
        })
    }
}

/// Durable, append-only log of responses
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Durably write one row; the header goes out with the first row
    async fn append(&self, response: &Response) -> Result<()>;

    /// Every row written so far, in write order
    async fn read_all(&self) -> Result<Vec<Response>>;

    /// Whole log in the tabular (CSV) format, header included
    async fn export(&self) -> Result<Vec<u8>>;
}

/// Open the configured backend for `kind`'s columns
pub async fn open_store(config: &StoreConfig, kind: JudgmentKind) -> Result<Arc<dyn ResponseStore>> {
    info!(
        "Response store: {:?} at {}",
        config.backend,
        config.path.display()
    );
    match config.backend {
        StoreBackend::Csv => Ok(Arc::new(CsvResponseLog::open(&config.path, kind).await?)),
        #[cfg(feature = "sqlx")]
        StoreBackend::Sqlite => Ok(Arc::new(
            SqliteResponseStore::open(&config.path, kind).await?,
        )),
        #[cfg(not(feature = "sqlx"))]
        StoreBackend::Sqlite => Err(Error::Config(
            "sqlite backend requires the `sqlx` feature".to_string(),
        )),
    }
}

/// Encode rows as CSV, optionally preceded by the header
pub(crate) fn encode_csv(
    columns: &[&str],
    with_header: bool,
    rows: &[Vec<String>],
) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if with_header {
        writer
            .write_record(columns)
            .map_err(|e| Error::Persistence(format!("CSV encode failed: {}", e)))?;
    }
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| Error::Persistence(format!("CSV encode failed: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Persistence(format!("CSV encode failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::Side;

    #[test]
    fn test_record_layout_follows_columns() {
        let response = Response::new(
            "alice",
            "41_outdoor",
            Judgment::Choice {
                ground_truth_side: Side::Right,
                chosen: Side::Right,
            },
        );
        let record = response.to_record();
        assert_eq!(record.len(), JudgmentKind::ForcedChoice.columns().len());
        assert_eq!(&record[..5], &["alice", "41_outdoor", "right", "right", "true"]);

        let cells: Vec<&str> = record.iter().map(String::as_str).collect();
        let parsed = Response::from_record(&JudgmentKind::ForcedChoice, &cells).unwrap();
        assert_eq!(parsed.participant_id, "alice");
        assert_eq!(parsed.judgment, response.judgment);
    }

    #[test]
    fn test_short_row_rejected() {
        let kind = JudgmentKind::Score { min: 0, max: 100 };
        assert!(matches!(
            Response::from_record(&kind, &["alice", "a.png"]),
            Err(Error::Persistence(_))
        ));
    }

    #[test]
    fn test_encode_quotes_commas() {
        let bytes = encode_csv(
            &["user", "item"],
            true,
            &[vec!["Smith, Jo".to_string(), "a.png".to_string()]],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "user,item\n\"Smith, Jo\",a.png\n"
        );
    }
}
