//! SQLite backend for the response log
//!
//! Rows live in `responses` ordered by an autoincrement `seq`. The column
//! header is stored once in `survey_meta` as the schema marker. Exports render
//! the same CSV format as the file backend.

use super::{encode_csv, Response, ResponseStore};
use crate::judgment::JudgmentKind;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Response log stored in a SQLite database
pub struct SqliteResponseStore {
    pool: SqlitePool,
    kind: JudgmentKind,
    /// Single writer
    write_lock: Mutex<()>,
}

impl SqliteResponseStore {
    /// Open or create the database at `db_path`
    pub async fn open(db_path: &Path, kind: JudgmentKind) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new response database: {}", db_path.display());
        } else {
            info!("Opened existing response database: {}", db_path.display());
        }

        // WAL lets summaries read while a submit is writing
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        create_tables(&pool).await?;
        check_schema_marker(&pool, &kind).await?;

        Ok(Self {
            pool,
            kind,
            write_lock: Mutex::new(()),
        })
    }
}

async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS survey_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS responses (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            cells TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Record the column header on first open, reject a different one later
async fn check_schema_marker(pool: &SqlitePool, kind: &JudgmentKind) -> Result<()> {
    let columns = kind.columns().join(",");

    sqlx::query("INSERT OR IGNORE INTO survey_meta (key, value) VALUES ('columns', ?)")
        .bind(&columns)
        .execute(pool)
        .await?;

    let stored: String = sqlx::query_scalar("SELECT value FROM survey_meta WHERE key = 'columns'")
        .fetch_one(pool)
        .await?;

    if stored != columns {
        return Err(Error::Config(format!(
            "Response database has columns '{}', survey expects '{}'",
            stored, columns
        )));
    }
    Ok(())
}

#[async_trait]
impl ResponseStore for SqliteResponseStore {
    async fn append(&self, response: &Response) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        // One CSV-encoded row per record keeps every judgment kind in one table
        let cells = encode_csv(&[], false, &[response.to_record()])?;
        let cells = String::from_utf8(cells)
            .map_err(|e| Error::Persistence(format!("Row not UTF-8: {}", e)))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO responses (cells) VALUES (?)")
            .bind(cells.trim_end_matches('\n'))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(
            "Appended response {}/{}",
            response.participant_id, response.item_id
        );
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Response>> {
        let rows = sqlx::query("SELECT cells FROM responses ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;

        let mut body = self.kind.columns().join(",");
        body.push('\n');
        for row in &rows {
            body.push_str(&row.get::<String, _>("cells"));
            body.push('\n');
        }
        super::csv_log::parse_rows(&self.kind, body.as_bytes())
    }

    async fn export(&self) -> Result<Vec<u8>> {
        let records: Vec<Vec<String>> = self
            .read_all()
            .await?
            .iter()
            .map(Response::to_record)
            .collect();
        encode_csv(self.kind.columns(), true, &records)
    }
}
