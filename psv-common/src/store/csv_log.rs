//! CSV file backend for the response log
//!
//! Rows are appended with a single write per row followed by `sync_data`.
//! A failed write truncates the file back to its previous length so readers
//! only ever see whole rows.

use super::{encode_csv, Response, ResponseStore};
use crate::judgment::JudgmentKind;
use crate::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Append-only CSV response log
pub struct CsvResponseLog {
    path: PathBuf,
    kind: JudgmentKind,
    /// Appends take the write half; reads and exports share the read half
    lock: RwLock<()>,
}

impl CsvResponseLog {
    /// Open (or prepare to create) the log at `path`
    ///
    /// An existing log whose header does not match `kind`'s columns is
    /// rejected with `Error::Config`.
    pub async fn open(path: &Path, kind: JudgmentKind) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Persistence(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }

        let log = Self {
            path: path.to_path_buf(),
            kind,
            lock: RwLock::new(()),
        };

        match log.read_bytes().await? {
            Some(bytes) if !bytes.is_empty() => {
                let header = read_header(&bytes)?;
                if header != kind.columns() {
                    return Err(Error::Config(format!(
                        "{} has columns {:?}, survey expects {:?}",
                        path.display(),
                        header,
                        kind.columns()
                    )));
                }
                info!("Opened existing response log {}", path.display());
            }
            _ => info!("Response log {} will be created on first write", path.display()),
        }

        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Persistence(format!(
                "Cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl ResponseStore for CsvResponseLog {
    async fn append(&self, response: &Response) -> Result<()> {
        let _guard = self.lock.write().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| persist_error(&self.path, e))?;
        let prior_len = file
            .metadata()
            .await
            .map_err(|e| persist_error(&self.path, e))?
            .len();

        let bytes = encode_csv(self.kind.columns(), prior_len == 0, &[response.to_record()])?;

        if let Err(e) = write_synced(&mut file, &bytes).await {
            error!(
                "Append to {} failed, rolling back to {} bytes: {}",
                self.path.display(),
                prior_len,
                e
            );
            if let Err(rollback) = file.set_len(prior_len).await {
                error!("Rollback of {} failed: {}", self.path.display(), rollback);
            }
            return Err(persist_error(&self.path, e));
        }

        debug!(
            "Appended response {}/{} to {}",
            response.participant_id,
            response.item_id,
            self.path.display()
        );
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Response>> {
        let bytes = {
            let _guard = self.lock.read().await;
            self.read_bytes().await?
        };
        match bytes {
            Some(bytes) => parse_rows(&self.kind, &bytes),
            None => Ok(Vec::new()),
        }
    }

    async fn export(&self) -> Result<Vec<u8>> {
        let _guard = self.lock.read().await;
        match self.read_bytes().await? {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => encode_csv(self.kind.columns(), true, &[]),
        }
    }
}

async fn write_synced(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_data().await
}

fn persist_error(path: &Path, e: std::io::Error) -> Error {
    Error::Persistence(format!("{}: {}", path.display(), e))
}

fn read_header(bytes: &[u8]) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);
    let header = reader
        .headers()
        .map_err(|e| Error::Persistence(format!("Unreadable header: {}", e)))?;
    Ok(header.iter().map(str::to_string).collect())
}

/// Parse a whole CSV log into responses, in file order
pub(crate) fn parse_rows(kind: &JudgmentKind, bytes: &[u8]) -> Result<Vec<Response>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let mut responses = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| Error::Persistence(format!("Row {} unreadable: {}", line + 1, e)))?;
        let cells: Vec<&str> = record.iter().collect();
        responses.push(Response::from_record(kind, &cells)?);
    }
    Ok(responses)
}
