pub mod models;
pub mod prediction_repository;
pub mod user_repository;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task failed: {0}")]
    Blocking(String),
    #[error("Item already exists: {0}")]
    Duplicate(String),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS user_predictions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL,
    image_ref TEXT NOT NULL,
    prediction TEXT NOT NULL,
    confidence REAL NOT NULL,
    is_healthy INTEGER NOT NULL,
    crop_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_user_predictions_username
    ON user_predictions(username, created_at);
"#;

/// Location of the SQLite file. Every operation opens its own short-lived
/// connection on the blocking pool; nothing holds a connection between
/// requests.
#[derive(Clone, Debug)]
pub struct Database {
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    /// Creates the tables if they do not exist yet.
    pub fn init(&self) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;
            }
        }
        let conn = open(&self.path)?;
        conn.execute_batch(SCHEMA)?;
        log::info!("Database initialized at {}", self.path.display());
        Ok(())
    }

    pub(crate) async fn run<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        web::block(move || {
            let mut conn = open(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RepositoryError::Blocking(e.to_string()))?
    }
}

fn open(path: &Path) -> Result<Connection, RepositoryError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Fixed-width RFC 3339 so that text ordering equals time ordering.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::InvalidData(format!("bad timestamp '{}': {}", raw, e)))
}
