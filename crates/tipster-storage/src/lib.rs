//! HTTP fetch utility and the SQLite-backed record store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tipster_core::{MatchStatus, PreviewRecord};
use tracing::info_span;

pub const CRATE_NAME: &str = "tipster-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            // Browser-like identification; the source site serves plain
            // HTML but rejects obviously non-browser agents.
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
                .to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Blocking-style sequential fetcher: one attempt per URL with a fixed
/// timeout. Transient failures are not retried within a run; the caller
/// skips the URL and moves on.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let span = info_span!("http_fetch", url);
        let _guard = span.enter();

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }
        Ok(response.text().await?)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file does not exist. Surfaced to the operator as a
    /// blocking notice by read-only consumers instead of rendering an
    /// empty dashboard.
    #[error("database file not found at {0}; run the collector first")]
    MissingDatabase(PathBuf),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Upsert-by-URL store over SQLite.
///
/// Backed by a connection pool, so one store value can be shared freely
/// across concurrent read contexts (dashboard handlers) and the single
/// sequential writer; there is no thread affinity to any one connection.
/// Readers may observe a half-finished collection run, which is fine.
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS predictions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    source_url    TEXT UNIQUE NOT NULL,
    collected_on  TEXT NOT NULL,
    kickoff_date  TEXT NOT NULL,
    kickoff_time  TEXT NOT NULL,
    league        TEXT NOT NULL,
    home_team     TEXT NOT NULL,
    away_team     TEXT NOT NULL,
    selection     TEXT,
    odds          REAL DEFAULT 0.0,
    status        TEXT DEFAULT 'PENDING'
)
"#;

impl RecordStore {
    /// Opens (creating if needed) the store at `path` and ensures the
    /// schema exists. Used by the collector.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Opens an existing store, refusing to create one. Used by the
    /// reporting surface, where a missing file is an operator error.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::MissingDatabase(path.to_path_buf()));
        }
        let options = SqliteConnectOptions::new().filename(path);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-process store for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Idempotent upsert keyed on `source_url`: a conflicting key replaces
    /// every other field wholesale, never merging.
    pub async fn upsert(&self, record: &PreviewRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO predictions
                (source_url, collected_on, kickoff_date, kickoff_time,
                 league, home_team, away_team, selection, odds, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(source_url) DO UPDATE SET
                collected_on = excluded.collected_on,
                kickoff_date = excluded.kickoff_date,
                kickoff_time = excluded.kickoff_time,
                league       = excluded.league,
                home_team    = excluded.home_team,
                away_team    = excluded.away_team,
                selection    = excluded.selection,
                odds         = excluded.odds,
                status       = excluded.status
            "#,
        )
        .bind(&record.source_url)
        .bind(record.collected_on.format("%Y-%m-%d").to_string())
        .bind(&record.kickoff_date)
        .bind(&record.kickoff_time)
        .bind(&record.league)
        .bind(&record.home_team)
        .bind(&record.away_team)
        .bind(&record.selection)
        .bind(record.odds)
        .bind(record.status.as_wire())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Full current record set, newest match days first, earliest kickoff
    /// time first within a day.
    pub async fn all_records(&self) -> Result<Vec<PreviewRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT source_url, collected_on, kickoff_date, kickoff_time,
                   league, home_team, away_team, selection, odds, status
              FROM predictions
             ORDER BY kickoff_date DESC, kickoff_time ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let collected_raw: String = row.try_get("collected_on")?;
            let collected_on = NaiveDate::parse_from_str(&collected_raw, "%Y-%m-%d")
                .unwrap_or(NaiveDate::MIN);
            let status_raw: String = row.try_get("status")?;
            out.push(PreviewRecord {
                source_url: row.try_get("source_url")?,
                collected_on,
                kickoff_date: row.try_get("kickoff_date")?,
                kickoff_time: row.try_get("kickoff_time")?,
                league: row.try_get("league")?,
                home_team: row.try_get("home_team")?,
                away_team: row.try_get("away_team")?,
                selection: row.try_get::<Option<String>, _>("selection")?.unwrap_or_default(),
                odds: row.try_get("odds")?,
                status: MatchStatus::parse_wire(&status_raw),
            });
        }
        Ok(out)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM predictions")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}
