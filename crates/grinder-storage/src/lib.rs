//! Report download + Postgres persistence for grinder-etl.
//!
//! The fetch side is one GET to a fixed URL written over a fixed local path;
//! a non-success status is fatal for the run. The persistence side exposes
//! the [`RowSink`] seam (existence check by natural key + single-row insert)
//! so the processing loop can run against an in-memory fake in tests.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use grinder_core::{KeyedRow, SharkbotRow, TournamentRow};
use reqwest::StatusCode;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

pub const CRATE_NAME: &str = "grinder-storage";

const TOURNAMENTS_TABLE: &str = "tournament_results";
const SHARKBOT_TABLE: &str = "sharkbot_stats";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("writing {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

/// Downloads one report file per run. No retries: the next scheduled run is
/// the retry policy.
#[derive(Debug)]
pub struct CsvFetcher {
    client: reqwest::Client,
}

impl CsvFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    /// GET `url` and write the body over `dest`, replacing prior content.
    /// Returns the byte count written.
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        if is_fatal_status(status) {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let body = response.bytes().await?;
        let written = write_report(dest, &body).await.map_err(|source| FetchError::Write {
            path: dest.display().to_string(),
            source,
        })?;
        info!(url = %final_url, bytes = written, path = %dest.display(), "report downloaded");
        Ok(written)
    }
}

/// Overwrite `dest` with `bytes`. Split out of [`CsvFetcher::download_to`] so
/// the overwrite contract is testable without a network.
pub async fn write_report(dest: &Path, bytes: &[u8]) -> std::io::Result<u64> {
    tokio::fs::write(dest, bytes).await?;
    Ok(bytes.len() as u64)
}

pub fn is_fatal_status(status: StatusCode) -> bool {
    !status.is_success()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid date value {value:?}: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Existence check + insert for one pipeline's natural-keyed rows.
///
/// Both calls happen per row, existence immediately before insert. The
/// check is an optimization only; a store-side uniqueness constraint on the
/// natural-key columns is the authoritative guard against concurrent runs
/// inserting the same key.
#[async_trait]
pub trait RowSink<R: KeyedRow + Send + Sync>: Send + Sync {
    async fn exists(&self, row: &R) -> Result<bool, StoreError>;
    async fn insert(&self, row: &R) -> Result<(), StoreError>;
}

/// One Postgres connection per run: acquired at run start, released by
/// [`PgStore::close`] when the run ends, success or failure.
#[derive(Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Normalized rows carry dates as `yyyy-mm-dd` strings; the conversion to a
/// SQL date happens at this boundary. A value the converter let through but
/// the calendar rejects (e.g. `2024-13-40`) fails that single row's insert.
fn sql_date(value: &Option<String>) -> Result<Option<NaiveDate>, StoreError> {
    value
        .as_deref()
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|source| StoreError::InvalidDate {
                value: s.to_string(),
                source,
            })
        })
        .transpose()
}

#[async_trait]
impl RowSink<TournamentRow> for PgStore {
    async fn exists(&self, row: &TournamentRow) -> Result<bool, StoreError> {
        let found: Option<i32> = sqlx::query_scalar(&format!(
            "SELECT 1 FROM {TOURNAMENTS_TABLE} WHERE tournament_id = $1 AND player = $2 LIMIT 1"
        ))
        .bind(&row.tournament_id)
        .bind(&row.player)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn insert(&self, row: &TournamentRow) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO {TOURNAMENTS_TABLE} (
                report_date, century, player, network, name, currency,
                buy_in, profit, shots, date, time, total_entrants,
                tournament_id, stake, game, structure, flags, rake,
                position, speed
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )"
        ))
        .bind(sql_date(&row.report_date)?)
        .bind(&row.century)
        .bind(&row.player)
        .bind(&row.network)
        .bind(&row.name)
        .bind(&row.currency)
        .bind(row.buy_in)
        .bind(row.profit)
        .bind(row.shots)
        .bind(&row.date)
        .bind(&row.time)
        .bind(row.total_entrants)
        .bind(&row.tournament_id)
        .bind(&row.stake)
        .bind(&row.game)
        .bind(&row.structure)
        .bind(&row.flags)
        .bind(row.rake)
        .bind(row.position)
        .bind(&row.speed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RowSink<SharkbotRow> for PgStore {
    async fn exists(&self, row: &SharkbotRow) -> Result<bool, StoreError> {
        let found: Option<i32> = sqlx::query_scalar(&format!(
            "SELECT 1 FROM {SHARKBOT_TABLE}
             WHERE nickname = $1 AND search_date = $2 AND bot_date = $3 LIMIT 1"
        ))
        .bind(&row.nickname)
        .bind(sql_date(&row.search_date)?)
        .bind(&row.bot_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn insert(&self, row: &SharkbotRow) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO {SHARKBOT_TABLE} (
                search_date, nickname, tournaments_count, average_stack, profit, bot_date
            ) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(sql_date(&row.search_date)?)
        .bind(&row.nickname)
        .bind(row.tournaments_count)
        .bind(row.average_stack)
        .bind(row.profit)
        .bind(&row.bot_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_report_overwrites_prior_content() {
        let dir = tempdir().expect("tempdir");
        let dest = dir.path().join("report.csv");

        let first = write_report(&dest, b"old,content\n1,2\n").await.expect("first write");
        assert_eq!(first, 16);

        let second = write_report(&dest, b"new\n").await.expect("second write");
        assert_eq!(second, 4);
        assert_eq!(std::fs::read(&dest).expect("read back"), b"new\n");
    }

    #[test]
    fn sql_date_passes_valid_and_absent_values() {
        let date = sql_date(&Some("2025-06-05".into())).expect("valid date");
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 6, 5));
        assert_eq!(sql_date(&None).expect("absent"), None);
    }

    #[test]
    fn sql_date_rejects_calendar_impossible_values() {
        let err = sql_date(&Some("2024-13-40".into())).expect_err("month 13");
        assert!(matches!(err, StoreError::InvalidDate { .. }));
    }

    #[test]
    fn non_success_statuses_are_fatal() {
        assert!(is_fatal_status(StatusCode::NOT_FOUND));
        assert!(is_fatal_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_fatal_status(StatusCode::OK));
    }
}
