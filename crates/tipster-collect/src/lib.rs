//! One sequential collection run: page-by-page link discovery, then
//! fetch, extract and persist for every discovered preview URL.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Serialize;
use tipster_core::PreviewRecord;
use tipster_extract::{discover_preview_links, extract_preview, listing_url, SiteConfig};
use tipster_storage::{HttpClientConfig, HttpFetcher, RecordStore};
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "tipster-collect";

#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub database_path: PathBuf,
    /// Pagination bound; the run also stops early the first time a
    /// listing page yields zero preview links.
    pub max_pages: u32,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub site: SiteConfig,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("tipster.db"),
            max_pages: 3,
            http_timeout_secs: 10,
            user_agent: HttpClientConfig::default().user_agent,
            site: SiteConfig::default(),
        }
    }
}

impl CollectConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: std::env::var("TIPSTER_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            max_pages: std::env::var("TIPSTER_MAX_PAGES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_pages),
            http_timeout_secs: std::env::var("TIPSTER_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            user_agent: std::env::var("TIPSTER_USER_AGENT").unwrap_or(defaults.user_agent),
            site: defaults.site,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_visited: u32,
    pub links_discovered: usize,
    pub records_saved: usize,
    pub skipped_no_tip: usize,
    pub skipped_fetch_errors: usize,
    pub skipped_store_errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Saved,
    SkippedNoTip,
    SkippedFetchError,
    SkippedStoreError,
}

fn apply_outcome(summary: &mut CollectSummary, outcome: Outcome) {
    match outcome {
        Outcome::Saved => summary.records_saved += 1,
        Outcome::SkippedNoTip => summary.skipped_no_tip += 1,
        Outcome::SkippedFetchError => summary.skipped_fetch_errors += 1,
        Outcome::SkippedStoreError => summary.skipped_store_errors += 1,
    }
}

fn empty_summary(run_id: Uuid, started_at: DateTime<Utc>) -> CollectSummary {
    CollectSummary {
        run_id,
        started_at,
        finished_at: started_at,
        pages_visited: 0,
        links_discovered: 0,
        records_saved: 0,
        skipped_no_tip: 0,
        skipped_fetch_errors: 0,
        skipped_store_errors: 0,
    }
}

pub struct Collector {
    config: CollectConfig,
    http: HttpFetcher,
    store: RecordStore,
}

impl Collector {
    pub async fn new(config: CollectConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: config.user_agent.clone(),
        })?;
        let store = RecordStore::open(&config.database_path)
            .await
            .with_context(|| format!("opening store at {}", config.database_path.display()))?;
        Ok(Self {
            config,
            http,
            store,
        })
    }

    /// Runs the whole pipeline once. Per-URL failures are logged and
    /// skipped; only being unable to even start (store unavailable at
    /// construction) is fatal.
    pub async fn run_once(&self) -> Result<CollectSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let now = Local::now().naive_local();
        let mut summary = empty_summary(run_id, started_at);

        for page in 1..=self.config.max_pages {
            let links = self.discover_page(page).await;
            if links.is_empty() {
                // Zero links means either the listing ran out or the fetch
                // failed; both end pagination for this run.
                info!(page, "no preview links found; stopping pagination");
                break;
            }
            summary.pages_visited += 1;
            summary.links_discovered += links.len();
            info!(page, links = links.len(), "listing page discovered");

            for url in links {
                let outcome = self.collect_one(&url, now).await;
                apply_outcome(&mut summary, outcome);
            }
        }

        summary.finished_at = Utc::now();
        info!(
            %run_id,
            pages = summary.pages_visited,
            links = summary.links_discovered,
            saved = summary.records_saved,
            "collection run finished"
        );
        Ok(summary)
    }

    /// Preview links for one listing page; any fetch failure degrades to
    /// an empty set rather than propagating.
    async fn discover_page(&self, page: u32) -> BTreeSet<String> {
        let url = listing_url(&self.config.site, page);
        match self.http.fetch_text(&url).await {
            Ok(html) => discover_preview_links(&html, &self.config.site),
            Err(err) => {
                warn!(page, error = %err, "listing fetch failed; treating page as empty");
                BTreeSet::new()
            }
        }
    }

    async fn collect_one(&self, url: &str, now: NaiveDateTime) -> Outcome {
        let html = match self.http.fetch_text(url).await {
            Ok(html) => html,
            Err(err) => {
                warn!(url, error = %err, "preview fetch failed; skipping");
                return Outcome::SkippedFetchError;
            }
        };

        let record = extract_preview(&html, url, now, &self.config.site);
        save_if_useful(&self.store, &record).await
    }
}

/// Post-extraction persistence policy: records without a usable tip are
/// never written, store failures skip the record without aborting the run.
async fn save_if_useful(store: &RecordStore, record: &PreviewRecord) -> Outcome {
    if !record.has_useful_tip() {
        info!(url = %record.source_url, "no usable tip on preview; not persisting");
        return Outcome::SkippedNoTip;
    }

    match store.upsert(record).await {
        Ok(()) => {
            info!(
                url = %record.source_url,
                home = %record.home_team,
                away = %record.away_team,
                status = %record.status,
                "record saved"
            );
            Outcome::Saved
        }
        Err(err) => {
            warn!(url = %record.source_url, error = %err, "store write failed; record not saved");
            Outcome::SkippedStoreError
        }
    }
}

/// Convenience entry point used by the CLI.
pub async fn run_collect_once_from_env() -> Result<CollectSummary> {
    let collector = Collector::new(CollectConfig::from_env()).await?;
    collector.run_once().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tipster_core::{MatchStatus, NO_TIP, ODDS_UNKNOWN};

    fn record(selection: &str, odds: f64) -> PreviewRecord {
        PreviewRecord {
            source_url: "https://example.com/stats/match/a-vs-b/preview".to_string(),
            collected_on: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            kickoff_date: "2026-01-14".to_string(),
            kickoff_time: "19:30".to_string(),
            league: "Brasileirão Série A".to_string(),
            home_team: "Flamengo".to_string(),
            away_team: "Fluminense".to_string(),
            selection: selection.to_string(),
            odds,
            status: MatchStatus::Pending,
        }
    }

    #[tokio::test]
    async fn no_tip_records_are_never_persisted() {
        let store = RecordStore::in_memory().await.unwrap();

        let outcome = save_if_useful(&store, &record(NO_TIP, ODDS_UNKNOWN)).await;
        assert_eq!(outcome, Outcome::SkippedNoTip);
        assert_eq!(store.count().await.unwrap(), 0);

        let outcome = save_if_useful(&store, &record("Mais de 2,5 gols", 1.9)).await;
        assert_eq!(outcome, Outcome::Saved);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[test]
    fn default_config_matches_documented_policy() {
        let config = CollectConfig::default();
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.database_path, PathBuf::from("tipster.db"));
        assert_eq!(config.site.listing_path, "/previews");
    }

    #[test]
    fn summary_accumulates_each_outcome_bucket() {
        let mut summary = empty_summary(Uuid::new_v4(), Utc::now());
        for outcome in [
            Outcome::Saved,
            Outcome::Saved,
            Outcome::SkippedNoTip,
            Outcome::SkippedFetchError,
            Outcome::SkippedStoreError,
        ] {
            apply_outcome(&mut summary, outcome);
        }
        assert_eq!(summary.records_saved, 2);
        assert_eq!(summary.skipped_no_tip, 1);
        assert_eq!(summary.skipped_fetch_errors, 1);
        assert_eq!(summary.skipped_store_errors, 1);
    }
}
