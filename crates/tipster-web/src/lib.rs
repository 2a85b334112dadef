//! Axum + Askama dashboard over the record store.
//!
//! Read-only: every request re-runs the read query against a fresh store
//! handle, so "refresh" is just requesting the page again and a collection
//! run in progress is simply observed mid-flight.

use std::path::PathBuf;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{Duration, Local, NaiveDate};
use serde::Deserialize;
use tipster_core::{MatchStatus, PreviewRecord, DATE_UNKNOWN, ODDS_UNKNOWN};
use tipster_storage::{RecordStore, StoreError};
use tokio::net::TcpListener;

pub const CRATE_NAME: &str = "tipster-web";

#[derive(Clone)]
pub struct AppState {
    pub database_path: PathBuf,
}

impl AppState {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/tips", get(tips_handler))
        .route("/stats", get(stats_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("TIPSTER_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let database_path = std::env::var("TIPSTER_DB").unwrap_or_else(|_| "tipster.db".to_string());
    let state = AppState::new(database_path);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

// ---- derived groupings and filters ----------------------------------------

/// Bucketing of a record by its kickoff date, computed purely by string
/// comparison in the fixed `YYYY-MM-DD` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBucket {
    Today,
    /// Strictly after today, within the next seven days.
    Upcoming,
    /// Beyond the seven-day horizon.
    Later,
    Past,
    Undated,
}

pub fn bucket_for(kickoff_date: &str, today: NaiveDate) -> DateBucket {
    if kickoff_date == DATE_UNKNOWN {
        return DateBucket::Undated;
    }
    let today_iso = today.format("%Y-%m-%d").to_string();
    let horizon_iso = (today + Duration::days(7)).format("%Y-%m-%d").to_string();
    if kickoff_date == today_iso {
        DateBucket::Today
    } else if kickoff_date < today_iso.as_str() {
        DateBucket::Past
    } else if kickoff_date <= horizon_iso.as_str() {
        DateBucket::Upcoming
    } else {
        DateBucket::Later
    }
}

fn parse_bucket(name: &str) -> Option<DateBucket> {
    match name {
        "today" => Some(DateBucket::Today),
        "upcoming" => Some(DateBucket::Upcoming),
        "later" => Some(DateBucket::Later),
        "past" => Some(DateBucket::Past),
        "undated" => Some(DateBucket::Undated),
        _ => None,
    }
}

/// Raw query-string filters. Numeric bounds stay `String` here because a
/// submitted form sends empty values for untouched fields, which must be
/// treated as "no filter" rather than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TipsQuery {
    pub bucket: Option<String>,
    pub date: Option<String>,
    pub league: Option<String>,
    pub selection: Option<String>,
    pub min_odds: Option<String>,
    pub max_odds: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_odds_bound(value: &Option<String>) -> Option<f64> {
    non_empty(value).and_then(|v| v.replace(',', ".").parse().ok())
}

/// Conjunction of the user-chosen filter predicates.
pub fn matches_filters(record: &PreviewRecord, query: &TipsQuery, today: NaiveDate) -> bool {
    if let Some(bucket) = non_empty(&query.bucket).and_then(parse_bucket) {
        if bucket_for(&record.kickoff_date, today) != bucket {
            return false;
        }
    }
    if let Some(date) = non_empty(&query.date) {
        if record.kickoff_date != date {
            return false;
        }
    }
    if let Some(league) = non_empty(&query.league) {
        if !record.league.eq_ignore_ascii_case(league) {
            return false;
        }
    }
    if let Some(needle) = non_empty(&query.selection) {
        if !record
            .selection
            .to_lowercase()
            .contains(&needle.to_lowercase())
        {
            return false;
        }
    }
    if let Some(min) = parse_odds_bound(&query.min_odds) {
        if record.odds < min {
            return false;
        }
    }
    if let Some(max) = parse_odds_bound(&query.max_odds) {
        if record.odds > max {
            return false;
        }
    }
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct OddsStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

/// Aggregates over records carrying real odds; `None` when no record does.
pub fn odds_stats(records: &[PreviewRecord]) -> Option<OddsStats> {
    let mut odds: Vec<f64> = records
        .iter()
        .map(|r| r.odds)
        .filter(|o| *o > ODDS_UNKNOWN)
        .collect();
    if odds.is_empty() {
        return None;
    }
    odds.sort_by(f64::total_cmp);
    let min = odds[0];
    let max = odds[odds.len() - 1];
    let mean = odds.iter().sum::<f64>() / odds.len() as f64;
    let mid = odds.len() / 2;
    let median = if odds.len() % 2 == 0 {
        (odds[mid - 1] + odds[mid]) / 2.0
    } else {
        odds[mid]
    };
    Some(OddsStats {
        min,
        max,
        mean,
        median,
    })
}

pub fn status_group(status: &MatchStatus) -> &'static str {
    match status {
        MatchStatus::Pending => "PENDING",
        MatchStatus::Finished { .. } => "FINISHED",
        MatchStatus::Unknown => "UNKNOWN",
    }
}

// ---- templates ------------------------------------------------------------

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    total_records: usize,
    today_count: usize,
    upcoming_count: usize,
    past_count: usize,
    pending_count: usize,
    finished_count: usize,
}

#[derive(Debug, Clone)]
struct TipRow {
    kickoff_date: String,
    kickoff_time: String,
    league: String,
    match_label: String,
    selection: String,
    odds_label: String,
    status: String,
}

#[derive(Template)]
#[template(path = "tips.html")]
struct TipsTemplate {
    rows: Vec<TipRow>,
    total: usize,
    bucket: String,
    date: String,
    league: String,
    selection: String,
    min_odds: String,
    max_odds: String,
}

#[derive(Debug, Clone)]
struct CountRow {
    label: String,
    count: usize,
}

#[derive(Debug, Clone)]
struct OddsView {
    min: String,
    max: String,
    mean: String,
    median: String,
}

#[derive(Template)]
#[template(path = "stats.html")]
struct StatsTemplate {
    total: usize,
    league_counts: Vec<CountRow>,
    status_counts: Vec<CountRow>,
    odds: Option<OddsView>,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    message: String,
}

// ---- handlers -------------------------------------------------------------

async fn load_records(state: &AppState) -> Result<Vec<PreviewRecord>, StoreError> {
    let store = RecordStore::open_existing(&state.database_path).await?;
    store.all_records().await
}

fn store_error_response(err: StoreError) -> Response {
    let (status, message) = match err {
        StoreError::MissingDatabase(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    };
    let body = ErrorTemplate { message }
        .render()
        .unwrap_or_else(|render_err| format!("Erro: {render_err}"));
    (status, Html(body)).into_response()
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!("Erro ao renderizar: {err}")),
        )
            .into_response(),
    }
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let records = match load_records(&state).await {
        Ok(records) => records,
        Err(err) => return store_error_response(err),
    };
    let today = Local::now().date_naive();
    let bucket_count = |bucket: DateBucket| {
        records
            .iter()
            .filter(|r| bucket_for(&r.kickoff_date, today) == bucket)
            .count()
    };
    render_html(IndexTemplate {
        total_records: records.len(),
        today_count: bucket_count(DateBucket::Today),
        upcoming_count: bucket_count(DateBucket::Upcoming),
        past_count: bucket_count(DateBucket::Past),
        pending_count: records
            .iter()
            .filter(|r| r.status == MatchStatus::Pending)
            .count(),
        finished_count: records.iter().filter(|r| r.status.is_finished()).count(),
    })
}

async fn tips_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TipsQuery>,
) -> Response {
    let records = match load_records(&state).await {
        Ok(records) => records,
        Err(err) => return store_error_response(err),
    };
    let today = Local::now().date_naive();
    let rows: Vec<TipRow> = records
        .iter()
        .filter(|r| matches_filters(r, &query, today))
        .map(|r| TipRow {
            kickoff_date: r.kickoff_date.clone(),
            kickoff_time: r.kickoff_time.clone(),
            league: r.league.clone(),
            match_label: format!("{} vs {}", r.home_team, r.away_team),
            selection: r.selection.clone(),
            odds_label: if r.odds > ODDS_UNKNOWN {
                format!("{:.2}", r.odds)
            } else {
                "—".to_string()
            },
            status: r.status.as_wire(),
        })
        .collect();
    render_html(TipsTemplate {
        total: rows.len(),
        rows,
        bucket: query.bucket.unwrap_or_default(),
        date: query.date.unwrap_or_default(),
        league: query.league.unwrap_or_default(),
        selection: query.selection.unwrap_or_default(),
        min_odds: query.min_odds.unwrap_or_default(),
        max_odds: query.max_odds.unwrap_or_default(),
    })
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Response {
    let records = match load_records(&state).await {
        Ok(records) => records,
        Err(err) => return store_error_response(err),
    };

    let mut league_counts = std::collections::BTreeMap::<String, usize>::new();
    let mut status_counts = std::collections::BTreeMap::<&'static str, usize>::new();
    for record in &records {
        *league_counts.entry(record.league.clone()).or_default() += 1;
        *status_counts.entry(status_group(&record.status)).or_default() += 1;
    }

    let odds = odds_stats(&records).map(|s| OddsView {
        min: format!("{:.2}", s.min),
        max: format!("{:.2}", s.max),
        mean: format!("{:.2}", s.mean),
        median: format!("{:.2}", s.median),
    });

    render_html(StatsTemplate {
        total: records.len(),
        league_counts: league_counts
            .into_iter()
            .map(|(label, count)| CountRow { label, count })
            .collect(),
        status_counts: status_counts
            .into_iter()
            .map(|(label, count)| CountRow {
                label: label.to_string(),
                count,
            })
            .collect(),
        odds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use tipster_core::TIME_UNKNOWN;
    use tower::ServiceExt;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(url: &str, date: &str, league: &str, selection: &str, odds: f64) -> PreviewRecord {
        PreviewRecord {
            source_url: url.to_string(),
            collected_on: day(2026, 1, 10),
            kickoff_date: date.to_string(),
            kickoff_time: "19:30".to_string(),
            league: league.to_string(),
            home_team: "Flamengo".to_string(),
            away_team: "Fluminense".to_string(),
            selection: selection.to_string(),
            odds,
            status: MatchStatus::Pending,
        }
    }

    #[test]
    fn buckets_follow_string_comparison_on_fixed_encoding() {
        let today = day(2026, 1, 14);
        assert_eq!(bucket_for("2026-01-14", today), DateBucket::Today);
        assert_eq!(bucket_for("2026-01-15", today), DateBucket::Upcoming);
        assert_eq!(bucket_for("2026-01-21", today), DateBucket::Upcoming);
        assert_eq!(bucket_for("2026-01-22", today), DateBucket::Later);
        assert_eq!(bucket_for("2026-01-13", today), DateBucket::Past);
        assert_eq!(bucket_for(DATE_UNKNOWN, today), DateBucket::Undated);
    }

    #[test]
    fn filters_are_a_conjunction() {
        let today = day(2026, 1, 10);
        let rec = record(
            "https://example.com/1",
            "2026-01-14",
            "Brasileirão Série A",
            "Menos de 2,5 gols",
            1.75,
        );

        assert!(matches_filters(&rec, &TipsQuery::default(), today));
        assert!(matches_filters(
            &rec,
            &TipsQuery {
                bucket: Some("upcoming".to_string()),
                league: Some("brasileirão série a".to_string()),
                selection: Some("2,5".to_string()),
                min_odds: Some("1,5".to_string()),
                max_odds: Some("2.0".to_string()),
                ..TipsQuery::default()
            },
            today
        ));
        assert!(!matches_filters(
            &rec,
            &TipsQuery {
                league: Some("Copa do Brasil".to_string()),
                ..TipsQuery::default()
            },
            today
        ));
        assert!(!matches_filters(
            &rec,
            &TipsQuery {
                min_odds: Some("1.8".to_string()),
                ..TipsQuery::default()
            },
            today
        ));
        assert!(!matches_filters(
            &rec,
            &TipsQuery {
                date: Some("2026-01-15".to_string()),
                ..TipsQuery::default()
            },
            today
        ));
    }

    #[test]
    fn empty_filter_strings_are_ignored() {
        let today = day(2026, 1, 10);
        let rec = record("https://example.com/1", "2026-01-14", "Geral", "Tip", 1.5);
        let query = TipsQuery {
            bucket: Some(String::new()),
            league: Some("  ".to_string()),
            min_odds: Some(String::new()),
            ..TipsQuery::default()
        };
        assert!(matches_filters(&rec, &query, today));
    }

    #[test]
    fn odds_stats_skip_the_zero_sentinel() {
        let records = vec![
            record("a", "2026-01-01", "L", "t", 1.5),
            record("b", "2026-01-02", "L", "t", 2.5),
            record("c", "2026-01-03", "L", "t", ODDS_UNKNOWN),
        ];
        let stats = odds_stats(&records).unwrap();
        assert_eq!(stats.min, 1.5);
        assert_eq!(stats.max, 2.5);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.median, 2.0);
    }

    #[test]
    fn median_of_odd_sized_sample_is_the_middle_value() {
        let records = vec![
            record("a", "2026-01-01", "L", "t", 3.0),
            record("b", "2026-01-02", "L", "t", 1.2),
            record("c", "2026-01-03", "L", "t", 1.8),
        ];
        assert_eq!(odds_stats(&records).unwrap().median, 1.8);
    }

    #[test]
    fn no_usable_odds_means_no_stats() {
        let records = vec![record("a", "2026-01-01", "L", "t", ODDS_UNKNOWN)];
        assert!(odds_stats(&records).is_none());
    }

    async fn seeded_state(dir: &tempfile::TempDir) -> AppState {
        let path = dir.path().join("tips.db");
        let store = RecordStore::open(&path).await.unwrap();
        store
            .upsert(&record(
                "https://example.com/stats/match/a-vs-b/preview",
                "2026-01-14",
                "Brasileirão Série A",
                "Menos de 2,5 gols",
                1.75,
            ))
            .await
            .unwrap();
        let mut undated = record(
            "https://example.com/stats/match/c-vs-d/preview",
            DATE_UNKNOWN,
            "Geral",
            "Ambas marcam",
            ODDS_UNKNOWN,
        );
        undated.kickoff_time = TIME_UNKNOWN.to_string();
        undated.status = MatchStatus::Unknown;
        store.upsert(&undated).await.unwrap();
        AppState::new(path)
    }

    #[tokio::test]
    async fn handler_smoke_get_index() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(seeded_state(&dir).await);
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Monitor de Prognósticos"));
    }

    #[tokio::test]
    async fn handler_smoke_tips_with_filters() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(seeded_state(&dir).await);
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/tips?league=Brasileir%C3%A3o%20S%C3%A9rie%20A&min_odds=1.5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Flamengo vs Fluminense"));
        assert!(text.contains("1.75"));
        assert!(!text.contains("Ambas marcam"));
    }

    #[tokio::test]
    async fn handler_smoke_stats_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(seeded_state(&dir).await);
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("PENDING"));
        assert!(text.contains("UNKNOWN"));
        assert!(text.contains("1.75"));
    }

    #[tokio::test]
    async fn missing_database_is_a_blocking_notice() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(AppState::new(dir.path().join("absent.db")));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("run the collector first"));
    }
}
