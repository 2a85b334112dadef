//! Core domain model for the football preview tips monitor.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "tipster-core";

/// Kickoff date sentinel when no date could be parsed from the page.
pub const DATE_UNKNOWN: &str = "N/A";
/// Kickoff time sentinel used alongside [`DATE_UNKNOWN`] or a date-only match.
pub const TIME_UNKNOWN: &str = "00:00";
/// League placeholder when breadcrumb parsing yields nothing usable.
pub const LEAGUE_FALLBACK: &str = "Geral";
/// Team placeholders when neither the title nor the URL produced names.
pub const HOME_TEAM_FALLBACK: &str = "Time A";
pub const AWAY_TEAM_FALLBACK: &str = "Time B";
/// Selection sentinel marking "no usable tip found"; such records are
/// never persisted.
pub const NO_TIP: &str = "Sem prognóstico";
/// Odds sentinel meaning "no odds parsed".
pub const ODDS_UNKNOWN: f64 = 0.0;

/// Match status as stored: `PENDING`, a literal `"<home> - <away>"`
/// scoreline, or `UNKNOWN` when the kickoff date itself was unparseable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum MatchStatus {
    Pending,
    Finished { home: u8, away: u8 },
    Unknown,
}

impl MatchStatus {
    pub fn as_wire(&self) -> String {
        match self {
            MatchStatus::Pending => "PENDING".to_string(),
            MatchStatus::Finished { home, away } => format!("{home} - {away}"),
            MatchStatus::Unknown => "UNKNOWN".to_string(),
        }
    }

    pub fn parse_wire(text: &str) -> MatchStatus {
        match text.trim() {
            "PENDING" => MatchStatus::Pending,
            "UNKNOWN" => MatchStatus::Unknown,
            other => parse_scoreline(other).unwrap_or(MatchStatus::Unknown),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, MatchStatus::Finished { .. })
    }
}

fn parse_scoreline(text: &str) -> Option<MatchStatus> {
    let (left, right) = text.split_once('-')?;
    let home = left.trim().parse::<u8>().ok()?;
    let away = right.trim().parse::<u8>().ok()?;
    Some(MatchStatus::Finished { home, away })
}

impl From<MatchStatus> for String {
    fn from(status: MatchStatus) -> Self {
        status.as_wire()
    }
}

impl TryFrom<String> for MatchStatus {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(MatchStatus::parse_wire(&value))
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_wire())
    }
}

/// One extracted preview page; `source_url` is the record identity and
/// re-extraction replaces every other field wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRecord {
    pub source_url: String,
    pub collected_on: NaiveDate,
    /// `YYYY-MM-DD`, or [`DATE_UNKNOWN`].
    pub kickoff_date: String,
    /// `HH:MM`, or [`TIME_UNKNOWN`].
    pub kickoff_time: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub selection: String,
    pub odds: f64,
    pub status: MatchStatus,
}

impl PreviewRecord {
    /// Parsed kickoff instant, or `None` while the date sentinel is set.
    pub fn kickoff_datetime(&self) -> Option<NaiveDateTime> {
        if self.kickoff_date == DATE_UNKNOWN {
            return None;
        }
        let date = NaiveDate::parse_from_str(&self.kickoff_date, "%Y-%m-%d").ok()?;
        let time = NaiveTime::parse_from_str(&self.kickoff_time, "%H:%M")
            .unwrap_or(NaiveTime::MIN);
        Some(date.and_time(time))
    }

    /// Persistence policy: only records carrying a real tip are stored.
    pub fn has_useful_tip(&self) -> bool {
        self.selection != NO_TIP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, time: &str) -> PreviewRecord {
        PreviewRecord {
            source_url: "https://example.com/stats/match/x/preview".to_string(),
            collected_on: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            kickoff_date: date.to_string(),
            kickoff_time: time.to_string(),
            league: LEAGUE_FALLBACK.to_string(),
            home_team: "Flamengo".to_string(),
            away_team: "Fluminense".to_string(),
            selection: "Mais de 2,5 gols".to_string(),
            odds: 1.9,
            status: MatchStatus::Pending,
        }
    }

    #[test]
    fn status_round_trips_through_wire_strings() {
        for status in [
            MatchStatus::Pending,
            MatchStatus::Unknown,
            MatchStatus::Finished { home: 2, away: 1 },
        ] {
            assert_eq!(MatchStatus::parse_wire(&status.as_wire()), status);
        }
        assert_eq!(
            MatchStatus::Finished { home: 3, away: 0 }.as_wire(),
            "3 - 0"
        );
    }

    #[test]
    fn garbage_status_text_degrades_to_unknown() {
        assert_eq!(MatchStatus::parse_wire("FINISHED"), MatchStatus::Unknown);
        assert_eq!(MatchStatus::parse_wire("a - b"), MatchStatus::Unknown);
        assert_eq!(MatchStatus::parse_wire(""), MatchStatus::Unknown);
    }

    #[test]
    fn kickoff_datetime_combines_date_and_time() {
        let rec = record("2026-01-14", "19:30");
        let dt = rec.kickoff_datetime().unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2026-01-14 19:30");
    }

    #[test]
    fn kickoff_datetime_is_none_for_date_sentinel() {
        assert!(record(DATE_UNKNOWN, TIME_UNKNOWN).kickoff_datetime().is_none());
    }

    #[test]
    fn malformed_time_falls_back_to_midnight() {
        let dt = record("2026-01-14", "not-a-time").kickoff_datetime().unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "00:00");
    }

    #[test]
    fn sentinel_selection_is_not_a_useful_tip() {
        let mut rec = record("2026-01-14", "19:30");
        assert!(rec.has_useful_tip());
        rec.selection = NO_TIP.to_string();
        assert!(!rec.has_useful_tip());
    }
}
