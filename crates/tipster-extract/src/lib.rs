//! Preview-page field extraction and listing-page link discovery.
//!
//! Every extractor here is a pure `&str`/document -> value function so the
//! heuristics can be tested against captured HTML without any network I/O.
//! Per field we keep an ordered list of independent strategies; the first
//! one that produces a value wins, and when all of them miss the field
//! degrades to its sentinel instead of failing.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use tipster_core::{
    MatchStatus, PreviewRecord, AWAY_TEAM_FALLBACK, DATE_UNKNOWN, HOME_TEAM_FALLBACK,
    LEAGUE_FALLBACK, NO_TIP, ODDS_UNKNOWN, TIME_UNKNOWN,
};

pub const CRATE_NAME: &str = "tipster-extract";

/// Shape of the source site, passed explicitly into the discoverer and
/// extractor instead of living in module-level constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub base_url: String,
    pub listing_path: String,
    /// Preview links must carry both path markers.
    pub match_path_marker: String,
    pub preview_path_marker: String,
    /// Labels stripped from the front of a match heading.
    pub title_prefixes: Vec<String>,
    /// Label introducing the editor's suggested bet.
    pub editor_label: String,
    /// Advertising boilerplate removed from the suggestion text.
    pub ad_boilerplate: Vec<String>,
    /// A selection containing one of these is not a usable tip.
    pub disclaimer_phrases: Vec<String>,
    pub min_selection_len: usize,
    /// Selectors locating the match header region of a preview page.
    pub header_selectors: Vec<String>,
    /// Class names of head-to-head / historical-stats sub-sections that
    /// must never contribute a scoreline for the current match.
    pub history_classes: Vec<String>,
    /// Minutes past kickoff during which the match still counts as pending.
    pub grace_minutes: i64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.academiadasapostasbrasil.com".to_string(),
            listing_path: "/previews".to_string(),
            match_path_marker: "/stats/match/".to_string(),
            preview_path_marker: "/preview".to_string(),
            title_prefixes: vec!["Prognóstico".to_string(), "Análise".to_string()],
            editor_label: "Sugestão do editor".to_string(),
            ad_boilerplate: vec![
                "Apostar agora".to_string(),
                "Aposte já".to_string(),
                "Publicidade".to_string(),
            ],
            disclaimer_phrases: vec![
                "Jogue com responsabilidade".to_string(),
                "18+".to_string(),
            ],
            min_selection_len: 5,
            header_selectors: vec![
                "div.match-info".to_string(),
                "#match-header".to_string(),
                "div.preview_header".to_string(),
            ],
            history_classes: vec![
                "h2h".to_string(),
                "head-to-head".to_string(),
                "last-matches".to_string(),
                "historical".to_string(),
            ],
            grace_minutes: 120,
        }
    }
}

/// Listing URL for a one-based page index; page 1 is the bare listing.
pub fn listing_url(config: &SiteConfig, page: u32) -> String {
    let base = format!("{}{}", config.base_url, config.listing_path);
    if page > 1 {
        format!("{base}/index/page:{page}")
    } else {
        base
    }
}

/// All preview links found on a listing page, absolute and deduplicated.
/// Anything that is not a preview link is ignored; an empty or unparseable
/// page simply yields an empty set.
pub fn discover_preview_links(html: &str, config: &SiteConfig) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    let Ok(anchor) = Selector::parse("a[href]") else {
        return BTreeSet::new();
    };
    document
        .select(&anchor)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| {
            href.contains(&config.match_path_marker) && href.contains(&config.preview_path_marker)
        })
        .map(|href| {
            if href.starts_with('/') {
                format!("{}{}", config.base_url, href)
            } else {
                href.to_string()
            }
        })
        .collect()
}

/// Localized month table: full and abbreviated Portuguese names mapped to
/// their two-digit codes.
pub const MONTHS: &[(&str, &str)] = &[
    ("janeiro", "01"),
    ("jan", "01"),
    ("fevereiro", "02"),
    ("fev", "02"),
    ("março", "03"),
    ("mar", "03"),
    ("abril", "04"),
    ("abr", "04"),
    ("maio", "05"),
    ("mai", "05"),
    ("junho", "06"),
    ("jun", "06"),
    ("julho", "07"),
    ("jul", "07"),
    ("agosto", "08"),
    ("ago", "08"),
    ("setembro", "09"),
    ("set", "09"),
    ("outubro", "10"),
    ("out", "10"),
    ("novembro", "11"),
    ("nov", "11"),
    ("dezembro", "12"),
    ("dez", "12"),
];

/// Two-digit month code for a localized month name, case-insensitive.
/// Unrecognized names fall back to `"01"` rather than failing.
pub fn month_number(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    MONTHS
        .iter()
        .find(|(month, _)| *month == lower)
        .map(|(_, number)| *number)
        .unwrap_or("01")
}

fn kickoff_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(\d{1,2})\s+([a-záéíóúâêôàãõç]+)\.?\s+(\d{4})(?:\s*[-–]\s*(\d{1,2}):(\d{2}))?",
        )
        .expect("kickoff pattern is valid")
    })
}

fn odds_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bodds?\s*:?\s*(\d+(?:[.,]\d+)?)").expect("odds pattern is valid")
    })
}

fn trailing_decimal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+[.,]\d+)\s*$").expect("trailing odds pattern is valid"))
}

fn scoreline_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Strict single digit vs single digit, with neither digit part of a
    // longer numeric token: `\b` alone would accept the leading digit of
    // a decimal, turning handicap/odds markets like "2 - 1.85" into a
    // scoreline. Anything wider also matches dates and aggregate stats.
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^\d.,])(\d)\s*-\s*(\d)(?:[^\d.,]|$)")
            .expect("scoreline pattern is valid")
    })
}

fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct PageInput<'a> {
    document: &'a Html,
    url: &'a str,
    config: &'a SiteConfig,
}

// ---- teams ----------------------------------------------------------------

/// Home/away team names; strategies run in priority order, first hit
/// wins, placeholders when every heuristic misses.
pub fn extract_teams(document: &Html, url: &str, config: &SiteConfig) -> (String, String) {
    let input = PageInput {
        document,
        url,
        config,
    };
    teams_from_heading(&input)
        .or_else(|| teams_from_analysis_titles(&input))
        .or_else(|| teams_from_url_segments(&input))
        .unwrap_or_else(|| {
            (
                HOME_TEAM_FALLBACK.to_string(),
                AWAY_TEAM_FALLBACK.to_string(),
            )
        })
}

const TEAM_SEPARATORS: &[&str] = &[" vs ", " - ", " v "];

fn split_on_first_separator(title: &str) -> Option<(String, String)> {
    for separator in TEAM_SEPARATORS {
        if let Some((left, right)) = title.split_once(separator) {
            let home = left.trim();
            let away = right.trim();
            if !home.is_empty() && !away.is_empty() {
                return Some((home.to_string(), away.to_string()));
            }
        }
    }
    None
}

fn strip_title_decorations(text: &str, config: &SiteConfig) -> String {
    let mut title = squash_whitespace(text);
    for prefix in &config.title_prefixes {
        if let Some(rest) = title.strip_prefix(prefix.as_str()) {
            title = rest.trim_start().to_string();
        }
    }
    // Drop a trailing parenthesized aside, e.g. a date annotation.
    if let Some(open) = title.find('(') {
        title.truncate(open);
    }
    title.trim().to_string()
}

fn teams_from_heading(input: &PageInput<'_>) -> Option<(String, String)> {
    let headings = Selector::parse("h1, h2, h3.preview_title, title").ok()?;
    input
        .document
        .select(&headings)
        .map(|el| strip_title_decorations(&el.text().collect::<String>(), input.config))
        .find_map(|title| split_on_first_separator(&title))
}

/// Per-team "Análise <Team>" headings, one per side.
fn teams_from_analysis_titles(input: &PageInput<'_>) -> Option<(String, String)> {
    let titles = Selector::parse("h3.preview_title").ok()?;
    let teams: Vec<String> = input
        .document
        .select(&titles)
        .filter_map(|el| {
            let text = squash_whitespace(&el.text().collect::<String>());
            text.strip_prefix("Análise")
                .map(|team| team.trim().to_string())
                .filter(|team| !team.is_empty())
        })
        .collect();
    if teams.len() >= 2 {
        Some((teams[0].clone(), teams[1].clone()))
    } else {
        None
    }
}

fn title_case_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn teams_from_url_segments(input: &PageInput<'_>) -> Option<(String, String)> {
    let path = input.url.split_once("//").map_or(input.url, |(_, rest)| {
        rest.split_once('/').map_or("", |(_, path)| path)
    });
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let match_index = segments.iter().position(|s| *s == "match")?;

    // Either a single "home-vs-away" segment or two positional segments.
    if let Some(joined) = segments.get(match_index + 1) {
        if let Some((home, away)) = joined.split_once("-vs-") {
            if !home.is_empty() && !away.is_empty() {
                return Some((title_case_slug(home), title_case_slug(away)));
            }
        }
    }
    match (
        segments.get(match_index + 1),
        segments.get(match_index + 2),
    ) {
        (Some(home), Some(away)) if !away.starts_with("preview") => {
            Some((title_case_slug(home), title_case_slug(away)))
        }
        _ => None,
    }
}

// ---- kickoff date/time ----------------------------------------------------

fn header_region<'a>(document: &'a Html, config: &SiteConfig) -> Option<ElementRef<'a>> {
    config
        .header_selectors
        .iter()
        .filter_map(|selector| Selector::parse(selector).ok())
        .find_map(|selector| document.select(&selector).next())
}

fn document_text(document: &Html) -> String {
    squash_whitespace(&document.root_element().text().collect::<Vec<_>>().join(" "))
}

/// Kickoff `(YYYY-MM-DD, HH:MM)`. Searches the header region when one is
/// present so dates inside historical-stats blocks cannot shadow the real
/// kickoff; absence yields the sentinel pair.
pub fn extract_kickoff(document: &Html, config: &SiteConfig) -> (String, String) {
    let haystack = match header_region(document, config) {
        Some(header) => squash_whitespace(&header.text().collect::<Vec<_>>().join(" ")),
        None => document_text(document),
    };
    parse_kickoff_text(&haystack)
}

/// Pure text form of the kickoff heuristic, also used for raw-HTML scans.
pub fn parse_kickoff_text(text: &str) -> (String, String) {
    let Some(caps) = kickoff_regex().captures(text) else {
        return (DATE_UNKNOWN.to_string(), TIME_UNKNOWN.to_string());
    };
    let day = &caps[1];
    let month = month_number(&caps[2]);
    let year = &caps[3];
    let date = format!("{year}-{month}-{day:0>2}");
    let time = match (caps.get(4), caps.get(5)) {
        (Some(hour), Some(minute)) => format!("{:0>2}:{}", hour.as_str(), minute.as_str()),
        _ => TIME_UNKNOWN.to_string(),
    };
    (date, time)
}

// ---- league ---------------------------------------------------------------

fn looks_like_match_title(text: &str) -> bool {
    let lower = format!(" {} ", text.to_lowercase());
    TEAM_SEPARATORS
        .iter()
        .any(|separator| lower.contains(separator))
        || lower.contains(" vs")
}

/// League label from the breadcrumb trail; `"Geral"` when missing.
pub fn extract_league(document: &Html) -> String {
    let Ok(crumbs) = Selector::parse(".breadcrumbs li, .breadcrumb li") else {
        return LEAGUE_FALLBACK.to_string();
    };
    let items: Vec<String> = document
        .select(&crumbs)
        .map(|el| {
            squash_whitespace(&el.text().collect::<String>())
                .replace('»', "")
                .trim()
                .to_string()
        })
        .collect();
    if items.len() < 3 {
        return LEAGUE_FALLBACK.to_string();
    }
    // Second-to-last entry is normally the league; when it is the match
    // title itself, step back one more position.
    let mut league = items[items.len() - 2].clone();
    if league.is_empty() || looks_like_match_title(&league) {
        league = items[items.len() - 3].clone();
    }
    if league.is_empty() {
        LEAGUE_FALLBACK.to_string()
    } else {
        league
    }
}

// ---- selection & odds -----------------------------------------------------

/// Predicted outcome text plus decimal odds. Falls back through labeled
/// odds, a trailing bare decimal, then "whole text, zero odds"; too-short
/// or disclaimer-bearing selections are replaced with the no-tip sentinel.
pub fn extract_selection(document: &Html, config: &SiteConfig) -> (String, f64) {
    let input = PageInput {
        document,
        url: "",
        config,
    };
    let (selection, odds) = selection_from_editor_label(&input)
        .or_else(|| selection_from_bet_block(&input))
        .unwrap_or_else(|| (NO_TIP.to_string(), ODDS_UNKNOWN));
    validate_selection(selection, odds, config)
}

fn validate_selection(selection: String, odds: f64, config: &SiteConfig) -> (String, f64) {
    let lower = selection.to_lowercase();
    let disclaimed = config
        .disclaimer_phrases
        .iter()
        .any(|phrase| lower.contains(&phrase.to_lowercase()));
    if selection.chars().count() < config.min_selection_len || disclaimed {
        return (NO_TIP.to_string(), ODDS_UNKNOWN);
    }
    (selection, odds)
}

fn parse_odds_token(token: &str) -> f64 {
    token.replace(',', ".").parse::<f64>().unwrap_or(ODDS_UNKNOWN)
}

/// Splits cleaned suggestion text into selection and odds.
pub fn split_selection_odds(text: &str) -> (String, f64) {
    if let Some(caps) = odds_marker_regex().captures(text) {
        let marker = caps.get(0).expect("whole match");
        let selection = text[..marker.start()].trim().to_string();
        return (selection, parse_odds_token(&caps[1]));
    }
    if let Some(caps) = trailing_decimal_regex().captures(text) {
        let token = caps.get(1).expect("trailing decimal group");
        let selection = text[..token.start()].trim().to_string();
        return (selection, parse_odds_token(token.as_str()));
    }
    (text.trim().to_string(), ODDS_UNKNOWN)
}

fn clean_suggestion_text(text: &str, config: &SiteConfig) -> String {
    let mut cleaned = squash_whitespace(text).replace(&config.editor_label, "");
    for boilerplate in &config.ad_boilerplate {
        cleaned = cleaned.replace(boilerplate.as_str(), "");
    }
    squash_whitespace(&cleaned)
}

fn selection_from_editor_label(input: &PageInput<'_>) -> Option<(String, f64)> {
    let candidates = Selector::parse("p, div, span, h4, strong").ok()?;
    let label = &input.config.editor_label;
    // Innermost element carrying the label; its parent holds the full
    // suggestion container text.
    let labeled = input
        .document
        .select(&candidates)
        .filter(|el| el.text().collect::<String>().contains(label.as_str()))
        .last()?;
    let container = labeled
        .parent()
        .and_then(ElementRef::wrap)
        .unwrap_or(labeled);
    let text = clean_suggestion_text(&container.text().collect::<String>(), input.config);
    if text.is_empty() {
        return None;
    }
    Some(split_selection_odds(&text))
}

/// `div.preview_bet` layout: first paragraph is the selection, a sibling
/// paragraph carries "Odd X.XX".
fn selection_from_bet_block(input: &PageInput<'_>) -> Option<(String, f64)> {
    let block = Selector::parse("div.preview_bet").ok()?;
    let paragraph = Selector::parse("p").ok()?;
    let bet = input.document.select(&block).next()?;
    let mut paragraphs = bet.select(&paragraph);
    let selection = squash_whitespace(&paragraphs.next()?.text().collect::<String>());
    if selection.is_empty() {
        return None;
    }
    let odds = paragraphs
        .map(|p| p.text().collect::<String>())
        .find_map(|text| {
            odds_marker_regex()
                .captures(&text)
                .map(|caps| parse_odds_token(&caps[1]))
        })
        .unwrap_or(ODDS_UNKNOWN);
    Some((selection, odds))
}

// ---- status ---------------------------------------------------------------

fn region_text_excluding(element: ElementRef<'_>, excluded_classes: &[String], out: &mut String) {
    let skip = element
        .value()
        .classes()
        .any(|class| excluded_classes.iter().any(|x| class.eq_ignore_ascii_case(x)));
    if skip {
        return;
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            region_text_excluding(child_element, excluded_classes, out);
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

fn kickoff_instant(kickoff_date: &str, kickoff_time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(kickoff_date, "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(kickoff_time, "%H:%M").unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time))
}

/// Match status relative to `now`.
///
/// Matches whose kickoff is in the future, or within the grace margin past
/// kickoff, are always `PENDING` no matter what scoreline-shaped text the
/// page contains; head-to-head blocks carry past results of other matches
/// between the same teams. A scoreline is only read from the header region
/// with those history sub-sections excluded, and only for a kickoff that is
/// unambiguously in the past. `UNKNOWN` means the kickoff date itself could
/// not be determined.
pub fn derive_status(
    document: &Html,
    kickoff_date: &str,
    kickoff_time: &str,
    now: NaiveDateTime,
    config: &SiteConfig,
) -> MatchStatus {
    if kickoff_date == DATE_UNKNOWN {
        return MatchStatus::Unknown;
    }
    let Some(kickoff) = kickoff_instant(kickoff_date, kickoff_time) else {
        return MatchStatus::Unknown;
    };
    if now <= kickoff + Duration::minutes(config.grace_minutes) {
        return MatchStatus::Pending;
    }

    let Some(header) = header_region(document, config) else {
        return MatchStatus::Pending;
    };
    let mut text = String::new();
    region_text_excluding(header, &config.history_classes, &mut text);
    match scoreline_regex().captures(&text) {
        Some(caps) => {
            let home = caps[1].parse::<u8>().unwrap_or(0);
            let away = caps[2].parse::<u8>().unwrap_or(0);
            MatchStatus::Finished { home, away }
        }
        None => MatchStatus::Pending,
    }
}

// ---- whole-page pipeline --------------------------------------------------

/// Runs the fixed extractor pipeline over one preview page. Each field is
/// best-effort; the result is always a complete record.
pub fn extract_preview(
    html: &str,
    url: &str,
    now: NaiveDateTime,
    config: &SiteConfig,
) -> PreviewRecord {
    let document = Html::parse_document(html);
    let (home_team, away_team) = extract_teams(&document, url, config);
    let (kickoff_date, kickoff_time) = extract_kickoff(&document, config);
    let league = extract_league(&document);
    let (selection, odds) = extract_selection(&document, config);
    let status = derive_status(&document, &kickoff_date, &kickoff_time, now, config);

    PreviewRecord {
        source_url: url.to_string(),
        collected_on: now.date(),
        kickoff_date,
        kickoff_time,
        league,
        home_team,
        away_team,
        selection,
        odds,
        status,
    }
}
