pub mod fivethirtyeight;
pub mod football_data;
pub mod kaggle;
pub mod mock_feed;
pub mod openfootball;
pub mod soccer_data_uk;
pub mod thesportsdb;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::IngestConfig;
use crate::error::SourceError;
use crate::fetch::{RateLimitedFetcher, RateLimits, Transport};
use crate::utils::{parse_match_datetime, to_snake_case};

pub use fivethirtyeight::FiveThirtyEightAdapter;
pub use football_data::FootballDataAdapter;
pub use kaggle::KaggleAdapter;
pub use mock_feed::MockFeedAdapter;
pub use openfootball::OpenFootballAdapter;
pub use soccer_data_uk::SoccerDataUkAdapter;
pub use thesportsdb::TheSportsDbAdapter;

pub const FOOTBALL_DATA_ORG: &str = "football_data_org";
pub const THESPORTSDB: &str = "thesportsdb";
pub const SOCCER_DATA_CO_UK: &str = "soccer_data_co_uk";
pub const OPENFOOTBALL: &str = "openfootball";
pub const KAGGLE_INTL_RESULTS: &str = "kaggle_intl_results";
pub const FIVETHIRTYEIGHT: &str = "fivethirtyeight";
pub const MOCK_FEED: &str = "mock_feed";

/// Canonical field names every adapter emits.
pub mod fields {
    pub const LEAGUE_NAME: &str = "league_name";
    pub const LEAGUE_SOURCE_ID: &str = "league_source_id";
    pub const SPORT: &str = "sport";
    pub const COUNTRY: &str = "country";
    pub const TEAM_NAME: &str = "team_name";
    pub const TEAM_SOURCE_ID: &str = "team_source_id";
    pub const HOME_TEAM: &str = "home_team";
    pub const HOME_TEAM_SOURCE_ID: &str = "home_team_source_id";
    pub const AWAY_TEAM: &str = "away_team";
    pub const AWAY_TEAM_SOURCE_ID: &str = "away_team_source_id";
    pub const DATETIME_UTC: &str = "datetime_utc";
    pub const STATUS: &str = "status";
    pub const HOME_SCORE: &str = "home_score";
    pub const AWAY_SCORE: &str = "away_score";
    pub const STAGE: &str = "stage";
    pub const MATCHDAY: &str = "matchday";
    pub const IS_MOCK: &str = "is_mock";
    pub const SOURCE_MATCH_ID: &str = "source_match_id";
    pub const BOOKMAKER: &str = "bookmaker";
    pub const MARKET_TYPE: &str = "market_type";
    pub const HOME_ODDS: &str = "home_odds";
    pub const DRAW_ODDS: &str = "draw_odds";
    pub const AWAY_ODDS: &str = "away_odds";
    pub const ODDS_TIMESTAMP: &str = "odds_timestamp";
    pub const STAT_TYPE: &str = "stat_type";
    pub const STAT_VALUE: &str = "stat_value";
    pub const PERIOD: &str = "period";
    pub const PLAYER_ID: &str = "player_id";
    /// "home" / "away" for stats attached to one side of a match.
    pub const TEAM_SIDE: &str = "team_side";
}

// ── Records ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    League,
    Team,
    Match,
    Odds,
    Stat,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::League => "league",
            RecordKind::Team => "team",
            RecordKind::Match => "match",
            RecordKind::Odds => "odds",
            RecordKind::Stat => "stat",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source-agnostic record. Keys are normalized to snake_case on the way
/// in, so `HomeTeam`, `home team` and `home_team` all land on `home_team`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub kind: RecordKind,
    fields: BTreeMap<String, Value>,
}

impl RawRecord {
    pub fn new(kind: RecordKind) -> Self {
        Self { kind, fields: BTreeMap::new() }
    }

    /// Builder form of [`RawRecord::set`]. Null values are not stored.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if !value.is_null() {
            self.fields.insert(to_snake_case(key), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).or_else(|| self.fields.get(&to_snake_case(key)))
    }

    /// Trimmed, non-empty text. Numbers are rendered, so vendor ids that
    /// arrive as integers still read as text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn datetime(&self, key: &str) -> Option<DateTime<Utc>> {
        parse_match_datetime(&self.text(key)?, None)
    }
}

// ── Selection / chunks ───────────────────────────────────────────────────────

/// What to fetch. `since = None` is a full refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selector {
    pub since: Option<NaiveDate>,
}

impl Selector {
    pub fn full() -> Self {
        Self { since: None }
    }

    pub fn since(date: NaiveDate) -> Self {
        Self { since: Some(date) }
    }

    pub fn admits(&self, at: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| at.date_naive() >= since)
    }
}

/// Label of one independently loadable unit of a source, e.g. `PL/2023` or
/// `2324/E0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `"PL/2023"` -> `("PL", "2023")`; a label without a separator yields
    /// an empty second part.
    pub fn split(&self) -> (&str, &str) {
        self.0.split_once('/').unwrap_or((self.0.as_str(), ""))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct ChunkBatch {
    pub chunk: ChunkId,
    pub result: Result<Vec<RawRecord>, SourceError>,
}

// ── Adapter trait ────────────────────────────────────────────────────────────

/// One external data source. Adapters only translate vendor payloads into
/// [`RawRecord`]s; identity resolution and storage happen downstream.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// True when the adapter applies `Selector::since` itself (server side).
    fn supports_since(&self) -> bool {
        false
    }

    fn chunks(&self, selector: &Selector) -> Vec<ChunkId>;

    /// Load one chunk. Within the returned batch a match record always
    /// precedes the odds and stat records that reference it.
    async fn fetch_chunk(&self, chunk: &ChunkId, selector: &Selector) -> Result<Vec<RawRecord>, SourceError>;

    /// Lazy, finite stream of per-chunk batches. A failed chunk is reported
    /// in its batch and the stream moves on to the next one.
    fn fetch_records<'a>(&'a self, selector: &'a Selector) -> BoxStream<'a, ChunkBatch> {
        stream::iter(self.chunks(selector))
            .then(move |chunk| async move {
                let result = self.fetch_chunk(&chunk, selector).await;
                ChunkBatch { chunk, result }
            })
            .boxed()
    }
}

pub type AdapterRegistry = BTreeMap<String, Arc<dyn SourceAdapter>>;

/// Builds every known adapter. Network adapters built here share `limits`,
/// so two adapters for the same vendor would share a budget.
pub fn build_adapters(
    config: &IngestConfig,
    limits: &RateLimits,
    transport: Arc<dyn Transport>,
) -> AdapterRegistry {
    let fetcher = |source: &str| {
        RateLimitedFetcher::new(
            source,
            transport.clone(),
            limits.limiter_for(source, config.rate_budget(source)),
            config.retry.clone(),
        )
    };

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(FootballDataAdapter::new(config.football_data.clone(), fetcher(FOOTBALL_DATA_ORG))),
        Arc::new(TheSportsDbAdapter::new(config.thesportsdb.clone(), fetcher(THESPORTSDB))),
        Arc::new(SoccerDataUkAdapter::new(config.soccer_data.clone(), fetcher(SOCCER_DATA_CO_UK))),
        Arc::new(OpenFootballAdapter::new(config.openfootball.clone())),
        Arc::new(KaggleAdapter::new(config.kaggle.clone())),
        Arc::new(FiveThirtyEightAdapter::new(config.fivethirtyeight.clone())),
        Arc::new(MockFeedAdapter::new()),
    ];

    adapters
        .into_iter()
        .map(|adapter| (adapter.name().to_string(), adapter))
        .collect()
}

/// Strip separators so team names can be embedded in synthetic match ids.
pub(crate) fn compact(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::ScriptedTransport;

    #[test]
    fn test_raw_record_normalizes_keys() {
        let record = RawRecord::new(RecordKind::Match)
            .with("HomeTeam", "Arsenal")
            .with("FTHG", "2")
            .with("utcDate", "2024-08-16T19:00:00Z")
            .with("stage", Value::Null);

        assert_eq!(record.text("home_team").as_deref(), Some("Arsenal"));
        assert_eq!(record.text("HomeTeam").as_deref(), Some("Arsenal"));
        assert_eq!(record.int("fthg"), Some(2));
        assert!(record.datetime("utc_date").is_some());
        assert!(record.get("stage").is_none());
    }

    #[test]
    fn test_raw_record_typed_getters() {
        let record = RawRecord::new(RecordKind::Odds)
            .with("home_odds", "2.10")
            .with("matchday", 3.0)
            .with("id", 4328)
            .with("blank", "   ")
            .with("neutral", "TRUE");

        assert_eq!(record.float("home_odds"), Some(2.1));
        assert_eq!(record.int("matchday"), Some(3));
        assert_eq!(record.text("id").as_deref(), Some("4328"));
        assert_eq!(record.text("blank"), None);
        assert_eq!(record.boolean("neutral"), Some(true));
    }

    #[test]
    fn test_selector_admits() {
        let since = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let before = parse_match_datetime("2024-02-29", Some("23:00")).unwrap();
        let on = parse_match_datetime("2024-03-01", None).unwrap();
        assert!(!Selector::since(since).admits(before));
        assert!(Selector::since(since).admits(on));
        assert!(Selector::full().admits(before));
    }

    #[test]
    fn test_chunk_id_split() {
        assert_eq!(ChunkId::new("PL/2023").split(), ("PL", "2023"));
        assert_eq!(ChunkId::new("results.csv").split(), ("results.csv", ""));
    }

    #[test]
    fn test_registry_knows_every_source() {
        let config = IngestConfig::from_lookup(|_| None);
        let registry = build_adapters(&config, &RateLimits::new(), ScriptedTransport::new(vec![]));
        let names: Vec<&str> = registry.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                FIVETHIRTYEIGHT,
                FOOTBALL_DATA_ORG,
                KAGGLE_INTL_RESULTS,
                MOCK_FEED,
                OPENFOOTBALL,
                SOCCER_DATA_CO_UK,
                THESPORTSDB
            ]
        );
    }
}
