use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::fetch::{RateBudget, RetryPolicy};
use crate::sources::{FOOTBALL_DATA_ORG, SOCCER_DATA_CO_UK, THESPORTSDB};

#[derive(Debug, Clone)]
pub struct FootballDataConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub competitions: Vec<String>,
    /// Season start years; empty means "current season".
    pub seasons: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TheSportsDbConfig {
    pub api_key: String,
    pub base_url: String,
    pub leagues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SoccerDataConfig {
    /// Local download directory; files are fetched from `base_url` when unset.
    pub data_dir: Option<PathBuf>,
    pub base_url: String,
    pub seasons: Vec<String>,
    pub divisions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OpenFootballConfig {
    pub repo_dir: PathBuf,
    pub seasons: Vec<String>,
    pub leagues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct KaggleConfig {
    pub dataset_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FiveThirtyEightConfig {
    /// Checkout of github.com/fivethirtyeight/data.
    pub repo_dir: PathBuf,
    /// Paths inside the checkout, one chunk each.
    pub files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_url: String,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
    pub rate_budgets: BTreeMap<String, RateBudget>,
    pub source_timeout: Duration,
    pub max_parallel_sources: usize,
    pub incremental_lookback_days: i64,
    pub report_error_samples: usize,
    pub football_data: FootballDataConfig,
    pub thesportsdb: TheSportsDbConfig,
    pub soccer_data: SoccerDataConfig,
    pub openfootball: OpenFootballConfig,
    pub kaggle: KaggleConfig,
    pub fivethirtyeight: FiveThirtyEightConfig,
}

/// (source, env prefix, default requests, default interval secs)
const RATE_DEFAULTS: [(&str, &str, u32, u64); 3] = [
    (FOOTBALL_DATA_ORG, "FOOTBALL_DATA", 10, 60),
    (THESPORTSDB, "THESPORTSDB", 30, 60),
    (SOCCER_DATA_CO_UK, "SOCCER_DATA", 5, 1),
];

impl IngestConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value lookup. Missing keys take defaults; values
    /// that fail to parse are logged and also take defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let retry = RetryPolicy {
            max_attempts: vars.parse("FETCH_MAX_ATTEMPTS", 3u32).max(1),
            backoff_base: Duration::from_millis(vars.parse("FETCH_BACKOFF_BASE_MS", 2000)),
            jitter: Duration::from_millis(vars.parse("FETCH_JITTER_MS", 500)),
            max_delay: Duration::from_millis(vars.parse("FETCH_MAX_DELAY_MS", 30_000)),
        };

        let rate_budgets = RATE_DEFAULTS
            .iter()
            .map(|(source, prefix, requests, secs)| {
                let requests = vars.parse(&format!("{}_RATE_LIMIT", prefix), *requests);
                let secs = vars.parse(&format!("{}_RATE_INTERVAL_SECS", prefix), *secs);
                (source.to_string(), RateBudget::new(requests, Duration::from_secs(secs)))
            })
            .collect();

        Self {
            database_url: vars.string("DATABASE_URL", "sqlite:data/sportsync.db"),
            retry,
            http_timeout: Duration::from_secs(vars.parse("HTTP_TIMEOUT_SECS", 20)),
            rate_budgets,
            source_timeout: Duration::from_secs(vars.parse("SOURCE_TIMEOUT_SECS", 900)),
            max_parallel_sources: vars.parse("MAX_PARALLEL_SOURCES", 1usize).max(1),
            incremental_lookback_days: vars.parse("INCREMENTAL_LOOKBACK_DAYS", 7i64).max(0),
            report_error_samples: vars.parse("REPORT_ERROR_SAMPLES", 5),
            football_data: FootballDataConfig {
                api_key: vars.secret("FOOTBALL_DATA_API_KEY"),
                base_url: vars.string("FOOTBALL_DATA_BASE_URL", "https://api.football-data.org/v4"),
                competitions: vars.list("FOOTBALL_DATA_COMPETITIONS", &["PL", "BL1", "SA", "PD", "FL1"]),
                seasons: vars.list("FOOTBALL_DATA_SEASONS", &[]),
            },
            thesportsdb: TheSportsDbConfig {
                api_key: vars.secret("THESPORTSDB_API_KEY").unwrap_or_else(|| "3".to_string()),
                base_url: vars.string("THESPORTSDB_BASE_URL", "https://www.thesportsdb.com/api/v1/json"),
                leagues: vars.list("THESPORTSDB_LEAGUES", &["4328", "4335", "4331"]),
            },
            soccer_data: SoccerDataConfig {
                data_dir: vars.lookup_trimmed("SOCCER_DATA_DIR").map(PathBuf::from),
                base_url: vars.string("SOCCER_DATA_BASE_URL", "https://www.football-data.co.uk/mmz4281"),
                seasons: vars.list("SOCCER_DATA_SEASONS", &["2324", "2425"]),
                divisions: vars.list("SOCCER_DATA_DIVISIONS", &["E0", "SP1", "D1", "I1", "F1"]),
            },
            openfootball: OpenFootballConfig {
                repo_dir: PathBuf::from(vars.string("OPENFOOTBALL_DIR", "data/football.json")),
                seasons: vars.list("OPENFOOTBALL_SEASONS", &["2023-24", "2024-25"]),
                leagues: vars.list("OPENFOOTBALL_LEAGUES", &["en.1", "es.1", "de.1", "it.1", "fr.1"]),
            },
            kaggle: KaggleConfig {
                dataset_dir: PathBuf::from(vars.string(
                    "KAGGLE_DATASET_DIR",
                    "data/kaggle/international-football-results",
                )),
            },
            fivethirtyeight: FiveThirtyEightConfig {
                repo_dir: PathBuf::from(vars.string("FIVETHIRTYEIGHT_DIR", "data/fivethirtyeight_data")),
                files: vars.list("FIVETHIRTYEIGHT_FILES", &["soccer-spi/spi_matches.csv"]),
            },
        }
    }

    pub fn rate_budget(&self, source: &str) -> RateBudget {
        self.rate_budgets
            .get(source)
            .copied()
            .unwrap_or_else(|| RateBudget::new(10, Duration::from_secs(1)))
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup_trimmed(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.lookup_trimmed(key).unwrap_or_else(|| default.to_string())
    }

    /// Credentials left at a template placeholder count as absent.
    fn secret(&self, key: &str) -> Option<String> {
        self.lookup_trimmed(key).filter(|v| {
            let upper = v.to_uppercase();
            !(upper.starts_with("YOUR_") || upper.contains("PLACEHOLDER") || upper == "CHANGEME")
        })
    }

    fn list(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.lookup_trimmed(key) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn parse<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + std::fmt::Display,
    {
        match self.lookup_trimmed(key) {
            None => default,
            Some(raw) => match raw.parse() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!("Ignoring malformed {}='{}', using default {}", key, raw, default);
                    default
                }
            },
        }
    }
}
