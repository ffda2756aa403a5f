use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ── Match status / winner ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "SCHEDULED",
            MatchStatus::Live => "LIVE",
            MatchStatus::Finished => "FINISHED",
            MatchStatus::Postponed => "POSTPONED",
            MatchStatus::Cancelled => "CANCELLED",
        }
    }

    /// Map the status vocabulary of any supported vendor onto ours.
    /// Returns `None` for values we do not recognise so the caller can fall
    /// back to score-based inference.
    pub fn from_vendor(raw: &str) -> Option<Self> {
        let key = raw.trim().to_uppercase().replace(['-', ' '], "_");
        let status = match key.as_str() {
            "SCHEDULED" | "TIMED" | "NOT_STARTED" | "NS" | "TBD" | "TIME_TO_BE_DEFINED" => {
                MatchStatus::Scheduled
            }
            "LIVE" | "IN_PLAY" | "PAUSED" | "HT" | "1H" | "2H" | "ET" | "BREAK" => MatchStatus::Live,
            "FINISHED" | "MATCH_FINISHED" | "FT" | "AET" | "PEN" | "AWARDED" => MatchStatus::Finished,
            "POSTPONED" | "MATCH_POSTPONED" | "SUSPENDED" | "INTERRUPTED" => MatchStatus::Postponed,
            "CANCELLED" | "CANCELED" | "MATCH_CANCELLED" | "ABANDONED" => MatchStatus::Cancelled,
            _ => return None,
        };
        Some(status)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatchStatus::from_vendor(s).ok_or_else(|| format!("unknown match status '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    Home,
    Away,
    Draw,
}

impl Winner {
    /// Only finished matches with both scores have a winner.
    pub fn derive(status: MatchStatus, home_score: Option<i64>, away_score: Option<i64>) -> Option<Self> {
        if status != MatchStatus::Finished {
            return None;
        }
        let (h, a) = (home_score?, away_score?);
        Some(match h.cmp(&a) {
            std::cmp::Ordering::Greater => Winner::Home,
            std::cmp::Ordering::Less => Winner::Away,
            std::cmp::Ordering::Equal => Winner::Draw,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::Home => "HOME",
            Winner::Away => "AWAY",
            Winner::Draw => "DRAW",
        }
    }
}

impl FromStr for Winner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOME" => Ok(Winner::Home),
            "AWAY" => Ok(Winner::Away),
            "DRAW" => Ok(Winner::Draw),
            other => Err(format!("unknown winner '{}'", other)),
        }
    }
}

// ── Source mappings ──────────────────────────────────────────────────────────

/// One (source_name, source-native id) pair attached to a league or team.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub id: String,
}

impl SourceRef {
    pub fn new(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self { source: source.into(), id: id.into() }
    }
}

/// Set of source mappings, stored as a JSON array column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceIds(BTreeSet<SourceRef>);

impl SourceIds {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    /// Idempotent union; returns true when the pair was new.
    pub fn attach(&mut self, source_ref: SourceRef) -> bool {
        self.0.insert(source_ref)
    }

    pub fn contains(&self, source: &str, id: &str) -> bool {
        self.0.iter().any(|r| r.source == source && r.id == id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Stored entities ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    pub id: String,
    pub name: String,
    pub sport: String,
    pub country: Option<String>,
    pub source_ids: SourceIds,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub sport: String,
    pub country: Option<String>,
    pub source_ids: SourceIds,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub league_id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub datetime_utc: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub winner: Option<Winner>,
    pub stage: Option<String>,
    pub matchday: Option<i64>,
    pub is_mock: bool,
    pub source_match_id: String,
    pub source_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Odds {
    pub id: String,
    pub match_id: String,
    pub bookmaker: String,
    pub market_type: String,
    pub home_odds: Option<f64>,
    pub draw_odds: Option<f64>,
    pub away_odds: Option<f64>,
    pub timestamp_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stat {
    pub id: String,
    pub match_id: String,
    pub team_id: Option<String>,
    pub player_id: Option<String>,
    pub stat_type: String,
    pub stat_value: String,
    pub period: Option<String>,
}

// ── Upsert inputs (foreign keys already resolved) ────────────────────────────

#[derive(Debug, Clone)]
pub struct NewLeague {
    pub name: String,
    pub sport: String,
    pub country: Option<String>,
    pub source_ref: Option<SourceRef>,
}

#[derive(Debug, Clone)]
pub struct NewTeam {
    pub name: String,
    pub sport: String,
    pub country: Option<String>,
    pub source_ref: Option<SourceRef>,
}

#[derive(Debug, Clone)]
pub struct NewMatch {
    pub league_id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub datetime_utc: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub stage: Option<String>,
    pub matchday: Option<i64>,
    pub is_mock: bool,
    pub source_match_id: String,
    pub source_name: String,
}

impl NewMatch {
    pub fn winner(&self) -> Option<Winner> {
        Winner::derive(self.status, self.home_score, self.away_score)
    }
}

#[derive(Debug, Clone)]
pub struct NewOdds {
    pub match_id: String,
    pub bookmaker: String,
    pub market_type: String,
    pub home_odds: Option<f64>,
    pub draw_odds: Option<f64>,
    pub away_odds: Option<f64>,
    pub timestamp_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewStat {
    pub match_id: String,
    pub team_id: Option<String>,
    pub player_id: Option<String>,
    pub stat_type: String,
    pub stat_value: String,
    pub period: Option<String>,
}

/// Result of a single merge: which row the natural key landed on and whether
/// it was created by this call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(String),
    Updated(String),
}

impl UpsertOutcome {
    pub fn id(&self) -> &str {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => id,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted(_))
    }
}

// ── Downstream read model ────────────────────────────────────────────────────

/// One row per match joined with resolved league/team names; what analysis
/// code consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchView {
    pub match_id: String,
    pub datetime_utc: DateTime<Utc>,
    pub league_name: String,
    pub sport: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub status: MatchStatus,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub winner: Option<Winner>,
    pub stage: Option<String>,
    pub matchday: Option<i64>,
    pub is_mock: bool,
    pub source_name: String,
}
