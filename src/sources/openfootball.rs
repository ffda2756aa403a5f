use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use super::{compact, fields, ChunkId, RawRecord, RecordKind, Selector, SourceAdapter, OPENFOOTBALL};
use crate::config::OpenFootballConfig;
use crate::error::SourceError;
use crate::utils::{parse_match_datetime, season_overlaps_since, season_start_year};

/// League code prefix -> country.
const COUNTRIES: [(&str, &str); 9] = [
    ("en", "England"),
    ("es", "Spain"),
    ("de", "Germany"),
    ("it", "Italy"),
    ("fr", "France"),
    ("at", "Austria"),
    ("nl", "Netherlands"),
    ("pt", "Portugal"),
    ("sco", "Scotland"),
];

#[derive(Debug, Deserialize)]
struct LeagueFile {
    name: Option<String>,
    #[serde(default)]
    matches: Vec<FileMatch>,
    /// Older layout: matches nested per round.
    #[serde(default)]
    rounds: Vec<FileRound>,
}

#[derive(Debug, Deserialize)]
struct FileRound {
    name: Option<String>,
    #[serde(default)]
    matches: Vec<FileMatch>,
}

#[derive(Debug, Deserialize)]
struct FileMatch {
    round: Option<String>,
    group: Option<String>,
    date: Option<String>,
    time: Option<String>,
    team1: TeamName,
    team2: TeamName,
    score: Option<FileScore>,
    score1: Option<i64>,
    score2: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TeamName {
    Plain(String),
    Named { name: String },
}

impl TeamName {
    fn as_str(&self) -> &str {
        match self {
            TeamName::Plain(name) | TeamName::Named { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileScore {
    ft: Option<Vec<i64>>,
}

impl FileMatch {
    fn full_time(&self) -> Option<(i64, i64)> {
        if let Some([home, away]) = self.score.as_ref().and_then(|s| s.ft.as_deref()) {
            return Some((*home, *away));
        }
        Some((self.score1?, self.score2?))
    }
}

fn country_for(code: &str) -> Option<&'static str> {
    let prefix = code.split('.').next()?;
    COUNTRIES.iter().find(|(p, _)| *p == prefix).map(|(_, country)| *country)
}

/// "English Premier League 2023/24" -> "English Premier League".
fn strip_season(name: &str) -> &str {
    let name = name.trim();
    match name.rsplit_once(' ') {
        Some((head, tail)) if is_season_label(tail) => head.trim_end(),
        _ => name,
    }
}

/// "2023", "2023/24" or "2023-24".
fn is_season_label(token: &str) -> bool {
    let bytes = token.as_bytes();
    let year = |b: &[u8]| b.len() == 4 && b.iter().all(u8::is_ascii_digit);
    match bytes.len() {
        4 => year(bytes),
        7 => year(&bytes[..4]) && matches!(bytes[4], b'/' | b'-') && bytes[5..].iter().all(u8::is_ascii_digit),
        _ => false,
    }
}

fn round_number(round: &str) -> Option<i64> {
    let digits: String = round
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Local checkout of the openfootball football.json repository, laid out as
/// `<repo>/<season>/<league>.json`. One chunk per season × league file.
pub struct OpenFootballAdapter {
    config: OpenFootballConfig,
}

impl OpenFootballAdapter {
    pub fn new(config: OpenFootballConfig) -> Self {
        Self { config }
    }

    fn path(&self, season: &str, code: &str) -> PathBuf {
        self.config.repo_dir.join(season).join(format!("{}.json", code))
    }
}

fn file_records(code: &str, file: LeagueFile) -> Vec<RawRecord> {
    let league_name = file.name.as_deref().map(strip_season).unwrap_or(code).to_string();
    let country = country_for(code);

    let nested = file
        .rounds
        .into_iter()
        .flat_map(|round| {
            let name = round.name;
            round.matches.into_iter().map(move |mut m| {
                if m.round.is_none() {
                    m.round = name.clone();
                }
                m
            })
        });

    let mut records = Vec::new();
    for m in file.matches.into_iter().chain(nested) {
        let (home, away) = (m.team1.as_str(), m.team2.as_str());
        let raw_date = m.date.as_deref().unwrap_or_default();
        // Kick-off times are local; the first token is taken as UTC.
        let time = m.time.as_deref().and_then(|t| t.split_whitespace().next());
        let kick_off = parse_match_datetime(raw_date, time);
        let day = kick_off.map_or_else(|| compact(raw_date), |at| at.format("%Y%m%d").to_string());

        let mut record = RawRecord::new(RecordKind::Match)
            .with(fields::SOURCE_MATCH_ID, format!("{}_{}_{}_{}", code, day, compact(home), compact(away)))
            .with(fields::LEAGUE_NAME, league_name.as_str())
            .with(fields::SPORT, "football")
            .with(fields::COUNTRY, country)
            .with(fields::HOME_TEAM, home)
            .with(fields::AWAY_TEAM, away)
            .with(fields::STAGE, m.round.clone().or_else(|| m.group.clone()))
            .with(fields::MATCHDAY, m.round.as_deref().and_then(round_number));

        match m.full_time() {
            Some((h, a)) => {
                record.set(fields::STATUS, "FINISHED");
                record.set(fields::HOME_SCORE, h);
                record.set(fields::AWAY_SCORE, a);
            }
            None => record.set(fields::STATUS, "SCHEDULED"),
        }
        match kick_off {
            Some(at) => record.set(fields::DATETIME_UTC, at.to_rfc3339()),
            None => record.set(fields::DATETIME_UTC, raw_date),
        }
        records.push(record);
    }
    records
}

#[async_trait]
impl SourceAdapter for OpenFootballAdapter {
    fn name(&self) -> &str {
        OPENFOOTBALL
    }

    fn chunks(&self, selector: &Selector) -> Vec<ChunkId> {
        self.config
            .seasons
            .iter()
            .filter(|season| match (selector.since, season_start_year(season)) {
                (Some(since), Some(start)) => season_overlaps_since(start, since),
                _ => true,
            })
            .flat_map(|season| {
                self.config
                    .leagues
                    .iter()
                    .map(move |code| ChunkId::new(format!("{}/{}", season, code)))
            })
            .collect()
    }

    async fn fetch_chunk(&self, chunk: &ChunkId, _selector: &Selector) -> Result<Vec<RawRecord>, SourceError> {
        let (season, code) = chunk.split();
        let path = self.path(season, code);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::PartialUnavailable {
                    chunk: chunk.to_string(),
                    reason: format!("{} not found", path.display()),
                })
            }
            Err(source) => return Err(SourceError::Io { path, source }),
        };

        let file: LeagueFile = serde_json::from_slice(&bytes).map_err(|e| SourceError::Parse {
            chunk: chunk.to_string(),
            reason: e.to_string(),
        })?;
        let records = file_records(code, file);
        tracing::debug!("{}: {} matches in {}", OPENFOOTBALL, records.len(), path.display());
        Ok(records)
    }
}
