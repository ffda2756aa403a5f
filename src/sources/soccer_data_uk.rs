use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use super::{compact, fields, ChunkId, RawRecord, RecordKind, Selector, SourceAdapter, SOCCER_DATA_CO_UK};
use crate::config::SoccerDataConfig;
use crate::error::{FetchError, SourceError};
use crate::fetch::{FetchRequest, RateLimitedFetcher};
use crate::utils::{parse_match_datetime, season_overlaps_since, season_start_year};

/// Division code -> (league name, country).
const DIVISIONS: [(&str, &str, &str); 8] = [
    ("E0", "Premier League", "England"),
    ("E1", "Championship", "England"),
    ("SP1", "La Liga", "Spain"),
    ("D1", "Bundesliga", "Germany"),
    ("I1", "Serie A", "Italy"),
    ("F1", "Ligue 1", "France"),
    ("SC0", "Scottish Premiership", "Scotland"),
    ("N1", "Eredivisie", "Netherlands"),
];

/// Column prefix -> bookmaker. Each prefix carries H/D/A columns.
const BOOKMAKERS: [(&str, &str); 10] = [
    ("B365", "Bet365"),
    ("BW", "BetWin"),
    ("IW", "Interwetten"),
    ("PS", "Pinnacle"),
    ("WH", "WilliamHill"),
    ("VC", "VCBet"),
    ("Max", "Market Max"),
    ("Avg", "Market Average"),
    ("BbMx", "BetBrain Max"),
    ("BbAv", "BetBrain Average"),
];

/// (home column, away column, stat type)
const STATS: [(&str, &str, &str); 4] = [
    ("HS", "AS", "shots_total"),
    ("HST", "AST", "shots_on_target"),
    ("HC", "AC", "corners"),
    ("HY", "AY", "yellow_cards"),
];

const MARKET_1X2: &str = "1X2";

fn division_info(code: &str) -> (String, Option<&'static str>) {
    DIVISIONS
        .iter()
        .find(|(c, _, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name, country)| (name.to_string(), Some(*country)))
        .unwrap_or_else(|| (code.to_string(), None))
}

/// football-data.co.uk season CSVs, one chunk per season × division
/// (`2324/E0`). Reads a local copy when `data_dir` is set, downloads otherwise.
pub struct SoccerDataUkAdapter {
    config: SoccerDataConfig,
    fetcher: RateLimitedFetcher,
}

impl SoccerDataUkAdapter {
    pub fn new(config: SoccerDataConfig, fetcher: RateLimitedFetcher) -> Self {
        Self { config, fetcher }
    }

    fn local_path(&self, season: &str, division: &str) -> Option<PathBuf> {
        self.config
            .data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}_{}.csv", division, season)))
    }

    async fn load(&self, chunk: &ChunkId, season: &str, division: &str) -> Result<Option<Vec<u8>>, SourceError> {
        if let Some(path) = self.local_path(season, division) {
            return match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SourceError::PartialUnavailable {
                    chunk: chunk.to_string(),
                    reason: format!("{} not found", path.display()),
                }),
                Err(source) => Err(SourceError::Io { path, source }),
            };
        }

        let url = format!("{}/{}/{}.csv", self.config.base_url.trim_end_matches('/'), season, division);
        match self.fetcher.fetch(&FetchRequest::get(url)).await {
            Ok(response) => Ok(Some(response.body)),
            Err(FetchError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse one season file. Rows without teams (the trailing `,,,,` lines the
/// vendor leaves in some files) are dropped.
fn parse_csv(chunk: &ChunkId, division: &str, bytes: &[u8]) -> Result<Vec<RawRecord>, SourceError> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let parse_error = |e: csv::Error| SourceError::Parse { chunk: chunk.to_string(), reason: e.to_string() };

    let headers = reader.headers().map_err(parse_error)?.clone();
    let (league_name, country) = division_info(division);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(parse_error)?;
        let columns: HashMap<&str, &str> = headers
            .iter()
            .zip(row.iter())
            .filter(|(_, value)| !value.is_empty())
            .collect();
        let (Some(home), Some(away)) = (columns.get("HomeTeam"), columns.get("AwayTeam")) else {
            continue;
        };
        records.extend(row_records(division, &league_name, country, home, away, &columns));
    }
    Ok(records)
}

fn row_records(
    division: &str,
    league_name: &str,
    country: Option<&str>,
    home: &str,
    away: &str,
    columns: &HashMap<&str, &str>,
) -> Vec<RawRecord> {
    let raw_date = columns.get("Date").copied().unwrap_or_default();
    let kick_off = parse_match_datetime(raw_date, columns.get("Time").copied());
    let day = kick_off.map_or_else(|| compact(raw_date), |at| at.format("%Y%m%d").to_string());
    let source_match_id = format!("{}_{}_{}_{}", division, day, compact(home), compact(away));

    let home_score = columns.get("FTHG").copied();
    let away_score = columns.get("FTAG").copied();
    let status = if home_score.is_some() && away_score.is_some() { "FINISHED" } else { "SCHEDULED" };

    let mut records = Vec::new();
    let mut fixture = RawRecord::new(RecordKind::Match)
        .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
        .with(fields::LEAGUE_NAME, league_name)
        .with(fields::SPORT, "football")
        .with(fields::COUNTRY, country)
        .with(fields::HOME_TEAM, home)
        .with(fields::AWAY_TEAM, away)
        .with(fields::STATUS, status)
        .with(fields::HOME_SCORE, home_score)
        .with(fields::AWAY_SCORE, away_score);
    // Unparseable dates are passed through so the record is reported as malformed.
    match kick_off {
        Some(at) => fixture.set(fields::DATETIME_UTC, at.to_rfc3339()),
        None => fixture.set(fields::DATETIME_UTC, raw_date),
    }
    records.push(fixture);

    for (prefix, bookmaker) in BOOKMAKERS {
        let price = |side: &str| columns.get(format!("{}{}", prefix, side).as_str()).copied();
        let (Some(home_odds), Some(away_odds)) = (price("H"), price("A")) else {
            continue;
        };
        records.push(
            RawRecord::new(RecordKind::Odds)
                .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
                .with(fields::BOOKMAKER, bookmaker)
                .with(fields::MARKET_TYPE, MARKET_1X2)
                .with(fields::HOME_ODDS, home_odds)
                .with(fields::DRAW_ODDS, price("D"))
                .with(fields::AWAY_ODDS, away_odds)
                .with(fields::ODDS_TIMESTAMP, kick_off.map(|at| at.to_rfc3339())),
        );
    }

    for (home_column, away_column, stat_type) in STATS {
        for (column, side) in [(home_column, "home"), (away_column, "away")] {
            if let Some(value) = columns.get(column) {
                records.push(
                    RawRecord::new(RecordKind::Stat)
                        .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
                        .with(fields::TEAM_SIDE, side)
                        .with(fields::STAT_TYPE, stat_type)
                        .with(fields::STAT_VALUE, *value),
                );
            }
        }
    }
    records
}

#[async_trait]
impl SourceAdapter for SoccerDataUkAdapter {
    fn name(&self) -> &str {
        SOCCER_DATA_CO_UK
    }

    fn chunks(&self, selector: &Selector) -> Vec<ChunkId> {
        let mut chunks = Vec::new();
        for season in &self.config.seasons {
            let admitted = match (selector.since, season_start_year(season)) {
                (Some(since), Some(start)) => season_overlaps_since(start, since),
                _ => true,
            };
            if !admitted {
                continue;
            }
            for division in &self.config.divisions {
                chunks.push(ChunkId::new(format!("{}/{}", season, division)));
            }
        }
        chunks
    }

    async fn fetch_chunk(&self, chunk: &ChunkId, _selector: &Selector) -> Result<Vec<RawRecord>, SourceError> {
        let (season, division) = chunk.split();
        let Some(bytes) = self.load(chunk, season, division).await? else {
            tracing::info!("{}: no file for {}", SOCCER_DATA_CO_UK, chunk);
            return Ok(Vec::new());
        };
        let records = parse_csv(chunk, division, &bytes)?;
        tracing::debug!("{}: {} records from {}", SOCCER_DATA_CO_UK, records.len(), chunk);
        Ok(records)
    }
}
