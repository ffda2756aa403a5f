use async_trait::async_trait;
use serde::Deserialize;

use super::{compact, fields, ChunkId, RawRecord, RecordKind, Selector, SourceAdapter, FIVETHIRTYEIGHT};
use crate::config::FiveThirtyEightConfig;
use crate::error::SourceError;
use crate::utils::parse_match_datetime;

pub const SPI_BOOKMAKER: &str = "FiveThirtyEight_SPI";
pub const SPI_MARKET: &str = "1X2_probabilities";

/// One row of `soccer-spi/spi_matches.csv`. Scores are blank for fixtures
/// not yet played.
#[derive(Debug, Deserialize)]
struct SpiRow {
    date: Option<String>,
    league_id: Option<String>,
    league: Option<String>,
    team1: Option<String>,
    team2: Option<String>,
    spi1: Option<String>,
    spi2: Option<String>,
    prob1: Option<String>,
    prob2: Option<String>,
    probtie: Option<String>,
    importance1: Option<String>,
    importance2: Option<String>,
    score1: Option<String>,
    score2: Option<String>,
}

/// Files from a checkout of the FiveThirtyEight data repository. Each
/// configured file is one chunk; win/draw/loss probabilities are stored as
/// odds and SPI ratings as per-team stats.
pub struct FiveThirtyEightAdapter {
    config: FiveThirtyEightConfig,
}

impl FiveThirtyEightAdapter {
    pub fn new(config: FiveThirtyEightConfig) -> Self {
        Self { config }
    }
}

fn number(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse().ok())
}

fn row_records(row: &SpiRow) -> Vec<RawRecord> {
    let raw_date = row.date.as_deref().unwrap_or_default();
    let home = row.team1.as_deref().unwrap_or_default();
    let away = row.team2.as_deref().unwrap_or_default();
    let league_id = row.league_id.as_deref().map(str::trim).filter(|id| !id.is_empty());
    let kick_off = parse_match_datetime(raw_date, None);
    let day = kick_off.map_or_else(|| compact(raw_date), |at| at.format("%Y%m%d").to_string());
    let source_match_id = format!("{}_{}_{}_{}", day, compact(home), compact(away), league_id.unwrap_or("NOLID"));

    // Scores arrive as "2.0" once pandas has seen a blank in the column.
    let home_score = number(row.score1.as_deref()).map(|s| s as i64);
    let away_score = number(row.score2.as_deref()).map(|s| s as i64);
    let status = if home_score.is_some() && away_score.is_some() { "FINISHED" } else { "SCHEDULED" };

    let mut fixture = RawRecord::new(RecordKind::Match)
        .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
        .with(fields::LEAGUE_NAME, row.league.as_deref())
        .with(fields::LEAGUE_SOURCE_ID, league_id)
        .with(fields::SPORT, "football")
        .with(fields::HOME_TEAM, home)
        .with(fields::AWAY_TEAM, away)
        .with(fields::STATUS, status)
        .with(fields::HOME_SCORE, home_score)
        .with(fields::AWAY_SCORE, away_score);
    match kick_off {
        Some(at) => fixture.set(fields::DATETIME_UTC, at.to_rfc3339()),
        None => fixture.set(fields::DATETIME_UTC, raw_date),
    }
    let mut records = vec![fixture];

    let probabilities = (
        number(row.prob1.as_deref()),
        number(row.probtie.as_deref()),
        number(row.prob2.as_deref()),
    );
    if let (Some(home_win), Some(draw), Some(away_win)) = probabilities {
        records.push(
            RawRecord::new(RecordKind::Odds)
                .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
                .with(fields::BOOKMAKER, SPI_BOOKMAKER)
                .with(fields::MARKET_TYPE, SPI_MARKET)
                .with(fields::HOME_ODDS, home_win)
                .with(fields::DRAW_ODDS, draw)
                .with(fields::AWAY_ODDS, away_win)
                .with(fields::ODDS_TIMESTAMP, kick_off.map(|at| at.to_rfc3339())),
        );
    }

    let team_stats = [
        ("spi_rating", "home", &row.spi1),
        ("spi_rating", "away", &row.spi2),
        ("match_importance", "home", &row.importance1),
        ("match_importance", "away", &row.importance2),
    ];
    for (stat_type, side, value) in team_stats {
        if let Some(value) = number(value.as_deref()) {
            records.push(
                RawRecord::new(RecordKind::Stat)
                    .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
                    .with(fields::TEAM_SIDE, side)
                    .with(fields::STAT_TYPE, stat_type)
                    .with(fields::STAT_VALUE, value),
            );
        }
    }
    records
}

#[async_trait]
impl SourceAdapter for FiveThirtyEightAdapter {
    fn name(&self) -> &str {
        FIVETHIRTYEIGHT
    }

    fn chunks(&self, _selector: &Selector) -> Vec<ChunkId> {
        self.config.files.iter().map(ChunkId::new).collect()
    }

    async fn fetch_chunk(&self, chunk: &ChunkId, _selector: &Selector) -> Result<Vec<RawRecord>, SourceError> {
        let path = self.config.repo_dir.join(chunk.as_str());
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::PartialUnavailable {
                    chunk: chunk.to_string(),
                    reason: format!("{} not found; clone github.com/fivethirtyeight/data there", path.display()),
                })
            }
            Err(source) => return Err(SourceError::Io { path, source }),
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes.as_slice());

        let mut records = Vec::new();
        for row in reader.deserialize::<SpiRow>() {
            let row = row.map_err(|e| SourceError::Parse { chunk: chunk.to_string(), reason: e.to_string() })?;
            records.extend(row_records(&row));
        }
        tracing::debug!("{}: {} records from {}", FIVETHIRTYEIGHT, records.len(), path.display());
        Ok(records)
    }
}
