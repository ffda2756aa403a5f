use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{fields, ChunkId, RawRecord, RecordKind, Selector, SourceAdapter, MOCK_FEED};
use crate::error::SourceError;

const LEAGUE_NAME: &str = "Mock Premier League";
const LEAGUE_SOURCE_ID: &str = "mpl";
const COUNTRY: &str = "Mockland";
const SPORT: &str = "football";
const BOOKMAKER: &str = "MockBook";

// (source id, name)
const TEAMS: [(&str, &str); 6] = [
    ("m1", "Mock Athletic"),
    ("m2", "Mock City"),
    ("m3", "Mock Rovers"),
    ("m4", "Mock United"),
    ("m5", "Mock Wanderers"),
    ("m6", "Mock Town"),
];

// (round, home, away, score) with indexes into TEAMS; `None` is still to play.
#[allow(clippy::type_complexity)]
const FIXTURES: [(u32, usize, usize, Option<(i64, i64)>); 15] = [
    (1, 0, 1, Some((2, 1))),
    (1, 2, 3, Some((0, 0))),
    (1, 4, 5, Some((1, 3))),
    (2, 1, 2, Some((2, 2))),
    (2, 3, 4, Some((1, 0))),
    (2, 5, 0, Some((0, 2))),
    (3, 0, 3, Some((3, 1))),
    (3, 1, 5, Some((1, 1))),
    (3, 2, 4, Some((2, 0))),
    (4, 4, 0, None),
    (4, 3, 1, None),
    (4, 5, 2, None),
    (5, 0, 2, None),
    (5, 1, 4, None),
    (5, 3, 5, None),
];

const ROUNDS: u32 = 5;

fn kick_off(round: u32) -> DateTime<Utc> {
    let anchor = Utc.with_ymd_and_hms(2024, 8, 10, 15, 0, 0).single().unwrap_or_default();
    anchor + Duration::weeks(i64::from(round) - 1)
}

/// Deterministic 1X2 prices from team strength (lower index is stronger).
fn prices(home: usize, away: usize) -> (f64, f64, f64) {
    let edge = away as f64 - home as f64;
    let home_price = (2.6 - 0.2 * edge).max(1.2);
    let away_price = (2.6 + 0.2 * edge).max(1.2);
    (home_price, 3.3, away_price)
}

/// Offline feed with a small fixed league, used for demos and pipeline
/// tests. Every record is flagged `is_mock`.
#[derive(Debug, Default)]
pub struct MockFeedAdapter;

impl MockFeedAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn league_and_teams() -> Vec<RawRecord> {
    let mut records = vec![RawRecord::new(RecordKind::League)
        .with(fields::LEAGUE_NAME, LEAGUE_NAME)
        .with(fields::LEAGUE_SOURCE_ID, LEAGUE_SOURCE_ID)
        .with(fields::SPORT, SPORT)
        .with(fields::COUNTRY, COUNTRY)];
    for (source_id, name) in TEAMS {
        records.push(
            RawRecord::new(RecordKind::Team)
                .with(fields::TEAM_NAME, name)
                .with(fields::TEAM_SOURCE_ID, source_id)
                .with(fields::SPORT, SPORT)
                .with(fields::COUNTRY, COUNTRY),
        );
    }
    records
}

fn round_records(round: u32) -> Vec<RawRecord> {
    let at = kick_off(round);
    let mut records = Vec::new();

    for (n, (_, home, away, score)) in FIXTURES.iter().filter(|f| f.0 == round).enumerate() {
        let (home_id, home_name) = TEAMS[*home];
        let (away_id, away_name) = TEAMS[*away];
        let source_match_id = format!("mock_r{}_{}", round, n + 1);

        let mut fixture = RawRecord::new(RecordKind::Match)
            .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
            .with(fields::LEAGUE_NAME, LEAGUE_NAME)
            .with(fields::LEAGUE_SOURCE_ID, LEAGUE_SOURCE_ID)
            .with(fields::SPORT, SPORT)
            .with(fields::COUNTRY, COUNTRY)
            .with(fields::HOME_TEAM, home_name)
            .with(fields::HOME_TEAM_SOURCE_ID, home_id)
            .with(fields::AWAY_TEAM, away_name)
            .with(fields::AWAY_TEAM_SOURCE_ID, away_id)
            .with(fields::DATETIME_UTC, at.to_rfc3339())
            .with(fields::MATCHDAY, round)
            .with(fields::STAGE, "REGULAR_SEASON")
            .with(fields::IS_MOCK, true);
        match score {
            Some((h, a)) => {
                fixture.set(fields::STATUS, "FINISHED");
                fixture.set(fields::HOME_SCORE, *h);
                fixture.set(fields::AWAY_SCORE, *a);
            }
            None => fixture.set(fields::STATUS, "SCHEDULED"),
        }
        records.push(fixture);

        let (h, d, a) = prices(*home, *away);
        records.push(
            RawRecord::new(RecordKind::Odds)
                .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
                .with(fields::BOOKMAKER, BOOKMAKER)
                .with(fields::MARKET_TYPE, "1X2")
                .with(fields::HOME_ODDS, h)
                .with(fields::DRAW_ODDS, d)
                .with(fields::AWAY_ODDS, a)
                .with(fields::ODDS_TIMESTAMP, (at - Duration::days(1)).to_rfc3339()),
        );

        if score.is_some() {
            let home_possession = 50.0 + 2.0 * (*away as f64 - *home as f64);
            for (side, value) in [("home", home_possession), ("away", 100.0 - home_possession)] {
                records.push(
                    RawRecord::new(RecordKind::Stat)
                        .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
                        .with(fields::TEAM_SIDE, side)
                        .with(fields::STAT_TYPE, "possession")
                        .with(fields::STAT_VALUE, value)
                        .with(fields::PERIOD, "FT"),
                );
            }
        }
    }
    records
}

#[async_trait]
impl SourceAdapter for MockFeedAdapter {
    fn name(&self) -> &str {
        MOCK_FEED
    }

    fn chunks(&self, _selector: &Selector) -> Vec<ChunkId> {
        (1..=ROUNDS).map(|round| ChunkId::new(format!("round/{}", round))).collect()
    }

    async fn fetch_chunk(&self, chunk: &ChunkId, _selector: &Selector) -> Result<Vec<RawRecord>, SourceError> {
        let round: u32 = chunk.split().1.parse().map_err(|_| SourceError::Parse {
            chunk: chunk.to_string(),
            reason: "expected round/<n>".to_string(),
        })?;
        if !(1..=ROUNDS).contains(&round) {
            return Err(SourceError::PartialUnavailable {
                chunk: chunk.to_string(),
                reason: format!("no round {}", round),
            });
        }

        let mut records = if round == 1 { league_and_teams() } else { Vec::new() };
        records.extend(round_records(round));
        Ok(records)
    }
}
