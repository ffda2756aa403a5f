use async_trait::async_trait;
use chrono::{Days, Utc};
use serde::Deserialize;

use super::{fields, ChunkId, RawRecord, RecordKind, Selector, SourceAdapter, FOOTBALL_DATA_ORG};
use crate::config::FootballDataConfig;
use crate::error::{FetchError, SourceError};
use crate::fetch::{FetchRequest, RateLimitedFetcher};
use crate::utils::season_overlaps_since;

const CURRENT_SEASON: &str = "current";
const ODDS_BOOKMAKER: &str = "football-data.org";

// ── football-data.org structures ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MatchesResponse {
    competition: Option<Competition>,
    #[serde(default)]
    matches: Vec<FootballMatch>,
}

#[derive(Debug, Deserialize)]
struct Competition {
    id: Option<u32>,
    name: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FootballMatch {
    id: u64,
    utc_date: Option<String>,
    status: Option<String>,
    stage: Option<String>,
    matchday: Option<i64>,
    area: Option<Area>,
    home_team: MatchTeam,
    away_team: MatchTeam,
    score: Option<MatchScore>,
    odds: Option<MatchOdds>,
}

#[derive(Debug, Deserialize)]
struct Area {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatchTeam {
    id: Option<u64>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchScore {
    full_time: Option<Score>,
}

#[derive(Debug, Deserialize)]
struct Score {
    home: Option<i64>,
    away: Option<i64>,
}

/// Only filled in on plans with the odds package; otherwise carries `msg`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchOdds {
    home_win: Option<f64>,
    draw: Option<f64>,
    away_win: Option<f64>,
}

/// football-data.org v4: one chunk per competition × season. Seasons are
/// start years ("2023" is 2023/24).
pub struct FootballDataAdapter {
    config: FootballDataConfig,
    fetcher: RateLimitedFetcher,
}

impl FootballDataAdapter {
    pub fn new(config: FootballDataConfig, fetcher: RateLimitedFetcher) -> Self {
        Self { config, fetcher }
    }

    fn api_key(&self) -> Result<&str, FetchError> {
        self.config.api_key.as_deref().ok_or_else(|| FetchError::MissingCredential {
            source_name: FOOTBALL_DATA_ORG.to_string(),
            variable: "FOOTBALL_DATA_API_KEY".to_string(),
        })
    }

    fn request(&self, api_key: &str, competition: &str, season: &str, selector: &Selector) -> FetchRequest {
        let url = format!(
            "{}/competitions/{}/matches",
            self.config.base_url.trim_end_matches('/'),
            competition
        );
        let mut request = FetchRequest::get(url).header("X-Auth-Token", api_key);
        if season != CURRENT_SEASON {
            request = request.query("season", season);
        }
        if let Some(since) = selector.since {
            // The API wants both ends of the window.
            let horizon = Utc::now()
                .date_naive()
                .max(since)
                .checked_add_days(Days::new(365))
                .unwrap_or(since);
            request = request
                .query("dateFrom", since.format("%Y-%m-%d"))
                .query("dateTo", horizon.format("%Y-%m-%d"));
        }
        request
    }
}

#[async_trait]
impl SourceAdapter for FootballDataAdapter {
    fn name(&self) -> &str {
        FOOTBALL_DATA_ORG
    }

    fn supports_since(&self) -> bool {
        true
    }

    fn chunks(&self, selector: &Selector) -> Vec<ChunkId> {
        let seasons: Vec<&str> = if self.config.seasons.is_empty() {
            vec![CURRENT_SEASON]
        } else {
            self.config
                .seasons
                .iter()
                .map(String::as_str)
                .filter(|season| match (selector.since, season.parse::<i32>().ok()) {
                    (Some(since), Some(year)) => season_overlaps_since(year, since),
                    _ => true,
                })
                .collect()
        };

        self.config
            .competitions
            .iter()
            .flat_map(|competition| {
                seasons
                    .iter()
                    .map(move |season| ChunkId::new(format!("{}/{}", competition, season)))
            })
            .collect()
    }

    async fn fetch_chunk(&self, chunk: &ChunkId, selector: &Selector) -> Result<Vec<RawRecord>, SourceError> {
        let api_key = self.api_key()?;
        let (competition, season) = chunk.split();
        let request = self.request(api_key, competition, season, selector);

        let response: MatchesResponse = match self.fetcher.fetch_json(&request).await {
            Ok(response) => response,
            Err(FetchError::NotFound { .. }) => {
                tracing::info!("{}: no data for {}", FOOTBALL_DATA_ORG, chunk);
                return Ok(Vec::new());
            }
            Err(FetchError::Decode { reason, .. }) => {
                return Err(SourceError::Parse { chunk: chunk.to_string(), reason });
            }
            Err(e) => return Err(e.into()),
        };

        let league_name = response
            .competition
            .as_ref()
            .and_then(|c| c.name.clone());
        let league_source_id = response
            .competition
            .as_ref()
            .and_then(|c| c.code.clone().or_else(|| c.id.map(|id| id.to_string())))
            .unwrap_or_else(|| competition.to_string());

        let mut records = Vec::with_capacity(response.matches.len() * 2);
        for m in response.matches {
            let source_match_id = m.id.to_string();
            let full_time = m.score.as_ref().and_then(|s| s.full_time.as_ref());

            records.push(
                RawRecord::new(RecordKind::Match)
                    .with(fields::LEAGUE_NAME, league_name.clone())
                    .with(fields::LEAGUE_SOURCE_ID, league_source_id.as_str())
                    .with(fields::SPORT, "football")
                    .with(fields::COUNTRY, m.area.and_then(|a| a.name))
                    .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
                    .with(fields::DATETIME_UTC, m.utc_date)
                    .with(fields::STATUS, m.status)
                    .with(fields::STAGE, m.stage)
                    .with(fields::MATCHDAY, m.matchday)
                    .with(fields::HOME_TEAM, m.home_team.name)
                    .with(fields::HOME_TEAM_SOURCE_ID, m.home_team.id.map(|id| id.to_string()))
                    .with(fields::AWAY_TEAM, m.away_team.name)
                    .with(fields::AWAY_TEAM_SOURCE_ID, m.away_team.id.map(|id| id.to_string()))
                    .with(fields::HOME_SCORE, full_time.and_then(|s| s.home))
                    .with(fields::AWAY_SCORE, full_time.and_then(|s| s.away)),
            );

            if let Some(odds) = m.odds {
                if odds.home_win.is_some() && odds.away_win.is_some() {
                    records.push(
                        RawRecord::new(RecordKind::Odds)
                            .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
                            .with(fields::BOOKMAKER, ODDS_BOOKMAKER)
                            .with(fields::MARKET_TYPE, "1X2")
                            .with(fields::HOME_ODDS, odds.home_win)
                            .with(fields::DRAW_ODDS, odds.draw)
                            .with(fields::AWAY_ODDS, odds.away_win),
                    );
                }
            }
        }

        tracing::debug!("{}: {} records from {}", FOOTBALL_DATA_ORG, records.len(), chunk);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{body, fetcher, status, ScriptedTransport};
    use chrono::NaiveDate;

    const PAYLOAD: &str = r#"{
        "competition": {"id": 2021, "name": "Premier League", "code": "PL"},
        "matches": [
            {
                "id": 435943,
                "utcDate": "2023-08-11T19:00:00Z",
                "status": "FINISHED",
                "stage": "REGULAR_SEASON",
                "matchday": 1,
                "area": {"name": "England"},
                "homeTeam": {"id": 328, "name": "Burnley FC"},
                "awayTeam": {"id": 65, "name": "Manchester City FC"},
                "score": {"winner": "AWAY_TEAM", "fullTime": {"home": 0, "away": 3}},
                "odds": {"homeWin": 8.5, "draw": 5.2, "awayWin": 1.3}
            },
            {
                "id": 435944,
                "utcDate": "2023-08-12T12:00:00Z",
                "status": "TIMED",
                "matchday": 1,
                "homeTeam": {"id": 57, "name": "Arsenal FC"},
                "awayTeam": {"id": 351, "name": "Nottingham Forest FC"},
                "score": {"fullTime": {"home": null, "away": null}},
                "odds": {"msg": "Activate Odds-Package in User-Panel to retrieve odds."}
            }
        ]
    }"#;

    fn config(api_key: Option<&str>, seasons: &[&str]) -> FootballDataConfig {
        FootballDataConfig {
            api_key: api_key.map(str::to_string),
            base_url: "http://fd.test/v4".into(),
            competitions: vec!["PL".into(), "BL1".into()],
            seasons: seasons.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_chunks_cover_competitions_and_recent_seasons() {
        let transport = ScriptedTransport::new(vec![]);
        let adapter = FootballDataAdapter::new(config(Some("k"), &["2021", "2023"]), fetcher(FOOTBALL_DATA_ORG, transport, 1));

        let all: Vec<String> = adapter.chunks(&Selector::full()).iter().map(|c| c.to_string()).collect();
        assert_eq!(all, vec!["PL/2021", "PL/2023", "BL1/2021", "BL1/2023"]);

        let since = Selector::since(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let recent: Vec<String> = adapter.chunks(&since).iter().map(|c| c.to_string()).collect();
        assert_eq!(recent, vec!["PL/2023", "BL1/2023"]);
    }

    #[tokio::test]
    async fn test_parses_matches_and_odds() {
        let transport = ScriptedTransport::new(vec![body(PAYLOAD)]);
        let adapter = FootballDataAdapter::new(config(Some("k"), &["2023"]), fetcher(FOOTBALL_DATA_ORG, transport.clone(), 1));

        let records = adapter.fetch_chunk(&ChunkId::new("PL/2023"), &Selector::full()).await.unwrap();
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.kind, RecordKind::Match);
        assert_eq!(first.text(fields::LEAGUE_NAME).as_deref(), Some("Premier League"));
        assert_eq!(first.text(fields::LEAGUE_SOURCE_ID).as_deref(), Some("PL"));
        assert_eq!(first.text(fields::HOME_TEAM_SOURCE_ID).as_deref(), Some("328"));
        assert_eq!(first.int(fields::AWAY_SCORE), Some(3));
        assert_eq!(records[1].kind, RecordKind::Odds);
        assert_eq!(records[1].float(fields::HOME_ODDS), Some(8.5));
        assert_eq!(records[2].int(fields::HOME_SCORE), None);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].url, "http://fd.test/v4/competitions/PL/matches");
        assert!(seen[0].headers.contains(&("X-Auth-Token".to_string(), "k".to_string())));
        assert!(seen[0].query.contains(&("season".to_string(), "2023".to_string())));
    }

    #[tokio::test]
    async fn test_incremental_passes_date_window() {
        let transport = ScriptedTransport::new(vec![body(r#"{"matches": []}"#)]);
        let adapter = FootballDataAdapter::new(config(Some("k"), &[]), fetcher(FOOTBALL_DATA_ORG, transport.clone(), 1));
        let selector = Selector::since(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let records = adapter.fetch_chunk(&ChunkId::new("PL/current"), &selector).await.unwrap();
        assert!(records.is_empty());

        let seen = transport.seen.lock().unwrap();
        assert!(seen[0].query.contains(&("dateFrom".to_string(), "2024-03-01".to_string())));
        assert!(seen[0].query.iter().any(|(k, _)| k == "dateTo"));
        assert!(!seen[0].query.iter().any(|(k, _)| k == "season"));
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let transport = ScriptedTransport::new(vec![]);
        let adapter = FootballDataAdapter::new(config(None, &[]), fetcher(FOOTBALL_DATA_ORG, transport.clone(), 1));

        let err = adapter.fetch_chunk(&ChunkId::new("PL/current"), &Selector::full()).await.unwrap_err();
        assert!(err.aborts_source());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_season_is_an_empty_chunk() {
        let transport = ScriptedTransport::new(vec![status(404)]);
        let adapter = FootballDataAdapter::new(config(Some("k"), &["1990"]), fetcher(FOOTBALL_DATA_ORG, transport, 1));

        let records = adapter.fetch_chunk(&ChunkId::new("PL/1990"), &Selector::full()).await.unwrap();
        assert!(records.is_empty());
    }
}
