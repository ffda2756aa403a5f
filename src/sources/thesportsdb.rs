use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{fields, ChunkId, RawRecord, RecordKind, Selector, SourceAdapter, THESPORTSDB};
use crate::config::TheSportsDbConfig;
use crate::error::{FetchError, SourceError};
use crate::fetch::{FetchRequest, RateLimitedFetcher};
use crate::utils::parse_match_datetime;

type Object = Map<String, Value>;

#[derive(Debug, Deserialize)]
struct LeaguesResponse {
    leagues: Option<Vec<Object>>,
}

/// `events` is `null` rather than `[]` when a league has nothing to show.
#[derive(Debug, Deserialize)]
struct EventsResponse {
    events: Option<Vec<Object>>,
}

/// Vendor event field -> canonical field, for the fields copied verbatim.
const EVENT_FIELDS: [(&str, &str); 10] = [
    ("idEvent", fields::SOURCE_MATCH_ID),
    ("strLeague", fields::LEAGUE_NAME),
    ("idLeague", fields::LEAGUE_SOURCE_ID),
    ("strHomeTeam", fields::HOME_TEAM),
    ("idHomeTeam", fields::HOME_TEAM_SOURCE_ID),
    ("strAwayTeam", fields::AWAY_TEAM),
    ("idAwayTeam", fields::AWAY_TEAM_SOURCE_ID),
    ("intHomeScore", fields::HOME_SCORE),
    ("intAwayScore", fields::AWAY_SCORE),
    ("strStatus", fields::STATUS),
];

/// TheSportsDB v1: one chunk per league id, covering the league itself and
/// its recent and upcoming events. The API has no date filter.
pub struct TheSportsDbAdapter {
    config: TheSportsDbConfig,
    fetcher: RateLimitedFetcher,
}

impl TheSportsDbAdapter {
    pub fn new(config: TheSportsDbConfig, fetcher: RateLimitedFetcher) -> Self {
        Self { config, fetcher }
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_key,
            endpoint
        )
    }

    /// A 404 on one listing means "nothing there", not a broken chunk.
    async fn get<T>(&self, chunk: &ChunkId, endpoint: &str, league_id: &str) -> Result<Option<T>, SourceError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = FetchRequest::get(self.url(endpoint)).query("id", league_id);
        match self.fetcher.fetch_json(&request).await {
            Ok(value) => Ok(Some(value)),
            Err(FetchError::NotFound { .. }) => Ok(None),
            Err(FetchError::Decode { reason, .. }) => Err(SourceError::Parse { chunk: chunk.to_string(), reason }),
            Err(e) => Err(e.into()),
        }
    }
}

fn league_record(league: &Object) -> RawRecord {
    let mut record = RawRecord::new(RecordKind::League);
    record.set(fields::LEAGUE_NAME, league.get("strLeague").cloned().unwrap_or(Value::Null));
    record.set(fields::LEAGUE_SOURCE_ID, league.get("idLeague").cloned().unwrap_or(Value::Null));
    record.set(fields::SPORT, league.get("strSport").cloned().unwrap_or(Value::Null));
    record.set(fields::COUNTRY, league.get("strCountry").cloned().unwrap_or(Value::Null));
    record
}

fn event_records(event: &Object, sport: Option<&str>, country: Option<&str>) -> Vec<RawRecord> {
    let mut record = RawRecord::new(RecordKind::Match);
    for (vendor, canonical) in EVENT_FIELDS {
        if let Some(value) = event.get(vendor) {
            record.set(canonical, value.clone());
        }
    }

    let sport = event.get("strSport").and_then(Value::as_str).or(sport);
    record.set(fields::SPORT, sport);
    record.set(fields::COUNTRY, country);
    record.set(fields::STAGE, event.get("strRound").and_then(value_text));
    record.set(fields::MATCHDAY, event.get("intRound").and_then(value_text));

    // strTimestamp is UTC when present; dateEvent + strTime otherwise.
    let kick_off = event
        .get("strTimestamp")
        .and_then(Value::as_str)
        .and_then(|ts| parse_match_datetime(ts, None))
        .or_else(|| {
            let date = event.get("dateEvent").and_then(Value::as_str)?;
            let time = event.get("strTime").and_then(Value::as_str);
            parse_match_datetime(date, time.map(|t| t.trim_end_matches("+00:00")))
        });
    match kick_off {
        Some(at) => record.set(fields::DATETIME_UTC, at.to_rfc3339()),
        None => record.set(fields::DATETIME_UTC, event.get("dateEvent").cloned().unwrap_or(Value::Null)),
    }

    let source_match_id = record.text(fields::SOURCE_MATCH_ID);
    let mut records = vec![record];

    if let Some(source_match_id) = source_match_id {
        for (vendor, side) in [("intHomeShots", "home"), ("intAwayShots", "away")] {
            if let Some(shots) = event.get(vendor).and_then(value_text) {
                records.push(
                    RawRecord::new(RecordKind::Stat)
                        .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
                        .with(fields::TEAM_SIDE, side)
                        .with(fields::STAT_TYPE, "shots_total")
                        .with(fields::STAT_VALUE, shots),
                );
            }
        }
    }
    records
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl SourceAdapter for TheSportsDbAdapter {
    fn name(&self) -> &str {
        THESPORTSDB
    }

    fn chunks(&self, _selector: &Selector) -> Vec<ChunkId> {
        self.config.leagues.iter().map(ChunkId::new).collect()
    }

    async fn fetch_chunk(&self, chunk: &ChunkId, _selector: &Selector) -> Result<Vec<RawRecord>, SourceError> {
        if self.config.api_key.trim().is_empty() {
            return Err(FetchError::MissingCredential {
                source_name: THESPORTSDB.to_string(),
                variable: "THESPORTSDB_API_KEY".to_string(),
            }
            .into());
        }
        let league_id = chunk.as_str();
        let mut records = Vec::new();

        let league = self
            .get::<LeaguesResponse>(chunk, "lookupleague.php", league_id)
            .await?
            .and_then(|r| r.leagues)
            .and_then(|mut leagues| (!leagues.is_empty()).then(|| leagues.swap_remove(0)));
        let sport = league.as_ref().and_then(|l| l.get("strSport")).and_then(Value::as_str).map(str::to_string);
        let country = league.as_ref().and_then(|l| l.get("strCountry")).and_then(Value::as_str).map(str::to_string);
        if let Some(league) = &league {
            records.push(league_record(league));
        }

        for endpoint in ["eventspastleague.php", "eventsnextleague.php"] {
            let events = self
                .get::<EventsResponse>(chunk, endpoint, league_id)
                .await?
                .and_then(|r| r.events)
                .unwrap_or_default();
            for event in &events {
                records.extend(event_records(event, sport.as_deref(), country.as_deref()));
            }
        }

        tracing::debug!("{}: {} records from league {}", THESPORTSDB, records.len(), league_id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{body, fetcher, status, ScriptedTransport};

    const LEAGUE: &str = r#"{"leagues":[{"idLeague":"4328","strLeague":"English Premier League","strSport":"Soccer","strCountry":"England"}]}"#;

    const PAST: &str = r#"{"events":[{
        "idEvent":"1032723","strLeague":"English Premier League","idLeague":"4328",
        "strHomeTeam":"Arsenal","idHomeTeam":"133604","strAwayTeam":"Chelsea","idAwayTeam":"133610",
        "intHomeScore":"2","intAwayScore":"1","strStatus":"Match Finished","intRound":"5",
        "dateEvent":"2023-09-16","strTime":"14:00:00","strTimestamp":"2023-09-16T14:00:00+00:00",
        "intHomeShots":"14","intAwayShots":null
    }]}"#;

    const NEXT: &str = r#"{"events":null}"#;

    fn config() -> TheSportsDbConfig {
        TheSportsDbConfig {
            api_key: "3".into(),
            base_url: "http://tsdb.test/api/v1/json".into(),
            leagues: vec!["4328".into()],
        }
    }

    #[tokio::test]
    async fn test_league_events_and_shots() {
        let transport = ScriptedTransport::new(vec![body(LEAGUE), body(PAST), body(NEXT)]);
        let adapter = TheSportsDbAdapter::new(config(), fetcher(THESPORTSDB, transport.clone(), 1));

        let records = adapter.fetch_chunk(&ChunkId::new("4328"), &Selector::full()).await.unwrap();
        let kinds: Vec<RecordKind> = records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RecordKind::League, RecordKind::Match, RecordKind::Stat]);

        let m = &records[1];
        assert_eq!(m.text(fields::SOURCE_MATCH_ID).as_deref(), Some("1032723"));
        assert_eq!(m.text(fields::SPORT).as_deref(), Some("Soccer"));
        assert_eq!(m.text(fields::COUNTRY).as_deref(), Some("England"));
        assert_eq!(m.int(fields::HOME_SCORE), Some(2));
        assert_eq!(m.int(fields::MATCHDAY), Some(5));
        assert_eq!(
            m.datetime(fields::DATETIME_UTC).unwrap().to_rfc3339(),
            "2023-09-16T14:00:00+00:00"
        );

        let stat = &records[2];
        assert_eq!(stat.text(fields::TEAM_SIDE).as_deref(), Some("home"));
        assert_eq!(stat.text(fields::STAT_VALUE).as_deref(), Some("14"));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].url, "http://tsdb.test/api/v1/json/3/lookupleague.php");
        assert_eq!(seen[1].query, vec![("id".to_string(), "4328".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_listing_is_not_an_error() {
        let transport = ScriptedTransport::new(vec![status(404), status(404), body(NEXT)]);
        let adapter = TheSportsDbAdapter::new(config(), fetcher(THESPORTSDB, transport, 1));

        let records = adapter.fetch_chunk(&ChunkId::new("4328"), &Selector::full()).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_key_aborts() {
        let transport = ScriptedTransport::new(vec![status(403)]);
        let adapter = TheSportsDbAdapter::new(config(), fetcher(THESPORTSDB, transport, 1));

        let err = adapter.fetch_chunk(&ChunkId::new("4328"), &Selector::full()).await.unwrap_err();
        assert!(err.aborts_source());
    }
}
