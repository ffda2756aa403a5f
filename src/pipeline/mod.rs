pub mod report;

use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::IngestConfig;
use crate::db::UpsertStore;
use crate::error::{ErrorKind, IngestError, RecordError};
use crate::models::{MatchStatus, NewMatch, NewOdds, NewStat, UpsertOutcome};
use crate::resolver::IdentityResolver;
use crate::sources::{fields, AdapterRegistry, RawRecord, RecordKind, Selector, SourceAdapter};

pub use report::{RunReport, SourceReport, SourceStatus};

/// Name that selects every registered source.
pub const ALL_SOURCES: &str = "all";

const DEFAULT_MARKET: &str = "1X2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    IncrementalSince(NaiveDate),
}

impl RunMode {
    pub fn selector(&self) -> Selector {
        match self {
            RunMode::Full => Selector::full(),
            RunMode::IncrementalSince(since) => Selector::since(*since),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Full => f.write_str("full"),
            RunMode::IncrementalSince(since) => write!(f, "incremental since {}", since),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub source_timeout: Duration,
    /// 1 runs sources one after another.
    pub max_parallel_sources: usize,
    pub error_samples: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(900),
            max_parallel_sources: 1,
            error_samples: 5,
        }
    }
}

impl OrchestratorOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            source_timeout: config.source_timeout,
            max_parallel_sources: config.max_parallel_sources,
            error_samples: config.report_error_samples,
        }
    }
}

/// Surrogate ids of a stored match, for the odds and stats that follow it.
#[derive(Debug, Clone)]
struct MatchRefs {
    match_id: String,
    home_team_id: String,
    away_team_id: String,
}

/// Per-source-run state shared by the records of all chunks.
struct RunState<'a> {
    source: &'a str,
    selector: Selector,
    filter_by_date: bool,
    matches: HashMap<String, MatchRefs>,
    filtered_matches: HashSet<String>,
}

enum SourceEnd {
    Finished,
    Aborted,
}

/// Runs adapters against the store: adapter -> resolver -> store, one
/// report per source.
pub struct Orchestrator {
    store: UpsertStore,
    resolver: IdentityResolver,
    adapters: AdapterRegistry,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(store: UpsertStore, adapters: AdapterRegistry, options: OrchestratorOptions) -> Self {
        let resolver = IdentityResolver::new(store.clone());
        Self { store, resolver, adapters, options }
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Split requested names into known adapters and unknown names. `all`
    /// expands to every registered source.
    fn select(&self, requested: &[String]) -> (BTreeMap<String, Arc<dyn SourceAdapter>>, Vec<String>) {
        let mut selected = BTreeMap::new();
        let mut unknown = Vec::new();
        for name in requested.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if name.eq_ignore_ascii_case(ALL_SOURCES) {
                selected.extend(self.adapters.iter().map(|(k, v)| (k.clone(), v.clone())));
            } else if let Some(adapter) = self.adapters.get(name) {
                selected.insert(name.to_string(), adapter.clone());
            } else if !unknown.iter().any(|u| u == name) {
                unknown.push(name.to_string());
            }
        }
        (selected, unknown)
    }

    pub async fn run(&self, requested: &[String], mode: RunMode) -> Result<RunReport, IngestError> {
        let (selected, unknown_sources) = self.select(requested);
        for name in &unknown_sources {
            tracing::warn!("Unknown source '{}' skipped (known: {})", name, self.source_names().collect::<Vec<_>>().join(", "));
        }
        if selected.is_empty() {
            return Err(IngestError::NoSourcesSelected { requested: requested.join(",") });
        }

        self.resolver.clear_cache().await;
        let selector = mode.selector();
        let parallel = self.options.max_parallel_sources.max(1);
        tracing::info!("Ingesting {} source(s), {} mode, up to {} at a time", selected.len(), mode, parallel);

        let mut sources: Vec<SourceReport> = stream::iter(selected)
            .map(|(name, adapter)| self.run_source(name, adapter, selector))
            .buffer_unordered(parallel)
            .collect()
            .await;
        sources.sort_by(|a, b| a.source.cmp(&b.source));

        Ok(RunReport { mode, sources, unknown_sources })
    }

    async fn run_source(&self, name: String, adapter: Arc<dyn SourceAdapter>, selector: Selector) -> SourceReport {
        let started = Instant::now();
        let mut report = SourceReport::new(&name, self.options.error_samples);

        let ingest = self.ingest_source(adapter.as_ref(), selector, &mut report);
        match tokio::time::timeout(self.options.source_timeout, ingest).await {
            Ok(SourceEnd::Finished) => report.settle(),
            Ok(SourceEnd::Aborted) => report.status = SourceStatus::Failed,
            Err(_) => {
                report
                    .errors
                    .record(ErrorKind::Timeout, format!("gave up after {:?}", self.options.source_timeout));
                report.status = SourceStatus::TimedOut;
            }
        }
        report.elapsed = started.elapsed();

        if report.status.is_failure() {
            tracing::error!("{} ({:.1?})", report, report.elapsed);
        } else {
            tracing::info!("{} ({:.1?})", report, report.elapsed);
        }
        report
    }

    async fn ingest_source(&self, adapter: &dyn SourceAdapter, selector: Selector, report: &mut SourceReport) -> SourceEnd {
        let mut state = RunState {
            source: adapter.name(),
            selector,
            filter_by_date: selector.since.is_some() && !adapter.supports_since(),
            matches: HashMap::new(),
            filtered_matches: HashSet::new(),
        };

        let mut batches = adapter.fetch_records(&selector);
        while let Some(batch) = batches.next().await {
            let records = match batch.result {
                Ok(records) => records,
                Err(e) => {
                    report.chunks_failed += 1;
                    report.errors.record(e.kind(), e.to_string());
                    if e.aborts_source() {
                        tracing::error!("{}: {}; stopping this source", state.source, e);
                        return SourceEnd::Aborted;
                    }
                    tracing::warn!("{}: chunk {} skipped: {}", state.source, batch.chunk, e);
                    continue;
                }
            };
            report.chunks_ok += 1;
            tracing::debug!("{}: chunk {} has {} records", state.source, batch.chunk, records.len());

            for record in &records {
                if self.filtered_out(&mut state, record) {
                    report.filtered += 1;
                    continue;
                }
                report.attempted += 1;
                match self.ingest_record(&mut state, record).await {
                    Ok(UpsertOutcome::Inserted(_)) => report.added += 1,
                    Ok(UpsertOutcome::Updated(_)) => report.updated += 1,
                    Err(e) => {
                        report.skipped += 1;
                        let id = record.text(fields::SOURCE_MATCH_ID).unwrap_or_else(|| "-".to_string());
                        tracing::warn!("{}: {} record {} skipped: {}", state.source, record.kind, id, e);
                        report.errors.record(e.kind(), format!("{} {}: {}", record.kind, id, e));
                    }
                }
            }
        }
        SourceEnd::Finished
    }

    /// Client-side half of incremental mode. Matches dated before `since`
    /// are dropped together with the odds and stats that reference them.
    /// Undated matches pass through and are rejected later as malformed.
    fn filtered_out(&self, state: &mut RunState<'_>, record: &RawRecord) -> bool {
        if !state.filter_by_date {
            return false;
        }
        match record.kind {
            RecordKind::Match => {
                let Some(at) = record.datetime(fields::DATETIME_UTC) else {
                    return false;
                };
                if state.selector.admits(at) {
                    return false;
                }
                if let Some(id) = record.text(fields::SOURCE_MATCH_ID) {
                    state.filtered_matches.insert(id);
                }
                true
            }
            RecordKind::Odds | RecordKind::Stat => record
                .text(fields::SOURCE_MATCH_ID)
                .is_some_and(|id| state.filtered_matches.contains(&id)),
            RecordKind::League | RecordKind::Team => false,
        }
    }

    async fn ingest_record(&self, state: &mut RunState<'_>, record: &RawRecord) -> Result<UpsertOutcome, RecordError> {
        match record.kind {
            RecordKind::League => Ok(self
                .resolver
                .resolve_league(
                    record.text(fields::LEAGUE_NAME).as_deref(),
                    record.text(fields::SPORT).as_deref(),
                    record.text(fields::COUNTRY).as_deref(),
                    state.source,
                    record.text(fields::LEAGUE_SOURCE_ID).as_deref(),
                )
                .await?
                .outcome()),
            RecordKind::Team => Ok(self
                .resolver
                .resolve_team(
                    record.text(fields::TEAM_NAME).as_deref(),
                    record.text(fields::SPORT).as_deref(),
                    record.text(fields::COUNTRY).as_deref(),
                    state.source,
                    record.text(fields::TEAM_SOURCE_ID).as_deref(),
                )
                .await?
                .outcome()),
            RecordKind::Match => self.ingest_match(state, record).await,
            RecordKind::Odds => self.ingest_odds(state, record).await,
            RecordKind::Stat => self.ingest_stat(state, record).await,
        }
    }

    async fn ingest_match(&self, state: &mut RunState<'_>, record: &RawRecord) -> Result<UpsertOutcome, RecordError> {
        let source_match_id = record
            .text(fields::SOURCE_MATCH_ID)
            .ok_or_else(|| RecordError::malformed("match without source_match_id"))?;
        let datetime_utc = record.datetime(fields::DATETIME_UTC).ok_or_else(|| {
            RecordError::malformed(format!(
                "unparseable kick-off {:?}",
                record.text(fields::DATETIME_UTC).unwrap_or_default()
            ))
        })?;

        let sport = record.text(fields::SPORT);
        let country = record.text(fields::COUNTRY);
        let league = self
            .resolver
            .resolve_league(
                record.text(fields::LEAGUE_NAME).as_deref(),
                sport.as_deref(),
                country.as_deref(),
                state.source,
                record.text(fields::LEAGUE_SOURCE_ID).as_deref(),
            )
            .await?;
        let home = self
            .resolver
            .resolve_team(
                record.text(fields::HOME_TEAM).as_deref(),
                sport.as_deref(),
                country.as_deref(),
                state.source,
                record.text(fields::HOME_TEAM_SOURCE_ID).as_deref(),
            )
            .await?;
        let away = self
            .resolver
            .resolve_team(
                record.text(fields::AWAY_TEAM).as_deref(),
                sport.as_deref(),
                country.as_deref(),
                state.source,
                record.text(fields::AWAY_TEAM_SOURCE_ID).as_deref(),
            )
            .await?;
        if home.id == away.id {
            return Err(RecordError::malformed("home and away resolve to the same team"));
        }

        let home_score = record.int(fields::HOME_SCORE);
        let away_score = record.int(fields::AWAY_SCORE);
        let status = record
            .text(fields::STATUS)
            .and_then(|raw| MatchStatus::from_vendor(&raw))
            .unwrap_or(if home_score.is_some() && away_score.is_some() {
                MatchStatus::Finished
            } else {
                MatchStatus::Scheduled
            });

        let outcome = self
            .store
            .upsert_match(&NewMatch {
                league_id: league.id,
                home_team_id: home.id.clone(),
                away_team_id: away.id.clone(),
                datetime_utc,
                status,
                home_score,
                away_score,
                stage: record.text(fields::STAGE),
                matchday: record.int(fields::MATCHDAY),
                is_mock: record.boolean(fields::IS_MOCK).unwrap_or(false),
                source_match_id: source_match_id.clone(),
                source_name: state.source.to_string(),
            })
            .await?;

        state.matches.insert(
            source_match_id,
            MatchRefs { match_id: outcome.id().to_string(), home_team_id: home.id, away_team_id: away.id },
        );
        Ok(outcome)
    }

    /// The match an odds or stat record points at: from this run, or stored
    /// by an earlier one.
    async fn match_refs(&self, state: &mut RunState<'_>, record: &RawRecord) -> Result<MatchRefs, RecordError> {
        let source_match_id = record
            .text(fields::SOURCE_MATCH_ID)
            .ok_or_else(|| RecordError::malformed("missing source_match_id"))?;
        if let Some(refs) = state.matches.get(&source_match_id) {
            return Ok(refs.clone());
        }

        let unknown = || RecordError::malformed(format!("unknown match {}", source_match_id));
        let match_id = self
            .store
            .find_match_id(&source_match_id, state.source)
            .await?
            .ok_or_else(unknown)?;
        let stored = self.store.get_match(&match_id).await?.ok_or_else(unknown)?;
        let refs = MatchRefs {
            match_id,
            home_team_id: stored.home_team_id,
            away_team_id: stored.away_team_id,
        };
        state.matches.insert(source_match_id, refs.clone());
        Ok(refs)
    }

    async fn ingest_odds(&self, state: &mut RunState<'_>, record: &RawRecord) -> Result<UpsertOutcome, RecordError> {
        let refs = self.match_refs(state, record).await?;
        let bookmaker = record
            .text(fields::BOOKMAKER)
            .ok_or_else(|| RecordError::malformed("odds without bookmaker"))?;
        let (home_odds, draw_odds, away_odds) = (
            record.float(fields::HOME_ODDS),
            record.float(fields::DRAW_ODDS),
            record.float(fields::AWAY_ODDS),
        );
        if home_odds.is_none() && draw_odds.is_none() && away_odds.is_none() {
            return Err(RecordError::malformed(format!("odds from {} carry no prices", bookmaker)));
        }

        Ok(self
            .store
            .upsert_odds(&NewOdds {
                match_id: refs.match_id,
                bookmaker,
                market_type: record.text(fields::MARKET_TYPE).unwrap_or_else(|| DEFAULT_MARKET.to_string()),
                home_odds,
                draw_odds,
                away_odds,
                timestamp_utc: record.datetime(fields::ODDS_TIMESTAMP),
            })
            .await?)
    }

    async fn ingest_stat(&self, state: &mut RunState<'_>, record: &RawRecord) -> Result<UpsertOutcome, RecordError> {
        let refs = self.match_refs(state, record).await?;
        let stat_type = record
            .text(fields::STAT_TYPE)
            .ok_or_else(|| RecordError::malformed("stat without stat_type"))?;
        let stat_value = record
            .text(fields::STAT_VALUE)
            .ok_or_else(|| RecordError::malformed(format!("stat {} without value", stat_type)))?;
        let team_id = match record.text(fields::TEAM_SIDE).map(|s| s.to_lowercase()).as_deref() {
            None => None,
            Some("home") => Some(refs.home_team_id),
            Some("away") => Some(refs.away_team_id),
            Some(other) => return Err(RecordError::malformed(format!("unknown team side {:?}", other))),
        };

        Ok(self
            .store
            .upsert_stat(&NewStat {
                match_id: refs.match_id,
                team_id,
                player_id: record.text(fields::PLAYER_ID),
                stat_type,
                stat_value,
                period: record.text(fields::PERIOD),
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;
    use crate::error::{FetchError, SourceError};
    use crate::sources::{ChunkId, MockFeedAdapter};
    use async_trait::async_trait;

    /// Adapter over canned chunks; `None` makes a chunk fail with `failure`.
    struct FakeAdapter {
        name: &'static str,
        chunks: Vec<(&'static str, Option<Vec<RawRecord>>)>,
        failure: fn(&ChunkId) -> SourceError,
        delay: Duration,
        supports_since: bool,
    }

    impl FakeAdapter {
        fn new(name: &'static str, chunks: Vec<(&'static str, Option<Vec<RawRecord>>)>) -> Self {
            Self { name, chunks, failure: missing_chunk, delay: Duration::ZERO, supports_since: false }
        }
    }

    fn missing_chunk(chunk: &ChunkId) -> SourceError {
        SourceError::PartialUnavailable { chunk: chunk.to_string(), reason: "file missing".into() }
    }

    fn bad_key(_: &ChunkId) -> SourceError {
        FetchError::Credential { source_name: "locked".into(), status: 401 }.into()
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn name(&self) -> &str {
            self.name
        }

        fn supports_since(&self) -> bool {
            self.supports_since
        }

        fn chunks(&self, _selector: &Selector) -> Vec<ChunkId> {
            self.chunks.iter().map(|(label, _)| ChunkId::new(*label)).collect()
        }

        async fn fetch_chunk(&self, chunk: &ChunkId, _selector: &Selector) -> Result<Vec<RawRecord>, SourceError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.chunks.iter().find(|(label, _)| *label == chunk.as_str()) {
                Some((_, Some(records))) => Ok(records.clone()),
                _ => Err((self.failure)(chunk)),
            }
        }
    }

    fn fixture(id: &str, day: &str, home: &str, away: &str) -> RawRecord {
        RawRecord::new(RecordKind::Match)
            .with(fields::SOURCE_MATCH_ID, id)
            .with(fields::LEAGUE_NAME, "Premier League")
            .with(fields::SPORT, "football")
            .with(fields::HOME_TEAM, home)
            .with(fields::AWAY_TEAM, away)
            .with(fields::DATETIME_UTC, format!("{}T15:00:00Z", day))
            .with(fields::HOME_SCORE, 1)
            .with(fields::AWAY_SCORE, 0)
    }

    fn odds(id: &str) -> RawRecord {
        RawRecord::new(RecordKind::Odds)
            .with(fields::SOURCE_MATCH_ID, id)
            .with(fields::BOOKMAKER, "Bet365")
            .with(fields::HOME_ODDS, 1.9)
            .with(fields::DRAW_ODDS, 3.4)
            .with(fields::AWAY_ODDS, 4.2)
    }

    async fn orchestrator(adapters: Vec<Arc<dyn SourceAdapter>>, options: OrchestratorOptions) -> Orchestrator {
        let registry: AdapterRegistry = adapters.into_iter().map(|a| (a.name().to_string(), a)).collect();
        Orchestrator::new(UpsertStore::new(memory_pool().await), registry, options)
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_one_missing_chunk_of_three() {
        let adapter = FakeAdapter::new(
            "csv",
            vec![
                ("2122/E0", Some(vec![fixture("a", "2021-08-14", "Arsenal", "Brentford")])),
                ("2223/E0", None),
                ("2324/E0", Some(vec![fixture("b", "2023-08-12", "Arsenal", "Forest"), odds("b")])),
            ],
        );
        let orch = orchestrator(vec![Arc::new(adapter)], OrchestratorOptions::default()).await;

        let report = orch.run(&names(&["csv"]), RunMode::Full).await.unwrap();
        let csv = report.source("csv").unwrap();
        assert_eq!(csv.status, SourceStatus::Partial);
        assert_eq!((csv.chunks_ok, csv.chunks_failed), (2, 1));
        assert_eq!(csv.attempted, 3);
        assert_eq!(csv.added, 3);
        assert_eq!(csv.errors.count(ErrorKind::PartialSourceUnavailable), 1);
        assert!(!report.has_failures());
        assert_eq!(orch.store.counts().await.unwrap().matches, 2);
    }

    #[tokio::test]
    async fn test_failed_source_does_not_affect_others() {
        let broken = FakeAdapter::new("broken", vec![("x", None), ("y", None)]);
        let healthy = FakeAdapter::new("healthy", vec![("x", Some(vec![fixture("a", "2024-01-01", "Lazio", "Roma")]))]);
        let options = OrchestratorOptions { max_parallel_sources: 2, ..Default::default() };
        let orch = orchestrator(vec![Arc::new(broken), Arc::new(healthy)], options).await;

        let report = orch.run(&names(&["all"]), RunMode::Full).await.unwrap();
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.source("broken").unwrap().status, SourceStatus::Failed);
        assert_eq!(report.source("healthy").unwrap().status, SourceStatus::Completed);
        assert_eq!(report.source("healthy").unwrap().added, 1);
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_credential_error_stops_the_source() {
        let mut adapter = FakeAdapter::new(
            "locked",
            vec![("first", None), ("second", Some(vec![fixture("a", "2024-01-01", "Lazio", "Roma")]))],
        );
        adapter.failure = bad_key;
        let orch = orchestrator(vec![Arc::new(adapter)], OrchestratorOptions::default()).await;

        let report = orch.run(&names(&["locked"]), RunMode::Full).await.unwrap();
        let locked = report.source("locked").unwrap();
        assert_eq!(locked.status, SourceStatus::Failed);
        assert_eq!((locked.chunks_ok, locked.chunks_failed), (0, 1));
        assert_eq!(locked.errors.count(ErrorKind::Credential), 1);
        assert_eq!(locked.attempted, 0);
    }

    #[tokio::test]
    async fn test_slow_source_times_out_alone() {
        let mut slow = FakeAdapter::new("slow", vec![("x", Some(vec![]))]);
        slow.delay = Duration::from_millis(500);
        let quick = FakeAdapter::new("quick", vec![("x", Some(vec![fixture("a", "2024-01-01", "Lazio", "Roma")]))]);
        let options = OrchestratorOptions { source_timeout: Duration::from_millis(50), ..Default::default() };
        let orch = orchestrator(vec![Arc::new(slow), Arc::new(quick)], options).await;

        let report = orch.run(&names(&["slow", "quick"]), RunMode::Full).await.unwrap();
        let slow = report.source("slow").unwrap();
        assert_eq!(slow.status, SourceStatus::TimedOut);
        assert_eq!(slow.errors.count(ErrorKind::Timeout), 1);
        assert_eq!(report.source("quick").unwrap().status, SourceStatus::Completed);
    }

    #[tokio::test]
    async fn test_incremental_filters_when_source_cannot() {
        let records = vec![
            fixture("old", "2024-02-20", "Lazio", "Roma"),
            odds("old"),
            fixture("new", "2024-03-02", "Roma", "Lazio"),
            odds("new"),
        ];
        let orch = orchestrator(
            vec![Arc::new(FakeAdapter::new("csv", vec![("x", Some(records))]))],
            OrchestratorOptions::default(),
        )
        .await;

        let since = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let report = orch.run(&names(&["csv"]), RunMode::IncrementalSince(since)).await.unwrap();
        let csv = report.source("csv").unwrap();
        assert_eq!(csv.filtered, 2);
        assert_eq!(csv.attempted, 2);
        assert_eq!(csv.added, 2);
        assert!(orch.store.find_match_id("old", "csv").await.unwrap().is_none());
        assert!(orch.store.find_match_id("new", "csv").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_server_side_filtering_is_trusted() {
        let mut adapter = FakeAdapter::new("api", vec![("x", Some(vec![fixture("old", "2024-02-20", "Lazio", "Roma")]))]);
        adapter.supports_since = true;
        let orch = orchestrator(vec![Arc::new(adapter)], OrchestratorOptions::default()).await;

        let since = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let report = orch.run(&names(&["api"]), RunMode::IncrementalSince(since)).await.unwrap();
        assert_eq!(report.source("api").unwrap().filtered, 0);
        assert_eq!(report.source("api").unwrap().added, 1);
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let records = vec![
            fixture("a", "2024-01-01", "Lazio", "Roma").with(fields::DATETIME_UTC, "soon"),
            RawRecord::new(RecordKind::Match)
                .with(fields::SOURCE_MATCH_ID, "b")
                .with(fields::LEAGUE_NAME, "Serie A")
                .with(fields::SPORT, "football")
                .with(fields::AWAY_TEAM, "Roma")
                .with(fields::DATETIME_UTC, "2024-01-02"),
            odds("nowhere"),
            fixture("c", "2024-01-03", "Lazio", "Lazio"),
            fixture("d", "2024-01-04", "Napoli", "Inter"),
        ];
        let orch = orchestrator(
            vec![Arc::new(FakeAdapter::new("csv", vec![("x", Some(records))]))],
            OrchestratorOptions { error_samples: 2, ..Default::default() },
        )
        .await;

        let report = orch.run(&names(&["csv"]), RunMode::Full).await.unwrap();
        let csv = report.source("csv").unwrap();
        assert_eq!(csv.attempted, 5);
        assert_eq!(csv.skipped, 4);
        assert_eq!(csv.added, 1);
        assert_eq!(csv.status, SourceStatus::Partial);
        assert_eq!(csv.errors.count(ErrorKind::MalformedRecord), 4);
        assert_eq!(csv.errors.samples(ErrorKind::MalformedRecord).len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_skips_only_that_record() {
        let records = vec![
            fixture("a", "2024-01-01", "Lazio", "Roma"),
            fixture("locked", "2024-01-02", "Napoli", "Inter"),
            fixture("c", "2024-01-03", "Milan", "Torino"),
            odds("c"),
        ];
        let orch = orchestrator(
            vec![Arc::new(FakeAdapter::new("csv", vec![("x", Some(records))]))],
            OrchestratorOptions::default(),
        )
        .await;
        sqlx::query(
            "CREATE TRIGGER refuse_locked BEFORE INSERT ON matches
             WHEN NEW.source_match_id = 'locked'
             BEGIN SELECT RAISE(ABORT, 'database is locked'); END",
        )
        .execute(orch.store.pool())
        .await
        .unwrap();

        let report = orch.run(&names(&["csv"]), RunMode::Full).await.unwrap();
        let csv = report.source("csv").unwrap();
        assert_eq!(csv.errors.count(ErrorKind::StoreWrite), 1);
        assert_eq!(csv.errors.total(), 1);
        assert_eq!(csv.attempted, 4);
        assert_eq!(csv.added, 3);
        assert_eq!(csv.skipped, 1);
        assert_eq!(csv.status, SourceStatus::Partial);
        assert!(!report.has_failures());

        assert!(orch.store.find_match_id("locked", "csv").await.unwrap().is_none());
        let later = orch.store.find_match_id("c", "csv").await.unwrap().unwrap();
        assert_eq!(orch.store.get_odds(&later).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_only_updates() {
        let orch = orchestrator(vec![Arc::new(MockFeedAdapter::new())], OrchestratorOptions::default()).await;
        let sources = names(&["mock_feed"]);

        let first = orch.run(&sources, RunMode::Full).await.unwrap();
        let first = first.source("mock_feed").unwrap().clone();
        assert_eq!(first.status, SourceStatus::Completed);
        assert_eq!(first.added, first.attempted);
        assert_eq!(first.updated, 0);
        let counts = orch.store.counts().await.unwrap();

        let second = orch.run(&sources, RunMode::Full).await.unwrap();
        let second = second.source("mock_feed").unwrap();
        assert_eq!(second.attempted, first.attempted);
        assert_eq!(second.added, 0);
        assert_eq!(second.updated, second.attempted);
        assert_eq!(orch.store.counts().await.unwrap(), counts);
        assert_eq!((counts.leagues, counts.teams, counts.matches), (1, 6, 15));
    }

    #[tokio::test]
    async fn test_side_stats_attach_to_teams() {
        let records = vec![
            fixture("a", "2024-01-01", "Lazio", "Roma"),
            RawRecord::new(RecordKind::Stat)
                .with(fields::SOURCE_MATCH_ID, "a")
                .with(fields::TEAM_SIDE, "away")
                .with(fields::STAT_TYPE, "shots_total")
                .with(fields::STAT_VALUE, 11),
        ];
        let orch = orchestrator(
            vec![Arc::new(FakeAdapter::new("csv", vec![("x", Some(records))]))],
            OrchestratorOptions::default(),
        )
        .await;
        orch.run(&names(&["csv"]), RunMode::Full).await.unwrap();

        let match_id = orch.store.find_match_id("a", "csv").await.unwrap().unwrap();
        let stored = orch.store.get_match(&match_id).await.unwrap().unwrap();
        let stats = orch.store.get_stats(&match_id).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].team_id.as_deref(), Some(stored.away_team_id.as_str()));
        assert_eq!(stats[0].stat_value, "11");
        assert_eq!(stored.winner, Some(crate::models::Winner::Home));
    }

    #[tokio::test]
    async fn test_unknown_sources_only_is_a_config_error() {
        let orch = orchestrator(vec![Arc::new(MockFeedAdapter::new())], OrchestratorOptions::default()).await;

        let err = orch.run(&names(&["nope"]), RunMode::Full).await.unwrap_err();
        assert!(matches!(err, IngestError::NoSourcesSelected { .. }));

        let report = orch.run(&names(&["nope", "mock_feed"]), RunMode::Full).await.unwrap();
        assert_eq!(report.unknown_sources, vec!["nope".to_string()]);
        assert_eq!(report.sources.len(), 1);
    }
}
