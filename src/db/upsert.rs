use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::*;
use crate::utils::{normalize_name, normalize_sport};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Column value handed to the generic merge.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Int(Option<i64>),
    Real(Option<f64>),
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(Some(v.to_string()))
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(Some(v))
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(v: Option<i64>) -> Self {
        SqlValue::Int(v)
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(v: Option<f64>) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Int(Some(v as i64))
    }
}

fn bind<'q>(query: SqliteQuery<'q>, value: &SqlValue) -> SqliteQuery<'q> {
    match value {
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Real(v) => query.bind(*v),
    }
}

type Columns = Vec<(&'static str, SqlValue)>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub leagues: i64,
    pub teams: i64,
    pub matches: i64,
    pub odds: i64,
    pub stats: i64,
}

/// Idempotent merge of every entity kind, keyed by natural keys.
///
/// All writes go through one async lock, so a natural key is never inserted
/// twice even when several sources run side by side.
#[derive(Clone)]
pub struct UpsertStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl UpsertStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, write_lock: Arc::new(Mutex::new(())) }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ── Merge routine ────────────────────────────────────────────────────────

    /// Look the natural key up inside a transaction, then insert a new row
    /// (fresh surrogate id) or overwrite the non-key columns of the existing
    /// one. `fields` sees the existing row, if any, so callers can express
    /// union or keep-if-null policies.
    async fn merge<F>(&self, table: &'static str, key: Columns, fields: F) -> Result<UpsertOutcome, StoreError>
    where
        F: FnOnce(Option<&SqliteRow>) -> Result<Columns, StoreError>,
    {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::write(table))?;

        // `IS` so that NULL key parts compare equal.
        let predicate = key
            .iter()
            .map(|(column, _)| format!("{} IS ?", column))
            .collect::<Vec<_>>()
            .join(" AND ");
        let select = format!("SELECT * FROM {} WHERE {} LIMIT 1", table, predicate);
        let mut query = sqlx::query(&select);
        for (_, value) in &key {
            query = bind(query, value);
        }
        let existing = query
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::read(table))?;

        let fields = fields(existing.as_ref())?;
        let now = Utc::now().to_rfc3339();

        let outcome = match existing {
            Some(row) => {
                let id: String = row.try_get("id").map_err(StoreError::read(table))?;
                let assignments = fields
                    .iter()
                    .map(|(column, _)| format!("{} = ?", column))
                    .chain(std::iter::once("updated_at = ?".to_string()))
                    .collect::<Vec<_>>()
                    .join(", ");
                let update = format!("UPDATE {} SET {} WHERE id = ?", table, assignments);
                let mut query = sqlx::query(&update);
                for (_, value) in &fields {
                    query = bind(query, value);
                }
                query
                    .bind(now)
                    .bind(id.clone())
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::write(table))?;
                UpsertOutcome::Updated(id)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let columns = std::iter::once("id")
                    .chain(key.iter().map(|(column, _)| *column))
                    .chain(fields.iter().map(|(column, _)| *column))
                    .chain(["created_at", "updated_at"])
                    .collect::<Vec<_>>();
                let placeholders = vec!["?"; columns.len()].join(", ");
                let insert = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table,
                    columns.join(", "),
                    placeholders
                );
                let mut query = sqlx::query(&insert).bind(id.clone());
                for (_, value) in key.iter().chain(fields.iter()) {
                    query = bind(query, value);
                }
                query
                    .bind(now.clone())
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::write(table))?;
                UpsertOutcome::Inserted(id)
            }
        };

        tx.commit().await.map_err(StoreError::write(table))?;
        Ok(outcome)
    }

    // ── Entity upserts ───────────────────────────────────────────────────────

    pub async fn upsert_league(&self, league: &NewLeague) -> Result<UpsertOutcome, StoreError> {
        self.upsert_named(
            "leagues",
            &league.name,
            &league.sport,
            league.country.as_deref(),
            league.source_ref.as_ref(),
        )
        .await
    }

    pub async fn upsert_team(&self, team: &NewTeam) -> Result<UpsertOutcome, StoreError> {
        self.upsert_named(
            "teams",
            &team.name,
            &team.sport,
            team.country.as_deref(),
            team.source_ref.as_ref(),
        )
        .await
    }

    /// Leagues and teams share a shape: (name, sport) identity, a nullable
    /// country and a growing set of source mappings.
    async fn upsert_named(
        &self,
        table: &'static str,
        name: &str,
        sport: &str,
        country: Option<&str>,
        source_ref: Option<&SourceRef>,
    ) -> Result<UpsertOutcome, StoreError> {
        let key: Columns = vec![
            ("name_key", normalize_name(name).into()),
            ("sport", normalize_sport(sport).into()),
        ];

        self.merge(table, key, |existing| {
            let mut source_ids = match existing {
                Some(row) => {
                    let raw: String = row.try_get("source_ids").map_err(StoreError::read(table))?;
                    SourceIds::from_json(&raw)
                        .map_err(|e| StoreError::Corrupt { table, reason: e.to_string() })?
                }
                None => SourceIds::default(),
            };
            if let Some(source_ref) = source_ref {
                source_ids.attach(source_ref.clone());
            }

            let previous_country = existing
                .and_then(|row| row.try_get::<Option<String>, _>("country").ok())
                .flatten();
            let country = country
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .or(previous_country);

            let mut fields: Columns = vec![
                ("country", country.into()),
                ("source_ids", source_ids.to_json().into()),
            ];
            if existing.is_none() {
                fields.push(("name", name.split_whitespace().collect::<Vec<_>>().join(" ").into()));
            }
            Ok(fields)
        })
        .await
    }

    pub async fn upsert_match(&self, m: &NewMatch) -> Result<UpsertOutcome, StoreError> {
        let key: Columns = vec![
            ("source_match_id", m.source_match_id.as_str().into()),
            ("source_name", m.source_name.as_str().into()),
        ];
        let winner = m.winner().map(|w| w.as_str().to_string());

        self.merge("matches", key, |_| {
            Ok(vec![
                ("league_id", m.league_id.as_str().into()),
                ("home_team_id", m.home_team_id.as_str().into()),
                ("away_team_id", m.away_team_id.as_str().into()),
                ("datetime_utc", m.datetime_utc.to_rfc3339().into()),
                ("status", m.status.as_str().into()),
                ("home_score", m.home_score.into()),
                ("away_score", m.away_score.into()),
                ("winner", winner.into()),
                ("stage", m.stage.clone().into()),
                ("matchday", m.matchday.into()),
                ("is_mock", m.is_mock.into()),
            ])
        })
        .await
    }

    pub async fn upsert_odds(&self, odds: &NewOdds) -> Result<UpsertOutcome, StoreError> {
        let key: Columns = vec![
            ("match_id", odds.match_id.as_str().into()),
            ("bookmaker", odds.bookmaker.as_str().into()),
            ("market_type", odds.market_type.as_str().into()),
        ];

        self.merge("odds", key, |_| {
            Ok(vec![
                ("home_odds", odds.home_odds.into()),
                ("draw_odds", odds.draw_odds.into()),
                ("away_odds", odds.away_odds.into()),
                ("timestamp_utc", odds.timestamp_utc.map(|t| t.to_rfc3339()).into()),
            ])
        })
        .await
    }

    pub async fn upsert_stat(&self, stat: &NewStat) -> Result<UpsertOutcome, StoreError> {
        let key: Columns = vec![
            ("match_id", stat.match_id.as_str().into()),
            ("team_id", stat.team_id.clone().into()),
            ("stat_type", stat.stat_type.as_str().into()),
            ("period", stat.period.clone().filter(|p| !p.is_empty()).into()),
        ];

        self.merge("stats", key, |_| {
            Ok(vec![
                ("player_id", stat.player_id.clone().into()),
                ("stat_value", stat.stat_value.as_str().into()),
            ])
        })
        .await
    }

    // ── Lookups ──────────────────────────────────────────────────────────────

    pub async fn find_match_id(&self, source_match_id: &str, source_name: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar("SELECT id FROM matches WHERE source_match_id = ? AND source_name = ?")
            .bind(source_match_id)
            .bind(source_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::read("matches"))
    }

    pub async fn find_league_by_source(&self, source: &str, source_id: &str) -> Result<Option<String>, StoreError> {
        self.find_by_source("leagues", source, source_id).await
    }

    pub async fn find_team_by_source(&self, source: &str, source_id: &str) -> Result<Option<String>, StoreError> {
        self.find_by_source("teams", source, source_id).await
    }

    async fn find_by_source(&self, table: &'static str, source: &str, source_id: &str) -> Result<Option<String>, StoreError> {
        let sql = format!(
            r#"SELECT t.id FROM {table} t
               WHERE EXISTS (
                   SELECT 1 FROM json_each(t.source_ids) j
                   WHERE json_extract(j.value, '$.source') = ?
                     AND json_extract(j.value, '$.id') = ?
               )
               LIMIT 1"#
        );
        sqlx::query_scalar(&sql)
            .bind(source)
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::read(table))
    }

    pub async fn get_league(&self, id: &str) -> Result<Option<League>, StoreError> {
        let row = sqlx::query("SELECT * FROM leagues WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::read("leagues"))?;

        match row {
            Some(row) => Ok(Some(League {
                id: row.get("id"),
                name: row.get("name"),
                sport: row.get("sport"),
                country: row.get("country"),
                source_ids: source_ids_column(&row, "leagues")?,
                created_at: timestamp_column(&row, "leagues", "created_at")?,
                updated_at: timestamp_column(&row, "leagues", "updated_at")?,
            })),
            None => Ok(None),
        }
    }

    pub async fn get_team(&self, id: &str) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query("SELECT * FROM teams WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::read("teams"))?;

        match row {
            Some(row) => Ok(Some(Team {
                id: row.get("id"),
                name: row.get("name"),
                sport: row.get("sport"),
                country: row.get("country"),
                source_ids: source_ids_column(&row, "teams")?,
                created_at: timestamp_column(&row, "teams", "created_at")?,
                updated_at: timestamp_column(&row, "teams", "updated_at")?,
            })),
            None => Ok(None),
        }
    }

    pub async fn get_match(&self, id: &str) -> Result<Option<Match>, StoreError> {
        let row = sqlx::query("SELECT * FROM matches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::read("matches"))?;

        match row {
            Some(row) => Ok(Some(Match {
                id: row.get("id"),
                league_id: row.get("league_id"),
                home_team_id: row.get("home_team_id"),
                away_team_id: row.get("away_team_id"),
                datetime_utc: timestamp_column(&row, "matches", "datetime_utc")?,
                status: status_column(&row, "matches")?,
                home_score: row.get("home_score"),
                away_score: row.get("away_score"),
                winner: winner_column(&row, "matches")?,
                stage: row.get("stage"),
                matchday: row.get("matchday"),
                is_mock: row.get::<i64, _>("is_mock") != 0,
                source_match_id: row.get("source_match_id"),
                source_name: row.get("source_name"),
                created_at: timestamp_column(&row, "matches", "created_at")?,
                updated_at: timestamp_column(&row, "matches", "updated_at")?,
            })),
            None => Ok(None),
        }
    }

    pub async fn get_odds(&self, match_id: &str) -> Result<Vec<Odds>, StoreError> {
        let rows = sqlx::query("SELECT * FROM odds WHERE match_id = ? ORDER BY bookmaker, market_type")
            .bind(match_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::read("odds"))?;

        let mut odds = Vec::with_capacity(rows.len());
        for row in rows {
            let timestamp_utc = match row.get::<Option<String>, _>("timestamp_utc") {
                Some(raw) => Some(parse_timestamp(&raw, "odds")?),
                None => None,
            };
            odds.push(Odds {
                id: row.get("id"),
                match_id: row.get("match_id"),
                bookmaker: row.get("bookmaker"),
                market_type: row.get("market_type"),
                home_odds: row.get("home_odds"),
                draw_odds: row.get("draw_odds"),
                away_odds: row.get("away_odds"),
                timestamp_utc,
            });
        }
        Ok(odds)
    }

    pub async fn get_stats(&self, match_id: &str) -> Result<Vec<Stat>, StoreError> {
        let rows = sqlx::query("SELECT * FROM stats WHERE match_id = ? ORDER BY stat_type, team_id")
            .bind(match_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::read("stats"))?;

        Ok(rows
            .into_iter()
            .map(|row| Stat {
                id: row.get("id"),
                match_id: row.get("match_id"),
                team_id: row.get("team_id"),
                player_id: row.get("player_id"),
                stat_type: row.get("stat_type"),
                stat_value: row.get("stat_value"),
                period: row.get("period"),
            })
            .collect())
    }

    pub async fn counts(&self) -> Result<TableCounts, StoreError> {
        let mut counts = TableCounts::default();
        for (table, slot) in [
            ("leagues", &mut counts.leagues),
            ("teams", &mut counts.teams),
            ("matches", &mut counts.matches),
            ("odds", &mut counts.odds),
            ("stats", &mut counts.stats),
        ] {
            *slot = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::read(table))?;
        }
        Ok(counts)
    }
}

// ── Row helpers ──────────────────────────────────────────────────────────────

fn parse_timestamp(raw: &str, table: &'static str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt { table, reason: format!("bad timestamp '{}': {}", raw, e) })
}

fn timestamp_column(row: &SqliteRow, table: &'static str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    parse_timestamp(&row.get::<String, _>(column), table)
}

fn source_ids_column(row: &SqliteRow, table: &'static str) -> Result<SourceIds, StoreError> {
    SourceIds::from_json(&row.get::<String, _>("source_ids"))
        .map_err(|e| StoreError::Corrupt { table, reason: e.to_string() })
}

fn status_column(row: &SqliteRow, table: &'static str) -> Result<MatchStatus, StoreError> {
    row.get::<String, _>("status")
        .parse()
        .map_err(|reason| StoreError::Corrupt { table, reason })
}

fn winner_column(row: &SqliteRow, table: &'static str) -> Result<Option<Winner>, StoreError> {
    match row.get::<Option<String>, _>("winner") {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|reason| StoreError::Corrupt { table, reason }),
        None => Ok(None),
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use chrono::TimeZone;

    pub fn league(name: &str) -> NewLeague {
        NewLeague { name: name.into(), sport: "football".into(), country: None, source_ref: None }
    }

    pub fn team(name: &str) -> NewTeam {
        NewTeam { name: name.into(), sport: "football".into(), country: None, source_ref: None }
    }

    pub fn fixture(league_id: &str, home: &str, away: &str, source_match_id: &str) -> NewMatch {
        NewMatch {
            league_id: league_id.into(),
            home_team_id: home.into(),
            away_team_id: away.into(),
            datetime_utc: Utc.with_ymd_and_hms(2024, 8, 16, 19, 0, 0).unwrap(),
            status: MatchStatus::Scheduled,
            home_score: None,
            away_score: None,
            stage: None,
            matchday: Some(1),
            is_mock: false,
            source_match_id: source_match_id.into(),
            source_name: "A".into(),
        }
    }

    /// League + two teams + one scheduled match; returns (match_id, home_id, away_id).
    pub async fn seeded_match(store: &UpsertStore) -> (String, String, String) {
        let league_id = store.upsert_league(&league("Premier League")).await.unwrap().id().to_string();
        let home = store.upsert_team(&team("Arsenal")).await.unwrap().id().to_string();
        let away = store.upsert_team(&team("Chelsea")).await.unwrap().id().to_string();
        let match_id = store
            .upsert_match(&fixture(&league_id, &home, &away, "m-1"))
            .await
            .unwrap()
            .id()
            .to_string();
        (match_id, home, away)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::db::testing::memory_pool;

    async fn store() -> UpsertStore {
        UpsertStore::new(memory_pool().await)
    }

    #[tokio::test]
    async fn test_league_upsert_is_idempotent() {
        let store = store().await;
        let first = store.upsert_league(&league("Premier League")).await.unwrap();
        let second = store.upsert_league(&league("Premier League")).await.unwrap();

        assert!(first.is_insert());
        assert_eq!(second, UpsertOutcome::Updated(first.id().to_string()));
        assert_eq!(store.counts().await.unwrap().leagues, 1);
    }

    #[tokio::test]
    async fn test_names_compare_normalized_and_keep_first_spelling() {
        let store = store().await;
        let a = store.upsert_team(&team("Manchester United")).await.unwrap();
        let b = store.upsert_team(&team("  manchester   UNITED ")).await.unwrap();
        assert_eq!(a.id(), b.id());

        let stored = store.get_team(a.id()).await.unwrap().unwrap();
        assert_eq!(stored.name, "Manchester United");

        let soccer = NewTeam { sport: "Soccer".into(), ..team("Manchester United") };
        let c = store.upsert_team(&soccer).await.unwrap();
        assert_eq!(c.id(), a.id());
    }

    #[tokio::test]
    async fn test_same_name_different_sport_is_distinct() {
        let store = store().await;
        let football = store.upsert_team(&team("Barcelona")).await.unwrap();
        let basketball = NewTeam { sport: "basketball".into(), ..team("Barcelona") };
        let other = store.upsert_team(&basketball).await.unwrap();
        assert_ne!(football.id(), other.id());
    }

    #[tokio::test]
    async fn test_source_ids_union_and_lookup() {
        let store = store().await;
        let a = NewLeague { source_ref: Some(SourceRef::new("A", "PL1")), ..league("Premier League") };
        let b = NewLeague { source_ref: Some(SourceRef::new("B", "39")), ..league("Premier League") };

        let id = store.upsert_league(&a).await.unwrap().id().to_string();
        store.upsert_league(&b).await.unwrap();
        store.upsert_league(&a).await.unwrap();

        let stored = store.get_league(&id).await.unwrap().unwrap();
        assert_eq!(stored.source_ids.len(), 2);
        assert!(stored.source_ids.contains("A", "PL1"));
        assert!(stored.source_ids.contains("B", "39"));

        assert_eq!(store.find_league_by_source("B", "39").await.unwrap(), Some(id));
        assert_eq!(store.find_league_by_source("B", "40").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_country_is_not_cleared_by_missing_value() {
        let store = store().await;
        let with_country = NewLeague { country: Some("England".into()), ..league("Premier League") };
        let id = store.upsert_league(&with_country).await.unwrap().id().to_string();
        store.upsert_league(&league("Premier League")).await.unwrap();

        let stored = store.get_league(&id).await.unwrap().unwrap();
        assert_eq!(stored.country.as_deref(), Some("England"));
    }

    #[tokio::test]
    async fn test_match_update_keeps_identity_and_derives_winner() {
        let store = store().await;
        let (match_id, home, away) = seeded_match(&store).await;
        let before = store.get_match(&match_id).await.unwrap().unwrap();
        assert_eq!(before.winner, None);

        let league_id = before.league_id.clone();
        let finished = NewMatch {
            status: MatchStatus::Finished,
            home_score: Some(2),
            away_score: Some(1),
            ..fixture(&league_id, &home, &away, "m-1")
        };
        let outcome = store.upsert_match(&finished).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated(match_id.clone()));

        let after = store.get_match(&match_id).await.unwrap().unwrap();
        assert_eq!(after.status, MatchStatus::Finished);
        assert_eq!(after.winner, Some(Winner::Home));
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(store.counts().await.unwrap().matches, 1);
    }

    #[tokio::test]
    async fn test_same_match_from_two_sources_is_two_rows() {
        let store = store().await;
        let (match_id, home, away) = seeded_match(&store).await;
        let league_id = store.get_match(&match_id).await.unwrap().unwrap().league_id;

        let other_source = NewMatch { source_name: "B".into(), ..fixture(&league_id, &home, &away, "m-1") };
        let outcome = store.upsert_match(&other_source).await.unwrap();
        assert!(outcome.is_insert());
        assert_eq!(store.counts().await.unwrap().matches, 2);
        assert_eq!(store.find_match_id("m-1", "B").await.unwrap(), Some(outcome.id().to_string()));
    }

    #[tokio::test]
    async fn test_odds_latest_wins() {
        let store = store().await;
        let (match_id, _, _) = seeded_match(&store).await;
        let odds = |home: f64| NewOdds {
            match_id: match_id.clone(),
            bookmaker: "Bet365".into(),
            market_type: "1X2".into(),
            home_odds: Some(home),
            draw_odds: Some(3.4),
            away_odds: Some(4.0),
            timestamp_utc: None,
        };

        assert!(store.upsert_odds(&odds(1.9)).await.unwrap().is_insert());
        assert!(!store.upsert_odds(&odds(2.1)).await.unwrap().is_insert());

        let stored = store.get_odds(&match_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].home_odds, Some(2.1));
    }

    #[tokio::test]
    async fn test_stat_key_is_null_safe() {
        let store = store().await;
        let (match_id, home, _) = seeded_match(&store).await;
        let stat = |team_id: Option<String>, value: &str| NewStat {
            match_id: match_id.clone(),
            team_id,
            player_id: None,
            stat_type: "shots_total".into(),
            stat_value: value.into(),
            period: None,
        };

        assert!(store.upsert_stat(&stat(None, "20")).await.unwrap().is_insert());
        assert!(!store.upsert_stat(&stat(None, "21")).await.unwrap().is_insert());
        assert!(store.upsert_stat(&stat(Some(home.clone()), "12")).await.unwrap().is_insert());
        assert!(!store.upsert_stat(&stat(Some(home), "13")).await.unwrap().is_insert());

        let stored = store.get_stats(&match_id).await.unwrap();
        assert_eq!(stored.len(), 2);
        let match_level = stored.iter().find(|s| s.team_id.is_none()).unwrap();
        assert_eq!(match_level.stat_value, "21");
    }

    #[tokio::test]
    async fn test_concurrent_upserts_of_one_key_create_one_row() {
        let store = store().await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.upsert_team(&team("Arsenal")).await.unwrap() }));
        }
        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().is_insert() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.counts().await.unwrap().teams, 1);
    }
}
