use chrono::{Days, NaiveDate, NaiveTime};
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::models::MatchView;
use crate::utils::normalize_name;

fn day_start(date: NaiveDate) -> String {
    date.and_time(NaiveTime::MIN).and_utc().to_rfc3339()
}

/// Matches joined with league and team names, oldest first. `leagues` are
/// compared by normalized name; an empty slice means every league. `to` is
/// inclusive.
pub async fn matches_for_analysis(
    pool: &SqlitePool,
    leagues: &[String],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<MatchView>, StoreError> {
    let mut sql = String::from(
        r#"SELECT m.id, m.datetime_utc, m.status, m.home_score, m.away_score, m.winner,
                  m.stage, m.matchday, m.is_mock, m.source_name,
                  l.name AS league_name, l.sport AS sport,
                  h.name AS home_team_name, a.name AS away_team_name
           FROM matches m
           JOIN leagues l ON l.id = m.league_id
           JOIN teams h ON h.id = m.home_team_id
           JOIN teams a ON a.id = m.away_team_id
           WHERE 1 = 1"#,
    );

    if !leagues.is_empty() {
        let placeholders = vec!["?"; leagues.len()].join(", ");
        sql.push_str(&format!(" AND l.name_key IN ({})", placeholders));
    }
    if from.is_some() {
        sql.push_str(" AND m.datetime_utc >= ?");
    }
    if to.is_some() {
        sql.push_str(" AND m.datetime_utc < ?");
    }
    sql.push_str(" ORDER BY m.datetime_utc ASC, m.id ASC");

    let mut query = sqlx::query(&sql);
    for league in leagues {
        query = query.bind(normalize_name(league));
    }
    if let Some(from) = from {
        query = query.bind(day_start(from));
    }
    if let Some(to) = to {
        let end = to.checked_add_days(Days::new(1)).unwrap_or(to);
        query = query.bind(day_start(end));
    }

    let rows = query.fetch_all(pool).await.map_err(StoreError::read("matches"))?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let raw_datetime: String = row.get("datetime_utc");
        let datetime_utc = chrono::DateTime::parse_from_rfc3339(&raw_datetime)
            .map_err(|e| StoreError::Corrupt { table: "matches", reason: e.to_string() })?
            .with_timezone(&chrono::Utc);
        let status = row
            .get::<String, _>("status")
            .parse()
            .map_err(|reason| StoreError::Corrupt { table: "matches", reason })?;
        let winner = match row.get::<Option<String>, _>("winner") {
            Some(raw) => Some(raw.parse().map_err(|reason| StoreError::Corrupt { table: "matches", reason })?),
            None => None,
        };

        views.push(MatchView {
            match_id: row.get("id"),
            datetime_utc,
            league_name: row.get("league_name"),
            sport: row.get("sport"),
            home_team_name: row.get("home_team_name"),
            away_team_name: row.get("away_team_name"),
            status,
            home_score: row.get("home_score"),
            away_score: row.get("away_score"),
            winner,
            stage: row.get("stage"),
            matchday: row.get("matchday"),
            is_mock: row.get::<i64, _>("is_mock") != 0,
            source_name: row.get("source_name"),
        });
    }
    Ok(views)
}
