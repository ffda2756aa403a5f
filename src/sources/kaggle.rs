use async_trait::async_trait;
use serde::Deserialize;

use super::{compact, fields, ChunkId, RawRecord, RecordKind, Selector, SourceAdapter, KAGGLE_INTL_RESULTS};
use crate::config::KaggleConfig;
use crate::error::SourceError;
use crate::utils::parse_match_datetime;

const RESULTS_FILE: &str = "results.csv";

/// One row of `results.csv` from the "International football results"
/// dataset. Scores are `NA` for fixtures not yet played.
#[derive(Debug, Deserialize)]
struct ResultRow {
    date: Option<String>,
    home_team: Option<String>,
    away_team: Option<String>,
    home_score: Option<String>,
    away_score: Option<String>,
    tournament: Option<String>,
    neutral: Option<String>,
}

fn score(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse().ok())
}

/// Extracted dataset archive. Tournaments become leagues; the whole file is
/// a single chunk.
pub struct KaggleAdapter {
    config: KaggleConfig,
}

impl KaggleAdapter {
    pub fn new(config: KaggleConfig) -> Self {
        Self { config }
    }
}

fn row_records(row: &ResultRow) -> Vec<RawRecord> {
    let raw_date = row.date.as_deref().unwrap_or_default();
    let home = row.home_team.as_deref().unwrap_or_default();
    let away = row.away_team.as_deref().unwrap_or_default();
    let kick_off = parse_match_datetime(raw_date, None);
    let day = kick_off.map_or_else(|| compact(raw_date), |at| at.format("%Y%m%d").to_string());
    let source_match_id = format!("{}_{}_{}", day, compact(home), compact(away));

    let (home_score, away_score) = (score(row.home_score.as_deref()), score(row.away_score.as_deref()));
    let status = if home_score.is_some() && away_score.is_some() { "FINISHED" } else { "SCHEDULED" };

    let mut fixture = RawRecord::new(RecordKind::Match)
        .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
        .with(fields::LEAGUE_NAME, row.tournament.as_deref())
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
    let neutral = row.neutral.as_deref().map(|n| n.trim().eq_ignore_ascii_case("true"));
    if let Some(neutral) = neutral {
        records.push(
            RawRecord::new(RecordKind::Stat)
                .with(fields::SOURCE_MATCH_ID, source_match_id.as_str())
                .with(fields::STAT_TYPE, "neutral_venue")
                .with(fields::STAT_VALUE, if neutral { 1.0 } else { 0.0 }),
        );
    }
    records
}

#[async_trait]
impl SourceAdapter for KaggleAdapter {
    fn name(&self) -> &str {
        KAGGLE_INTL_RESULTS
    }

    fn chunks(&self, _selector: &Selector) -> Vec<ChunkId> {
        vec![ChunkId::new(RESULTS_FILE)]
    }

    async fn fetch_chunk(&self, chunk: &ChunkId, _selector: &Selector) -> Result<Vec<RawRecord>, SourceError> {
        let path = self.config.dataset_dir.join(chunk.as_str());
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::PartialUnavailable {
                    chunk: chunk.to_string(),
                    reason: format!("{} not found; extract the dataset archive there", path.display()),
                })
            }
            Err(source) => return Err(SourceError::Io { path, source }),
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes.as_slice());

        let mut records = Vec::new();
        for row in reader.deserialize::<ResultRow>() {
            let row = row.map_err(|e| SourceError::Parse { chunk: chunk.to_string(), reason: e.to_string() })?;
            records.extend(row_records(&row));
        }
        tracing::debug!("{}: {} records from {}", KAGGLE_INTL_RESULTS, records.len(), path.display());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS: &str = "date,home_team,away_team,home_score,away_score,tournament,city,country,neutral\n\
1872-11-30,Scotland,England,0,0,Friendly,Glasgow,Scotland,FALSE\n\
2024-07-14,Spain,England,2,1,UEFA Euro,Berlin,Germany,TRUE\n\
2026-06-11,Mexico,South Africa,NA,NA,FIFA World Cup,Mexico City,Mexico,FALSE\n";

    fn adapter(dir: &std::path::Path) -> KaggleAdapter {
        KaggleAdapter::new(KaggleConfig { dataset_dir: dir.to_path_buf() })
    }

    #[tokio::test]
    async fn test_reads_results_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RESULTS_FILE), RESULTS).unwrap();

        let records = adapter(dir.path())
            .fetch_chunk(&ChunkId::new(RESULTS_FILE), &Selector::full())
            .await
            .unwrap();
        let matches: Vec<&RawRecord> = records.iter().filter(|r| r.kind == RecordKind::Match).collect();
        assert_eq!(matches.len(), 3);

        let final_ = matches[1];
        assert_eq!(final_.text(fields::SOURCE_MATCH_ID).as_deref(), Some("20240714_Spain_England"));
        assert_eq!(final_.text(fields::LEAGUE_NAME).as_deref(), Some("UEFA Euro"));
        assert_eq!(final_.text(fields::STATUS).as_deref(), Some("FINISHED"));

        let upcoming = matches[2];
        assert_eq!(upcoming.text(fields::STATUS).as_deref(), Some("SCHEDULED"));
        assert!(upcoming.get(fields::HOME_SCORE).is_none());

        let neutral: Vec<f64> = records
            .iter()
            .filter(|r| r.kind == RecordKind::Stat)
            .filter_map(|r| r.float(fields::STAT_VALUE))
            .collect();
        assert_eq!(neutral, vec![0.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_missing_archive_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let err = adapter(dir.path())
            .fetch_chunk(&ChunkId::new(RESULTS_FILE), &Selector::full())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::PartialUnavailable { .. }));
    }
}
