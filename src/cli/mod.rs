use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, Utc};
use std::sync::Arc;

use crate::config::IngestConfig;
use crate::db::{init_database, matches_for_analysis, UpsertStore};
use crate::fetch::{RateLimits, ReqwestTransport};
use crate::pipeline::{Orchestrator, OrchestratorOptions, RunMode, RunReport};
use crate::sources::build_adapters;

pub async fn init_db(config: &IngestConfig) -> Result<()> {
    let pool = init_database(&config.database_url).await?;
    let counts = UpsertStore::new(pool).counts().await?;

    println!("✅ Database ready at {}", config.database_url);
    println!(
        "   {} leagues, {} teams, {} matches, {} odds, {} stats",
        counts.leagues, counts.teams, counts.matches, counts.odds, counts.stats
    );
    Ok(())
}

/// Incremental runs without an explicit date look back a few days so late
/// score corrections are picked up.
pub fn run_mode(full: bool, since: Option<NaiveDate>, config: &IngestConfig) -> RunMode {
    if full {
        return RunMode::Full;
    }
    let since = since.unwrap_or_else(|| {
        let today = Utc::now().date_naive();
        today
            .checked_sub_days(Days::new(config.incremental_lookback_days.unsigned_abs()))
            .unwrap_or(today)
    });
    RunMode::IncrementalSince(since)
}

/// Returns `true` when every selected source finished without failing.
pub async fn update(config: &IngestConfig, sources: &[String], mode: RunMode) -> Result<bool> {
    let pool = init_database(&config.database_url).await?;
    let store = UpsertStore::new(pool);
    let transport = ReqwestTransport::new(config.http_timeout).context("building HTTP client")?;
    let adapters = build_adapters(config, &RateLimits::new(), Arc::new(transport));
    let orchestrator = Orchestrator::new(store, adapters, OrchestratorOptions::from_config(config));

    println!("📥 Updating {} ({})...", sources.join(", "), mode);
    let report = orchestrator.run(sources, mode).await?;
    print_report(&report);

    Ok(!report.has_failures())
}

fn print_report(report: &RunReport) {
    for name in &report.unknown_sources {
        println!("⚠️  Unknown source '{}' was skipped", name);
    }

    for source in &report.sources {
        let icon = if source.status.is_failure() {
            "❌"
        } else if source.errors.is_empty() {
            "✅"
        } else {
            "⚠️ "
        };
        println!("{} {} [{:.1?}]", icon, source, source.elapsed);
        if source.filtered > 0 {
            println!("   {} records before the since-date were left out", source.filtered);
        }
        for (kind, count, samples) in source.errors.iter() {
            println!("   {} × {}", count, kind);
            for message in samples {
                println!("     • {}", message);
            }
        }
    }

    println!(
        "\n📊 {} added, {} updated across {} source(s) ({})",
        report.total_added(),
        report.total_updated(),
        report.sources.len(),
        report.mode
    );
}

pub fn list_sources(config: &IngestConfig) -> Result<()> {
    let transport = ReqwestTransport::new(config.http_timeout)?;
    let adapters = build_adapters(config, &RateLimits::new(), Arc::new(transport));

    println!("📋 Available sources:");
    for (name, adapter) in &adapters {
        let since = if adapter.supports_since() { "server-side" } else { "client-side" };
        let budget = config.rate_budget(name);
        println!(
            "   • {} ({} since-filter, {} req / {:?})",
            name, since, budget.requests, budget.interval
        );
    }
    println!("\n💡 Run `sportsync update --sources <name>[,<name>]` or `--sources all`");
    Ok(())
}

pub async fn show_matches(
    config: &IngestConfig,
    leagues: &[String],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let pool = init_database(&config.database_url).await?;
    let matches = matches_for_analysis(&pool, leagues, from, to).await?;

    if matches.is_empty() {
        println!("📭 No matches found. Try fetching data first with: sportsync update --sources mock_feed --full");
        return Ok(());
    }

    println!("⚽ {} matches:\n", matches.len());
    for m in &matches {
        let score = match (m.home_score, m.away_score) {
            (Some(h), Some(a)) => format!("{}-{}", h, a),
            _ => "vs".to_string(),
        };
        println!(
            "{}  {:<24} {:>24} {:^5} {:<24} {}{}",
            m.datetime_utc.format("%Y-%m-%d %H:%M"),
            m.league_name,
            m.home_team_name,
            score,
            m.away_team_name,
            m.status,
            if m.is_mock { " (mock)" } else { "" }
        );
    }
    Ok(())
}
