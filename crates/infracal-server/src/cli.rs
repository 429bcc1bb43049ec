//! Offline commands behind the `infracal` binary.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use infracal_extract::{ExtractionReport, Pipeline};
use infracal_store::{MigrationReport, Migrator, PageFetch, PageFilter, SchemaReport, SqliteStore};

/// Pages upserted per transaction during `ingest`.
const INGEST_BATCH: usize = 500;
/// Page limit for a command-line extraction run.
const ALL_PAGES: usize = 1_000_000;

/// Apply pending migrations to `db_path`, creating the file if needed.
pub fn migrate(db_path: &Path, busy_timeout_ms: u64) -> anyhow::Result<MigrationReport> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = rusqlite::Connection::open(db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;
    conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;
    let report = Migrator::embedded().run(&mut conn)?;
    Ok(report)
}

pub fn print_migration_report(report: &MigrationReport) {
    println!("=== InfraCalendar Migrations ===");
    println!();
    println!("Applied:            {}", report.applied.len());
    for filename in &report.applied {
        println!("  + {}", filename);
    }
    println!("Already applied:    {}", report.skipped.len());
}

pub fn print_schema_report(report: &SchemaReport) {
    println!("=== InfraCalendar Schema Report ===");
    println!();
    println!("Database:           {}", report.db_path.display());
    println!("Pages:              {}", report.pages);
    println!("Events:             {}", report.events);
    println!("Valid events:       {}", report.valid_events);
    println!("Migrations applied: {}", report.applied_migrations.len());
    println!("Migrations pending: {}", report.pending_migrations.len());
    for filename in &report.pending_migrations {
        println!("  - {}", filename);
    }

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }

    println!();
    if report.is_valid() {
        println!("Status: READY FOR USE");
    } else {
        println!("Status: INVALID");
    }
}

/// Outcome of a JSON-lines ingest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub lines: usize,
    pub upserted: usize,
    pub skipped: usize,
}

/// Upsert one crawl tuple per line of `path`. Blank lines are ignored; lines
/// that fail to parse are logged and skipped.
pub fn ingest_jsonl(store: &SqliteStore, path: &Path) -> anyhow::Result<IngestSummary> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut summary = IngestSummary::default();
    let mut batch: Vec<PageFetch> = Vec::with_capacity(INGEST_BATCH);

    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;
        match serde_json::from_str::<PageFetch>(&line) {
            Ok(fetch) => batch.push(fetch),
            Err(e) => {
                warn!("{}:{}: skipping malformed page: {}", path.display(), n + 1, e);
                summary.skipped += 1;
            }
        }
        if batch.len() >= INGEST_BATCH {
            summary.upserted += store.upsert_pages(&batch)?.len();
            batch.clear();
        }
    }
    if !batch.is_empty() {
        summary.upserted += store.upsert_pages(&batch)?.len();
    }

    info!(
        "Ingested {} page(s) from {} ({} skipped)",
        summary.upserted,
        path.display(),
        summary.skipped
    );
    Ok(summary)
}

/// Extract every stored page with `version`.
pub fn extract_all(store: &SqliteStore, version: &str) -> anyhow::Result<ExtractionReport> {
    let filter = PageFilter {
        config_id: None,
        limit: Some(ALL_PAGES),
    };
    Ok(Pipeline::new(store).run(&filter, version)?)
}

pub fn print_extraction_report(report: &ExtractionReport) {
    println!("=== Extraction ({}) ===", report.extraction_version);
    println!();
    println!("Pages:              {}", report.pages);
    println!("Candidates:         {}", report.candidates);
    println!("Inserted:           {}", report.inserted);
    println!("Unchanged:          {}", report.unchanged);
    println!("Superseded:         {}", report.superseded);
    println!("Discarded:          {}", report.discarded);
    println!("Pages w/o events:   {}", report.pages_without_events);
    if report.failed_pages > 0 {
        println!("Failed pages:       {}", report.failed_pages);
    }
}

pub fn search(store: &SqliteStore, terms: &[String], limit: usize) -> anyhow::Result<()> {
    let query = terms.join(" ");
    let hits = store.search_pages(&query, limit)?;
    if hits.is_empty() {
        println!("No pages match \"{}\"", query);
        return Ok(());
    }
    for hit in hits {
        println!("{:>6}  {:>7.3}  {}", hit.page_id, hit.score, hit.page_url);
        if !hit.snippet.is_empty() {
            println!("        {}", hit.snippet);
        }
    }
    Ok(())
}
