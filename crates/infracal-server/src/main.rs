//! InfraCalendar: crawled pages in, deduplicated and versioned events out.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use infracal_core::InfracalConfig;
use infracal_server::{cli, routes, worker, AppState};
use infracal_store::SqliteStore;

fn resolve_data_dir() -> PathBuf {
    std::env::var("INFRACAL_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_help() {
    println!("InfraCalendar: event extraction for crawled infrastructure pages");
    println!();
    println!("Usage: infracal [command]");
    println!();
    println!("Commands:");
    println!("  serve                    Start the server (default)");
    println!("  migrate [db]             Apply pending migrations");
    println!("  validate [db]            Validate an existing database");
    println!("  ingest <file.jsonl>      Upsert one crawled page per line");
    println!("  extract [version]        Extract events from every stored page");
    println!("  search <terms...>        Full-text search over page text");
    println!("  help                     Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("serve");

    let data_dir = resolve_data_dir();
    let config = InfracalConfig::from_env(&data_dir)?;
    let db_arg = |i: usize| {
        args.get(i)
            .map(PathBuf::from)
            .unwrap_or_else(|| config.data_paths.database.clone())
    };

    match command {
        "serve" | "--serve" => {}
        "migrate" | "--migrate" => {
            let report = cli::migrate(&db_arg(2), config.busy_timeout_ms)?;
            cli::print_migration_report(&report);
            return Ok(());
        }
        "validate" | "--validate" => {
            let report = infracal_store::validate_schema(&db_arg(2));
            cli::print_schema_report(&report);
            std::process::exit(if report.is_valid() { 0 } else { 1 });
        }
        "ingest" => {
            let Some(path) = args.get(2) else {
                eprintln!("Usage: infracal ingest <file.jsonl>");
                std::process::exit(1);
            };
            let store = SqliteStore::open(&config.data_paths.database, config.busy_timeout_ms)?;
            let summary = cli::ingest_jsonl(&store, &PathBuf::from(path))?;
            println!(
                "Upserted {} page(s) from {} line(s), {} skipped",
                summary.upserted, summary.lines, summary.skipped
            );
            return Ok(());
        }
        "extract" => {
            let version = args
                .get(2)
                .cloned()
                .unwrap_or_else(|| config.default_extractor.clone());
            let store = SqliteStore::open(&config.data_paths.database, config.busy_timeout_ms)?;
            let report = cli::extract_all(&store, &version)?;
            cli::print_extraction_report(&report);
            return Ok(());
        }
        "search" => {
            if args.len() < 3 {
                eprintln!("Usage: infracal search <terms...>");
                std::process::exit(1);
            }
            let store = SqliteStore::open(&config.data_paths.database, config.busy_timeout_ms)?;
            cli::search(&store, &args[2..], 20)?;
            return Ok(());
        }
        "--help" | "-h" | "help" => {
            print_help();
            return Ok(());
        }
        other => {
            eprintln!("Unknown command: {}. Use 'infracal help' for usage.", other);
            std::process::exit(1);
        }
    }

    info!("Data directory: {}", data_dir.display());
    let port = config.port;

    // Opening the store applies pending migrations; a failed unit aborts startup.
    let store = SqliteStore::open(&config.data_paths.database, config.busy_timeout_ms)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;

    let state = Arc::new(AppState::new(config, store));
    worker::start_extract_worker(state.clone());

    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("InfraCalendar server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
