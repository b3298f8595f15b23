use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use paperlog_core::{AppConfig, MemoryPaperStore, PaperStore, SqlitePaperStore};
use paperlog_science::{PaperRecord, Resolver, ScienceError};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "paperlog",
    about = "Resolve DOIs and PMIDs into reconciled paper metadata",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format. Also enabled by setting PAPERLOG_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Paper database to use instead of the configured one.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Keep papers in memory only; nothing is written to disk.
    #[arg(long, global = true, conflicts_with = "db")]
    memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a DOI (bare, `doi:` labelled, or a doi.org URL).
    Resolve { doi: String },

    /// Resolve a PubMed ID through its DOI.
    Pmid { pmid: String },

    /// Keyword search; supports "phrases", field:value, AND/OR/NOT.
    Search {
        query: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Fetch and store the DOIs of papers citing a DOI.
    Citing { doi: String },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all config values.
    List,
    /// Get a specific config key.
    Get { key: String },
    /// Print the config file path.
    Path,
    /// Write the current settings to the config file.
    Init,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();
    let cli = Cli::parse();
    init_tracing();

    let json_output = cli.json || std::env::var("PAPERLOG_JSON").as_deref() == Ok("1");
    let config = AppConfig::load()?;

    match cli.command {
        Commands::Resolve { doi } => {
            let resolver = open_resolver(&config, cli.db, cli.memory)?;
            let outcome = resolver.try_resolve_by_doi(&doi).await;
            report_record(outcome, json_output, start)?;
            // let background citing-paper discovery finish before exit
            resolver.wait_for_background().await;
        }

        Commands::Pmid { pmid } => {
            let resolver = open_resolver(&config, cli.db, cli.memory)?;
            let outcome = resolver.try_resolve_by_pmid(&pmid).await;
            report_record(outcome, json_output, start)?;
            // let background citing-paper discovery finish before exit
            resolver.wait_for_background().await;
        }

        Commands::Search { query, limit } => {
            let resolver = open_resolver(&config, cli.db, cli.memory)?;
            let results = resolver.search_by_keywords(&query, limit).await;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": results, "total": results.len(), "query": query },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if results.is_empty() {
                println!("No results for: {query}");
            } else {
                println!("Found {} results:", results.len());
                for record in &results {
                    let cites = record
                        .citation_count
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "  {key:<36}  {cites:>6}  {title}",
                        key = record.key.to_string(),
                        title = record.title.as_deref().unwrap_or("(untitled)"),
                    );
                }
            }
        }

        Commands::Citing { doi } => {
            let resolver = open_resolver(&config, cli.db, cli.memory)?;
            match resolver.discover_citing(&doi).await {
                Ok(citing) => {
                    let dur = start.elapsed().as_millis();
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": { "doi": doi, "citing": citing, "total": citing.len() },
                            "meta": { "duration_ms": dur }
                        }))?;
                    } else if citing.is_empty() {
                        println!("No citing papers found for {doi}");
                    } else {
                        for d in &citing {
                            println!("{d}");
                        }
                    }
                }
                Err(e) => fail(&e, json_output, start)?,
            }
        }

        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::List => {
                    let kv = config_key_values(&config);
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":kv,"meta":{"duration_ms":dur}}))?;
                    } else {
                        for (k, v) in &kv {
                            println!("{k} = {v}");
                        }
                    }
                }
                ConfigAction::Get { key } => {
                    let kv = config_key_values(&config);
                    match kv.get(key.as_str()) {
                        Some(val) => {
                            if json_output {
                                print_json(&serde_json::json!({"status":"ok","data":{"key":key,"value":val},"meta":{"duration_ms":dur}}))?;
                            } else {
                                println!("{val}");
                            }
                        }
                        None => {
                            eprintln!("Unknown config key: {key}");
                            std::process::exit(2);
                        }
                    }
                }
                ConfigAction::Path => {
                    println!("{}", AppConfig::config_path().display());
                }
                ConfigAction::Init => {
                    // Env credentials are not written back to disk.
                    let path = AppConfig::config_path();
                    AppConfig::load_from(&path)?.save_to(&path)?;
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":path},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("Wrote {}", path.display());
                    }
                }
            }
        }
    }

    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Logs go to stderr so `--json` output stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("paperlog_science=info,paperlog_cli=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_resolver(config: &AppConfig, db: Option<PathBuf>, memory: bool) -> Result<Resolver> {
    let store: Arc<dyn PaperStore> = if memory {
        Arc::new(MemoryPaperStore::new())
    } else {
        let path = db.unwrap_or_else(|| config.database_path());
        tracing::debug!(path = %path.display(), "opening paper store");
        Arc::new(SqlitePaperStore::open(&path)?)
    };
    Ok(Resolver::from_config(config, store)?)
}

fn report_record(
    outcome: paperlog_science::Result<PaperRecord>,
    json_output: bool,
    start: Instant,
) -> Result<()> {
    let record = match outcome {
        Ok(record) => record,
        Err(e) => return fail(&e, json_output, start),
    };
    let dur = start.elapsed().as_millis();

    if json_output {
        print_json(&serde_json::json!({"status":"ok","data":record,"meta":{"duration_ms":dur}}))?;
    } else {
        print_record(&record);
    }
    Ok(())
}

fn print_record(record: &PaperRecord) {
    println!("{}", record.title.as_deref().unwrap_or("(untitled)"));
    println!("  id:        {}", record.key);
    if !record.authors.is_empty() {
        let names: Vec<String> = record.authors.iter().map(|a| a.display_name()).collect();
        println!("  authors:   {}", names.join(", "));
    }
    if let Some(year) = record.year {
        println!("  year:      {year}");
    }
    if let Some(venue) = record.venue() {
        println!("  venue:     {venue}");
    }
    if let Some(count) = record.citation_count {
        println!("  cited by:  {count}");
    }
    let sources: Vec<&str> = record.sources.iter().map(|s| s.as_str()).collect();
    println!("  sources:   {}", sources.join(", "));
    if let Some(text) = &record.abstract_text {
        println!();
        println!("{text}");
    }
}

/// Report a pipeline error and exit: 2 for bad input, 1 otherwise.
fn fail(err: &ScienceError, json_output: bool, start: Instant) -> Result<()> {
    let code = if err.is_input_error() { 2 } else { 1 };
    if json_output {
        let dur = start.elapsed().as_millis();
        print_json(&serde_json::json!({
            "status": "error",
            "error": error_kind(err),
            "message": err.to_string(),
            "meta": { "duration_ms": dur }
        }))?;
    } else {
        eprintln!("error: {err}");
    }
    std::process::exit(code);
}

fn error_kind(err: &ScienceError) -> &'static str {
    match err {
        ScienceError::InvalidDoi(_) => "invalid_doi",
        ScienceError::InvalidPmid(_) => "invalid_pmid",
        ScienceError::CoolingDown(_) => "cooling_down",
        ScienceError::NotFound(_) => "not_found",
        ScienceError::RateLimit(..) => "rate_limited",
        _ => "upstream_error",
    }
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn config_key_values(config: &AppConfig) -> BTreeMap<&'static str, String> {
    let mut map = BTreeMap::new();
    map.insert("config_path", AppConfig::config_path().to_string_lossy().to_string());
    map.insert("database_path", config.database_path().to_string_lossy().to_string());
    map.insert(
        "polite_email",
        config.sources.polite_email.clone().unwrap_or_default(),
    );
    map.insert(
        "semantic_scholar_api_key",
        if config.sources.semantic_scholar_api_key.is_some() { "(set)" } else { "" }.to_string(),
    );
    map.insert(
        "min_global_interval_ms",
        config.rate_limit.min_global_interval_ms.to_string(),
    );
    map.insert(
        "per_doi_cooldown_secs",
        config.rate_limit.per_doi_cooldown_secs.to_string(),
    );
    map.insert(
        "local_hit_threshold",
        config.search.local_hit_threshold.to_string(),
    );
    map
}
