//! Officine - command-line front end for the pharmacy console data layer.
//!
//! Runs the staged load against the configured API and prints what the
//! console would render, as JSON on stdout. Logs go to stderr, and to a
//! daily log file when `OFFICINE_LOG_DIR` is set.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::json;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use officine_core::{ApiClient, Category, Config, StoreState, SyncContext};

/// Directory for the optional log file
const LOG_DIR_ENV: &str = "OFFICINE_LOG_DIR";

const LOG_FILE_PREFIX: &str = "officine.log";

const USAGE: &str = "usage: officine [--search <term> [--famille <code>]] [--refresh] [--folder <path>]";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must outlive `main`'s work.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=officine_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

enum Command {
    Load,
    Search { term: String, famille: Option<String> },
    Refresh,
    Folder(String),
}

fn parse_args(args: &[String]) -> Result<Command> {
    let mut iter = args.iter().skip(1);
    let mut command = Command::Load;
    let mut famille = None;

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--search" => match iter.next() {
                Some(term) => {
                    command = Command::Search {
                        term: term.clone(),
                        famille: None,
                    }
                }
                None => bail!("--search needs a term\n{}", USAGE),
            },
            "--famille" => match iter.next() {
                Some(code) => famille = Some(code.clone()),
                None => bail!("--famille needs a code\n{}", USAGE),
            },
            "--refresh" => command = Command::Refresh,
            "--folder" => match iter.next() {
                Some(path) => command = Command::Folder(path.clone()),
                None => bail!("--folder needs a path\n{}", USAGE),
            },
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => bail!("unknown argument: {}\n{}", other, USAGE),
        }
    }

    if let Command::Search { famille: ref mut slot, .. } = command {
        *slot = famille;
    }
    Ok(command)
}

/// What the landing screen and the dashboard would show
fn summary(state: &StoreState) -> serde_json::Value {
    let errors: serde_json::Map<String, serde_json::Value> = Category::ALL
        .iter()
        .filter_map(|c| state.errors.get(*c).map(|e| (c.to_string(), json!(e))))
        .collect();

    json!({
        "initial_loaded": state.initial_loaded,
        "familles": state.familles.len(),
        "articles": {
            "shown": state.articles.len(),
            "total": state.articles_pagination.total_items,
            "low_stock": state.articles.iter().filter(|a| a.is_low_stock()).count(),
        },
        "medicaments": state.medicaments.len(),
        "medecins": state.medecins.len(),
        "ordonnances": state.ordonnances.len(),
        "statistiques": state.statistiques.as_ref(),
        "errors": errors,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;

    let mut config = Config::load()?;
    let base_url = config.api_base_url();
    info!(api = %base_url, "Officine starting");

    let client = ApiClient::with_base_url(&base_url, config.sync.http_timeout())?;
    let context = SyncContext::new(Arc::new(client), config.sync.clone());

    match command {
        Command::Load => {
            context.load_initial().wait().await;
            println!("{}", serde_json::to_string_pretty(&summary(&context.snapshot()))?);
        }
        Command::Search { term, famille } => {
            let result = context.search_articles(&term, famille.as_deref()).await?;
            let output = json!({
                "items": result.items,
                "pagination": result.pagination,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Refresh => {
            context.load_initial().wait().await;
            context.refresh_all().wait().await;
            println!("{}", serde_json::to_string_pretty(&summary(&context.snapshot()))?);
        }
        Command::Folder(path) => {
            context.select_folder(&path).await?.wait().await;
            config.last_folder = Some(path);
            config.save()?;
            println!("{}", serde_json::to_string_pretty(&summary(&context.snapshot()))?);
        }
    }

    context.shutdown();
    info!("Officine shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("officine").chain(list.iter().copied()).map(String::from).collect()
    }

    #[test]
    fn test_parse_search_with_famille() {
        match parse_args(&args(&["--famille", "ANT", "--search", "doli"])).unwrap() {
            Command::Search { term, famille } => {
                assert_eq!(term, "doli");
                assert_eq!(famille.as_deref(), Some("ANT"));
            }
            _ => panic!("expected a search"),
        }
    }

    #[test]
    fn test_parse_defaults_to_load() {
        assert!(matches!(parse_args(&args(&[])).unwrap(), Command::Load));
        assert!(matches!(parse_args(&args(&["--refresh"])).unwrap(), Command::Refresh));
    }

    #[test]
    fn test_parse_rejects_unknown_and_missing_values() {
        assert!(parse_args(&args(&["--verbose"])).is_err());
        assert!(parse_args(&args(&["--search"])).is_err());
    }

    #[test]
    fn test_summary_reports_errors() {
        let mut state = StoreState::default();
        state.errors.set(Category::Medecins, Some("hors ligne".to_string()));
        let value = summary(&state);
        assert_eq!(value["errors"]["medecins"], "hors ligne");
        assert_eq!(value["initial_loaded"], false);
    }
}
