//! Command-line entry point for the subreddit scraper.
//!
//! Scans a subreddit's newest posts, keeps the ones that match, attaches their
//! comment trees and writes the result as JSON. A one-object summary is
//! printed to stdout; logs go to stderr.

use anyhow::Context;
use clap::Parser;
use llm_interface::{AnthropicScorer, RelevanceScorer};
use reddit_client::{RedditApiClient, RedditClientConfig};
use relevance_engine::MatchMode;
use scrape_service::{write_result, ScrapeFailure, ScrapeRequest, ScrapeService, ScrapeSummary};
use scraper_core::{AppConfig, CoreError, ErrorReporter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Scrape a subreddit for posts matching keywords or a semantic query
#[derive(Parser, Debug)]
#[command(name = "subreddit-scraper")]
#[command(version)]
#[command(about = "Scan a subreddit's newest posts and save the matching threads", long_about = None)]
struct Cli {
    /// Subreddit to scan, without the `r/` prefix
    #[arg(value_name = "SUBREDDIT")]
    subreddit: String,

    /// Keyword to look for (repeatable)
    #[arg(short = 't', long = "target", value_name = "TARGET")]
    targets: Vec<String>,

    /// Stop after this many matching posts
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// keyword, semantic or hybrid
    #[arg(long, default_value = "keyword")]
    mode: MatchMode,

    /// Query handed to the scorer in semantic and hybrid modes
    #[arg(long, value_name = "Q")]
    query: Option<String>,

    /// Minimum score for a semantic match (defaults to the config value)
    #[arg(long, value_name = "F")]
    threshold: Option<f64>,

    /// Maximum number of scorer calls (defaults to the config value)
    #[arg(long, value_name = "N")]
    max_calls: Option<u32>,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Where to write the result file
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli).await {
        Ok(summary) => {
            let json = serde_json::to_string_pretty(&summary).context("serializing summary")?;
            println!("{}", json);
            Ok(())
        }
        Err(e) => {
            ErrorReporter::new().report_error(&e);
            let failure = ScrapeFailure::new(e.to_string());
            let json = serde_json::to_string_pretty(&failure).context("serializing failure")?;
            println!("{}", json);
            Err(anyhow::Error::new(e).context("scrape failed"))
        }
    }
}

/// `RUST_LOG` wins when set; otherwise `-v` picks the level.
fn setup_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("subreddit_scraper=info,scrape_service=info,reddit_client=info,warn"),
        1 => EnvFilter::new(
            "subreddit_scraper=debug,scrape_service=debug,reddit_client=debug,\
             relevance_engine=debug,llm_interface=debug,info",
        ),
        _ => EnvFilter::new("debug"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ScrapeSummary, CoreError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    tracing::debug!(scrape = ?config.scrape, "Configuration loaded");

    let scorer: Option<Arc<dyn RelevanceScorer>> = if cli.mode.uses_scorer() {
        Some(Arc::new(AnthropicScorer::from_config(&config.anthropic)?))
    } else {
        None
    };

    let client = RedditApiClient::new(RedditClientConfig::from_app_config(&config)?)?;
    let service = ScrapeService::from_config(Arc::new(client), &config.scrape);

    let request = ScrapeRequest::new(cli.subreddit, cli.targets)
        .with_limit(cli.limit)
        .with_mode(cli.mode)
        .with_query(cli.query)
        .with_threshold(cli.threshold.unwrap_or(config.scrape.threshold))
        .with_max_calls(cli.max_calls.unwrap_or(config.scrape.max_semantic_calls));

    let result = service.scrape(request, scorer).await?;

    let output_dir = cli.output_dir.unwrap_or_else(|| config.output_dir());
    let file_path = write_result(&result, &output_dir).await?;

    Ok(ScrapeSummary::new(&result, file_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_full_invocation() {
        let cli = Cli::try_parse_from([
            "subreddit-scraper",
            "rust",
            "-t",
            "tokio",
            "--target",
            "async",
            "--limit",
            "10",
            "--mode",
            "hybrid",
            "--query",
            "async runtimes",
            "--threshold",
            "0.7",
            "--max-calls",
            "5",
            "--output-dir",
            "/tmp/out",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.subreddit, "rust");
        assert_eq!(cli.targets, vec!["tokio".to_string(), "async".to_string()]);
        assert_eq!(cli.limit, Some(10));
        assert_eq!(cli.mode, MatchMode::Hybrid);
        assert_eq!(cli.threshold, Some(0.7));
        assert_eq!(cli.max_calls, Some(5));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["subreddit-scraper", "rust"]).unwrap();
        assert_eq!(cli.mode, MatchMode::Keyword);
        assert!(cli.targets.is_empty());
        assert!(cli.limit.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["subreddit-scraper", "rust", "--mode", "fuzzy"]).is_err());
    }
}
