use scraper_core::{CoreError, ScrapeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// What the CLI prints after a successful scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeSummary {
    pub ok: bool,
    pub subreddit: String,
    pub targets: Vec<String>,
    pub matched_post_count: usize,
    pub total_scanned: usize,
    pub file_path: PathBuf,
}

impl ScrapeSummary {
    pub fn new(result: &ScrapeResult, file_path: PathBuf) -> Self {
        Self {
            ok: true,
            subreddit: result.subreddit.clone(),
            targets: result.targets.clone(),
            matched_post_count: result.matched_post_count,
            total_scanned: result.total_scanned,
            file_path,
        }
    }
}

/// What the CLI prints when a scrape fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeFailure {
    pub ok: bool,
    pub error: String,
}

impl ScrapeFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

/// `<subreddit>-<unix millis>.json`, with `subreddit` as the stem when the
/// name is empty.
pub fn result_file_name(subreddit: &str, timestamp_millis: i64) -> String {
    let stem: String = subreddit
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = if stem.is_empty() { "subreddit" } else { &stem };
    format!("{}-{}.json", stem, timestamp_millis)
}

/// Writes `result` as pretty JSON into `dir`, creating it if needed.
pub async fn write_result(result: &ScrapeResult, dir: &Path) -> Result<PathBuf, CoreError> {
    tokio::fs::create_dir_all(dir).await?;

    let file_name = result_file_name(&result.subreddit, chrono::Utc::now().timestamp_millis());
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(result)?;
    tokio::fs::write(&path, json).await?;

    info!("Wrote scrape result to {}", path.display());
    Ok(path)
}
