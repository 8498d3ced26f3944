//! Application configuration.
//!
//! Values come from an optional TOML file and are then overridden by the
//! environment (`REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET`,
//! `REDDIT_USER_AGENT`, `ANTHROPIC_API_KEY`).

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_REDDIT_API_BASE: &str = "https://oauth.reddit.com";
pub const DEFAULT_REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-haiku-20240307";

pub const ENV_REDDIT_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_REDDIT_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_REDDIT_USER_AGENT: &str = "REDDIT_USER_AGENT";
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Reddit caps listing pages at 100 entries.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub anthropic: AnthropicConfig,
    pub scrape: ScrapeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: Option<String>,
    pub api_base_url: String,
    pub token_url: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: None,
            api_base_url: DEFAULT_REDDIT_API_BASE.to_string(),
            token_url: DEFAULT_REDDIT_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl AnthropicConfig {
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: ENV_ANTHROPIC_API_KEY.to_string(),
            })
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub page_size: u32,
    pub threshold: f64,
    pub max_semantic_calls: u32,
    pub max_resolution_passes: u32,
    pub output_dir: Option<PathBuf>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            threshold: 0.5,
            max_semantic_calls: 200,
            max_resolution_passes: 32,
            output_dir: None,
        }
    }
}

/// Credentials required to talk to Reddit, resolved from config + env.
#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads the file (if any), applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                debug!("Reading configuration from {}", path.display());
                let content = std::fs::read_to_string(path)?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to a value.
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_REDDIT_CLIENT_ID) {
            self.reddit.client_id = Some(v);
        }
        if let Some(v) = get(ENV_REDDIT_CLIENT_SECRET) {
            self.reddit.client_secret = Some(v);
        }
        if let Some(v) = get(ENV_REDDIT_USER_AGENT) {
            self.reddit.user_agent = Some(v);
        }
        if let Some(v) = get(ENV_ANTHROPIC_API_KEY) {
            self.anthropic.api_key = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("reddit.api_base_url", &self.reddit.api_base_url),
            ("reddit.token_url", &self.reddit.token_url),
            ("anthropic.base_url", &self.anthropic.base_url),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                });
            }
        }

        let scrape = &self.scrape;
        if scrape.page_size == 0 || scrape.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "scrape.page_size must be between 1 and {}, got {}",
                    MAX_PAGE_SIZE, scrape.page_size
                ),
            });
        }
        if !(0.0..=1.0).contains(&scrape.threshold) {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "scrape.threshold must be within [0, 1], got {}",
                    scrape.threshold
                ),
            });
        }
        if scrape.max_semantic_calls == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "scrape.max_semantic_calls must be positive".to_string(),
            });
        }
        if scrape.max_resolution_passes == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "scrape.max_resolution_passes must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn reddit_credentials(&self) -> Result<RedditCredentials, ConfigError> {
        let require = |value: &Option<String>, var_name: &str| {
            value
                .clone()
                .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                    var_name: var_name.to_string(),
                })
        };

        Ok(RedditCredentials {
            client_id: require(&self.reddit.client_id, ENV_REDDIT_CLIENT_ID)?,
            client_secret: require(&self.reddit.client_secret, ENV_REDDIT_CLIENT_SECRET)?,
            user_agent: require(&self.reddit.user_agent, ENV_REDDIT_USER_AGENT)?,
        })
    }

    /// Configured output directory, else `$HOME/Downloads/reddit-scraping`,
    /// else `./Downloads/reddit-scraping`.
    pub fn output_dir(&self) -> PathBuf {
        match &self.scrape.output_dir {
            Some(dir) => dir.clone(),
            None => default_output_dir(std::env::var_os("HOME").map(PathBuf::from)),
        }
    }
}

fn default_output_dir(home: Option<PathBuf>) -> PathBuf {
    let base = home
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("Downloads").join("reddit-scraping")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.reddit.api_base_url, DEFAULT_REDDIT_API_BASE);
        assert_eq!(config.scrape.page_size, 100);
        assert_eq!(config.scrape.threshold, 0.5);
        assert_eq!(config.scrape.max_semantic_calls, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [reddit]
            client_id = "abc"
            user_agent = "scraper/0.1 by tester"

            [scrape]
            threshold = 0.7
            "#,
        )
        .unwrap();

        assert_eq!(config.reddit.client_id.as_deref(), Some("abc"));
        assert_eq!(config.reddit.token_url, DEFAULT_REDDIT_TOKEN_URL);
        assert_eq!(config.scrape.threshold, 0.7);
        assert_eq!(config.scrape.max_semantic_calls, 200);
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = AppConfig::from_toml_str("[reddit]\nclient_id = \"from-file\"").unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_REDDIT_CLIENT_ID, "from-env"),
            (ENV_REDDIT_CLIENT_SECRET, "secret"),
            (ENV_REDDIT_USER_AGENT, ""),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.reddit.client_id.as_deref(), Some("from-env"));
        assert_eq!(config.reddit.client_secret.as_deref(), Some("secret"));
        assert!(config.reddit.user_agent.is_none());
    }

    #[test]
    fn test_missing_credentials() {
        let config = AppConfig::default();
        match config.reddit_credentials() {
            Err(ConfigError::MissingEnvironmentVariable { var_name }) => {
                assert_eq!(var_name, ENV_REDDIT_CLIENT_ID);
            }
            other => panic!("Expected MissingEnvironmentVariable, got {:?}", other),
        }
        assert!(config.anthropic.api_key().is_err());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.reddit.api_base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = AppConfig::default();
        config.scrape.page_size = 101;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));

        let mut config = AppConfig::default();
        config.scrape.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scrape]\nmax_resolution_passes = 4").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.scrape.max_resolution_passes, 4);
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_default_output_dir() {
        assert_eq!(
            default_output_dir(Some(PathBuf::from("/home/alice"))),
            PathBuf::from("/home/alice/Downloads/reddit-scraping")
        );

        let without_home = default_output_dir(None);
        assert!(without_home.ends_with("Downloads/reddit-scraping"));
        assert_eq!(
            without_home,
            std::env::current_dir()
                .unwrap()
                .join("Downloads")
                .join("reddit-scraping")
        );
    }

    #[test]
    fn test_output_dir_override() {
        let mut config = AppConfig::default();
        config.scrape.output_dir = Some(PathBuf::from("/tmp/out"));
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/out"));
    }
}
