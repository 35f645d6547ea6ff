use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// A value that must never reach a log line or an output record.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Login for the browser transport. Opaque to everything but the transport.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Secret,
}

/// Secrets and endpoints loaded from environment variables.
/// Scrape tuning lives in the TOML [`ScrapeTuning`] file.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub apify_api_key: Option<Secret>,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<Secret>,
    pub credentials: Option<Credentials>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let credentials = match (
            std::env::var("INSTAGRAM_USERNAME").ok(),
            std::env::var("INSTAGRAM_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) if !username.is_empty() => Some(Credentials {
                username,
                password: Secret::new(password),
            }),
            _ => None,
        };

        let config = Self {
            apify_api_key: secret_env("APIFY_API_KEY"),
            browserless_url: std::env::var("BROWSERLESS_URL").ok().filter(|v| !v.is_empty()),
            browserless_token: secret_env("BROWSERLESS_TOKEN"),
            credentials,
        };

        config.log_keys();
        config
    }

    fn log_keys(&self) {
        fn presence<T>(val: &Option<T>) -> &'static str {
            if val.is_some() {
                "<set>"
            } else {
                "<not set>"
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  APIFY_API_KEY: {}", presence(&self.apify_api_key));
        tracing::info!(
            "  BROWSERLESS_URL: {}",
            self.browserless_url.as_deref().unwrap_or("<not set>")
        );
        tracing::info!("  BROWSERLESS_TOKEN: {}", presence(&self.browserless_token));
        tracing::info!("  INSTAGRAM credentials: {}", presence(&self.credentials));
    }
}

fn secret_env(key: &str) -> Option<Secret> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .map(Secret::new)
}

/// Tuning knobs for a scrape, loaded from TOML. Every field has a default so
/// the file may set only what it needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrapeTuning {
    /// Consecutive reads at the same revealed-comment count that end collection.
    pub stagnation_limit: u32,
    /// Hard ceiling on collection steps per post.
    pub max_collect_steps: u32,
    pub comment_step_delay_ms: u64,
    /// Minimum pause before each detail fetch.
    pub detail_delay_ms: u64,
    /// Deadline for one page, scroll or comment read.
    pub fetch_timeout_secs: u64,
    /// Deadline for calls that wait on a whole scraper run: opening the feed
    /// and opening a post's comments.
    pub run_timeout_secs: u64,
    /// Items per batch for paged transports.
    pub page_size: u32,
    /// Most posts the API transport asks the scraper for.
    pub post_limit: u32,
    pub comment_page_size: u32,
    pub max_comments_per_post: Option<u32>,
    pub scroll_delay_ms: u64,
    /// Advances without new links before the browser feed counts as exhausted.
    pub stale_scroll_limit: u32,
    pub batch_retries: u32,
    pub max_batches: Option<u32>,
    pub reels_only: bool,
    /// Offset in which window dates and record Date/Time are evaluated.
    pub utc_offset_minutes: i32,
}

impl Default for ScrapeTuning {
    fn default() -> Self {
        Self {
            stagnation_limit: 5,
            max_collect_steps: 200,
            comment_step_delay_ms: 1_500,
            detail_delay_ms: 2_000,
            fetch_timeout_secs: 180,
            run_timeout_secs: 1_800,
            page_size: 12,
            post_limit: 1_000,
            comment_page_size: 50,
            max_comments_per_post: Some(50),
            scroll_delay_ms: 2_500,
            stale_scroll_limit: 3,
            batch_retries: 3,
            max_batches: None,
            reels_only: false,
            utc_offset_minutes: 0,
        }
    }
}

impl ScrapeTuning {
    pub fn comment_step_delay(&self) -> Duration {
        Duration::from_millis(self.comment_step_delay_ms)
    }

    pub fn detail_delay(&self) -> Duration {
        Duration::from_millis(self.detail_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }
}

/// Load and parse a TOML tuning file.
pub fn load_tuning(path: &Path) -> Result<ScrapeTuning> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let tuning: ScrapeTuning = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(tuning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn secret_debug_is_redacted() {
        let creds = Credentials {
            username: "analyst".to_string(),
            password: Secret::new("hunter2"),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("analyst"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stagnation_limit = 3\nreels_only = true").unwrap();

        let tuning = load_tuning(file.path()).unwrap();
        assert_eq!(tuning.stagnation_limit, 3);
        assert!(tuning.reels_only);
        assert_eq!(tuning.max_collect_steps, 200);
        assert_eq!(tuning.max_comments_per_post, Some(50));
        assert_eq!(tuning.run_timeout_secs, 1_800);
    }

    #[test]
    fn run_deadline_is_separate_from_fetch_deadline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fetch_timeout_secs = 30\nrun_timeout_secs = 3600").unwrap();

        let tuning = load_tuning(file.path()).unwrap();
        assert_eq!(tuning.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(tuning.run_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stagnation_limt = 3").unwrap();

        assert!(load_tuning(file.path()).is_err());
    }
}
