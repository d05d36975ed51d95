use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{FixedOffset, Offset, Utc};
use reqwest::Url;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Seconds between the end of one cycle and the start of the next
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub mode: MergeMode,
    /// Fixed display zone, in minutes east of UTC
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    pub max_concurrent_fetches: Option<usize>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub feeds: Vec<FeedConfig>,
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_utc_offset() -> i32 {
    -6 * 60
}

fn default_request_timeout() -> u64 {
    15
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}

/// How each cycle's batch is merged into what is already on display.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Only entries with unseen links are inserted above the existing rows.
    #[default]
    Incremental,
    /// The whole display is replaced with the freshly sorted batch.
    Resync,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refresh_interval_secs == 0 {
            bail!("refresh_interval_secs must be positive");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be positive");
        }
        if self.max_concurrent_fetches == Some(0) {
            bail!("max_concurrent_fetches must be positive when set");
        }
        if offset_from_minutes(self.utc_offset_minutes).is_none() {
            bail!(
                "utc_offset_minutes {} is outside +/-23:59",
                self.utc_offset_minutes
            );
        }
        for feed in &self.feeds {
            let url = Url::parse(&feed.url)
                .with_context(|| format!("feed '{}' has an invalid url", feed.name))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("feed '{}' must use http or https, got {}", feed.name, url.scheme());
            }
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn local_offset(&self) -> FixedOffset {
        // validate() has already rejected out-of-range offsets
        offset_from_minutes(self.utc_offset_minutes).unwrap_or_else(|| Utc.fix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::from_str("feeds = []").unwrap();

        assert_eq!(config.refresh_interval_secs, 30);
        assert_eq!(config.mode, MergeMode::Incremental);
        assert_eq!(config.utc_offset_minutes, -360);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.max_concurrent_fetches, None);
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            refresh_interval_secs = 1800
            mode = "resync"

            [[feeds]]
            name = "Test Feed"
            url = "https://example.com/feed.xml"

            [[feeds]]
            name = "Another Feed"
            url = "https://example.org/rss"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.refresh_interval(), Duration::from_secs(1800));
        assert_eq!(config.mode, MergeMode::Resync);
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feeds[0].name, "Test Feed");
        assert_eq!(config.feeds[0].url, "https://example.com/feed.xml");
        assert_eq!(config.feeds[1].name, "Another Feed");
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_missing_required_fields() {
        let content = r#"
            [[feeds]]
            name = "Test Feed"
            # Missing url field
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let content = r#"
            mode = "sometimes"
            feeds = []
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let content = r#"
            refresh_interval_secs = 0
            feeds = []
        "#;

        let err = Config::from_str(content).unwrap_err();
        assert!(err.to_string().contains("refresh_interval_secs"));
    }

    #[test]
    fn test_zero_concurrency_cap_rejected() {
        let content = r#"
            max_concurrent_fetches = 0
            feeds = []
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_offset_out_of_range_rejected() {
        let content = r#"
            utc_offset_minutes = 1440
            feeds = []
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_local_offset() {
        let content = r#"
            utc_offset_minutes = 330
            feeds = []
        "#;

        let config = Config::from_str(content).unwrap();
        assert_eq!(config.local_offset().local_minus_utc(), 330 * 60);
    }

    #[test]
    fn test_non_http_url_rejected() {
        let content = r#"
            [[feeds]]
            name = "Local"
            url = "file:///etc/passwd"
        "#;

        let err = Config::from_str(content).unwrap_err();
        assert!(err.to_string().contains("Local"));
    }

    #[test]
    fn test_relative_url_rejected() {
        let content = r#"
            [[feeds]]
            name = "Relative"
            url = "/rss.xml"
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_duplicate_names_allowed() {
        let content = r#"
            [[feeds]]
            name = "CNBC - Top News"
            url = "https://www.cnbc.com/id/10001147/device/rss/rss.html"

            [[feeds]]
            name = "CNBC - Top News"
            url = "https://search.cnbc.com/rs/search/combinedcms/view.xml?partnerId=wrss01&id=100727362"
        "#;

        let config = Config::from_str(content).unwrap();
        assert_eq!(config.feeds.len(), 2);
        assert_ne!(config.feeds[0], config.feeds[1]);
    }
}
