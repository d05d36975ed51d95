use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::parser::{self, ParseFeedError};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;

const USER_AGENT: &str = "MarketWire/1.0 (RSS Aggregator)";

/// One normalized feed item. Two entries are the same item iff their links match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub source_name: String,
}

/// Failures that cost a source its whole contribution to a cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("source answered with HTTP {0}")]
    HttpStatus(u16),

    #[error("source is not a valid feed: {0}")]
    Malformed(#[from] ParseFeedError),

    #[error("source did not answer within {0:?}")]
    TimedOut(Duration),
}

/// Failures that drop a single item while its siblings survive.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("entry '{0}' has no link")]
    MissingLink(String),

    #[error("entry '{0}' has no usable publish date")]
    MissingPublished(String),
}

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &FeedConfig) -> Result<Vec<Entry>, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, source: &FeedConfig) -> Result<Vec<Entry>, FetchError> {
        debug!(source = %source.name, url = %source.url, "fetching feed");

        let response = self.client.get(&source.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        parse_entries(source, &bytes)
    }
}

/// Parse an RSS/Atom document into entries attributed to `source`.
///
/// Items without a link or a publish date are dropped; the rest of the
/// document still yields entries.
pub fn parse_entries(source: &FeedConfig, bytes: &[u8]) -> Result<Vec<Entry>, FetchError> {
    let parsed = parser::parse(bytes)?;

    let mut entries = Vec::with_capacity(parsed.entries.len());
    for item in parsed.entries {
        match entry_from_item(source, item) {
            Ok(entry) => entries.push(entry),
            Err(e) => debug!(source = %source.name, error = %e, "dropping malformed entry"),
        }
    }

    Ok(entries)
}

pub fn entry_from_item(
    source: &FeedConfig,
    item: feed_rs::model::Entry,
) -> Result<Entry, EntryError> {
    let title = item
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let link = item
        .links
        .into_iter()
        .next()
        .map(|l| l.href)
        .filter(|href| !href.is_empty())
        .ok_or_else(|| EntryError::MissingLink(title.clone()))?;

    // Atom feeds often carry only <updated>
    let published_at = item
        .published
        .or(item.updated)
        .ok_or_else(|| EntryError::MissingPublished(title.clone()))?;

    Ok(Entry {
        title,
        link,
        published_at,
        source_name: source.name.clone(),
    })
}

/// Run one fetch under a hard deadline, whatever the fetcher's own timeouts.
///
/// Failures are logged here; the caller treats `Err` as an empty contribution.
pub async fn fetch_with_deadline(
    fetcher: &dyn FeedFetcher,
    source: &FeedConfig,
    deadline: Duration,
) -> Result<Vec<Entry>, FetchError> {
    let result = match tokio::time::timeout(deadline, fetcher.fetch(source)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::TimedOut(deadline)),
    };

    match &result {
        Ok(entries) => info!(source = %source.name, count = entries.len(), "fetched feed"),
        Err(e) => warn!(source = %source.name, error = %e, "feed contributes no entries this cycle"),
    }

    result
}
