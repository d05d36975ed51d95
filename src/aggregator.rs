//! The aggregation cycle: fan out one fetch per source, wait for all of them,
//! then sort and merge the results against what is already on display.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::config::{Config, FeedConfig, MergeMode};
use crate::fetcher::{fetch_with_deadline, Entry, FeedFetcher, FetchError};

/// Links currently on display. Owned by the aggregator, never read back from the sink.
#[derive(Debug, Default, Clone)]
pub struct DisplayedSet {
    links: HashSet<String>,
}

impl DisplayedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, link: &str) -> bool {
        self.links.contains(link)
    }

    /// Returns false when the link was already present.
    pub fn insert(&mut self, link: &str) -> bool {
        if self.links.contains(link) {
            return false;
        }
        self.links.insert(link.to_string())
    }

    pub fn replace_with(&mut self, links: HashSet<String>) {
        self.links = links;
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// One cycle's output, newest entry first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Batch {
    /// Complete replacement of the displayed records.
    Replace(Vec<Entry>),
    /// Records to insert above the ones already displayed.
    Insert(Vec<Entry>),
}

impl Batch {
    pub fn entries(&self) -> &[Entry] {
        match self {
            Batch::Replace(entries) | Batch::Insert(entries) => entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sources: usize,
    pub failed_sources: usize,
    pub fetched: usize,
    pub published: usize,
}

/// A merged cycle waiting to be published.
#[derive(Debug)]
pub struct PendingCycle {
    pub batch: Batch,
    pub report: CycleReport,
    /// The displayed set as it stands once `batch` is on screen
    pub displayed: DisplayedSet,
}

#[derive(Debug, Clone, Copy)]
pub struct CycleOptions {
    /// Hard per-source deadline
    pub fetch_timeout: Duration,
    /// Cap on fetches in flight; `None` runs one per source
    pub max_concurrent: Option<usize>,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(15),
            max_concurrent: None,
        }
    }
}

pub struct Aggregator {
    fetcher: Arc<dyn FeedFetcher>,
    sources: Vec<FeedConfig>,
    mode: MergeMode,
    options: CycleOptions,
    displayed: DisplayedSet,
}

impl Aggregator {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        sources: Vec<FeedConfig>,
        mode: MergeMode,
        options: CycleOptions,
    ) -> Self {
        Self {
            fetcher,
            sources,
            mode,
            options,
            displayed: DisplayedSet::new(),
        }
    }

    pub fn from_config(fetcher: Arc<dyn FeedFetcher>, config: &Config) -> Self {
        let options = CycleOptions {
            fetch_timeout: config.request_timeout(),
            max_concurrent: config.max_concurrent_fetches,
        };
        Self::new(fetcher, config.feeds.clone(), config.mode, options)
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    pub fn sources(&self) -> &[FeedConfig] {
        &self.sources
    }

    pub fn displayed(&self) -> &DisplayedSet {
        &self.displayed
    }

    /// Fetch every source, then sort and merge against a copy of the displayed
    /// set. Never fails: a broken source contributes nothing and an all-broken
    /// cycle yields an empty batch. Nothing changes until [`Aggregator::commit`].
    pub async fn run_cycle(&self) -> PendingCycle {
        let results = self.fetch_all().await;

        let failed_sources = results.iter().filter(|r| r.is_err()).count();
        let mut entries: Vec<Entry> = results
            .into_iter()
            .flat_map(|result| result.unwrap_or_default())
            .collect();
        let fetched = entries.len();

        sort_newest_first(&mut entries);

        let mut displayed = self.displayed.clone();
        let batch = match self.mode {
            MergeMode::Resync => Batch::Replace(merge_resync(entries, &mut displayed)),
            MergeMode::Incremental => Batch::Insert(merge_incremental(entries, &mut displayed)),
        };

        let report = CycleReport {
            sources: self.sources.len(),
            failed_sources,
            fetched,
            published: batch.len(),
        };

        PendingCycle {
            batch,
            report,
            displayed,
        }
    }

    /// Record a cycle's links as displayed. Call once its batch reached the sink.
    pub fn commit(&mut self, displayed: DisplayedSet) {
        self.displayed = displayed;
    }

    async fn fetch_all(&self) -> Vec<Result<Vec<Entry>, FetchError>> {
        let cap = self
            .options
            .max_concurrent
            .unwrap_or(self.sources.len())
            .max(1);
        let fetcher = self.fetcher.as_ref();
        let deadline = self.options.fetch_timeout;

        let fetches: Vec<_> = self
            .sources
            .iter()
            .map(|source| fetch_with_deadline(fetcher, source, deadline))
            .collect();

        stream::iter(fetches).buffered(cap).collect().await
    }
}

/// Stable sort, most recent first; equal timestamps keep fetch order.
pub fn sort_newest_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

/// Keep the first occurrence of every link and make the batch the new displayed set.
pub fn merge_resync(entries: Vec<Entry>, displayed: &mut DisplayedSet) -> Vec<Entry> {
    let mut seen = HashSet::with_capacity(entries.len());
    let batch: Vec<Entry> = entries
        .into_iter()
        .filter(|entry| seen.insert(entry.link.clone()))
        .collect();

    displayed.replace_with(seen);
    batch
}

/// Keep only entries whose link has never been displayed, recording them as displayed.
pub fn merge_incremental(entries: Vec<Entry>, displayed: &mut DisplayedSet) -> Vec<Entry> {
    entries
        .into_iter()
        .filter(|entry| displayed.insert(&entry.link))
        .collect()
}
