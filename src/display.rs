use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::aggregator::Batch;
use crate::fetcher::Entry;

pub const TIME_FORMAT: &str = "%m-%d %I:%M %p";

/// Render an instant in the fixed display zone, e.g. `01-15 12:30 PM`.
pub fn format_local_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format(TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub title: String,
    pub published: String,
    pub source: String,
    pub link: String,
}

impl DisplayRow {
    pub fn from_entry(entry: Entry, offset: FixedOffset) -> Self {
        Self {
            published: format_local_time(entry.published_at, offset),
            title: entry.title,
            source: entry.source_name,
            link: entry.link,
        }
    }
}

/// Whatever renders published rows. Rows always arrive newest first.
#[async_trait]
pub trait DisplaySink: Send + Sync {
    async fn replace_all(&self, rows: Vec<DisplayRow>);

    /// Put `rows` above every existing row, leaving existing rows untouched.
    async fn insert_above(&self, rows: Vec<DisplayRow>);
}

/// Hand a batch to the sink. Returns the number of rows published.
pub async fn publish_batch(batch: Batch, sink: &dyn DisplaySink, offset: FixedOffset) -> usize {
    let to_rows = |entries: Vec<Entry>| -> Vec<DisplayRow> {
        entries
            .into_iter()
            .map(|entry| DisplayRow::from_entry(entry, offset))
            .collect()
    };

    match batch {
        Batch::Replace(entries) => {
            let rows = to_rows(entries);
            let count = rows.len();
            sink.replace_all(rows).await;
            count
        }
        Batch::Insert(entries) => {
            let rows = to_rows(entries);
            let count = rows.len();
            sink.insert_above(rows).await;
            count
        }
    }
}

#[derive(Default)]
struct BoardState {
    rows: Vec<DisplayRow>,
    last_published: Option<DateTime<Utc>>,
}

/// In-memory table backing the web view.
///
/// Rows and the publish time share one lock, so a publish lands whole or not at all.
#[derive(Default)]
pub struct NewsBoard {
    state: RwLock<BoardState>,
}

impl NewsBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Vec<DisplayRow> {
        self.state.read().await.rows.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    pub async fn last_published(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_published
    }
}

#[async_trait]
impl DisplaySink for NewsBoard {
    async fn replace_all(&self, rows: Vec<DisplayRow>) {
        debug!(rows = rows.len(), "replacing board");
        let mut state = self.state.write().await;
        state.rows = rows;
        state.last_published = Some(Utc::now());
    }

    async fn insert_above(&self, rows: Vec<DisplayRow>) {
        debug!(rows = rows.len(), "inserting rows above board");
        let mut state = self.state.write().await;
        state.rows.splice(0..0, rows);
        state.last_published = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn central() -> FixedOffset {
        FixedOffset::west_opt(6 * 3600).unwrap()
    }

    fn row(link: &str) -> DisplayRow {
        DisplayRow {
            title: link.to_uppercase(),
            published: "01-15 12:30 PM".to_string(),
            source: "S".to_string(),
            link: link.to_string(),
        }
    }

    fn entry(link: &str, hour: u32) -> Entry {
        Entry {
            title: format!("story {}", link),
            link: link.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
            source_name: "Wire".to_string(),
        }
    }

    mod format_tests {
        use super::*;

        #[test]
        fn test_central_time() {
            let at = Utc.with_ymd_and_hms(2024, 1, 15, 18, 30, 0).unwrap();
            assert_eq!(format_local_time(at, central()), "01-15 12:30 PM");
        }

        #[test]
        fn test_crosses_midnight_backwards() {
            let at = Utc.with_ymd_and_hms(2024, 3, 1, 2, 5, 0).unwrap();
            assert_eq!(format_local_time(at, central()), "02-29 08:05 PM");
        }

        #[test]
        fn test_morning_is_am() {
            let at = Utc.with_ymd_and_hms(2024, 7, 4, 15, 0, 0).unwrap();
            assert_eq!(format_local_time(at, central()), "07-04 09:00 AM");
        }

        #[test]
        fn test_row_from_entry() {
            let r = DisplayRow::from_entry(entry("x", 18), central());

            assert_eq!(r.title, "story x");
            assert_eq!(r.published, "01-15 12:00 PM");
            assert_eq!(r.source, "Wire");
            assert_eq!(r.link, "x");
        }
    }

    mod board_tests {
        use super::*;

        #[tokio::test]
        async fn test_replace_all() {
            let board = NewsBoard::new();
            board.replace_all(vec![row("a"), row("b")]).await;
            board.replace_all(vec![row("c")]).await;

            assert_eq!(board.snapshot().await, vec![row("c")]);
            assert!(board.last_published().await.is_some());
        }

        #[tokio::test]
        async fn test_insert_above_keeps_existing_rows() {
            let board = NewsBoard::new();
            board.insert_above(vec![row("x")]).await;
            board.insert_above(vec![row("z"), row("y")]).await;

            let links: Vec<_> = board.snapshot().await.into_iter().map(|r| r.link).collect();
            assert_eq!(links, vec!["z", "y", "x"]);
        }

        #[tokio::test]
        async fn test_empty_insert_still_marks_publish() {
            let board = NewsBoard::new();
            assert!(board.last_published().await.is_none());

            board.insert_above(Vec::new()).await;

            assert_eq!(board.len().await, 0);
            assert!(board.last_published().await.is_some());
        }
    }

    mod publish_tests {
        use super::*;

        #[tokio::test]
        async fn test_publish_replace() {
            let board = NewsBoard::new();
            board.insert_above(vec![row("old")]).await;

            let count = publish_batch(
                Batch::Replace(vec![entry("b", 19), entry("a", 18)]),
                &board,
                central(),
            )
            .await;

            assert_eq!(count, 2);
            let links: Vec<_> = board.snapshot().await.into_iter().map(|r| r.link).collect();
            assert_eq!(links, vec!["b", "a"]);
        }

        #[tokio::test]
        async fn test_publish_insert() {
            let board = NewsBoard::new();
            board.insert_above(vec![row("old")]).await;

            publish_batch(Batch::Insert(vec![entry("new", 19)]), &board, central()).await;

            let rows = board.snapshot().await;
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].link, "new");
            assert_eq!(rows[0].published, "01-15 01:00 PM");
            assert_eq!(rows[1], row("old"));
        }
    }
}
