//! Window-bounded paper fetching over a paginated, newest-first feed.

use dailypapers_core::{Error, FeedRecord, FetchWindow, Paper, PaperFeed};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// `(t1) OR (t2) ...`
pub fn build_query(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("({t})"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Feed-native submission-date clause for a window, e.g.
/// `submittedDate:[202405021800 TO 202405031800]`.
pub fn date_range_term(window: &FetchWindow) -> String {
    format!(
        "submittedDate:[{} TO {}]",
        window.start.format("%Y%m%d%H%M"),
        window.end.format("%Y%m%d%H%M")
    )
}

#[derive(Clone)]
pub struct TimeWindowFetcher {
    feed: Arc<dyn PaperFeed>,
    page_size: usize,
}

impl std::fmt::Debug for TimeWindowFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeWindowFetcher")
            .field("feed", &self.feed.name())
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// What to do with the remaining pages after one record.
enum Step {
    Continue,
    Stop,
}

impl TimeWindowFetcher {
    pub fn new(feed: Arc<dyn PaperFeed>) -> Self {
        Self {
            feed,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Papers submitted inside `window`, relying on the feed's newest-first order:
    /// the first record older than `window.start` ends the scan.
    pub async fn fetch_window(
        &self,
        terms: &[String],
        max_results: usize,
        window: &FetchWindow,
    ) -> Vec<Paper> {
        let query = build_query(terms);
        info!(
            query = %query,
            start = %window.start,
            end = %window.end,
            "fetching papers for window"
        );
        let papers = self
            .scan(&query, max_results, |rec| {
                if rec.submitted < window.start {
                    info!(before = %window.start, "reached papers older than the window; stopping");
                    return (Step::Stop, false);
                }
                (Step::Continue, rec.submitted < window.end)
            })
            .await;
        info!(found = papers.len(), anchor = %window.anchor, "window fetch done");
        papers
    }

    /// Same bounds pushed into the query as a date-range clause. Records are still
    /// filtered to the window, but the scan never stops early.
    pub async fn fetch_range(
        &self,
        terms: &[String],
        max_results: usize,
        window: &FetchWindow,
    ) -> Vec<Paper> {
        let base = build_query(terms);
        let range = date_range_term(window);
        let query = if base.is_empty() {
            range
        } else {
            format!("({base}) AND {range}")
        };
        info!(query = %query, "fetching papers for date range");
        let papers = self
            .scan(&query, max_results, |rec| {
                (Step::Continue, window.contains(rec.submitted))
            })
            .await;
        info!(found = papers.len(), "date range fetch done");
        papers
    }

    /// Page through the feed. `decide` says whether to keep scanning and whether
    /// to keep the record. At most `max_results` records are read.
    async fn scan<F>(&self, query: &str, max_results: usize, mut decide: F) -> Vec<Paper>
    where
        F: FnMut(&FeedRecord) -> (Step, bool),
    {
        let mut out = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut read = 0usize;
        let source = self.feed.name();
        'pages: while read < max_results {
            let want = self.page_size.min(max_results - read);
            let page = match self.feed.fetch_page(query, read, want).await {
                Ok(p) => p,
                Err(Error::FeedExhausted) => break,
                Err(e) => {
                    error!(error = %e, kept = out.len(), "feed failed; returning partial results");
                    break;
                }
            };
            let n = page.records.len();
            for rec in page.records {
                if read >= max_results {
                    break 'pages;
                }
                read += 1;
                let (step, keep) = decide(&rec);
                if keep && seen.insert(rec.id.clone()) {
                    out.push(Paper::from_record(rec, source));
                }
                if matches!(step, Step::Stop) {
                    break 'pages;
                }
            }
            if n == 0 || page.total_results.is_some_and(|t| read as u64 >= t) {
                break;
            }
        }
        out
    }
}
