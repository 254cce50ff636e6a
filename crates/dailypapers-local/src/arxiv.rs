//! arXiv Atom feed client.
//!
//! Notes:
//! - arXiv exposes an Atom API at `https://export.arxiv.org/api/query`.
//! - Parsing is kept minimal and resilient: an entry without a usable id or
//!   `published` timestamp is dropped, a broken document yields what was parsed
//!   before the error.
//! - arXiv asks clients to leave a few seconds between requests; [`ArxivClient`]
//!   enforces `page_delay` between consecutive page fetches.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dailypapers_core::{FeedPage, FeedRecord, PaperFeed};
use quick_xml::events::{BytesStart, Event};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://export.arxiv.org/api/query";
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `DAILYPAPERS_ARXIV_ENDPOINT` wins over the configured endpoint.
pub fn arxiv_api_endpoint(configured: Option<&str>) -> Result<reqwest::Url> {
    let s = std::env::var("DAILYPAPERS_ARXIV_ENDPOINT")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    reqwest::Url::parse(s.trim()).map_err(|e| Error::Config(format!("arxiv endpoint: {e}")))
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn arxiv_id_from_url(url: &str) -> Option<String> {
    // http://arxiv.org/abs/2405.01234v1, http://arxiv.org/abs/cs/9901001v1
    let u = url.trim();
    let i = u.rfind("/abs/")?;
    let id = u[i + "/abs/".len()..].trim_matches('/').trim();
    (!id.is_empty()).then(|| id.to_string())
}

pub fn arxiv_pdf_url(id: &str) -> String {
    format!("https://arxiv.org/pdf/{}", id.trim())
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

#[derive(Default)]
struct Entry {
    id_url: String,
    title: String,
    summary: String,
    published: String,
    comment: Option<String>,
    authors: Vec<String>,
    pdf_url: Option<String>,
}

impl Entry {
    fn on_link(&mut self, e: &BytesStart<'_>) {
        let is_pdf = attr(e, "title").as_deref() == Some("pdf")
            || attr(e, "type").as_deref() == Some("application/pdf");
        if is_pdf {
            if let Some(href) = attr(e, "href") {
                self.pdf_url = Some(href);
            }
        }
    }

    fn finish(self) -> Option<FeedRecord> {
        let submitted = DateTime::parse_from_rfc3339(self.published.trim())
            .ok()?
            .with_timezone(&Utc);
        let id = arxiv_id_from_url(&self.id_url)?;
        let pdf_url = self.pdf_url.or_else(|| Some(arxiv_pdf_url(&id)));
        Some(FeedRecord {
            id,
            title: self.title,
            summary: self.summary,
            url: self.id_url,
            pdf_url,
            authors: self.authors,
            submitted,
            comment: self.comment,
        })
    }
}

/// Returns `(total_results, records, parse_ok)`.
pub fn parse_atom(body: &str) -> (Option<u64>, Vec<FeedRecord>, bool) {
    let mut total_results = None;
    let mut records = Vec::new();
    let mut reader = quick_xml::Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut entry: Option<Entry> = None;
    let mut in_author = false;
    let mut tag = String::new();
    let mut text = String::new();
    let mut ok = true;

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name.ends_with("entry") {
                    entry = Some(Entry::default());
                } else if name.ends_with("author") {
                    in_author = true;
                } else if name.ends_with("link") {
                    if let Some(cur) = entry.as_mut() {
                        cur.on_link(&e);
                    }
                }
                tag = name;
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if e.name().as_ref().ends_with(b"link") {
                    if let Some(cur) = entry.as_mut() {
                        cur.on_link(&e);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let s = t.unescape().map(|s| s.to_string()).unwrap_or_default();
                if entry.is_some() {
                    text.push_str(&s);
                } else if tag.ends_with("totalResults") {
                    total_results = s.trim().parse::<u64>().ok();
                }
            }
            Ok(Event::CData(t)) => {
                text.push_str(&String::from_utf8_lossy(&t));
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name.ends_with("entry") {
                    match entry.take().and_then(Entry::finish) {
                        Some(r) => records.push(r),
                        None => debug!("dropping atom entry without id or published time"),
                    }
                } else if name.ends_with("author") {
                    in_author = false;
                } else if let Some(cur) = entry.as_mut() {
                    let t = normalize_ws(&text);
                    if in_author {
                        if name.ends_with("name") && !t.is_empty() {
                            cur.authors.push(t);
                        }
                    } else if name.ends_with("comment") {
                        cur.comment = (!t.is_empty()).then_some(t);
                    } else if name.ends_with("summary") {
                        cur.summary = t;
                    } else if name.ends_with("title") {
                        cur.title = t;
                    } else if name.ends_with("published") {
                        cur.published = t;
                    } else if name == "id" || name.ends_with(":id") {
                        cur.id_url = t;
                    }
                }
                text.clear();
                tag.clear();
            }
            Err(e) => {
                warn!(error = %e, parsed = records.len(), "arxiv atom parse failed; keeping partial page");
                ok = false;
                break;
            }
            _ => {}
        }
    }

    (total_results, records, ok)
}

/// Paginated arXiv search, newest submissions first.
#[derive(Debug)]
pub struct ArxivClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    timeout: Duration,
    page_delay: Duration,
    last_request: Mutex<Option<tokio::time::Instant>>,
}

impl ArxivClient {
    pub fn new(http: reqwest::Client, endpoint: reqwest::Url) -> Self {
        Self {
            http,
            endpoint,
            timeout: DEFAULT_TIMEOUT,
            page_delay: DEFAULT_PAGE_DELAY,
            last_request: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    async fn wait_turn(&self) {
        let wait = {
            let mut last = match self.last_request.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = tokio::time::Instant::now();
            let wait = last
                .map(|t| (t + self.page_delay).saturating_duration_since(now))
                .unwrap_or_default();
            *last = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    fn page_url(&self, query: &str, start: usize, max_results: usize) -> reqwest::Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("search_query", query)
            .append_pair("start", &start.to_string())
            .append_pair("max_results", &max_results.to_string())
            .append_pair("sortBy", "submittedDate")
            .append_pair("sortOrder", "descending");
        url
    }
}

#[async_trait::async_trait]
impl PaperFeed for ArxivClient {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    async fn fetch_page(&self, query: &str, start: usize, max_results: usize) -> Result<FeedPage> {
        self.wait_turn().await;
        let url = self.page_url(query, start, max_results);
        debug!(url = %url, "arxiv page request");
        let resp = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Feed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Feed(format!("arxiv query failed: HTTP {status}")));
        }
        let body = resp.text().await.map_err(|e| Error::Feed(e.to_string()))?;
        let (total_results, records, parse_ok) = parse_atom(&body);
        if records.is_empty() {
            if !parse_ok {
                return Err(Error::Feed("unparseable arxiv response".to_string()));
            }
            return Err(Error::FeedExhausted);
        }
        Ok(FeedPage {
            total_results,
            records,
        })
    }
}
