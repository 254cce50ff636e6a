use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod contract;

pub use contract::parse_json_contract;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    Config(String),
    #[error("feed failed: {0}")]
    Feed(String),
    /// The feed has no further pages. Normal end of stream, not a failure.
    #[error("feed exhausted")]
    FeedExhausted,
    #[error("transient provider error: {0}")]
    TransientProvider(String),
    #[error("fatal provider error: {0}")]
    FatalProvider(String),
    #[error("every model in the fallback chain failed")]
    ExhaustedFallback,
    #[error("document failed: {0}")]
    Document(String),
    #[error("malformed json: {0}")]
    MalformedJson(String),
    #[error("json is missing keys: {0:?}")]
    MissingKeys(Vec<String>),
}

impl Error {
    /// Rate limits, upstream 5xx and connection failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientProvider(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub keyword_score: u32,
    #[serde(default)]
    pub keyword_reasons: Vec<String>,
    #[serde(default)]
    pub llm_score: Option<i64>,
    #[serde(default)]
    pub llm_rationale: Option<String>,
}

impl ScoreRecord {
    /// LLM score used for ranking; an absent score ranks as zero.
    pub fn llm_rank(&self) -> i64 {
        self.llm_score.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    FullText,
    Abstract,
}

impl SummarySource {
    pub fn label(&self) -> &'static str {
        match self {
            SummarySource::FullText => "Full Text",
            SummarySource::Abstract => "Abstract",
        }
    }
}

/// T.A.R.G.E.T. summary of one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub topic: String,
    pub aim: String,
    pub rationale: String,
    pub ground: String,
    pub experiment: String,
    pub takeaway: String,
    pub source: SummarySource,
}

impl TargetSummary {
    pub const FIELDS: [&'static str; 6] = [
        "topic",
        "aim",
        "rationale",
        "ground",
        "experiment",
        "takeaway",
    ];

    /// Parse the final-format LLM response (a JSON object with the six fields).
    pub fn from_llm_json(raw: &str, source: SummarySource) -> Result<Self> {
        #[derive(Deserialize)]
        struct Fields {
            topic: serde_json::Value,
            aim: serde_json::Value,
            rationale: serde_json::Value,
            ground: serde_json::Value,
            experiment: serde_json::Value,
            takeaway: serde_json::Value,
        }
        let f: Fields = parse_json_contract(raw, &Self::FIELDS)?;
        Ok(Self {
            topic: contract::value_to_text(&f.topic),
            aim: contract::value_to_text(&f.aim),
            rationale: contract::value_to_text(&f.rationale),
            ground: contract::value_to_text(&f.ground),
            experiment: contract::value_to_text(&f.experiment),
            takeaway: contract::value_to_text(&f.takeaway),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub url: String,
    pub pdf_url: Option<String>,
    pub authors: Vec<String>,
    pub submitted: DateTime<Utc>,
    #[serde(default)]
    pub comment: Option<String>,
    pub source: String,
    #[serde(default)]
    pub scores: ScoreRecord,
    #[serde(default)]
    pub target_summary: Option<TargetSummary>,
}

impl Paper {
    pub fn from_record(record: FeedRecord, source: &str) -> Self {
        Self {
            id: record.id,
            title: record.title,
            abstract_text: record.summary,
            url: record.url,
            pdf_url: record.pdf_url,
            authors: record.authors,
            submitted: record.submitted,
            comment: record.comment,
            source: source.to_string(),
            scores: ScoreRecord::default(),
            target_summary: None,
        }
    }

    /// Short title prefix for log lines.
    pub fn short_title(&self, max_chars: usize) -> String {
        let mut out: String = self.title.chars().take(max_chars).collect();
        if self.title.chars().count() > max_chars {
            out.push_str("...");
        }
        out
    }
}

/// `[start, end)` submission-time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Local date whose cutover instant is `end`.
    pub anchor: NaiveDate,
    pub days: u32,
}

impl FetchWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// One record as yielded by the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub pdf_url: Option<String>,
    pub authors: Vec<String>,
    pub submitted: DateTime<Utc>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedPage {
    pub total_results: Option<u64>,
    pub records: Vec<FeedRecord>,
}

/// Paginated paper search sorted by submission time, newest first.
///
/// Implementations return `Err(Error::FeedExhausted)` when a page comes back
/// empty.
#[async_trait::async_trait]
pub trait PaperFeed: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_page(&self, query: &str, start: usize, max_results: usize) -> Result<FeedPage>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    /// Ask the provider for a strict JSON object response.
    pub json: bool,
}

/// A single chat-completion call against one model.
///
/// Errors must be classified as `TransientProvider` (retryable) or
/// `FatalProvider`.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, req: &ChatRequest) -> Result<String>;
}

/// Full text of a paper's PDF, or `None` on any network/parse failure.
#[async_trait::async_trait]
pub trait DocumentText: Send + Sync {
    async fn full_text(&self, pdf_url: &str) -> Option<String>;
}
