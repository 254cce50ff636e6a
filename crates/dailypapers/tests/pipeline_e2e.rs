use chrono::{Duration, NaiveDate};
use dailypapers::config::Config;
use dailypapers::pipeline::{Pipeline, Source};
use dailypapers_core::{
    ChatProvider, ChatRequest, DocumentText, Error, FeedPage, FeedRecord, FetchWindow, PaperFeed,
    Result,
};
use dailypapers_local::relevance::SCORING_FAILED;
use dailypapers_local::window::window_ending_on;
use std::path::Path;
use std::sync::{Arc, Mutex};

struct FixedFeed {
    records: Vec<FeedRecord>,
}

#[async_trait::async_trait]
impl PaperFeed for FixedFeed {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    async fn fetch_page(&self, _query: &str, start: usize, max_results: usize) -> Result<FeedPage> {
        let records: Vec<FeedRecord> = self
            .records
            .iter()
            .skip(start)
            .take(max_results)
            .cloned()
            .collect();
        if records.is_empty() {
            return Err(Error::FeedExhausted);
        }
        Ok(FeedPage {
            total_results: Some(self.records.len() as u64),
            records,
        })
    }
}

/// Every call is rate limited.
#[derive(Default)]
struct RateLimited {
    calls: Mutex<Vec<ChatRequest>>,
}

#[async_trait::async_trait]
impl ChatProvider for RateLimited {
    fn name(&self) -> &'static str {
        "rate-limited"
    }

    async fn complete(&self, req: &ChatRequest) -> Result<String> {
        self.calls.lock().unwrap().push(req.clone());
        Err(Error::TransientProvider("HTTP 429 Too Many Requests".to_string()))
    }
}

struct StaticText;

#[async_trait::async_trait]
impl DocumentText for StaticText {
    async fn full_text(&self, _pdf_url: &str) -> Option<String> {
        Some("Section 1. We propose a method. Section 2. It works.".to_string())
    }
}

fn record(id: &str, title: &str, summary: &str, w: &FetchWindow, mins_before_end: i64) -> FeedRecord {
    FeedRecord {
        id: id.to_string(),
        title: title.to_string(),
        summary: summary.to_string(),
        url: format!("http://arxiv.org/abs/{id}"),
        pdf_url: Some(format!("http://arxiv.org/pdf/{id}")),
        authors: vec!["A. Author".to_string()],
        submitted: w.end - Duration::minutes(mins_before_end),
        comment: None,
    }
}

fn config(root: &Path, llm: bool) -> Config {
    let yaml = format!(
        r#"
arxiv_crawler:
  queries: ["cat:cs.IR"]
classifier:
  keyword_weights:
    retrieval: 2
    click: 5
llm_scorer:
  enabled: {llm}
  interests: "click models and ranking"
  model: primary-model
summarizer:
  enabled: {llm}
  map_model: map-model
  reduce_model: reduce-model
reporter:
  report_path: {root}/reports
  top_n: 10
storage:
  crawled_path: {root}/data/crawled
  scores_path: {root}/data/scores
logging:
  file: null
"#,
        root = root.display()
    );
    Config::from_yaml_str(&yaml).unwrap()
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 3).unwrap()
}

fn five_papers(w: &FetchWindow) -> Vec<FeedRecord> {
    vec![
        record("2405.00001", "Dense Retrieval at Scale", "We study passage retrieval.", w, 10),
        record("2405.00002", "Graph Neural Networks for Molecules", "Chemistry.", w, 20),
        record("2405.00003", "Position-Biased Click Models", "User behaviour.", w, 30),
        record("2405.00004", "Robot Grasping", "Manipulation.", w, 40),
        record("2405.00005", "Protein Folding", "Biology.", w, 50),
    ]
}

#[tokio::test(start_paused = true)]
async fn llm_outage_degrades_to_keyword_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let w = window_ending_on(date(), 1).unwrap();
    let feed = Arc::new(FixedFeed {
        records: five_papers(&w),
    });
    let chat = Arc::new(RateLimited::default());
    let p = Pipeline::new(
        config(dir.path(), true),
        feed,
        Some(chat.clone()),
        Arc::new(StaticText),
    )
    .unwrap();

    let out = p.run(Source::Window(w), date()).await.unwrap();

    assert_eq!(out.crawled, 5);
    let ids: Vec<&str> = out.ranked.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["2405.00003", "2405.00001"]);
    assert_eq!(out.ranked[0].scores.keyword_score, 5);
    assert_eq!(out.ranked[1].scores.keyword_score, 2);
    for paper in &out.ranked {
        assert_eq!(paper.scores.llm_score, None);
        assert_eq!(paper.scores.llm_rationale.as_deref(), Some(SCORING_FAILED));
        assert!(paper.target_summary.is_none());
    }

    // Scoring: 2 papers x 3 attempts on the only model, JSON mode.
    let calls = chat.calls.lock().unwrap();
    let scoring: Vec<&ChatRequest> = calls.iter().filter(|c| c.model == "primary-model").collect();
    assert_eq!(scoring.len(), 6);
    assert!(scoring.iter().all(|c| c.json));
    // Summaries: each paper is one chunk whose map call fails 3 times; no reduce.
    assert_eq!(calls.iter().filter(|c| c.model == "map-model").count(), 6);
    assert_eq!(calls.iter().filter(|c| c.model == "reduce-model").count(), 0);
    drop(calls);

    let crawled = out.crawled_snapshot.unwrap();
    assert!(crawled.ends_with("data/crawled/2024-05-03.json"));
    let snap = dailypapers::snapshot::read_papers(&crawled).unwrap();
    assert_eq!(snap.len(), 5);
    assert!(out
        .scores_snapshot
        .unwrap()
        .ends_with("data/scores/2024-05-03-scores.json"));

    let report = std::fs::read_to_string(out.report.unwrap()).unwrap();
    assert!(report.contains("## 1. Position-Biased Click Models"));
    assert!(report.contains("## 2. Dense Retrieval at Scale"));
    assert!(!report.contains("LLM Score"));
    assert!(!report.contains("Protein Folding"));
}

#[tokio::test]
async fn snapshot_replay_without_llm() {
    let dir = tempfile::tempdir().unwrap();
    let w = window_ending_on(date(), 1).unwrap();

    // Produce a crawled snapshot first.
    let p = Pipeline::new(
        config(dir.path(), false),
        Arc::new(FixedFeed {
            records: five_papers(&w),
        }),
        None,
        Arc::new(StaticText),
    )
    .unwrap();
    let first = p.run(Source::Window(w), date()).await.unwrap();
    let snapshot = first.crawled_snapshot.unwrap();

    // Replay it through a pipeline whose feed has nothing.
    let replay_root = dir.path().join("replay");
    let p = Pipeline::new(
        config(&replay_root, false),
        Arc::new(FixedFeed { records: vec![] }),
        None,
        Arc::new(StaticText),
    )
    .unwrap();
    let out = p.run(Source::Snapshot(snapshot), date()).await.unwrap();
    assert_eq!(out.crawled, 5);
    assert!(out.crawled_snapshot.is_none());
    assert_eq!(out.ranked.len(), 2);
    assert!(out.ranked.iter().all(|p| p.scores.llm_rationale.is_none()));
    assert!(out.report.is_some());
}

#[tokio::test]
async fn nothing_matching_writes_no_report() {
    let dir = tempfile::tempdir().unwrap();
    let w = window_ending_on(date(), 1).unwrap();
    let p = Pipeline::new(
        config(dir.path(), false),
        Arc::new(FixedFeed {
            records: vec![record("x", "Robot Grasping", "Manipulation.", &w, 5)],
        }),
        None,
        Arc::new(StaticText),
    )
    .unwrap();
    let out = p.run(Source::Window(w), date()).await.unwrap();
    assert_eq!(out.crawled, 1);
    assert!(out.ranked.is_empty());
    assert!(out.report.is_none());
    assert!(!dir.path().join("reports").exists());
}

#[derive(Default)]
struct CountingFeed {
    pages: Mutex<usize>,
}

#[async_trait::async_trait]
impl PaperFeed for CountingFeed {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn fetch_page(&self, _query: &str, _start: usize, _max_results: usize) -> Result<FeedPage> {
        *self.pages.lock().unwrap() += 1;
        Err(Error::FeedExhausted)
    }
}

#[tokio::test]
async fn disabled_crawler_fetches_nothing_but_snapshots_still_replay() {
    let dir = tempfile::tempdir().unwrap();
    let w = window_ending_on(date(), 1).unwrap();

    // Build a snapshot to replay with the crawler switched on.
    let p = Pipeline::new(
        config(dir.path(), false),
        Arc::new(FixedFeed {
            records: five_papers(&w),
        }),
        None,
        Arc::new(StaticText),
    )
    .unwrap();
    let snapshot = p
        .run(Source::Window(w), date())
        .await
        .unwrap()
        .crawled_snapshot
        .unwrap();

    let off_root = dir.path().join("off");
    let mut cfg = config(&off_root, false);
    cfg.arxiv_crawler.enabled = false;
    let feed = Arc::new(CountingFeed::default());
    let p = Pipeline::new(cfg, feed.clone(), None, Arc::new(StaticText)).unwrap();

    for source in [Source::Window(w), Source::Range(w)] {
        let out = p.run(source, date()).await.unwrap();
        assert_eq!(out.crawled, 0);
        assert!(out.crawled_snapshot.is_none());
        assert!(out.report.is_none());
    }
    assert_eq!(*feed.pages.lock().unwrap(), 0);
    assert!(!off_root.join("reports").exists());

    let out = p.run(Source::Snapshot(snapshot), date()).await.unwrap();
    assert_eq!(out.crawled, 5);
    assert!(out.report.is_some());
}
