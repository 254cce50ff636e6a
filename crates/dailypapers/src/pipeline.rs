//! Crawl -> keyword filter -> LLM scoring -> rank -> summarize -> report.
//!
//! Component failures degrade the run (keyword-only scores, missing summaries)
//! instead of aborting it. Only setup and file I/O errors propagate.

use crate::config::Config;
use crate::{report, snapshot};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use dailypapers_core::{ChatProvider, DocumentText, FetchWindow, Paper, PaperFeed, SummarySource};
use dailypapers_local::arxiv::{arxiv_api_endpoint, ArxivClient};
use dailypapers_local::openai_compat::OpenAiCompatClient;
use dailypapers_local::pdf::PdfTextFetcher;
use dailypapers_local::prompts::PromptSet;
use dailypapers_local::relevance::rank;
use dailypapers_local::{
    KeywordScorer, MapReduceSummarizer, ModelChain, RelevanceScorer, ResilientInvoker,
    RetryPolicy, TimeWindowFetcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Where the candidate papers come from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Live, newest-first scan that stops at the window start.
    Window(FetchWindow),
    /// Live, with the window pushed into the query (backfills).
    Range(FetchWindow),
    /// Replay of a crawled snapshot.
    Snapshot(PathBuf),
}

#[derive(Debug, Default)]
pub struct RunOutcome {
    pub crawled: usize,
    pub ranked: Vec<Paper>,
    pub crawled_snapshot: Option<PathBuf>,
    pub scores_snapshot: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

pub struct Pipeline {
    config: Config,
    prompts: PromptSet,
    keywords: KeywordScorer,
    feed: Arc<dyn PaperFeed>,
    chat: Option<Arc<dyn ChatProvider>>,
    documents: Arc<dyn DocumentText>,
    retry: RetryPolicy,
}

impl Pipeline {
    /// Validates `config`. `chat = None` disables the LLM stages.
    pub fn new(
        config: Config,
        feed: Arc<dyn PaperFeed>,
        chat: Option<Arc<dyn ChatProvider>>,
        documents: Arc<dyn DocumentText>,
    ) -> Result<Self> {
        config.validate().context("invalid config")?;
        let keywords = KeywordScorer::new(
            config
                .classifier
                .keyword_weights
                .iter()
                .map(|(k, w)| (k.as_str(), *w)),
        )?;
        let prompts = config.prompts()?;
        Ok(Self {
            config,
            prompts,
            keywords,
            feed,
            chat,
            documents,
            retry: RetryPolicy::default(),
        })
    }

    /// Production collaborators: arXiv, the configured OpenAI-compatible endpoint
    /// and PDF download. A missing API key only disables the LLM stages.
    pub fn from_config(config: Config) -> Result<Self> {
        let http = dailypapers_local::http_client()?;
        let c = &config.arxiv_crawler;
        let feed = ArxivClient::new(http.clone(), arxiv_api_endpoint(c.endpoint.as_deref())?)
            .with_timeout(Duration::from_secs(c.timeout_secs))
            .with_page_delay(Duration::from_secs(c.page_delay_secs));

        let g = &config.groq_settings;
        let needs_llm = config.llm_scorer.enabled || config.summarizer.enabled;
        let chat: Option<Arc<dyn ChatProvider>> = if needs_llm {
            match OpenAiCompatClient::from_env(http.clone(), &g.base_url, &g.api_key_env) {
                Ok(client) => Some(Arc::new(
                    client.with_timeout(Duration::from_secs(g.timeout_secs)),
                )),
                Err(e) => {
                    error!(error = %e, "LLM provider unavailable; LLM stages disabled");
                    None
                }
            }
        } else {
            None
        };

        let s = &config.summarizer;
        let documents = PdfTextFetcher::new(http)
            .with_max_bytes(s.pdf_max_bytes)
            .with_timeout(Duration::from_secs(s.pdf_timeout_secs));

        Self::new(config, Arc::new(feed), chat, Arc::new(documents))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn invoker(&self, primary: &str, fallbacks: &[String]) -> Option<ResilientInvoker> {
        let chat = self.chat.clone()?;
        match ModelChain::new(primary, fallbacks) {
            Ok(chain) => Some(
                ResilientInvoker::new(chat, chain)
                    .with_temperature(self.config.groq_settings.temperature)
                    .with_retry(self.retry),
            ),
            Err(e) => {
                error!(error = %e, "cannot build model chain");
                None
            }
        }
    }

    pub async fn crawl(&self, source: &Source) -> Result<Vec<Paper>> {
        let c = &self.config.arxiv_crawler;
        if !c.enabled && !matches!(source, Source::Snapshot(_)) {
            info!("crawler disabled; nothing fetched");
            return Ok(Vec::new());
        }
        let fetcher = TimeWindowFetcher::new(self.feed.clone()).with_page_size(c.page_size);
        let papers = match source {
            Source::Window(w) => fetcher.fetch_window(&c.queries, c.max_results, w).await,
            Source::Range(w) => fetcher.fetch_range(&c.queries, c.max_results, w).await,
            Source::Snapshot(p) => snapshot::read_papers(p)?,
        };
        info!(count = papers.len(), "crawled papers");
        Ok(papers)
    }

    /// Keyword filter, then LLM scoring of the best keyword matches when enabled.
    pub async fn score(&self, papers: Vec<Paper>) -> Vec<Paper> {
        let filtered = self.keywords.score(papers);
        info!(count = filtered.len(), "papers left after keyword filtering");
        if filtered.is_empty() || !self.config.llm_scorer.enabled {
            return filtered;
        }
        let l = &self.config.llm_scorer;
        let Some(invoker) = self.invoker(&l.model, &l.model_fallback_list) else {
            warn!("LLM scorer unavailable; keeping keyword scores");
            return filtered;
        };
        match RelevanceScorer::new(invoker, &l.interests, l.processing_limit) {
            Ok(scorer) => {
                scorer
                    .with_prompts(self.prompts.scoring.clone())
                    .score(filtered)
                    .await
            }
            Err(e) => {
                error!(error = %e, "cannot build LLM scorer; keeping keyword scores");
                filtered
            }
        }
    }

    fn summarizer(&self) -> Option<MapReduceSummarizer> {
        let s = &self.config.summarizer;
        let map = self.invoker(&s.map_model, &s.map_fallback_list)?;
        let reduce = self.invoker(&s.reduce_model, &s.reduce_fallback_list)?;
        match MapReduceSummarizer::new(map, reduce, s.chunks()) {
            Ok(m) => Some(
                m.with_payload_limit(s.payload_limit)
                    .with_throttle(s.throttle())
                    .with_max_reduce_rounds(s.max_reduce_rounds)
                    .with_prompts(self.prompts.summarize_target_map_reduce.clone()),
            ),
            Err(e) => {
                error!(error = %e, "cannot build summarizer");
                None
            }
        }
    }

    /// Full text when short enough, else the abstract. `None` when the PDF
    /// yields no text at all.
    async fn summary_input(&self, paper: &Paper) -> Option<(String, SummarySource)> {
        let url = paper.pdf_url.as_deref()?;
        let text = self.documents.full_text(url).await?;
        let len = text.chars().count();
        let max = self.config.summarizer.max_text_length_for_full_summary;
        if len > max {
            info!(chars = len, max, "paper too long; summarizing the abstract");
            Some((paper.abstract_text.clone(), SummarySource::Abstract))
        } else {
            Some((text, SummarySource::FullText))
        }
    }

    /// Attach T.A.R.G.E.T. summaries to the first `processing_limit` papers.
    pub async fn summarize(&self, mut papers: Vec<Paper>) -> Vec<Paper> {
        let s = &self.config.summarizer;
        if !s.enabled || papers.is_empty() {
            return papers;
        }
        let Some(summarizer) = self.summarizer() else {
            warn!("summarizer unavailable; skipping summaries");
            return papers;
        };
        let take = if s.processing_limit <= 0 {
            papers.len()
        } else {
            (s.processing_limit as usize).min(papers.len())
        };
        for (i, paper) in papers.iter_mut().take(take).enumerate() {
            info!(n = i + 1, of = take, title = %paper.short_title(50), "summarizing paper");
            let Some((content, source)) = self.summary_input(paper).await else {
                warn!(id = %paper.id, "no full text; skipping summary");
                continue;
            };
            if content.trim().is_empty() {
                warn!(id = %paper.id, "nothing to summarize");
                continue;
            }
            paper.target_summary = summarizer.summarize(&content, source).await;
            if paper.target_summary.is_none() {
                warn!(id = %paper.id, "summarization produced no result");
            }
        }
        papers
    }

    pub async fn run(&self, source: Source, date: NaiveDate) -> Result<RunOutcome> {
        info!(%date, "starting pipeline");
        let mut outcome = RunOutcome::default();
        let crawled = self.crawl(&source).await?;
        outcome.crawled = crawled.len();
        if crawled.is_empty() {
            info!("no new papers; nothing to do");
            return Ok(outcome);
        }
        let storage = &self.config.storage;
        if !matches!(source, Source::Snapshot(_)) {
            outcome.crawled_snapshot = Some(snapshot::write_papers(
                &storage.crawled_path,
                &snapshot::crawled_file_name(date),
                &crawled,
            )?);
        }

        let scored = self.score(crawled).await;
        if scored.is_empty() {
            info!("no papers left after scoring");
            return Ok(outcome);
        }
        outcome.scores_snapshot = Some(snapshot::write_papers(
            &storage.scores_path,
            &snapshot::scores_file_name(date),
            &scored,
        )?);

        let ranked = self.summarize(rank(scored)).await;
        let r = &self.config.reporter;
        outcome.report = report::write_report(&r.report_path, date, r.top_n, &ranked)?;
        outcome.ranked = ranked;
        info!("pipeline finished");
        Ok(outcome)
    }
}
