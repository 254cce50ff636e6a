//! Map-reduce T.A.R.G.E.T. summaries.
//!
//! Map: one summary per overlapping chunk. Reduce: greedily pack summaries into
//! batches under a payload ceiling and fold each batch, round after round, until
//! one summary is left. Final: rewrite that summary into the six-field JSON.

use crate::invoker::ResilientInvoker;
use crate::prompts::{render, SummaryPrompts};
use crate::{Error, Result};
use dailypapers_core::{ChatMessage, SummarySource, TargetSummary};
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 4000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 400;
pub const DEFAULT_PAYLOAD_LIMIT: usize = 12_000;
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(8);
pub const DEFAULT_MAX_REDUCE_ROUNDS: u32 = 10;
pub const REDUCE_SEPARATOR: &str = "\n---\n";

/// A character window of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Offset of the first character, counted in chars.
    pub start: usize,
    pub text: String,
}

/// A chunk and its map-phase summary; an empty summary marks a failed chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub chunk: Chunk,
    pub summary: String,
}

impl ChunkSummary {
    pub fn failed(&self) -> bool {
        self.summary.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::Config("chunk_size must be positive".to_string()));
        }
        if self.overlap >= self.size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

/// Split into windows of `cfg.size` chars advancing by `size - overlap`,
/// stopping at the first window that reaches the end of the text. The last
/// window may be short; empty text yields no chunks.
pub fn split_text(text: &str, cfg: ChunkConfig) -> Result<Vec<Chunk>> {
    cfg.validate()?;
    let chars: Vec<char> = text.chars().collect();
    let stride = cfg.size - cfg.overlap;
    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + cfg.size).min(chars.len());
        out.push(Chunk {
            start,
            text: chars[start..end].iter().collect(),
        });
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    Ok(out)
}

/// Greedy packing: close the current batch when the next summary would push it
/// past `limit`. A single oversized summary still forms its own batch.
pub fn pack_batches(summaries: &[String], limit: usize) -> Vec<Vec<&str>> {
    let mut batches = Vec::new();
    let mut batch: Vec<&str> = Vec::new();
    let mut len = 0usize;
    for s in summaries {
        let n = s.chars().count();
        if len + n > limit && !batch.is_empty() {
            batches.push(std::mem::take(&mut batch));
            len = 0;
        }
        batch.push(s.as_str());
        len += n;
    }
    if !batch.is_empty() {
        batches.push(batch);
    }
    batches
}

#[derive(Debug, Clone)]
pub struct MapReduceSummarizer {
    map: ResilientInvoker,
    reduce: ResilientInvoker,
    chunks: ChunkConfig,
    payload_limit: usize,
    throttle: Duration,
    max_reduce_rounds: u32,
    prompts: SummaryPrompts,
}

impl MapReduceSummarizer {
    pub fn new(map: ResilientInvoker, reduce: ResilientInvoker, chunks: ChunkConfig) -> Result<Self> {
        chunks.validate()?;
        Ok(Self {
            map,
            reduce,
            chunks,
            payload_limit: DEFAULT_PAYLOAD_LIMIT,
            throttle: DEFAULT_THROTTLE,
            max_reduce_rounds: DEFAULT_MAX_REDUCE_ROUNDS,
            prompts: SummaryPrompts::default(),
        })
    }

    pub fn with_payload_limit(mut self, limit: usize) -> Self {
        self.payload_limit = limit;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_max_reduce_rounds(mut self, rounds: u32) -> Self {
        self.max_reduce_rounds = rounds;
        self
    }

    pub fn with_prompts(mut self, prompts: SummaryPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    async fn pause(&self) {
        if !self.throttle.is_zero() {
            tokio::time::sleep(self.throttle).await;
        }
    }

    async fn map_chunks(&self, chunks: Vec<Chunk>) -> Vec<ChunkSummary> {
        let total = chunks.len();
        let mut out = Vec::with_capacity(total);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let prompt = render(&self.prompts.map_prompt, &[("input", chunk.text.as_str())]);
            let summary = match self.map.invoke(&[ChatMessage::user(prompt)], false).await {
                Some(s) => s,
                None => {
                    error!(chunk = i + 1, of = total, "chunk summary failed; skipping chunk");
                    String::new()
                }
            };
            out.push(ChunkSummary { chunk, summary });
            self.pause().await;
        }
        out
    }

    async fn fold(&self, batch: &[&str]) -> Option<String> {
        let joined = batch.join(REDUCE_SEPARATOR);
        let prompt = render(
            &self.prompts.intermediate_reduce_prompt,
            &[("chunk_summaries", joined.as_str())],
        );
        self.reduce.invoke(&[ChatMessage::user(prompt)], false).await
    }

    /// Fold until a single summary is left. `None` if a round produced nothing
    /// or the round cap was hit first.
    async fn reduce_all(&self, mut current: Vec<String>) -> Option<String> {
        let mut round = 0u32;
        while current.len() > 1 {
            if round >= self.max_reduce_rounds {
                error!(
                    rounds = round,
                    remaining = current.len(),
                    "reduction did not converge"
                );
                return None;
            }
            round += 1;
            info!(round, summaries = current.len(), "reducing summaries in batches");
            let batches = pack_batches(&current, self.payload_limit);
            let last = batches.len().saturating_sub(1);
            let mut next = Vec::new();
            for (i, batch) in batches.iter().enumerate() {
                match self.fold(batch).await {
                    Some(s) => next.push(s),
                    None => warn!(round, batch = i + 1, "batch reduction failed; dropping batch"),
                }
                if i == last {
                    self.pause().await;
                }
            }
            if next.is_empty() {
                error!(round, "reduction produced no summaries");
                return None;
            }
            current = next;
        }
        current.pop()
    }

    pub async fn summarize(&self, content: &str, source: SummarySource) -> Option<TargetSummary> {
        let chunks = match split_text(content, self.chunks) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "cannot chunk document");
                return None;
            }
        };
        if chunks.is_empty() {
            warn!("nothing to summarize");
            return None;
        }
        info!(chunks = chunks.len(), source = source.label(), "mapping chunks into summaries");
        let mapped = self.map_chunks(chunks).await;
        let ok: Vec<String> = mapped
            .into_iter()
            .filter(|c| !c.failed())
            .map(|c| c.summary)
            .collect();
        if ok.is_empty() {
            error!("no chunk was summarized");
            return None;
        }

        let single = self.reduce_all(ok).await?;
        info!("final reduction to T.A.R.G.E.T. format");
        let prompt = render(&self.prompts.reduce_prompt, &[("chunk_summaries", single.as_str())]);
        let raw = match self.reduce.invoke(&[ChatMessage::user(prompt)], true).await {
            Some(r) => r,
            None => {
                error!("final reduction failed");
                return None;
            }
        };
        match TargetSummary::from_llm_json(&raw, source) {
            Ok(s) => Some(s),
            Err(e) => {
                error!(error = %e, "final summary is not usable");
                None
            }
        }
    }
}
