//! Second-pass LLM relevance judgments and the final ranking.

use crate::invoker::ResilientInvoker;
use crate::prompts::{render, ScoringPrompts};
use crate::{Error, Result};
use dailypapers_core::{contract, parse_json_contract, ChatMessage, Paper};
use serde::Deserialize;
use tracing::{info, warn};

pub const SCORING_FAILED: &str = "scoring failed";

#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    pub score: i64,
    pub reasons: String,
}

impl Judgment {
    /// `score` may arrive as an integer or a float; `reasons` as a string or a list.
    pub fn parse(raw: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Wire {
            score: serde_json::Value,
            #[serde(default)]
            reasons: serde_json::Value,
        }
        let w: Wire = parse_json_contract(raw, &["score"])?;
        let score = match &w.score {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64)),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
            _ => None,
        }
        .ok_or_else(|| Error::MalformedJson(format!("score is not a number: {}", w.score)))?;
        Ok(Self {
            score,
            reasons: contract::value_to_text(&w.reasons),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    invoker: ResilientInvoker,
    interests: String,
    prompts: ScoringPrompts,
    limit: i64,
}

impl RelevanceScorer {
    /// `limit <= 0` scores every paper.
    pub fn new(invoker: ResilientInvoker, interests: &str, limit: i64) -> Result<Self> {
        let interests = interests.trim();
        if interests.is_empty() {
            return Err(Error::Config(
                "llm_scorer.interests must not be empty".to_string(),
            ));
        }
        Ok(Self {
            invoker,
            interests: interests.to_string(),
            prompts: ScoringPrompts::default(),
            limit,
        })
    }

    pub fn with_prompts(mut self, prompts: ScoringPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    fn messages(&self, paper: &Paper) -> Vec<ChatMessage> {
        let user = render(
            &self.prompts.user_prompt,
            &[
                ("interests", self.interests.as_str()),
                ("title", paper.title.as_str()),
                ("abstract", paper.abstract_text.as_str()),
            ],
        );
        vec![
            ChatMessage::system(self.prompts.system_prompt.clone()),
            ChatMessage::user(user),
        ]
    }

    async fn judge(&self, paper: &Paper) -> Option<Judgment> {
        let raw = self.invoker.invoke(&self.messages(paper), true).await?;
        match Judgment::parse(&raw) {
            Ok(j) => Some(j),
            Err(e) => {
                warn!(id = %paper.id, error = %e, "unusable relevance judgment");
                None
            }
        }
    }

    /// Score the first `limit` papers in order; the rest follow untouched.
    pub async fn score(&self, papers: Vec<Paper>) -> Vec<Paper> {
        let take = if self.limit <= 0 {
            papers.len()
        } else {
            (self.limit as usize).min(papers.len())
        };
        info!(total = papers.len(), scoring = take, "starting LLM relevance scoring");
        let mut papers = papers;
        let rest = papers.split_off(take);
        let mut out = Vec::with_capacity(papers.len() + rest.len());
        for (i, mut p) in papers.into_iter().enumerate() {
            info!(n = i + 1, of = take, title = %p.short_title(60), "scoring paper");
            match self.judge(&p).await {
                Some(j) => {
                    p.scores.llm_score = Some(j.score);
                    p.scores.llm_rationale = Some(j.reasons);
                }
                None => {
                    p.scores.llm_score = None;
                    p.scores.llm_rationale = Some(SCORING_FAILED.to_string());
                }
            }
            out.push(p);
        }
        out.extend(rest);
        out
    }
}

/// Order by LLM score (absent = 0), then keyword score, both descending; stable.
pub fn rank(mut papers: Vec<Paper>) -> Vec<Paper> {
    papers.sort_by(|a, b| {
        (b.scores.llm_rank(), b.scores.keyword_score)
            .cmp(&(a.scores.llm_rank(), a.scores.keyword_score))
    });
    papers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::testing::ScriptedProvider;
    use crate::invoker::ModelChain;
    use crate::keyword::paper;
    use std::sync::Arc;

    fn invoker(provider: Arc<ScriptedProvider>) -> ResilientInvoker {
        ResilientInvoker::new(provider, ModelChain::new("judge", &[]).unwrap())
    }

    #[test]
    fn judgment_accepts_loose_shapes() {
        let j = Judgment::parse(r#"{"score": 7.6, "reasons": ["on topic", "strong eval"]}"#).unwrap();
        assert_eq!(j.score, 8);
        assert_eq!(j.reasons, "on topic; strong eval");
        let j = Judgment::parse(r#"{"score": 3}"#).unwrap();
        assert_eq!(j.reasons, "");
        assert!(matches!(
            Judgment::parse(r#"{"reasons": "x"}"#),
            Err(Error::MissingKeys(_))
        ));
        assert!(Judgment::parse(r#"{"score": "high"}"#).is_err());
    }

    #[test]
    fn empty_interests_are_rejected() {
        let p = Arc::new(ScriptedProvider::new());
        assert!(matches!(
            RelevanceScorer::new(invoker(p), "  ", 0),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn scores_prefix_and_keeps_remainder_in_order() {
        let provider = Arc::new(ScriptedProvider::with_handler(|req| {
            let user = &req.messages[1].content;
            assert!(user.contains("ranking systems"));
            if user.contains("Title A") {
                Ok(r#"{"score": 9, "reasons": "core topic"}"#.to_string())
            } else {
                Ok("not json at all".to_string())
            }
        }));
        let scorer = RelevanceScorer::new(invoker(provider.clone()), "ranking systems", 2).unwrap();
        let out = scorer
            .score(vec![
                paper("a", "Title A", "x"),
                paper("b", "Title B", "y"),
                paper("c", "Title C", "z"),
            ])
            .await;

        let ids: Vec<&str> = out.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(out[0].scores.llm_score, Some(9));
        assert_eq!(out[0].scores.llm_rationale.as_deref(), Some("core topic"));
        assert_eq!(out[1].scores.llm_score, None);
        assert_eq!(out[1].scores.llm_rationale.as_deref(), Some(SCORING_FAILED));
        assert_eq!(out[2].scores.llm_score, None);
        assert_eq!(out[2].scores.llm_rationale, None);
        assert_eq!(provider.total_calls(), 2);
        assert!(provider.calls.lock().unwrap().iter().all(|c| c.json));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_model_degrades_to_absent_scores() {
        let provider = Arc::new(ScriptedProvider::new());
        let scorer = RelevanceScorer::new(invoker(provider), "anything", 0).unwrap();
        let out = scorer.score(vec![paper("a", "A", ""), paper("b", "B", "")]).await;
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.scores.llm_score.is_none()));
    }

    #[test]
    fn rank_uses_llm_then_keyword_and_is_stable() {
        let mut a = paper("a", "", "");
        a.scores.keyword_score = 2;
        let mut b = paper("b", "", "");
        b.scores.keyword_score = 5;
        let mut c = paper("c", "", "");
        c.scores.keyword_score = 1;
        c.scores.llm_score = Some(6);
        let mut d = paper("d", "", "");
        d.scores.keyword_score = 5;
        let ids: Vec<String> = rank(vec![a, b, c, d]).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["c", "b", "d", "a"]);
    }
}
