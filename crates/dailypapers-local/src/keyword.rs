//! First-pass keyword scoring over title + abstract.

use crate::{Error, Result};
use dailypapers_core::Paper;

#[derive(Debug, Clone)]
pub struct KeywordScorer {
    weights: Vec<(String, u32)>,
}

impl KeywordScorer {
    /// Keywords are lower-cased; a later entry for the same lower-cased keyword wins.
    pub fn new<I, K>(weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, u32)>,
        K: AsRef<str>,
    {
        let mut out: Vec<(String, u32)> = Vec::new();
        for (k, w) in weights {
            let k = k.as_ref().trim().to_lowercase();
            if k.is_empty() {
                return Err(Error::Config("keyword must be non-empty".to_string()));
            }
            if w == 0 {
                return Err(Error::Config(format!("keyword '{k}' has a zero weight")));
            }
            match out.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = w,
                None => out.push((k, w)),
            }
        }
        if out.is_empty() {
            return Err(Error::Config("keyword_weights must not be empty".to_string()));
        }
        Ok(Self { weights: out })
    }

    pub fn weights(&self) -> &[(String, u32)] {
        &self.weights
    }

    /// Score and reasons for one paper, without touching it.
    pub fn score_one(&self, paper: &Paper) -> (u32, Vec<String>) {
        let haystack = format!(
            "{} {}",
            paper.title.to_lowercase(),
            paper.abstract_text.to_lowercase()
        );
        let mut score = 0u32;
        let mut reasons = Vec::new();
        for (kw, w) in &self.weights {
            if haystack.contains(kw.as_str()) {
                score = score.saturating_add(*w);
                reasons.push(format!("Found '{kw}' (score: +{w})"));
            }
        }
        (score, reasons)
    }

    /// Annotate every paper, drop those scoring zero, sort by score descending.
    /// Ties keep their input order.
    pub fn score(&self, papers: Vec<Paper>) -> Vec<Paper> {
        let mut kept: Vec<Paper> = papers
            .into_iter()
            .map(|mut p| {
                let (score, reasons) = self.score_one(&p);
                p.scores.keyword_score = score;
                p.scores.keyword_reasons = reasons;
                p
            })
            .filter(|p| p.scores.keyword_score > 0)
            .collect();
        kept.sort_by(|a, b| b.scores.keyword_score.cmp(&a.scores.keyword_score));
        kept
    }
}

#[cfg(test)]
pub(crate) fn paper(id: &str, title: &str, abstract_text: &str) -> Paper {
    use chrono::TimeZone;
    Paper {
        id: id.to_string(),
        title: title.to_string(),
        abstract_text: abstract_text.to_string(),
        url: format!("http://arxiv.org/abs/{id}"),
        pdf_url: Some(format!("http://arxiv.org/pdf/{id}")),
        authors: vec!["A. Author".to_string()],
        submitted: chrono::Utc.with_ymd_and_hms(2024, 5, 2, 20, 0, 0).unwrap(),
        comment: None,
        source: "arxiv".to_string(),
        scores: Default::default(),
        target_summary: None,
    }
}
