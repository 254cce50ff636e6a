//! Prompt templates.
//!
//! Layout matches the `prompt.json` files the pipeline accepts as overrides:
//! `{"scoring": {...}, "summarize_target_map_reduce": {...}}`. Placeholders are
//! `{name}`; unknown placeholders are left as-is.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringPrompts {
    pub system_prompt: String,
    /// Placeholders: `{interests}`, `{title}`, `{abstract}`.
    pub user_prompt: String,
}

impl Default for ScoringPrompts {
    fn default() -> Self {
        Self {
            system_prompt: "You are a research assistant who triages newly published computer \
science papers for a reader. You answer with a single JSON object and nothing else."
                .to_string(),
            user_prompt: "Reader interests:\n{interests}\n\n\
Paper title: {title}\n\
Paper abstract: {abstract}\n\n\
Rate how relevant this paper is to the reader's interests on an integer scale from 0 \
(unrelated) to 10 (must read). Respond with JSON of the form \
{\"score\": <int>, \"reasons\": \"<one or two sentences>\"}."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPrompts {
    /// Placeholder: `{input}` (one chunk of the paper).
    pub map_prompt: String,
    /// Placeholder: `{chunk_summaries}` (summaries joined by a separator).
    pub intermediate_reduce_prompt: String,
    /// Placeholder: `{chunk_summaries}` (the single remaining summary).
    pub reduce_prompt: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            map_prompt: "The following is one section of a computer science paper.\n\n\
{input}\n\n\
Summarize this section in a dense paragraph. Keep the problem statement, the method, \
datasets, metrics and numeric results when present. Do not invent details."
                .to_string(),
            intermediate_reduce_prompt: "The following are partial summaries of consecutive \
sections of one paper, separated by ---.\n\n\
{chunk_summaries}\n\n\
Merge them into one coherent summary. Keep every concrete method detail, dataset, metric \
and result; drop repetition."
                .to_string(),
            reduce_prompt: "The following is a summary of a computer science paper.\n\n\
{chunk_summaries}\n\n\
Rewrite it in the T.A.R.G.E.T. format and respond with a JSON object with exactly these \
string fields:\n\
- \"topic\": the research area and problem\n\
- \"aim\": what the paper sets out to achieve\n\
- \"rationale\": why the problem matters and what gap it fills\n\
- \"ground\": the method or theoretical ground\n\
- \"experiment\": datasets, baselines and key results\n\
- \"takeaway\": the main lesson for a practitioner"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptSet {
    #[serde(default)]
    pub scoring: ScoringPrompts,
    #[serde(default)]
    pub summarize_target_map_reduce: SummaryPrompts,
}

/// Substitute `{key}` placeholders.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let hit = vars.iter().find(|(k, _)| {
            after
                .strip_prefix(*k)
                .map(|t| t.starts_with('}'))
                .unwrap_or(false)
        });
        match hit {
            Some((k, v)) => {
                out.push_str(v);
                rest = &after[k.len() + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
