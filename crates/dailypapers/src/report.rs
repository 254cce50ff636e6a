//! Markdown report over the ranked paper list.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use dailypapers_core::{Paper, TargetSummary};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

fn summary_section(out: &mut String, s: &TargetSummary) {
    let _ = writeln!(out, "### T.A.R.G.E.T. Summary (from {})", s.source.label());
    for (label, v) in [
        ("Topic", &s.topic),
        ("Aim", &s.aim),
        ("Rationale", &s.rationale),
        ("Ground", &s.ground),
        ("Experiment", &s.experiment),
        ("Takeaway", &s.takeaway),
    ] {
        let _ = writeln!(out, "- **{label}**: {v}");
    }
    out.push('\n');
}

fn paper_section(out: &mut String, rank: usize, p: &Paper) {
    let _ = writeln!(out, "## {rank}. {}\n", p.title);
    let _ = writeln!(out, "- **Keyword Score**: {}", p.scores.keyword_score);
    if let Some(score) = p.scores.llm_score {
        let _ = writeln!(out, "- **LLM Score**: {score}");
    }
    if let Some(r) = p.scores.llm_rationale.as_deref().filter(|r| !r.is_empty()) {
        let _ = writeln!(out, "- **Reason**: {r}");
    }
    if !p.scores.keyword_reasons.is_empty() {
        let _ = writeln!(
            out,
            "- **Keyword Reasons**: {}",
            p.scores.keyword_reasons.join("; ")
        );
    }
    let _ = writeln!(out, "- **Authors**: {}", p.authors.join(", "));
    let _ = writeln!(out, "- **URL**: <{}>", p.url);
    let _ = writeln!(
        out,
        "- **Submitted**: {}",
        p.submitted.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(c) = p.comment.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(out, "- **Comment**: {c}");
    }
    out.push('\n');

    if let Some(s) = &p.target_summary {
        summary_section(out, s);
    }

    out.push_str("### Abstract\n");
    let abstract_text = if p.abstract_text.trim().is_empty() {
        "No abstract available."
    } else {
        p.abstract_text.trim()
    };
    let _ = writeln!(out, "> {abstract_text}\n");
    out.push_str("---\n\n");
}

/// Report body: the top `top_n` papers in full, the rest as a short list.
pub fn render(papers: &[Paper], date: NaiveDate, top_n: usize) -> String {
    let split = top_n.min(papers.len());
    let (top, rest) = papers.split_at(split);

    let mut out = String::new();
    let _ = writeln!(out, "# Daily Papers Report - {}\n", date.format("%Y-%m-%d"));
    let _ = writeln!(out, "Top {} relevant papers.\n", top.len());
    for (i, p) in top.iter().enumerate() {
        paper_section(&mut out, i + 1, p);
    }

    if !rest.is_empty() {
        out.push_str("## Other noteworthy papers\n\n");
        for p in rest {
            let llm = p
                .scores
                .llm_score
                .map(|s| format!(", LLM score {s}"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "- [{}](<{}>) (keyword score {}{llm})",
                p.title, p.url, p.scores.keyword_score
            );
        }
    }
    out
}

/// Writes `<dir>/<date>.md`. Nothing is written for an empty list.
pub fn write_report(
    dir: &Path,
    date: NaiveDate,
    top_n: usize,
    papers: &[Paper],
) -> Result<Option<PathBuf>> {
    if papers.is_empty() {
        tracing::warn!("no relevant papers to report");
        return Ok(None);
    }
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(format!("{}.md", date.format("%Y-%m-%d")));
    fs::write(&path, render(papers, date, top_n))
        .with_context(|| format!("write {}", path.display()))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dailypapers_core::SummarySource;

    fn paper(id: &str, title: &str, kw: u32) -> Paper {
        let mut p: Paper = serde_json::from_value(serde_json::json!({
            "id": id,
            "title": title,
            "abstract": "An abstract.",
            "url": format!("http://arxiv.org/abs/{id}"),
            "pdf_url": null,
            "authors": ["A. Author", "B. Author"],
            "submitted": "2024-05-02T20:00:00Z",
            "source": "arxiv"
        }))
        .unwrap();
        p.scores.keyword_score = kw;
        p
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    #[test]
    fn top_section_shows_scores_reasons_and_summary() {
        let mut a = paper("1", "Alpha", 5);
        a.scores.keyword_reasons = vec!["Found 'click' (score: +5)".to_string()];
        a.scores.llm_score = Some(8);
        a.scores.llm_rationale = Some("directly about click models".to_string());
        a.comment = Some("Accepted at SIGIR".to_string());
        a.target_summary = Some(TargetSummary {
            topic: "clicks".to_string(),
            aim: "a".to_string(),
            rationale: "r".to_string(),
            ground: "g".to_string(),
            experiment: "e".to_string(),
            takeaway: "k".to_string(),
            source: SummarySource::Abstract,
        });
        let b = paper("2", "Beta", 2);

        let md = render(&[a, b], date(), 1);
        assert!(md.starts_with("# Daily Papers Report - 2024-05-06\n"));
        assert!(md.contains("## 1. Alpha"));
        assert!(md.contains("- **LLM Score**: 8"));
        assert!(md.contains("- **Reason**: directly about click models"));
        assert!(md.contains("- **Keyword Reasons**: Found 'click' (score: +5)"));
        assert!(md.contains("- **Comment**: Accepted at SIGIR"));
        assert!(md.contains("### T.A.R.G.E.T. Summary (from Abstract)"));
        assert!(md.contains("- **Topic**: clicks"));
        assert!(md.contains("> An abstract."));
        assert!(!md.contains("## 2. Beta"));
        assert!(md.contains("## Other noteworthy papers"));
        assert!(md.contains("[Beta](<http://arxiv.org/abs/2>) (keyword score 2)"));
    }

    #[test]
    fn absent_llm_score_is_not_rendered() {
        let md = render(&[paper("1", "Alpha", 3)], date(), 10);
        assert!(!md.contains("LLM Score"));
        assert!(!md.contains("Other noteworthy"));
    }

    #[test]
    fn empty_list_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_report(dir.path(), date(), 10, &[]).unwrap().is_none());
        let p = write_report(dir.path(), date(), 10, &[paper("1", "Alpha", 3)])
            .unwrap()
            .unwrap();
        assert_eq!(p.file_name().unwrap(), "2024-05-06.md");
    }
}
