//! JSON snapshots of the paper list between pipeline stages.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use dailypapers_core::Paper;
use std::fs;
use std::path::{Path, PathBuf};

pub fn crawled_file_name(date: NaiveDate) -> String {
    format!("{}.json", date.format("%Y-%m-%d"))
}

pub fn scores_file_name(date: NaiveDate) -> String {
    format!("{}-scores.json", date.format("%Y-%m-%d"))
}

/// Pretty-printed JSON array; `dir` is created on demand.
pub fn write_papers(dir: &Path, file_name: &str, papers: &[Paper]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(file_name);
    let body = serde_json::to_vec_pretty(papers).context("serialize papers")?;
    fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    tracing::info!(count = papers.len(), path = %path.display(), "saved papers");
    Ok(path)
}

pub fn read_papers(path: &Path) -> Result<Vec<Paper>> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse papers from {}", path.display()))
}
