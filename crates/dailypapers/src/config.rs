//! YAML configuration.
//!
//! Every field has a default, so a partial file (or an empty one) is valid input;
//! [`Config::validate`] then rejects combinations that cannot run.

use anyhow::{Context, Result};
use dailypapers_core::Error;
use dailypapers_local::prompts::PromptSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub arxiv_crawler: CrawlerSettings,
    pub classifier: ClassifierSettings,
    pub llm_scorer: LlmScorerSettings,
    pub groq_settings: GroqSettings,
    pub summarizer: SummarizerSettings,
    pub reporter: ReporterSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
    /// JSON prompt overrides; built-in prompts when absent.
    pub prompts_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerSettings {
    pub enabled: bool,
    pub queries: Vec<String>,
    pub max_results: usize,
    pub page_size: usize,
    pub page_delay_secs: u64,
    pub timeout_secs: u64,
    pub endpoint: Option<String>,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            queries: vec!["cat:cs.IR".to_string()],
            max_results: 100,
            page_size: dailypapers_local::fetcher::DEFAULT_PAGE_SIZE,
            page_delay_secs: 3,
            timeout_secs: 30,
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub keyword_weights: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmScorerSettings {
    pub enabled: bool,
    pub interests: String,
    pub model: String,
    pub model_fallback_list: Vec<String>,
    /// Papers sent to the LLM, best keyword scores first; `<= 0` means all.
    pub processing_limit: i64,
}

impl Default for LlmScorerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interests: String::new(),
            model: String::new(),
            model_fallback_list: Vec::new(),
            processing_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroqSettings {
    pub api_key_env: String,
    pub base_url: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for GroqSettings {
    fn default() -> Self {
        Self {
            api_key_env: dailypapers_local::openai_compat::DEFAULT_API_KEY_ENV.to_string(),
            base_url: dailypapers_local::openai_compat::DEFAULT_BASE_URL.to_string(),
            temperature: dailypapers_local::invoker::DEFAULT_TEMPERATURE,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerSettings {
    pub enabled: bool,
    pub map_model: String,
    pub map_fallback_list: Vec<String>,
    pub reduce_model: String,
    pub reduce_fallback_list: Vec<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub payload_limit: usize,
    pub throttle_secs: u64,
    pub max_reduce_rounds: u32,
    /// Longer full texts are replaced by the abstract.
    pub max_text_length_for_full_summary: usize,
    /// Top-ranked papers to summarize; `<= 0` means all.
    pub processing_limit: i64,
    pub pdf_max_bytes: usize,
    pub pdf_timeout_secs: u64,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        use dailypapers_local::summarize as s;
        Self {
            enabled: false,
            map_model: String::new(),
            map_fallback_list: Vec::new(),
            reduce_model: String::new(),
            reduce_fallback_list: Vec::new(),
            chunk_size: s::DEFAULT_CHUNK_SIZE,
            chunk_overlap: s::DEFAULT_CHUNK_OVERLAP,
            payload_limit: s::DEFAULT_PAYLOAD_LIMIT,
            throttle_secs: s::DEFAULT_THROTTLE.as_secs(),
            max_reduce_rounds: s::DEFAULT_MAX_REDUCE_ROUNDS,
            max_text_length_for_full_summary: 100_000,
            processing_limit: 5,
            pdf_max_bytes: dailypapers_local::pdf::DEFAULT_MAX_BYTES,
            pdf_timeout_secs: 30,
        }
    }
}

impl SummarizerSettings {
    pub fn chunks(&self) -> dailypapers_local::summarize::ChunkConfig {
        dailypapers_local::summarize::ChunkConfig {
            size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_secs(self.throttle_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterSettings {
    pub report_path: PathBuf,
    pub top_n: usize,
}

impl Default for ReporterSettings {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("reports"),
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub crawled_path: PathBuf,
    pub scores_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            crawled_path: PathBuf::from("data/crawled"),
            scores_path: PathBuf::from("data/scores"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Appended to, without ANSI colors. `null` disables the file layer.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("logs/app.log")),
        }
    }
}

impl Config {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a map.
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(s).context("parse config yaml")?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg = Self::from_yaml_str(&s).with_context(|| format!("load {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> std::result::Result<(), Error> {
        let bad = |m: &str| Err(Error::Config(m.to_string()));
        if self.classifier.keyword_weights.is_empty() {
            return bad("classifier.keyword_weights must not be empty");
        }
        if let Some((k, _)) = self.classifier.keyword_weights.iter().find(|(_, w)| **w == 0) {
            return Err(Error::Config(format!(
                "classifier.keyword_weights: '{k}' has a zero weight"
            )));
        }
        if self.arxiv_crawler.enabled && self.arxiv_crawler.queries.iter().all(|q| q.trim().is_empty()) {
            return bad("arxiv_crawler.queries must not be empty");
        }
        if self.llm_scorer.enabled {
            if self.llm_scorer.interests.trim().is_empty() {
                return bad("llm_scorer.interests must not be empty when llm_scorer is enabled");
            }
            if self.llm_scorer.model.trim().is_empty() {
                return bad("llm_scorer.model must be set when llm_scorer is enabled");
            }
        }
        if self.summarizer.enabled {
            if self.summarizer.map_model.trim().is_empty() {
                return bad("summarizer.map_model must be set when summarizer is enabled");
            }
            if self.summarizer.reduce_model.trim().is_empty() {
                return bad("summarizer.reduce_model must be set when summarizer is enabled");
            }
        }
        self.summarizer.chunks().validate()?;
        Ok(())
    }

    /// Prompt set: built-ins, overridden by `prompts_path` when set.
    pub fn prompts(&self) -> Result<PromptSet> {
        let Some(p) = &self.prompts_path else {
            return Ok(PromptSet::default());
        };
        let s = std::fs::read_to_string(p).with_context(|| format!("read prompts {}", p.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parse prompts {}", p.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
arxiv_crawler:
  queries: ["cat:cs.IR", "ti:retrieval"]
  max_results: 50
classifier:
  keyword_weights:
    retrieval: 2
    click: 5
llm_scorer:
  enabled: true
  interests: "search ranking, click models"
  model: llama-3.1-8b-instant
  model_fallback_list: [gemma2-9b-it]
summarizer:
  chunk_size: 3000
logging:
  file: null
"#;

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg = Config::from_yaml_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.arxiv_crawler.max_results, 50);
        assert_eq!(cfg.arxiv_crawler.page_size, 100);
        assert_eq!(cfg.classifier.keyword_weights["click"], 5);
        assert_eq!(cfg.llm_scorer.processing_limit, 20);
        assert_eq!(cfg.summarizer.chunk_size, 3000);
        assert_eq!(cfg.summarizer.chunk_overlap, 400);
        assert_eq!(cfg.groq_settings.api_key_env, "GROQ_API_KEY");
        assert!(cfg.logging.file.is_none());
        assert_eq!(cfg.reporter.top_n, 10);
    }

    #[test]
    fn empty_document_is_all_defaults_but_not_runnable() {
        let cfg = Config::from_yaml_str("").unwrap();
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validation_rejects_unrunnable_combinations() {
        let base = Config::from_yaml_str(SAMPLE).unwrap();

        let mut c = base.clone();
        c.classifier.keyword_weights.insert("zero".to_string(), 0);
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.llm_scorer.interests = " ".to_string();
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.summarizer.enabled = true;
        c.summarizer.map_model = "m".to_string();
        assert!(c.validate().is_err());

        let mut c = base;
        c.summarizer.chunk_overlap = c.summarizer.chunk_size;
        assert!(c.validate().is_err());
    }

    #[test]
    fn prompt_overrides_are_read_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("prompt.json");
        std::fs::write(
            &p,
            r#"{"scoring": {"system_prompt": "S", "user_prompt": "{title}"}}"#,
        )
        .unwrap();
        let mut cfg = Config::from_yaml_str(SAMPLE).unwrap();
        assert!(cfg.prompts().unwrap().scoring.user_prompt.contains("{interests}"));
        cfg.prompts_path = Some(p);
        assert_eq!(cfg.prompts().unwrap().scoring.user_prompt, "{title}");
    }
}
