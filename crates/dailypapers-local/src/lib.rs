use std::time::Duration;

pub use dailypapers_core::{Error, Result};

pub mod arxiv;
pub mod fetcher;
pub mod invoker;
pub mod keyword;
pub mod openai_compat;
pub mod pdf;
pub mod prompts;
pub mod relevance;
pub mod summarize;
pub mod window;

pub use fetcher::TimeWindowFetcher;
pub use invoker::{ModelChain, ResilientInvoker, RetryPolicy};
pub use keyword::KeywordScorer;
pub use relevance::RelevanceScorer;
pub use summarize::MapReduceSummarizer;

/// Shared HTTP client. Per-request timeouts (chat, feed, PDF) override the
/// default here.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("dailypapers/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        // Avoid "hang forever" on DNS/TLS/body stalls.
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| Error::Config(format!("http client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_client_builds() {
        assert!(http_client().is_ok());
    }
}
