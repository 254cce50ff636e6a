//! Full text of a paper from its PDF.

use crate::{Error, Result};
use dailypapers_core::DocumentText;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_MAX_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Extract text from an in-memory PDF body.
///
/// Extraction quality varies by PDF (text layer vs scanned images).
pub fn pdf_to_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| Error::Document(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct PdfTextFetcher {
    http: reqwest::Client,
    max_bytes: usize,
    timeout: Duration,
}

impl PdfTextFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            max_bytes: DEFAULT_MAX_BYTES,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Download at most `max_bytes`; a larger body is an error, not a truncation,
    /// since a cut PDF does not parse.
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Document(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Document(format!("pdf download failed: HTTP {status}")));
        }
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Document(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > self.max_bytes {
                return Err(Error::Document(format!(
                    "pdf larger than {} bytes",
                    self.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    pub async fn try_full_text(&self, url: &str) -> Result<String> {
        let bytes = self.download(url).await?;
        // pdf-extract is CPU-bound and may panic on odd files; keep it off the runtime.
        let text = tokio::task::spawn_blocking(move || pdf_to_text(&bytes))
            .await
            .map_err(|e| Error::Document(format!("pdf extraction aborted: {e}")))??;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(Error::Document("pdf has no text layer".to_string()));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl DocumentText for PdfTextFetcher {
    async fn full_text(&self, pdf_url: &str) -> Option<String> {
        info!(url = pdf_url, "downloading pdf");
        match self.try_full_text(pdf_url).await {
            Ok(text) => {
                info!(url = pdf_url, chars = text.chars().count(), "pdf text extracted");
                Some(text)
            }
            Err(e) => {
                warn!(url = pdf_url, error = %e, "no pdf text");
                None
            }
        }
    }
}
