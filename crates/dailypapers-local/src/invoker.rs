//! Resilient chat-completion invocation: per-model retry with exponential backoff,
//! then a cascade through an ordered fallback chain.
//!
//! Exhausting the whole chain is not an error for callers of [`ResilientInvoker::invoke`]:
//! it returns `None` so they can degrade (keyword-only scores, skipped chunk, ...).

use crate::{Error, Result};
use dailypapers_core::{ChatMessage, ChatProvider, ChatRequest};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{error, info, warn};

pub const DEFAULT_TEMPERATURE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): `2^attempt` seconds,
    /// clamped to `[min_delay, max_delay]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = Duration::from_secs(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        exp.clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }

    /// One delay per retry: `delay_for(1)`, `delay_for(2)`, ...
    pub fn strategy(&self) -> impl Iterator<Item = Duration> {
        let min = self.min_delay;
        ExponentialBackoff::from_millis(2)
            .factor(1000)
            .max_delay(self.max_delay.max(min))
            .map(move |d| d.max(min))
            .take(self.max_attempts.max(1) as usize - 1)
    }
}

/// Run `op` until it succeeds, fails with an error `should_retry` rejects, or
/// `policy.max_attempts` attempts have been made. `op` receives the 1-based
/// attempt number.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    should_retry: P,
    mut op: F,
) -> std::result::Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let attempts = AtomicU32::new(0);
    let action = || op(attempts.fetch_add(1, Ordering::Relaxed) + 1);
    let condition = |e: &E| {
        let attempt = attempts.load(Ordering::Relaxed);
        let retry = attempt < max_attempts && should_retry(e);
        if retry {
            warn!(
                target: "dailypapers::invoker",
                label,
                attempt,
                delay_s = policy.delay_for(attempt).as_secs(),
                error = %e,
                "retryable error; backing off"
            );
        }
        retry
    };
    RetryIf::spawn(policy.strategy(), action, condition).await
}

/// Primary model first, then the fallbacks in order, each at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChain {
    models: Vec<String>,
}

impl ModelChain {
    pub fn new(primary: &str, fallbacks: &[String]) -> Result<Self> {
        let primary = primary.trim();
        if primary.is_empty() {
            return Err(Error::Config("a primary model must be specified".to_string()));
        }
        let mut models = vec![primary.to_string()];
        for m in fallbacks {
            let m = m.trim();
            if !m.is_empty() && !models.iter().any(|x| x == m) {
                models.push(m.to_string());
            }
        }
        Ok(Self { models })
    }

    pub fn primary(&self) -> &str {
        &self.models[0]
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }
}

#[derive(Clone)]
pub struct ResilientInvoker {
    provider: Arc<dyn ChatProvider>,
    chain: ModelChain,
    temperature: f64,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ResilientInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientInvoker")
            .field("provider", &self.provider.name())
            .field("chain", &self.chain)
            .field("temperature", &self.temperature)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ResilientInvoker {
    pub fn new(provider: Arc<dyn ChatProvider>, chain: ModelChain) -> Self {
        Self {
            provider,
            chain,
            temperature: DEFAULT_TEMPERATURE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Walk the chain. `Err(Error::ExhaustedFallback)` once every model failed.
    pub async fn try_invoke(&self, messages: &[ChatMessage], json: bool) -> Result<String> {
        let models = self.chain.models();
        for (i, model) in models.iter().enumerate() {
            info!(target: "dailypapers::invoker", model = %model, json, "attempting model");
            let req = ChatRequest {
                model: model.clone(),
                messages: messages.to_vec(),
                temperature: self.temperature,
                json,
            };
            let provider = &self.provider;
            let r = retry_with_backoff(&self.retry, model, Error::is_transient, |attempt| {
                let req = &req;
                async move {
                    info!(target: "dailypapers::invoker", model = %req.model, attempt, "calling provider");
                    provider.complete(req).await
                }
            })
            .await;
            match r {
                Ok(text) => return Ok(text),
                Err(e) => {
                    let next = models.get(i + 1).map(String::as_str).unwrap_or("<none>");
                    warn!(
                        target: "dailypapers::invoker",
                        model = %model,
                        next_model = next,
                        error = %e,
                        "model failed; moving to next model in fallback chain"
                    );
                }
            }
        }
        error!(
            target: "dailypapers::invoker",
            models = models.len(),
            "all models in fallback chain failed"
        );
        Err(Error::ExhaustedFallback)
    }

    /// Like [`Self::try_invoke`], with exhaustion reported as `None`.
    pub async fn invoke(&self, messages: &[ChatMessage], json: bool) -> Option<String> {
        self.try_invoke(messages, json).await.ok()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory provider shared by the component tests.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    pub type Handler = Box<dyn Fn(&ChatRequest) -> Result<String> + Send + Sync>;

    #[derive(Default)]
    pub struct ScriptedProvider {
        per_model: Mutex<HashMap<String, VecDeque<Result<String>>>>,
        handler: Option<Handler>,
        pub calls: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer every request with `f` (after any queued per-model responses).
        pub fn with_handler(
            f: impl Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Some(Box::new(f)),
                ..Self::default()
            }
        }

        pub fn push(&self, model: &str, r: Result<String>) {
            self.per_model
                .lock()
                .unwrap()
                .entry(model.to_string())
                .or_default()
                .push_back(r);
        }

        pub fn calls_for(&self, model: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.model == model)
                .count()
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, req: &ChatRequest) -> Result<String> {
            self.calls.lock().unwrap().push(req.clone());
            let queued = self
                .per_model
                .lock()
                .unwrap()
                .get_mut(&req.model)
                .and_then(|q| q.pop_front());
            if let Some(r) = queued {
                return r;
            }
            match &self.handler {
                Some(h) => h(req),
                None => Err(Error::TransientProvider("no scripted response".to_string())),
            }
        }
    }
}
