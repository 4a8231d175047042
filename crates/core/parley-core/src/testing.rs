//! Testing utilities shared by the adaptor crates

use crate::config::AgentSettings;
use crate::gateway::{CompletionGateway, CompletionProvider};
use crate::memory_store::InMemoryMemoryStore;
use crate::resilience::RetryPolicy;
use crate::runtime::{AgentRuntime, RuntimeOpts};
use crate::types::*;
use crate::utils::Logger;
use crate::{ParleyError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<String>>,
    requests: Vec<CompletionRequest>,
}

/// Completion backend that replays queued responses and records requests.
///
/// Once the queue is empty every call fails with a model error.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
}

impl ScriptedProvider {
    /// Provider answering with `responses` in order
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::default();
        for response in responses {
            provider.push_response(response);
        }
        provider
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a successful completion
    pub fn push_response(&self, text: impl Into<String>) {
        self.script().responses.push_back(Ok(text.into()));
    }

    /// Queue a failure
    pub fn push_error(&self, error: ParleyError) {
        self.script().responses.push_back(Err(error));
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.script().requests.clone()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.script().requests.len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut script = self.script();
        script.requests.push(request);
        script
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(ParleyError::model("scripted provider has no responses left")))
    }
}

/// Character used across tests
pub fn test_character() -> Character {
    Character {
        name: "Rop".to_string(),
        username: Some("rop_bot".to_string()),
        bio: vec!["terminally online".to_string()],
        lore: vec!["once out-posted a bot farm".to_string()],
        topics: vec!["memes".to_string()],
        post_examples: vec!["gm to everyone except gas fees".to_string()],
        ..Default::default()
    }
}

/// Retry policy that never waits long
pub fn quick_retry(max_attempts: usize) -> RetryPolicy {
    RetryPolicy::bounded(max_attempts, Duration::from_millis(1))
}

/// Settings with bounded, fast retries for tests
pub fn test_settings() -> AgentSettings {
    let mut settings = AgentSettings::default();
    settings.retry = quick_retry(3);
    settings.format.retry_delay = Duration::from_millis(1);
    settings
}

/// Runtime backed by `provider` (registered as the default and the format
/// provider) and an in-memory store
pub fn create_test_runtime(
    provider: Arc<ScriptedProvider>,
) -> (Arc<AgentRuntime>, Arc<InMemoryMemoryStore>) {
    let settings = test_settings();
    let store = Arc::new(InMemoryMemoryStore::new());
    let gateway = CompletionGateway::new(settings.model_provider, Logger::new("test"))
        .with_provider(settings.model_provider, provider.clone())
        .with_provider(settings.format.provider, provider);

    let runtime = AgentRuntime::new(RuntimeOpts {
        agent_id: None,
        character: test_character(),
        settings,
        gateway: Arc::new(gateway),
        store: store.clone(),
        logger: Logger::new("test"),
    });
    (Arc::new(runtime), store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_provider_replays_in_order() {
        let provider = ScriptedProvider::new(["one"]);
        provider.push_error(ParleyError::model("boom"));

        let request = CompletionRequest::default();
        assert_eq!(provider.complete(request.clone()).await.unwrap(), "one");
        assert!(provider.complete(request.clone()).await.is_err());
        assert!(provider.complete(request).await.is_err());
        assert_eq!(provider.call_count(), 3);
    }
}
