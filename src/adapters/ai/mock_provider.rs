//! Mock AI Provider for testing.
//!
//! Provides a configurable mock implementation of the AIProvider port,
//! allowing tests to run without calling real AI APIs.
//!
//! # Features
//!
//! - Pre-configured responses, globally or per cognitive step
//! - Simulated delays for timeout and cancellation testing
//! - Error injection for resilience testing
//! - Call tracking for verification
//!
//! Responses are picked in this order: the step's queue, the step's sticky
//! default, the global queue, then a generic fallback. The step is read from
//! `request.metadata.step`.
//!
//! # Example
//!
//! ```ignore
//! let provider = MockAIProvider::new()
//!     .with_step_response(INTERRUPTION_DECISION, "urgency: 0.9")
//!     .with_step_default(CHUNKED_DIALOGUE, "First thought | second thought")
//!     .with_delay(Duration::from_millis(10));
//! ```

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, CompletionStream, FinishReason,
    ProviderInfo, StreamChunk, TokenUsage,
};

/// Mock AI provider for testing.
///
/// Clones share queues and call history.
#[derive(Debug, Clone)]
pub struct MockAIProvider {
    /// Pre-configured responses for any step (consumed in order).
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Per-step responses (consumed in order).
    step_responses: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    /// Per-step responses returned whenever the step's queue is empty.
    step_defaults: Arc<Mutex<HashMap<String, MockResponse>>>,
    /// Provider info to return.
    info: ProviderInfo,
    /// Simulated latency per request.
    delay: Duration,
    /// Call history for verification.
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

/// A configured mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a successful completion.
    Success {
        content: String,
        usage: TokenUsage,
        finish_reason: FinishReason,
    },
    /// Return an error.
    Error(MockError),
}

impl MockResponse {
    fn text(content: impl Into<String>) -> Self {
        MockResponse::Success {
            content: content.into(),
            usage: TokenUsage::new(10, 20, 1),
            finish_reason: FinishReason::Stop,
        }
    }
}

/// Mock error types for testing error handling.
#[derive(Debug, Clone)]
pub enum MockError {
    /// Simulate rate limiting.
    RateLimited { retry_after_secs: u32 },
    /// Simulate context too long.
    ContextTooLong { tokens: u32, max: u32 },
    /// Simulate content filtering.
    ContentFiltered { reason: String },
    /// Simulate provider unavailable.
    Unavailable { message: String },
    /// Simulate authentication failure.
    AuthenticationFailed,
    /// Simulate network error.
    Network { message: String },
    /// Simulate timeout.
    Timeout { timeout_secs: u32 },
}

impl From<MockError> for AIError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::RateLimited { retry_after_secs } => AIError::rate_limited(retry_after_secs),
            MockError::ContextTooLong { tokens, max } => AIError::context_too_long(tokens, max),
            MockError::ContentFiltered { reason } => AIError::content_filtered(reason),
            MockError::Unavailable { message } => AIError::unavailable(message),
            MockError::AuthenticationFailed => AIError::AuthenticationFailed,
            MockError::Network { message } => AIError::network(message),
            MockError::Timeout { timeout_secs } => AIError::Timeout { timeout_secs },
        }
    }
}

impl Default for MockAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockAIProvider {
    /// Creates a new mock provider with default settings.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            step_responses: Arc::new(Mutex::new(HashMap::new())),
            step_defaults: Arc::new(Mutex::new(HashMap::new())),
            info: ProviderInfo::new("mock", "mock-model-1", 128000).with_streaming(true),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adds a successful response to the queue.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.with_response_full(content, TokenUsage::new(10, 20, 1), FinishReason::Stop)
    }

    /// Adds a successful response with full configuration.
    pub fn with_response_full(
        self,
        content: impl Into<String>,
        usage: TokenUsage,
        finish_reason: FinishReason,
    ) -> Self {
        lock(&self.responses).push_back(MockResponse::Success {
            content: content.into(),
            usage,
            finish_reason,
        });
        self
    }

    /// Adds an error response to the queue.
    pub fn with_error(self, error: MockError) -> Self {
        lock(&self.responses).push_back(MockResponse::Error(error));
        self
    }

    /// Queues a response for one cognitive step.
    pub fn with_step_response(self, step: &str, content: impl Into<String>) -> Self {
        lock(&self.step_responses)
            .entry(step.to_string())
            .or_default()
            .push_back(MockResponse::text(content));
        self
    }

    /// Queues an error for one cognitive step.
    pub fn with_step_error(self, step: &str, error: MockError) -> Self {
        lock(&self.step_responses)
            .entry(step.to_string())
            .or_default()
            .push_back(MockResponse::Error(error));
        self
    }

    /// Response for `step` whenever its queue is empty.
    pub fn with_step_default(self, step: &str, content: impl Into<String>) -> Self {
        lock(&self.step_defaults).insert(step.to_string(), MockResponse::text(content));
        self
    }

    /// Sets simulated latency per request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the provider info.
    pub fn with_provider_info(mut self, info: ProviderInfo) -> Self {
        self.info = info;
        self
    }

    /// Returns the number of calls made to this provider.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Returns the number of calls issued by `step`.
    pub fn calls_for_step(&self, step: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|request| request.metadata.step == step)
            .count()
    }

    /// Returns all recorded calls.
    pub fn get_calls(&self) -> Vec<CompletionRequest> {
        lock(&self.calls).clone()
    }

    /// Clears the call history.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Records the call and picks its response.
    fn next_response(&self, request: CompletionRequest) -> MockResponse {
        let step = request.metadata.step.clone();
        lock(&self.calls).push(request);

        if let Some(response) = lock(&self.step_responses)
            .get_mut(&step)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }
        if let Some(response) = lock(&self.step_defaults).get(&step) {
            return response.clone();
        }
        lock(&self.responses).pop_front().unwrap_or_else(|| MockResponse::Success {
            content: "Mock response".to_string(),
            usage: TokenUsage::new(5, 10, 1),
            finish_reason: FinishReason::Stop,
        })
    }
}

#[async_trait]
impl AIProvider for MockAIProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AIError> {
        let response = self.next_response(request);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match response {
            MockResponse::Success {
                content,
                usage,
                finish_reason,
            } => Ok(CompletionResponse {
                content,
                usage,
                model: self.info.model.clone(),
                finish_reason,
            }),
            MockResponse::Error(err) => Err(err.into()),
        }
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<CompletionStream, AIError> {
        let response = self.next_response(request);

        // Simulate initial delay
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let delay = self.delay;

        match response {
            MockResponse::Success {
                content,
                usage,
                finish_reason,
            } => {
                // Word-sized deltas that concatenate back to the exact content
                let word_chunks: Vec<Result<StreamChunk, AIError>> = content
                    .split_inclusive(' ')
                    .map(|word| Ok(StreamChunk::content(word)))
                    .collect();

                let final_chunk = stream::once(async move {
                    if !delay.is_zero() {
                        sleep(delay / 10).await;
                    }
                    Ok(StreamChunk::final_chunk(finish_reason, usage))
                });

                Ok(Box::pin(stream::iter(word_chunks).chain(final_chunk)))
            }
            MockResponse::Error(err) => Err(err.into()),
        }
    }

    fn estimate_tokens(&self, text: &str) -> u32 {
        // Rough approximation: ~4 characters per token
        (text.len() / 4).max(1) as u32
    }

    fn provider_info(&self) -> ProviderInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::SessionId;
    use crate::ports::{MessageRole, RequestMetadata};

    fn request_for(step: &str) -> CompletionRequest {
        CompletionRequest::new(RequestMetadata::new(Some(SessionId::new()), step, "trace-123"))
            .with_message(MessageRole::User, "Hello")
    }

    fn test_request() -> CompletionRequest {
        request_for("test_step")
    }

    #[tokio::test]
    async fn mock_provider_returns_configured_response() {
        let provider = MockAIProvider::new().with_response("Hello from mock!");

        let response = provider.complete(test_request()).await.unwrap();

        assert_eq!(response.content, "Hello from mock!");
        assert_eq!(response.model, "mock-model-1");
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn mock_provider_returns_responses_in_order() {
        let provider = MockAIProvider::new()
            .with_response("First")
            .with_response("Second")
            .with_response("Third");

        let r1 = provider.complete(test_request()).await.unwrap();
        let r2 = provider.complete(test_request()).await.unwrap();
        let r3 = provider.complete(test_request()).await.unwrap();

        assert_eq!(r1.content, "First");
        assert_eq!(r2.content, "Second");
        assert_eq!(r3.content, "Third");
    }

    #[tokio::test]
    async fn mock_provider_returns_default_after_exhausted() {
        let provider = MockAIProvider::new().with_response("Only one");

        let r1 = provider.complete(test_request()).await.unwrap();
        let r2 = provider.complete(test_request()).await.unwrap();

        assert_eq!(r1.content, "Only one");
        assert_eq!(r2.content, "Mock response"); // Default
    }

    #[tokio::test]
    async fn step_queue_then_step_default() {
        let provider = MockAIProvider::new()
            .with_response("global")
            .with_step_response("decision", "image")
            .with_step_default("decision", "chat");

        let r1 = provider.complete(request_for("decision")).await.unwrap();
        let r2 = provider.complete(request_for("decision")).await.unwrap();
        let r3 = provider.complete(request_for("decision")).await.unwrap();
        let r4 = provider.complete(request_for("summarize")).await.unwrap();

        assert_eq!(r1.content, "image");
        assert_eq!(r2.content, "chat");
        assert_eq!(r3.content, "chat");
        assert_eq!(r4.content, "global");
        assert_eq!(provider.calls_for_step("decision"), 3);
        assert_eq!(provider.calls_for_step("summarize"), 1);
    }

    #[tokio::test]
    async fn mock_provider_returns_configured_error() {
        let provider = MockAIProvider::new()
            .with_error(MockError::RateLimited { retry_after_secs: 30 });

        let result = provider.complete(test_request()).await;

        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, AIError::RateLimited { retry_after_secs: 30 }));
    }

    #[tokio::test]
    async fn step_errors_only_hit_their_step() {
        let provider = MockAIProvider::new().with_step_error(
            "backchannel",
            MockError::Unavailable {
                message: "down".to_string(),
            },
        );

        assert!(provider.complete(request_for("backchannel")).await.is_err());
        assert!(provider.complete(request_for("other")).await.is_ok());
    }

    #[tokio::test]
    async fn mock_provider_tracks_calls() {
        let provider = MockAIProvider::new()
            .with_response("Response 1")
            .with_response("Response 2");

        assert_eq!(provider.call_count(), 0);

        provider.complete(test_request()).await.unwrap();
        assert_eq!(provider.call_count(), 1);

        provider.complete(test_request()).await.unwrap();
        assert_eq!(provider.call_count(), 2);

        provider.clear_calls();
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn streaming_reassembles_exact_content() {
        let provider = MockAIProvider::new().with_response("Hello  world, from streaming ");

        let mut stream = provider.stream_complete(test_request()).await.unwrap();

        let mut content = String::new();
        let mut final_chunk = None;

        while let Some(result) = stream.next().await {
            let chunk = result.unwrap();
            if chunk.is_final() {
                final_chunk = Some(chunk);
            } else {
                content.push_str(&chunk.delta);
            }
        }

        assert_eq!(content, "Hello  world, from streaming ");
        let final_chunk = final_chunk.unwrap();
        assert_eq!(final_chunk.finish_reason, Some(FinishReason::Stop));
        assert_eq!(final_chunk.usage, Some(TokenUsage::new(10, 20, 1)));
    }

    #[tokio::test]
    async fn mock_provider_streaming_returns_error() {
        let provider = MockAIProvider::new().with_error(MockError::Unavailable {
            message: "Service down".to_string(),
        });

        let result = provider.stream_complete(test_request()).await;

        match result {
            Ok(_) => panic!("Expected error, got stream"),
            Err(err) => assert!(matches!(err, AIError::Unavailable { .. })),
        }
    }

    #[tokio::test]
    async fn mock_provider_estimates_tokens() {
        let provider = MockAIProvider::new();

        // ~4 chars per token
        assert_eq!(provider.estimate_tokens("Hi"), 1);
        assert_eq!(provider.estimate_tokens("Hello world"), 2); // 11 chars / 4 = 2
        assert_eq!(provider.estimate_tokens("This is a longer sentence."), 6); // 26 chars / 4 = 6
    }

    #[tokio::test]
    async fn mock_provider_returns_info() {
        let custom_info = ProviderInfo::new("custom", "custom-model", 32000).with_streaming(false);

        let provider = MockAIProvider::new().with_provider_info(custom_info);

        let info = provider.provider_info();
        assert_eq!(info.name, "custom");
        assert_eq!(info.model, "custom-model");
        assert_eq!(info.max_context_tokens, 32000);
        assert!(!info.supports_streaming);
    }

    #[tokio::test]
    async fn mock_provider_respects_delay() {
        let provider = MockAIProvider::new()
            .with_response("Delayed response")
            .with_delay(Duration::from_millis(50));

        let start = std::time::Instant::now();
        provider.complete(test_request()).await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(50));
    }

    #[test]
    fn mock_error_converts_to_ai_error() {
        let err: AIError = MockError::RateLimited { retry_after_secs: 10 }.into();
        assert!(matches!(err, AIError::RateLimited { retry_after_secs: 10 }));

        let err: AIError = MockError::ContextTooLong { tokens: 100, max: 50 }.into();
        assert!(matches!(err, AIError::ContextTooLong { tokens: 100, max: 50 }));

        let err: AIError = MockError::AuthenticationFailed.into();
        assert!(matches!(err, AIError::AuthenticationFailed));

        let err: AIError = MockError::Timeout { timeout_secs: 30 }.into();
        assert!(matches!(err, AIError::Timeout { timeout_secs: 30 }));
    }
}
