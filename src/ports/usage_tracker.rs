//! UsageTracker port - Interface for tracking model usage and costs.
//!
//! Every cognitive step invocation produces exactly one `UsageRecord`,
//! streamed or not, so cost can be attributed per session and per step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{SessionId, Timestamp};

use super::ai_provider::{ProviderId, TokenUsage};

/// Record of model usage for a single step invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Session context.
    pub session_id: SessionId,
    /// Provider that served the call.
    pub provider: ProviderId,
    /// Model used.
    pub model: String,
    /// Cognitive step that issued the call.
    pub step: String,
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// Cost in cents.
    pub cost_cents: u32,
    /// Whether the call was streamed.
    pub streamed: bool,
    /// When the usage occurred.
    pub occurred_at: Timestamp,
}

impl UsageRecord {
    /// Creates a new usage record from a provider's token report.
    pub fn new(
        session_id: SessionId,
        provider: ProviderId,
        model: impl Into<String>,
        step: impl Into<String>,
        usage: &TokenUsage,
        streamed: bool,
    ) -> Self {
        Self {
            session_id,
            provider,
            model: model.into(),
            step: step.into(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cost_cents: usage.estimated_cost_cents,
            streamed,
            occurred_at: Timestamp::now(),
        }
    }

    /// Total tokens used.
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Summary of usage for a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Total cost in cents.
    pub total_cost_cents: u32,
    /// Total tokens used.
    pub total_tokens: u32,
    /// Number of model calls.
    pub request_count: u32,
    /// Breakdown by provider.
    pub by_provider: Vec<ProviderUsage>,
}

impl UsageSummary {
    /// Folds records into a summary, grouping by provider in first-seen order.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a UsageRecord>) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.total_cost_cents += record.cost_cents;
            summary.total_tokens += record.total_tokens();
            summary.request_count += 1;

            match summary
                .by_provider
                .iter_mut()
                .find(|p| p.provider == record.provider)
            {
                Some(entry) => {
                    entry.cost_cents += record.cost_cents;
                    entry.tokens += record.total_tokens();
                    entry.requests += 1;
                }
                None => summary.by_provider.push(ProviderUsage {
                    provider: record.provider,
                    cost_cents: record.cost_cents,
                    tokens: record.total_tokens(),
                    requests: 1,
                }),
            }
        }
        summary
    }
}

/// Usage breakdown by provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUsage {
    /// Provider.
    pub provider: ProviderId,
    /// Cost in cents for this provider.
    pub cost_cents: u32,
    /// Tokens used with this provider.
    pub tokens: u32,
    /// Number of calls to this provider.
    pub requests: u32,
}

/// Status of usage relative to a limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageLimitStatus {
    /// Under the limit, no concerns.
    UnderLimit {
        /// Cents remaining before limit.
        remaining_cents: u32,
    },
    /// Approaching the limit (>= 80% used).
    Warning {
        /// Cents remaining before limit.
        remaining_cents: u32,
        /// Percentage of limit used.
        percent_used: u8,
    },
    /// At or over the limit.
    AtLimit,
}

impl UsageLimitStatus {
    /// Calculates limit status from current usage and limit.
    ///
    /// - Under 80% used: `UnderLimit`
    /// - 80-99% used: `Warning`
    /// - 100%+ used: `AtLimit`
    pub fn from_usage(current_cents: u32, limit_cents: u32) -> Self {
        if limit_cents == 0 || current_cents >= limit_cents {
            return Self::AtLimit;
        }

        let remaining = limit_cents - current_cents;
        let percent_used = ((current_cents as f64 / limit_cents as f64) * 100.0) as u8;

        if percent_used >= 80 {
            Self::Warning {
                remaining_cents: remaining,
                percent_used,
            }
        } else {
            Self::UnderLimit {
                remaining_cents: remaining,
            }
        }
    }

    /// Returns true if further calls should be blocked.
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::AtLimit)
    }

    /// Returns true if the operator should be warned.
    pub fn should_warn(&self) -> bool {
        matches!(self, Self::Warning { .. })
    }
}

/// Port for tracking model usage and costs.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    /// Records a usage event.
    async fn record_usage(&self, record: UsageRecord) -> Result<(), UsageTrackerError>;

    /// Gets the usage summary for a session.
    async fn session_usage(&self, session_id: SessionId) -> Result<UsageSummary, UsageTrackerError>;

    /// Checks if a session is within its limit.
    async fn check_session_limit(
        &self,
        session_id: SessionId,
        limit_cents: u32,
    ) -> Result<UsageLimitStatus, UsageTrackerError> {
        let summary = self.session_usage(session_id).await?;
        Ok(UsageLimitStatus::from_usage(summary.total_cost_cents, limit_cents))
    }
}

/// Errors from the usage tracker.
#[derive(Debug, thiserror::Error)]
pub enum UsageTrackerError {
    /// Backing store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Session not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
}
