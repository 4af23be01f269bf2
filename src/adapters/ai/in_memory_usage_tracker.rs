//! In-memory usage tracker implementation.
//!
//! This adapter provides an in-memory implementation of the `UsageTracker` port.
//! Useful for:
//! - Tests that assert on per-step accounting
//! - The command-line dialogue runner, which prints usage on exit
//!
//! Records are lost when the process exits.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::SessionId;
use crate::ports::{UsageRecord, UsageSummary, UsageTracker, UsageTrackerError};

/// In-memory implementation of the UsageTracker port.
///
/// Thread-safe via internal `Mutex`.
///
/// # Example
///
/// ```ignore
/// let tracker = Arc::new(InMemoryUsageTracker::new());
/// let runtime = StepRuntime::new(registry, tracker.clone(), session_id);
///
/// step.run(&runtime, &memory, &args, &options).await?;
///
/// let summary = tracker.session_usage(session_id).await?;
/// assert_eq!(summary.request_count, 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryUsageTracker {
    records: Mutex<Vec<UsageRecord>>,
}

impl InMemoryUsageTracker {
    /// Creates a new empty usage tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded usage records.
    pub fn records(&self) -> Vec<UsageRecord> {
        self.lock().clone()
    }

    /// Records issued by one cognitive step.
    pub fn records_for_step(&self, step: &str) -> Vec<UsageRecord> {
        self.lock()
            .iter()
            .filter(|record| record.step == step)
            .cloned()
            .collect()
    }

    /// Clears all recorded usage.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns the total number of records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no records exist.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UsageRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UsageTracker for InMemoryUsageTracker {
    async fn record_usage(&self, record: UsageRecord) -> Result<(), UsageTrackerError> {
        self.lock().push(record);
        Ok(())
    }

    async fn session_usage(&self, session_id: SessionId) -> Result<UsageSummary, UsageTrackerError> {
        let records = self.lock();
        Ok(UsageSummary::from_records(
            records.iter().filter(|r| r.session_id == session_id),
        ))
    }
}
