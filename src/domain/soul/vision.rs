//! Per-session image generation budget.
//!
//! Each chat session carries its own budget, so concurrent sessions never
//! share counters.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// Outcome of asking the budget for one more image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum VisionDecision {
    Allowed,
    CooldownActive { remaining_secs: u64 },
    SessionLimitReached,
}

impl VisionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, VisionDecision::Allowed)
    }
}

/// Image generation count and cooldown for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionBudget {
    generated: u32,
    last_generated_at: Option<Timestamp>,
    cooldown_secs: u64,
    max_per_session: u32,
}

impl VisionBudget {
    pub fn new(cooldown_secs: u64, max_per_session: u32) -> Self {
        Self {
            generated: 0,
            last_generated_at: None,
            cooldown_secs,
            max_per_session,
        }
    }

    pub fn generated(&self) -> u32 {
        self.generated
    }

    pub fn last_generated_at(&self) -> Option<Timestamp> {
        self.last_generated_at
    }

    /// Whether an image may be generated at `now`. The session limit is
    /// checked before the cooldown.
    pub fn check(&self, now: Timestamp) -> VisionDecision {
        if self.generated >= self.max_per_session {
            return VisionDecision::SessionLimitReached;
        }
        let Some(last) = self.last_generated_at else {
            return VisionDecision::Allowed;
        };

        let ready_at = last.plus_secs(self.cooldown_secs);
        if now.is_before(&ready_at) {
            let remaining_ms = ready_at.duration_since(&now).num_milliseconds().max(0) as u64;
            VisionDecision::CooldownActive {
                remaining_secs: remaining_ms.div_ceil(1000),
            }
        } else {
            VisionDecision::Allowed
        }
    }

    /// Counts one generated image.
    pub fn record(&mut self, now: Timestamp) {
        self.generated += 1;
        self.last_generated_at = Some(now);
    }
}

impl Default for VisionBudget {
    fn default() -> Self {
        Self::new(60, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_budget_allows() {
        assert_eq!(VisionBudget::new(60, 3).check(Timestamp::now()), VisionDecision::Allowed);
    }

    #[test]
    fn cooldown_reports_remaining_seconds() {
        let start = Timestamp::now();
        let mut budget = VisionBudget::new(60, 3);
        budget.record(start);

        assert_eq!(
            budget.check(start.plus_secs(15)),
            VisionDecision::CooldownActive { remaining_secs: 45 }
        );
        assert_eq!(budget.check(start.plus_secs(60)), VisionDecision::Allowed);
    }

    #[test]
    fn limit_wins_over_cooldown() {
        let start = Timestamp::now();
        let mut budget = VisionBudget::new(0, 2);
        budget.record(start);
        budget.record(start);

        assert_eq!(budget.generated(), 2);
        assert_eq!(budget.check(start.plus_secs(3600)), VisionDecision::SessionLimitReached);
    }

    #[test]
    fn budgets_are_independent() {
        let now = Timestamp::now();
        let mut first = VisionBudget::default();
        let second = VisionBudget::default();
        first.record(now);

        assert!(!first.check(now).is_allowed());
        assert!(second.check(now).is_allowed());
    }
}
