//! Tunables of the dialogue loop.

use serde::Deserialize;

use crate::domain::foundation::ValidationError;

use super::agent::AgentId;

/// Dialogue loop settings. Every field has a documented default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DialogueSettings {
    /// Turns before the loop ends.
    #[serde(default = "default_max_topic_depth")]
    pub max_topic_depth: u32,

    /// Urgency at or above which the listener interrupts.
    #[serde(default = "default_interruption_threshold")]
    pub interruption_threshold: f32,

    /// Check for interruption before chunk 0 and every n-th chunk after.
    #[serde(default = "default_stride")]
    pub interruption_check_interval: usize,

    /// Consider a backchannel after every n-th spoken chunk.
    #[serde(default = "default_stride")]
    pub backchannel_interval: usize,

    #[serde(default = "default_backchannel_probability")]
    pub backchannel_probability: f64,

    /// Longer backchannels are treated as silence.
    #[serde(default = "default_backchannel_max_chars")]
    pub backchannel_max_chars: usize,

    /// Look for a listener question every n total turns.
    #[serde(default = "default_question_check_interval")]
    pub question_check_interval: u32,

    /// First responder when the question selector names nobody.
    #[serde(default = "default_selector_fallback")]
    pub selector_fallback: AgentId,

    /// Speaking rate used to estimate duration when synthesis fails.
    #[serde(default = "default_ms_per_word")]
    pub ms_per_word: u64,

    /// Fixed seed for backchannel sampling; random when unset.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl DialogueSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_topic_depth == 0 {
            return Err(ValidationError::out_of_range("max_topic_depth", 1.0, f64::from(u32::MAX), 0.0));
        }
        if !(0.0..=1.0).contains(&self.interruption_threshold) {
            return Err(ValidationError::out_of_range(
                "interruption_threshold",
                0.0,
                1.0,
                f64::from(self.interruption_threshold),
            ));
        }
        if !(0.0..=1.0).contains(&self.backchannel_probability) {
            return Err(ValidationError::out_of_range(
                "backchannel_probability",
                0.0,
                1.0,
                self.backchannel_probability,
            ));
        }
        for (field, value) in [
            ("interruption_check_interval", self.interruption_check_interval as u64),
            ("backchannel_interval", self.backchannel_interval as u64),
            ("question_check_interval", u64::from(self.question_check_interval)),
        ] {
            if value == 0 {
                return Err(ValidationError::out_of_range(field, 1.0, f64::MAX, 0.0));
            }
        }
        Ok(())
    }
}

impl Default for DialogueSettings {
    fn default() -> Self {
        Self {
            max_topic_depth: default_max_topic_depth(),
            interruption_threshold: default_interruption_threshold(),
            interruption_check_interval: default_stride(),
            backchannel_interval: default_stride(),
            backchannel_probability: default_backchannel_probability(),
            backchannel_max_chars: default_backchannel_max_chars(),
            question_check_interval: default_question_check_interval(),
            selector_fallback: default_selector_fallback(),
            ms_per_word: default_ms_per_word(),
            rng_seed: None,
        }
    }
}

fn default_max_topic_depth() -> u32 {
    12
}

fn default_interruption_threshold() -> f32 {
    0.7
}

fn default_stride() -> usize {
    2
}

fn default_backchannel_probability() -> f64 {
    0.5
}

fn default_backchannel_max_chars() -> usize {
    20
}

fn default_question_check_interval() -> u32 {
    3
}

fn default_selector_fallback() -> AgentId {
    AgentId::A
}

fn default_ms_per_word() -> u64 {
    150
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = DialogueSettings::default();

        assert_eq!(settings.max_topic_depth, 12);
        assert_eq!(settings.interruption_threshold, 0.7);
        assert_eq!(settings.interruption_check_interval, 2);
        assert_eq!(settings.backchannel_interval, 2);
        assert_eq!(settings.backchannel_probability, 0.5);
        assert_eq!(settings.backchannel_max_chars, 20);
        assert_eq!(settings.question_check_interval, 3);
        assert_eq!(settings.selector_fallback, AgentId::A);
        assert_eq!(settings.ms_per_word, 150);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let settings: DialogueSettings =
            serde_json::from_str(r#"{"max_topic_depth": 4, "selector_fallback": "b"}"#).unwrap();

        assert_eq!(settings.max_topic_depth, 4);
        assert_eq!(settings.selector_fallback, AgentId::B);
        assert_eq!(settings.interruption_threshold, 0.7);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let settings = DialogueSettings {
            interruption_threshold: 1.5,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_strides_and_depth() {
        for settings in [
            DialogueSettings { interruption_check_interval: 0, ..Default::default() },
            DialogueSettings { backchannel_interval: 0, ..Default::default() },
            DialogueSettings { question_check_interval: 0, ..Default::default() },
            DialogueSettings { max_topic_depth: 0, ..Default::default() },
            DialogueSettings { backchannel_probability: -0.1, ..Default::default() },
        ] {
            assert!(settings.validate().is_err());
        }
    }
}
