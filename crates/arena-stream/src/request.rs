use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_TOPIC_CHARS: usize = 3;
pub const MIN_JUDGES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchRequestError {
    #[error("debate topic must be at least {MIN_TOPIC_CHARS} characters")]
    TopicTooShort,
    #[error("at least {MIN_JUDGES} judges are required, got {0}")]
    NotEnoughJudges(usize),
    #[error("round count must be at least 1")]
    NoRounds,
}

/// Body of the stream-opening request, serialized to the server's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub topic: String,
    #[serde(default)]
    pub topic_difficulty: Difficulty,
    pub proponent_model: String,
    pub opponent_model: String,
    #[serde(default)]
    pub proponent_personality: String,
    #[serde(default)]
    pub opponent_personality: String,
    pub rounds: u32,
    pub judges: Vec<String>,
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl MatchRequest {
    pub fn new(
        topic: impl Into<String>,
        proponent_model: impl Into<String>,
        opponent_model: impl Into<String>,
        judges: Vec<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            topic_difficulty: Difficulty::default(),
            proponent_model: proponent_model.into(),
            opponent_model: opponent_model.into(),
            proponent_personality: String::new(),
            opponent_personality: String::new(),
            rounds: 3,
            judges,
            enabled_tools: Vec::new(),
            user_id: None,
        }
    }

    /// Caller-side validation mirroring the server's admission rules. The
    /// transport does not validate; callers run this before connecting.
    pub fn validate(&self) -> Result<(), MatchRequestError> {
        if self.topic.trim().chars().count() < MIN_TOPIC_CHARS {
            return Err(MatchRequestError::TopicTooShort);
        }
        if self.judges.len() < MIN_JUDGES {
            return Err(MatchRequestError::NotEnoughJudges(self.judges.len()));
        }
        if self.rounds == 0 {
            return Err(MatchRequestError::NoRounds);
        }
        Ok(())
    }

    /// Same model on both sides: allowed, but played without rating stakes.
    pub fn is_exhibition(&self) -> bool {
        self.proponent_model == self.opponent_model
    }
}
