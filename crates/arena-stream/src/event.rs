use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ArenaStreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    Proponent,
    Opponent,
}

impl SpeakerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::Proponent => "proponent",
            SpeakerRole::Opponent => "opponent",
        }
    }
}

impl fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Proponent,
    Opponent,
    Draw,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Winner::Proponent => "proponent",
            Winner::Opponent => "opponent",
            Winner::Draw => "draw",
        })
    }
}

/// One entry of a finalized turn's tool-call list, in the shape the server
/// stores them: name, raw arguments, and the result once the tool ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// One participant's finalized contribution in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker_role: SpeakerRole,
    pub round_number: u32,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<TurnToolCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgeScores {
    pub proponent: f64,
    pub opponent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub final_scores: JudgeScores,
    pub winner: Winner,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EloSide {
    pub old_rating: i64,
    pub new_rating: i64,
    pub change: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EloUpdate {
    pub proponent: EloSide,
    pub opponent: EloSide,
}

/// Payload of an `elo_update` event. The server sends per-side ratings after
/// a scored match, but a skip notice (`{message|error, skip: true}`) when the
/// update was withheld — same-model exhibitions, empty results, update
/// failures. Both shapes must parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EloUpdateData {
    Ratings(EloUpdate),
    Skipped(Value),
}

impl EloUpdateData {
    pub fn ratings(&self) -> Option<&EloUpdate> {
        match self {
            EloUpdateData::Ratings(update) => Some(update),
            EloUpdateData::Skipped(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStartData {
    #[serde(default)]
    pub match_id: Option<String>,
}

/// Wire event pushed by the arena server, tagged by `type`.
///
/// Unrecognized discriminants deserialize to [`StreamEvent::Unknown`] so a
/// newer server never breaks an older client; the engine ignores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status {
        content: String,
    },
    TurnDelta {
        speaker: SpeakerRole,
        round: u32,
        delta: String,
    },
    TurnToolCall {
        speaker: SpeakerRole,
        round: u32,
        tool_call: Value,
    },
    TurnToolResult {
        speaker: SpeakerRole,
        round: u32,
        tool_name: String,
        result: Value,
    },
    TurnComplete {
        turn: Turn,
    },
    JudgeProgress {
        current: u32,
        total: u32,
        progress: f64,
    },
    JudgeComplete {
        result: JudgeResult,
    },
    EloUpdate {
        data: EloUpdateData,
    },
    MatchInit {
        match_id: String,
    },
    MatchStart {
        data: MatchStartData,
    },
    MatchEnd,
    Timeout {
        content: String,
    },
    Error {
        #[serde(default)]
        content: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Decodes one frame payload into an event. Failures carry the raw frame so
/// the transport can log and drop it without interrupting the stream.
pub fn parse_event(frame: &str) -> Result<StreamEvent, ArenaStreamError> {
    serde_json::from_str(frame).map_err(|source| ArenaStreamError::EventParse {
        frame: frame.to_string(),
        source,
    })
}
