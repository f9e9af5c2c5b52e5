use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::event::{
    EloUpdate, JudgeResult, SpeakerRole, StreamEvent, Turn, TurnToolCall,
};

/// Key identifying one turn slot. `Ord` is round ascending with proponent
/// before opponent, so a `BTreeMap` keyed by it iterates in view order and
/// carries the one-finalized-turn-per-slot guarantee for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TurnKey {
    pub round: u32,
    pub speaker: SpeakerRole,
}

impl TurnKey {
    pub fn new(speaker: SpeakerRole, round: u32) -> Self {
        Self { round, speaker }
    }

    fn of_turn(turn: &Turn) -> Self {
        Self::new(turn.speaker_role, turn.round_number)
    }
}

/// A tool invocation recorded while a turn is still streaming. Mutable until
/// its result arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub id: Option<String>,
    pub tool_name: String,
    pub arguments: Value,
    pub result: Option<Value>,
}

impl ToolCallRecord {
    /// The wire payload is provider-shaped (`{id, function: {name, arguments}}`);
    /// missing pieces degrade to `"unknown"` / empty rather than dropping the call.
    fn from_wire(tool_call: &Value) -> Self {
        let function = tool_call.get("function");
        let tool_name = function
            .and_then(|f| f.get("name"))
            .or_else(|| tool_call.get("tool_name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let arguments = function
            .and_then(|f| f.get("arguments"))
            .or_else(|| tool_call.get("arguments"))
            .cloned()
            .unwrap_or(Value::Null);
        let id = tool_call
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            id,
            tool_name,
            arguments,
            result: None,
        }
    }
}

#[derive(Debug, Clone)]
struct StreamingTurn {
    speaker: SpeakerRole,
    round: u32,
    content: String,
    tool_calls: Vec<ToolCallRecord>,
}

impl StreamingTurn {
    fn new(speaker: SpeakerRole, round: u32) -> Self {
        Self {
            speaker,
            round,
            content: String::new(),
            tool_calls: Vec::new(),
        }
    }

    /// Attaches a result to the matching call. The wire event carries only the
    /// tool name, so when a turn issued the same tool more than once the
    /// earliest call still awaiting a result wins; a result payload carrying a
    /// `tool_call_id` is matched by id first when the call recorded one.
    fn attach_tool_result(&mut self, tool_name: &str, result: &Value) {
        if let Some(result_id) = result.get("tool_call_id").and_then(Value::as_str) {
            if let Some(call) = self
                .tool_calls
                .iter_mut()
                .find(|call| call.id.as_deref() == Some(result_id))
            {
                call.result = Some(result.clone());
                return;
            }
        }

        match self
            .tool_calls
            .iter_mut()
            .find(|call| call.tool_name == tool_name && call.result.is_none())
        {
            Some(call) => call.result = Some(result.clone()),
            None => tracing::debug!(tool_name, "tool result without a pending call, dropped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JudgeProgress {
    pub current: u32,
    pub total: u32,
    pub progress: f64,
}

/// One turn in the derived view; `is_streaming` distinguishes open turns from
/// finalized ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnView {
    pub speaker_role: SpeakerRole,
    pub round_number: u32,
    pub content: String,
    pub tool_calls: Vec<TurnToolCall>,
    pub is_streaming: bool,
}

impl TurnView {
    fn finalized(turn: &Turn) -> Self {
        Self {
            speaker_role: turn.speaker_role,
            round_number: turn.round_number,
            content: turn.content.clone(),
            tool_calls: turn.tool_calls.clone(),
            is_streaming: false,
        }
    }

    fn streaming(turn: &StreamingTurn) -> Self {
        Self {
            speaker_role: turn.speaker,
            round_number: turn.round,
            content: turn.content.clone(),
            tool_calls: turn
                .tool_calls
                .iter()
                .map(|call| TurnToolCall {
                    tool_name: call.tool_name.clone(),
                    arguments: call.arguments.clone(),
                    result: call.result.clone(),
                })
                .collect(),
            is_streaming: true,
        }
    }
}

/// The derived, time-ordered merge of finalized and in-progress turns plus the
/// session's judging state. Pure projection; recomputed on every read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranscriptView {
    pub turns: Vec<TurnView>,
    pub current_status: Option<String>,
    pub judge_progress: Option<JudgeProgress>,
    pub result: Option<JudgeResult>,
    pub elo: Option<EloUpdate>,
}

/// Folds the ordered event sequence into transcript state. Has no knowledge of
/// the transport: live streams and history replay drive it identically.
#[derive(Debug, Default)]
pub struct TranscriptEngine {
    finalized: BTreeMap<TurnKey, Turn>,
    streaming: BTreeMap<TurnKey, StreamingTurn>,
    status_log: Vec<String>,
    judge_progress: Option<JudgeProgress>,
    result: Option<JudgeResult>,
    elo: Option<EloUpdate>,
    active_match_id: Option<String>,
}

impl TranscriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Status { content } => self.status_log.push(content.clone()),
            StreamEvent::TurnDelta {
                speaker,
                round,
                delta,
            } => {
                self.streaming
                    .entry(TurnKey::new(*speaker, *round))
                    .or_insert_with(|| StreamingTurn::new(*speaker, *round))
                    .content
                    .push_str(delta);
            }
            StreamEvent::TurnToolCall {
                speaker,
                round,
                tool_call,
            } => match self.streaming.get_mut(&TurnKey::new(*speaker, *round)) {
                Some(turn) => turn.tool_calls.push(ToolCallRecord::from_wire(tool_call)),
                None => tracing::debug!(
                    speaker = %speaker,
                    round,
                    "tool call for a turn with no streamed content yet, dropped"
                ),
            },
            StreamEvent::TurnToolResult {
                speaker,
                round,
                tool_name,
                result,
            } => match self.streaming.get_mut(&TurnKey::new(*speaker, *round)) {
                Some(turn) => turn.attach_tool_result(tool_name, result),
                None => tracing::debug!(
                    speaker = %speaker,
                    round,
                    tool_name,
                    "tool result for an unknown turn, dropped"
                ),
            },
            StreamEvent::TurnComplete { turn } => {
                let key = TurnKey::of_turn(turn);
                if self.finalized.contains_key(&key) {
                    tracing::debug!(
                        speaker = %turn.speaker_role,
                        round = turn.round_number,
                        "duplicate turn_complete, dropped"
                    );
                    return;
                }
                self.streaming.remove(&key);
                self.finalized.insert(key, turn.clone());
            }
            StreamEvent::JudgeProgress {
                current,
                total,
                progress,
            } => {
                self.judge_progress = Some(JudgeProgress {
                    current: *current,
                    total: *total,
                    progress: *progress,
                });
            }
            StreamEvent::JudgeComplete { result } => {
                self.result = Some(result.clone());
                self.judge_progress = None;
            }
            StreamEvent::EloUpdate { data } => match data.ratings() {
                Some(update) => self.elo = Some(*update),
                None => tracing::debug!("elo update skipped by the server"),
            },
            StreamEvent::MatchInit { match_id } => {
                self.active_match_id = Some(match_id.clone());
            }
            // match_start never overwrites an id already set by match_init.
            StreamEvent::MatchStart { data } => {
                if self.active_match_id.is_none() {
                    self.active_match_id = data.match_id.clone();
                }
            }
            StreamEvent::MatchEnd => self.active_match_id = None,
            StreamEvent::Timeout { .. }
            | StreamEvent::Error { .. }
            | StreamEvent::Unknown => {}
        }
    }

    /// Recomputes the merged, ordered view. Finalized turns win over an open
    /// turn for the same slot.
    pub fn current_view(&self) -> TranscriptView {
        let mut merged: BTreeMap<TurnKey, TurnView> = self
            .streaming
            .iter()
            .map(|(key, turn)| (*key, TurnView::streaming(turn)))
            .collect();
        for (key, turn) in &self.finalized {
            merged.insert(*key, TurnView::finalized(turn));
        }

        TranscriptView {
            turns: merged.into_values().collect(),
            current_status: match self.result {
                Some(_) => None,
                None => self.status_log.last().cloned(),
            },
            judge_progress: self.judge_progress,
            result: self.result.clone(),
            elo: self.elo,
        }
    }

    pub fn active_match_id(&self) -> Option<&str> {
        self.active_match_id.as_deref()
    }

    pub fn set_active_match_id(&mut self, match_id: Option<String>) {
        self.active_match_id = match_id;
    }

    /// Wipes every piece of state in one step. Events delivered afterwards are
    /// processed as new; nothing about the previous match is remembered.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
