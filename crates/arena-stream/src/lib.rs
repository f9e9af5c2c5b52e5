//! Streaming client for the debate arena: opens the server-sent match stream,
//! decodes it into events, and folds the events into a renderable transcript.
//!
//! The transport ([`StreamManager`]) and the reconstruction engine
//! ([`TranscriptEngine`]) are deliberately decoupled: the engine is driven
//! purely by the event sequence, so live streams and replayed match history
//! produce identical views.

mod error;
mod event;
mod history;
mod request;
mod sse;
mod transcript;
mod transport;

pub use error::ArenaStreamError;
pub use event::{
    parse_event, EloSide, EloUpdate, EloUpdateData, JudgeResult, JudgeScores, MatchStartData,
    SpeakerRole, StreamEvent, Turn, TurnToolCall, Winner,
};
pub use history::MatchHistory;
pub use request::{Difficulty, MatchRequest, MatchRequestError};
pub use sse::SseFrameDecoder;
pub use transcript::{JudgeProgress, TranscriptEngine, TranscriptView, TurnKey, TurnView};
pub use transport::{
    ConnectionStatus, SessionSnapshot, StreamConfig, StreamEventHandler, StreamManager,
    StreamOutcome, DEFAULT_STREAM_TIMEOUT,
};
