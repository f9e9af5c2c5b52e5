use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;

use crate::error::ArenaStreamError;
use crate::event::{parse_event, StreamEvent};
use crate::request::MatchRequest;
use crate::sse::SseFrameDecoder;
use crate::transcript::{TranscriptEngine, TranscriptView};

/// Wall-clock ceiling for one match stream.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(15 * 60);

const TIMEOUT_NOTICE: &str = "match timed out; showing the content produced so far";

/// Called with every decoded event, in arrival order, while a stream is live.
pub type StreamEventHandler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Streaming,
    Ended,
    TimedOut,
}

/// How a `connect` call reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The server closed the stream.
    Completed,
    /// The wall-clock timer fired first; accumulated transcript state is kept.
    TimedOut,
    /// An explicit `disconnect` or a newer `connect` canceled this stream.
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl StreamConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Point-in-time read of the session, safe to take while a stream is live.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: ConnectionStatus,
    pub active_match_id: Option<String>,
    pub timed_out: bool,
    pub view: TranscriptView,
}

#[derive(Debug)]
struct SessionState {
    generation: u64,
    status: ConnectionStatus,
    timed_out: bool,
    events: Vec<StreamEvent>,
    engine: TranscriptEngine,
}

impl SessionState {
    fn new() -> Self {
        Self {
            generation: 0,
            status: ConnectionStatus::Idle,
            timed_out: false,
            events: Vec::new(),
            engine: TranscriptEngine::new(),
        }
    }
}

enum FrameOutcome {
    Applied { match_ended: bool },
    /// A newer generation owns the session; the caller's loop must stop.
    Stale,
}

/// Owns at most one live match stream and the session state around it.
///
/// Handles are cheap to clone and share one session; `disconnect` from any
/// clone cancels the read loop running inside another clone's `connect`.
/// Every state mutation is guarded by a generation counter bumped when a
/// stream starts or stops, so whichever of {natural end, disconnect, timeout}
/// transitions first is final and the losers' effects are dropped.
#[derive(Clone)]
pub struct StreamManager {
    http: reqwest::Client,
    config: StreamConfig,
    state: Arc<Mutex<SessionState>>,
    cancel: Arc<watch::Sender<u64>>,
    on_event: Option<StreamEventHandler>,
}

impl StreamManager {
    pub fn new(config: StreamConfig) -> Result<Self, ArenaStreamError> {
        let http = reqwest::Client::builder().build()?;
        let (cancel, _) = watch::channel(0);
        Ok(Self {
            http,
            config,
            state: Arc::new(Mutex::new(SessionState::new())),
            cancel: Arc::new(cancel),
            on_event: None,
        })
    }

    pub fn with_event_handler(mut self, handler: StreamEventHandler) -> Self {
        self.on_event = Some(handler);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock poisoned")
    }

    /// Opens the match stream and drives it to a terminal state.
    ///
    /// Any previous stream is canceled before the new one begins. The caller
    /// is responsible for validating `request` (`MatchRequest::validate`).
    /// Runs until the server closes the stream, `disconnect` is called, or
    /// the wall-clock timeout fires; partial transcript state survives all
    /// three.
    pub async fn connect(&self, request: &MatchRequest) -> Result<StreamOutcome, ArenaStreamError> {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.status = ConnectionStatus::Connecting;
            state.timed_out = false;
            state.events.clear();
            state.engine.reset();
            state.generation
        };
        // wakes any previous read loop so it observes its cancellation
        let _ = self.cancel.send_replace(generation);
        let mut cancel_rx = self.cancel.subscribe();
        if *cancel_rx.borrow_and_update() != generation {
            return Ok(StreamOutcome::Disconnected);
        }

        tracing::debug!(endpoint = %self.config.endpoint, topic = %request.topic, "opening match stream");

        // one timer per connect, armed before the request goes out
        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);

        let send = self.http.post(&self.config.endpoint).json(request).send();
        let response = tokio::select! {
            _ = &mut deadline => return self.finish_timed_out(generation),
            _ = cancel_rx.changed() => return Ok(StreamOutcome::Disconnected),
            response = send => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                self.finish_failed(generation);
                return Err(error.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            // per contract: do not read the body of a failed response
            self.finish_failed(generation);
            return Err(ArenaStreamError::HttpStatus {
                status: status.as_u16(),
            });
        }

        {
            let mut state = self.lock();
            if state.generation != generation {
                return Ok(StreamOutcome::Disconnected);
            }
            state.status = ConnectionStatus::Streaming;
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseFrameDecoder::new();
        let mut timer_armed = true;

        loop {
            tokio::select! {
                _ = &mut deadline, if timer_armed => {
                    return self.finish_timed_out(generation);
                }
                _ = cancel_rx.changed() => {
                    return Ok(StreamOutcome::Disconnected);
                }
                chunk = stream.next() => match chunk {
                    None => {
                        if let Some(frame) = decoder.finish() {
                            if matches!(self.apply_frame(generation, &frame), FrameOutcome::Stale) {
                                return Ok(StreamOutcome::Disconnected);
                            }
                        }
                        return self.finish_ended(generation);
                    }
                    Some(Ok(bytes)) => {
                        let frames = match decoder.push_chunk(&bytes) {
                            Ok(frames) => frames,
                            Err(error) => {
                                self.finish_failed(generation);
                                return Err(error);
                            }
                        };
                        for frame in frames {
                            match self.apply_frame(generation, &frame) {
                                FrameOutcome::Stale => return Ok(StreamOutcome::Disconnected),
                                FrameOutcome::Applied { match_ended } => {
                                    if match_ended {
                                        // the match is decided; stop racing the clock
                                        timer_armed = false;
                                    }
                                }
                            }
                        }
                    }
                    Some(Err(error)) => {
                        self.finish_failed(generation);
                        return Err(error.into());
                    }
                },
            }
        }
    }

    /// Cancels the active read, if any. Idempotent; accumulated transcript
    /// state is left intact.
    pub fn disconnect(&self) {
        let generation = {
            let mut state = self.lock();
            if matches!(
                state.status,
                ConnectionStatus::Connecting | ConnectionStatus::Streaming
            ) {
                state.status = ConnectionStatus::Ended;
            }
            state.generation += 1;
            state.generation
        };
        let _ = self.cancel.send_replace(generation);
    }

    /// Replaces the session's event sequence with a replayed history,
    /// canceling any live stream first.
    pub fn load_history(&self, events: Vec<StreamEvent>, match_id: Option<String>) {
        self.disconnect();
        let mut state = self.lock();
        state.engine.reset();
        state.timed_out = false;
        for event in &events {
            state.engine.apply(event);
        }
        state.events = events;
        if match_id.is_some() {
            state.engine.set_active_match_id(match_id);
        }
        state.status = ConnectionStatus::Idle;
    }

    /// Full reset back to an empty session.
    pub fn clear(&self) {
        self.disconnect();
        let mut state = self.lock();
        state.engine.reset();
        state.events.clear();
        state.timed_out = false;
        state.status = ConnectionStatus::Idle;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            status: state.status,
            active_match_id: state.engine.active_match_id().map(str::to_string),
            timed_out: state.timed_out,
            view: state.engine.current_view(),
        }
    }

    /// The event sequence accumulated so far (live or loaded from history).
    pub fn events(&self) -> Vec<StreamEvent> {
        self.lock().events.clone()
    }

    fn apply_frame(&self, generation: u64, frame: &str) -> FrameOutcome {
        let event = match parse_event(frame) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed stream frame");
                return FrameOutcome::Applied { match_ended: false };
            }
        };

        let match_ended = matches!(event, StreamEvent::MatchEnd);
        {
            let mut state = self.lock();
            if state.generation != generation {
                return FrameOutcome::Stale;
            }
            state.events.push(event.clone());
            state.engine.apply(&event);
        }
        if let Some(handler) = &self.on_event {
            handler(&event);
        }

        FrameOutcome::Applied { match_ended }
    }

    /// Timeout transition: exactly one synthetic event, further frames from
    /// the canceled read no longer apply (the loop returned).
    fn finish_timed_out(&self, generation: u64) -> Result<StreamOutcome, ArenaStreamError> {
        let event = StreamEvent::Timeout {
            content: TIMEOUT_NOTICE.to_string(),
        };
        {
            let mut state = self.lock();
            if state.generation != generation {
                return Ok(StreamOutcome::Disconnected);
            }
            state.status = ConnectionStatus::TimedOut;
            state.timed_out = true;
            state.events.push(event.clone());
            state.engine.apply(&event);
        }
        tracing::warn!(timeout = ?self.config.timeout, "match stream timed out");
        if let Some(handler) = &self.on_event {
            handler(&event);
        }
        Ok(StreamOutcome::TimedOut)
    }

    fn finish_ended(&self, generation: u64) -> Result<StreamOutcome, ArenaStreamError> {
        let mut state = self.lock();
        if state.generation != generation {
            return Ok(StreamOutcome::Disconnected);
        }
        state.status = ConnectionStatus::Ended;
        state.engine.set_active_match_id(None);
        tracing::debug!(events = state.events.len(), "match stream ended");
        Ok(StreamOutcome::Completed)
    }

    /// Transport failure: terminal not-streaming state, match id cleared. The
    /// caller observes this through the returned error and the status.
    fn finish_failed(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.status = ConnectionStatus::Ended;
        state.engine.set_active_match_id(None);
    }
}
