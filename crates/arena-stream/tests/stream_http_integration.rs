use std::sync::{Arc, Mutex};
use std::time::Duration;

use arena_stream::{
    ArenaStreamError, ConnectionStatus, MatchRequest, SpeakerRole, StreamConfig, StreamEvent,
    StreamEventHandler, StreamManager, StreamOutcome, Winner,
};
use httpmock::prelude::*;
use serde_json::json;

fn match_request() -> MatchRequest {
    MatchRequest::new(
        "Should cities ban private cars?",
        "gpt-4o",
        "claude-sonnet-4",
        vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
    )
}

fn sse_body(events: &[serde_json::Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

fn manager_for(server: &MockServer, timeout: Duration) -> StreamManager {
    StreamManager::new(
        StreamConfig::new(format!("{}/api/tournament/match/stream", server.base_url()))
            .with_timeout(timeout),
    )
    .expect("manager must build")
}

#[tokio::test]
async fn reconstructs_a_full_match_from_the_stream() {
    let server = MockServer::start();
    let body = sse_body(&[
        json!({"type": "match_init", "match_id": "m1"}),
        json!({"type": "match_start", "data": {"match_id": "m2"}}),
        json!({"type": "status", "content": "round 1 starting"}),
        json!({"type": "turn_delta", "speaker": "proponent", "round": 1, "delta": "Hel"}),
        json!({"type": "turn_delta", "speaker": "proponent", "round": 1, "delta": "lo"}),
        json!({"type": "turn_complete", "turn": {
            "speaker_role": "proponent", "round_number": 1, "content": "Hello", "tool_calls": []
        }}),
        json!({"type": "turn_complete", "turn": {
            "speaker_role": "opponent", "round_number": 1, "content": "Goodbye", "tool_calls": []
        }}),
        json!({"type": "judge_progress", "current": 2, "total": 2, "progress": 1.0}),
        json!({"type": "judge_complete", "result": {
            "final_scores": {"proponent": 8.0, "opponent": 7.0},
            "winner": "proponent",
            "reasoning": "better evidence"
        }}),
        json!({"type": "match_end"}),
    ]);
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/tournament/match/stream")
            .json_body_includes(
                json!({
                    "topic": "Should cities ban private cars?",
                    "judges": ["gpt-4o", "gpt-4o-mini"],
                    "rounds": 3
                })
                .to_string(),
            );
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(body);
    });

    let manager = manager_for(&server, Duration::from_secs(30));
    let outcome = manager
        .connect(&match_request())
        .await
        .expect("stream should complete");

    mock.assert();
    assert_eq!(outcome, StreamOutcome::Completed);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::Ended);
    // match_end and natural completion both clear the active match id
    assert_eq!(snapshot.active_match_id, None);
    assert!(!snapshot.timed_out);

    assert_eq!(snapshot.view.turns.len(), 2);
    assert_eq!(snapshot.view.turns[0].speaker_role, SpeakerRole::Proponent);
    assert_eq!(snapshot.view.turns[0].content, "Hello");
    assert!(!snapshot.view.turns[0].is_streaming);
    assert_eq!(snapshot.view.turns[1].content, "Goodbye");

    let result = snapshot.view.result.expect("judge result set");
    assert_eq!(result.winner, Winner::Proponent);
    assert!(snapshot.view.judge_progress.is_none());
    assert_eq!(snapshot.view.current_status, None);
}

#[tokio::test]
async fn event_handler_observes_events_in_arrival_order() {
    let server = MockServer::start();
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = events.clone();
    let handler: StreamEventHandler = Arc::new(move |event: &StreamEvent| {
        seen.lock().expect("event log lock").push(event.clone());
    });

    let body = sse_body(&[
        json!({"type": "match_init", "match_id": "m1"}),
        json!({"type": "match_start", "data": {"match_id": "m2"}}),
        json!({"type": "status", "content": "starting"}),
    ]);
    server.mock(|when, then| {
        when.method(POST).path("/api/tournament/match/stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(body);
    });

    let manager = manager_for(&server, Duration::from_secs(30)).with_event_handler(handler);
    manager
        .connect(&match_request())
        .await
        .expect("stream should complete");

    let seen = events.lock().expect("event log lock");
    assert_eq!(seen.len(), 3);
    assert_eq!(
        seen[0],
        StreamEvent::MatchInit {
            match_id: "m1".to_string()
        }
    );
    // events() exposes the same accumulated sequence
    assert_eq!(manager.events().len(), 3);
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_aborting_the_stream() {
    let server = MockServer::start();
    let body = concat!(
        "data: {\"type\":\"turn_delta\",\"speaker\":\"proponent\",\"round\":1,\"delta\":\"A\"}\n\n",
        "data: {not json at all\n\n",
        ": keep-alive\n\n",
        "data: {\"type\":\"turn_delta\",\"speaker\":\"proponent\",\"round\":1,\"delta\":\"B\"}\n\n",
    );
    server.mock(|when, then| {
        when.method(POST).path("/api/tournament/match/stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(body);
    });

    let manager = manager_for(&server, Duration::from_secs(30));
    let outcome = manager
        .connect(&match_request())
        .await
        .expect("stream should complete despite the bad frame");

    assert_eq!(outcome, StreamOutcome::Completed);
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.view.turns.len(), 1);
    assert_eq!(snapshot.view.turns[0].content, "AB");
    assert!(snapshot.view.turns[0].is_streaming);
}

#[tokio::test]
async fn non_success_status_surfaces_as_transport_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/tournament/match/stream");
        then.status(500).body("internal error");
    });

    let manager = manager_for(&server, Duration::from_secs(30));
    let error = manager
        .connect(&match_request())
        .await
        .expect_err("500 must fail the connect");

    assert!(matches!(
        error,
        ArenaStreamError::HttpStatus { status: 500 }
    ));
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::Ended);
    assert_eq!(snapshot.active_match_id, None);
    assert!(snapshot.view.turns.is_empty());
}

#[tokio::test]
async fn timeout_fires_once_and_preserves_partial_transcript() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/tournament/match/stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .delay(Duration::from_secs(5))
            .body("data: {\"type\":\"status\",\"content\":\"late\"}\n\n");
    });

    let manager = manager_for(&server, Duration::from_millis(150));
    let outcome = manager
        .connect(&match_request())
        .await
        .expect("timeout is a soft outcome, not an error");

    assert_eq!(outcome, StreamOutcome::TimedOut);
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::TimedOut);
    assert!(snapshot.timed_out);

    let timeout_events = manager
        .events()
        .into_iter()
        .filter(|event| matches!(event, StreamEvent::Timeout { .. }))
        .count();
    assert_eq!(timeout_events, 1);
}

#[tokio::test]
async fn disconnect_from_a_clone_cancels_the_stream_and_freezes_state() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/tournament/match/stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .delay(Duration::from_secs(2))
            .body(sse_body(&[
                json!({"type": "match_init", "match_id": "m-late"}),
                json!({"type": "status", "content": "too late"}),
            ]));
    });

    let manager = manager_for(&server, Duration::from_secs(30));
    let reader = {
        let manager = manager.clone();
        let request = match_request();
        tokio::spawn(async move { manager.connect(&request).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.disconnect();

    let outcome = reader
        .await
        .expect("read task must not panic")
        .expect("disconnect is a soft outcome, not an error");
    assert_eq!(outcome, StreamOutcome::Disconnected);
    assert_eq!(manager.snapshot().status, ConnectionStatus::Ended);
    assert!(manager.events().is_empty());

    // the canceled read's response eventually arrives; it must not apply
    tokio::time::sleep(Duration::from_millis(2_200)).await;
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::Ended);
    assert_eq!(snapshot.active_match_id, None);
    assert!(manager.events().is_empty());
}

#[tokio::test]
async fn history_replay_produces_the_same_view_as_the_live_stream() {
    let server = MockServer::start();
    let body = sse_body(&[
        json!({"type": "turn_delta", "speaker": "proponent", "round": 1, "delta": "Hello"}),
        json!({"type": "turn_complete", "turn": {
            "speaker_role": "proponent", "round_number": 1, "content": "Hello", "tool_calls": []
        }}),
        json!({"type": "judge_complete", "result": {
            "final_scores": {"proponent": 9.0, "opponent": 6.0},
            "winner": "proponent",
            "reasoning": "unopposed"
        }}),
    ]);
    server.mock(|when, then| {
        when.method(POST).path("/api/tournament/match/stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(body);
    });

    let live = manager_for(&server, Duration::from_secs(30));
    live.connect(&match_request())
        .await
        .expect("stream should complete");
    let live_view = live.snapshot().view;

    let history = arena_stream::MatchHistory {
        transcript: vec![arena_stream::Turn {
            speaker_role: SpeakerRole::Proponent,
            round_number: 1,
            content: "Hello".to_string(),
            tool_calls: Vec::new(),
        }],
        judge_result: live_view.result.clone(),
        elo_changes: None,
    };
    let replayed = manager_for(&server, Duration::from_secs(30));
    replayed.load_history(history.into_events(), Some("m9".to_string()));

    assert_eq!(replayed.snapshot().view, live_view);
    assert_eq!(replayed.snapshot().active_match_id.as_deref(), Some("m9"));
}

#[tokio::test]
async fn reconnect_replaces_the_previous_session_state() {
    let server = MockServer::start();
    let first = sse_body(&[json!({"type": "turn_complete", "turn": {
        "speaker_role": "proponent", "round_number": 1, "content": "first match", "tool_calls": []
    }})]);
    let second = sse_body(&[json!({"type": "turn_complete", "turn": {
        "speaker_role": "proponent", "round_number": 1, "content": "second match", "tool_calls": []
    }})]);
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/tournament/match/stream")
            .json_body_includes(json!({"rounds": 3}).to_string());
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(first);
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/tournament/match/stream")
            .json_body_includes(json!({"rounds": 1}).to_string());
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(second);
    });

    let manager = manager_for(&server, Duration::from_secs(30));
    manager
        .connect(&match_request())
        .await
        .expect("first stream should complete");
    assert_eq!(manager.snapshot().view.turns[0].content, "first match");

    let mut rematch = match_request();
    rematch.rounds = 1;
    manager
        .connect(&rematch)
        .await
        .expect("second stream should complete");

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.view.turns.len(), 1);
    assert_eq!(snapshot.view.turns[0].content, "second match");
}
