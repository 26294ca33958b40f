//! End-to-end behavior of `ChatService` against the scripted backend.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::time::Instant;

use chatwire_core::scripted::{ScriptStep, ScriptedBackend};
use chatwire_core::{
    CancellationToken, ChatConfig, ChatError, ChatService, Reply, SessionEvent,
    SystemMessageMode, Termination, Tool, NO_RESPONSE_MESSAGE,
};

fn service(backend: &Arc<ScriptedBackend>) -> ChatService {
    ChatService::new(backend.clone(), ChatConfig::default())
}

fn emit(event: SessionEvent) -> ScriptStep {
    ScriptStep::Emit(event)
}

// ============================================================================
// Reply reduction
// ============================================================================

#[tokio::test]
async fn deltas_then_idle_are_concatenated() {
    let backend = Arc::new(ScriptedBackend::replying(&["Hel", "lo"]));
    let service = service(&backend);

    let completion = service.ask_detailed("Hi", CancellationToken::new()).await.unwrap();

    assert_eq!(completion.reply, Reply::Text("Hello".into()));
    assert_eq!(completion.termination, Termination::Idle);
    assert_eq!(backend.prompts(), vec!["Hi".to_string()]);
}

#[tokio::test]
async fn many_deltas_keep_their_order() {
    let pieces: Vec<String> = (0..50).map(|i| format!("{i},")).collect();
    let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
    let backend = Arc::new(ScriptedBackend::replying(&refs));
    let service = service(&backend);

    let text = service.ask("count", CancellationToken::new()).await.unwrap();

    assert_eq!(text, pieces.concat());
}

#[tokio::test]
async fn idle_without_text_yields_fallback() {
    let backend = Arc::new(ScriptedBackend::new(vec![emit(SessionEvent::Idle)]));
    let service = service(&backend);

    let text = service.ask("Q", CancellationToken::new()).await.unwrap();

    assert_eq!(text, NO_RESPONSE_MESSAGE);
}

#[tokio::test]
async fn error_without_text_is_reported_as_text() {
    let backend = Arc::new(ScriptedBackend::new(vec![emit(SessionEvent::Error(
        "rate limited".into(),
    ))]));
    let service = service(&backend);

    let completion = service.ask_detailed("Q", CancellationToken::new()).await.unwrap();

    assert_eq!(completion.termination, Termination::SessionError);
    assert_eq!(completion.into_text(), "Error: rate limited");
}

#[tokio::test]
async fn error_after_text_keeps_the_text() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        emit(SessionEvent::Delta("partial ".into())),
        emit(SessionEvent::Delta("answer".into())),
        emit(SessionEvent::Error("stream reset".into())),
    ]));
    let service = service(&backend);

    let text = service.ask("Q", CancellationToken::new()).await.unwrap();

    assert_eq!(text, "partial answer");
}

#[tokio::test]
async fn message_events_do_not_change_the_reply() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        emit(SessionEvent::Delta("short".into())),
        emit(SessionEvent::Message("a much longer full message".into())),
        emit(SessionEvent::Idle),
    ]));
    let service = service(&backend);

    let text = service.ask("Q", CancellationToken::new()).await.unwrap();

    assert_eq!(text, "short");
}

#[tokio::test]
async fn events_after_idle_are_ignored() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        emit(SessionEvent::Delta("done".into())),
        emit(SessionEvent::Idle),
        emit(SessionEvent::Delta(" and more".into())),
        emit(SessionEvent::Error("late".into())),
    ]));
    let service = service(&backend);

    let completion = service.ask_detailed("Q", CancellationToken::new()).await.unwrap();

    assert_eq!(completion.termination, Termination::Idle);
    assert_eq!(completion.into_text(), "done");
}

// ============================================================================
// Send acknowledgment
// ============================================================================

#[tokio::test]
async fn send_failure_yields_fallback() {
    let backend = Arc::new(ScriptedBackend::replying(&["never"]).with_send_error("pipe closed"));
    let service = service(&backend);

    let completion = service.ask_detailed("Q", CancellationToken::new()).await.unwrap();

    assert!(matches!(completion.termination, Termination::SendFailed(_)));
    assert_eq!(completion.into_text(), NO_RESPONSE_MESSAGE);
    assert_eq!(backend.sessions_closed(), 1);
}

#[tokio::test]
async fn terminal_event_before_acknowledgment_is_kept() {
    let backend = Arc::new(
        ScriptedBackend::replying(&["early"]).with_send_delay(Duration::from_millis(50)),
    );
    let service = service(&backend);

    let completion = service.ask_detailed("Q", CancellationToken::new()).await.unwrap();

    assert_eq!(completion.termination, Termination::Idle);
    assert_eq!(completion.into_text(), "early");
}

#[tokio::test]
async fn closed_stream_returns_partial_text() {
    let backend = Arc::new(
        ScriptedBackend::new(vec![emit(SessionEvent::Delta("cut".into()))])
            .with_disconnect_after_script(),
    );
    let service = service(&backend);

    let completion = service.ask_detailed("Q", CancellationToken::new()).await.unwrap();

    assert_eq!(completion.termination, Termination::Disconnected);
    assert_eq!(completion.into_text(), "cut");
}

// ============================================================================
// Deadline
// ============================================================================

#[tokio::test(start_paused = true)]
async fn ceiling_returns_partial_text_without_error() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        emit(SessionEvent::Delta("par".into())),
        ScriptStep::Pause(Duration::from_secs(600)),
        emit(SessionEvent::Delta("tial".into())),
        emit(SessionEvent::Idle),
    ]));
    let service = service(&backend);
    let started = Instant::now();

    let completion = service.ask_detailed("slow", CancellationToken::new()).await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(120), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(121), "{elapsed:?}");
    assert_eq!(completion.termination, Termination::SoftTimeout);
    assert_eq!(completion.into_text(), "par");
    assert_eq!(backend.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn configured_ceiling_is_respected() {
    let backend = Arc::new(ScriptedBackend::new(vec![ScriptStep::Pause(Duration::from_secs(600))]));
    let service = ChatService::new(
        backend.clone(),
        ChatConfig::default().with_response_timeout(Duration::from_secs(5)),
    );
    let started = Instant::now();

    let text = service.ask("slow", CancellationToken::new()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(text, NO_RESPONSE_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn caller_cancellation_returns_partial_text() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        emit(SessionEvent::Delta("a".into())),
        ScriptStep::Pause(Duration::from_secs(600)),
        emit(SessionEvent::Idle),
    ]));
    let service = service(&backend);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        canceller.cancel();
    });
    let started = Instant::now();

    let completion = service.ask_detailed("Q", token).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(completion.termination, Termination::Cancelled);
    assert_eq!(completion.into_text(), "a");
    assert_eq!(backend.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_after_idle_but_before_acknowledgment_keeps_idle() {
    let backend = Arc::new(
        ScriptedBackend::replying(&["done"]).with_send_delay(Duration::from_secs(10)),
    );
    let service = service(&backend);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let completion = service.ask_detailed("Q", token).await.unwrap();

    assert_eq!(completion.termination, Termination::Idle);
    assert_eq!(completion.into_text(), "done");
    assert_eq!(backend.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn ceiling_after_idle_but_before_acknowledgment_keeps_idle() {
    let backend = Arc::new(
        ScriptedBackend::replying(&["done"]).with_send_delay(Duration::from_secs(600)),
    );
    let service = service(&backend);

    let completion = service.ask_detailed("Q", CancellationToken::new()).await.unwrap();

    assert_eq!(completion.termination, Termination::Idle);
    assert_eq!(completion.into_text(), "done");
}

#[tokio::test(start_paused = true)]
async fn disconnect_after_error_but_before_acknowledgment_keeps_session_error() {
    let backend = Arc::new(
        ScriptedBackend::new(vec![emit(SessionEvent::Error("quota".into()))])
            .with_disconnect_after_script()
            .with_send_delay(Duration::from_secs(1)),
    );
    let service = service(&backend);

    let completion = service.ask_detailed("Q", CancellationToken::new()).await.unwrap();

    assert_eq!(completion.termination, Termination::SessionError);
    assert_eq!(completion.into_text(), "Error: quota");
}

#[tokio::test(start_paused = true)]
async fn disconnect_after_idle_but_before_acknowledgment_keeps_idle() {
    let backend = Arc::new(
        ScriptedBackend::replying(&["done"])
            .with_disconnect_after_script()
            .with_send_delay(Duration::from_secs(1)),
    );
    let service = service(&backend);

    let completion = service.ask_detailed("Q", CancellationToken::new()).await.unwrap();

    assert_eq!(completion.termination, Termination::Idle);
    assert_eq!(completion.into_text(), "done");
}

#[tokio::test]
async fn dropped_call_still_releases_its_session() {
    let backend = Arc::new(ScriptedBackend::new(vec![ScriptStep::Pause(Duration::from_secs(60))]));
    let service = Arc::new(service(&backend));

    let task = {
        let service = service.clone();
        tokio::spawn(async move { service.ask("Q", CancellationToken::new()).await })
    };
    while backend.sessions_opened() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    task.abort();
    let _ = task.await;
    for _ in 0..100 {
        if backend.sessions_closed() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(backend.sessions_closed(), 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn concurrent_first_calls_start_backend_once() {
    let backend = Arc::new(
        ScriptedBackend::replying(&["ok"]).with_start_delay(Duration::from_millis(30)),
    );
    let service = Arc::new(service(&backend));

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.ask(&format!("q{i}"), CancellationToken::new()).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "ok");
    }

    assert_eq!(backend.start_calls(), 1);
    assert_eq!(backend.sessions_opened(), 20);
    assert_eq!(backend.sessions_closed(), 20);
}

#[tokio::test]
async fn start_failure_propagates_and_next_call_retries() {
    let backend = Arc::new(ScriptedBackend::replying(&["ok"]).with_start_failures(1));
    let service = service(&backend);

    let first = service.ask("Q", CancellationToken::new()).await;
    assert!(matches!(first, Err(ChatError::Start(_))));
    assert!(!service.is_started());
    assert_eq!(backend.sessions_opened(), 0);

    let second = service.ask("Q", CancellationToken::new()).await.unwrap();
    assert_eq!(second, "ok");
    assert_eq!(backend.start_calls(), 2);
}

#[tokio::test]
async fn session_open_failure_propagates() {
    let backend = Arc::new(ScriptedBackend::replying(&["ok"]).with_open_error("bad model"));
    let service = service(&backend);

    let result = service.ask("Q", CancellationToken::new()).await;

    assert!(matches!(result, Err(ChatError::OpenSession(_))));
}

#[tokio::test]
async fn every_call_closes_its_session() {
    let backend = Arc::new(ScriptedBackend::replying(&["ok"]));
    let service = service(&backend);

    for _ in 0..3 {
        service.ask("Q", CancellationToken::new()).await.unwrap();
    }

    assert_eq!(backend.sessions_opened(), 3);
    assert_eq!(backend.sessions_closed(), 3);
    assert_eq!(backend.start_calls(), 1);
}

#[tokio::test]
async fn shutdown_stops_a_started_backend() {
    let backend = Arc::new(ScriptedBackend::replying(&["ok"]));
    let service = service(&backend);
    service.ask("Q", CancellationToken::new()).await.unwrap();

    service.shutdown().await;

    assert_eq!(backend.stop_calls(), 1);
}

#[tokio::test]
async fn shutdown_without_start_does_not_stop() {
    let backend = Arc::new(ScriptedBackend::replying(&["ok"]));

    service(&backend).shutdown().await;

    assert_eq!(backend.stop_calls(), 0);
}

#[tokio::test]
async fn shutdown_swallows_stop_failure() {
    let backend = Arc::new(ScriptedBackend::replying(&["ok"]).with_stop_error("already gone"));
    let service = service(&backend);
    service.ask("Q", CancellationToken::new()).await.unwrap();

    service.shutdown().await;

    assert_eq!(backend.stop_calls(), 1);
}

// ============================================================================
// Session configuration
// ============================================================================

#[tokio::test]
async fn session_config_follows_current_settings() {
    let backend = Arc::new(ScriptedBackend::replying(&["ok"]));
    let service = ChatService::new(
        backend.clone(),
        ChatConfig::default()
            .with_model("model-a")
            .with_system_message("Keep answers short."),
    );

    service.ask("Q", CancellationToken::new()).await.unwrap();
    let first = backend.last_config().unwrap();
    assert_eq!(first.model, "model-a");
    assert!(first.streaming);
    assert!(first.tools.is_none());
    let system = first.system_message.unwrap();
    assert_eq!(system.content, "Keep answers short.");
    assert_eq!(system.mode, SystemMessageMode::Append);

    service.set_model("model-b");
    service.set_system_message(Some("   ".into()));
    service.set_tools(vec![Tool::new(
        "lookup",
        "Look something up",
        Value::Null,
        |_| "found".into(),
    )]);
    service.ask("Q", CancellationToken::new()).await.unwrap();

    let second = backend.last_config().unwrap();
    assert_eq!(second.model, "model-b");
    assert!(second.system_message.is_none());
    assert_eq!(second.tool_names(), vec!["lookup"]);
}

// ============================================================================
// Streaming shim
// ============================================================================

#[tokio::test]
async fn streaming_yields_exactly_what_ask_returns() {
    let backend = Arc::new(ScriptedBackend::replying(&["same ", "answer"]));
    let service = service(&backend);

    let asked = service.ask("Q", CancellationToken::new()).await.unwrap();
    let streamed: Vec<String> = service
        .ask_streaming("Q", CancellationToken::new())
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(streamed, vec![asked]);
}

#[tokio::test]
async fn streaming_reports_error_text_as_its_item() {
    let backend = Arc::new(ScriptedBackend::new(vec![emit(SessionEvent::Error(
        "quota".into(),
    ))]));
    let service = service(&backend);

    let streamed: Vec<String> = service
        .ask_streaming("Q", CancellationToken::new())
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(streamed, vec!["Error: quota".to_string()]);
}
