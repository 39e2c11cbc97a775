//! Host-facing controller over the session lifecycle.
//!
//! `activate` spawns a fresh session task and returns immediately;
//! `deactivate` signals it and waits for the teardown to settle in `Closed`.
//! Both are idempotent, and activating over a live session forces the prior
//! one through its full teardown first so devices are never double-acquired.

use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use super::connection::{SessionContext, SessionPhase, run_session};
use crate::error::{LiveError, Result};
use crate::state::LogCategory;

struct ActiveSession {
    shutdown_tx: Option<oneshot::Sender<()>>,
    phase_rx: watch::Receiver<SessionPhase>,
}

pub struct LiveController {
    ctx: Arc<SessionContext>,
    active: Arc<TokioMutex<Option<ActiveSession>>>,
}

impl LiveController {
    pub(crate) fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            ctx,
            active: Arc::new(TokioMutex::new(None)),
        }
    }

    /// Starts a session. Returns once the session task is spawned; progress
    /// past `Connecting` is observable through [`LiveController::phase`].
    ///
    /// A missing credential fails here, before anything touches the network
    /// or the devices.
    pub async fn activate(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(prior) = active.take() {
            info!("[Controller] Activation over a live session; tearing the old one down.");
            Self::wind_down(prior).await;
        }

        if self.ctx.api_key.trim().is_empty() {
            self.ctx.log_sink.emit("API Key missing", LogCategory::Error);
            return Err(LiveError::Config("API key missing".to_string()));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Idle);
        tokio::spawn(run_session(Arc::clone(&self.ctx), shutdown_rx, phase_tx));

        *active = Some(ActiveSession {
            shutdown_tx: Some(shutdown_tx),
            phase_rx,
        });
        Ok(())
    }

    /// Stops the current session and waits for its teardown to finish.
    /// Harmless when no session is running.
    pub async fn deactivate(&self) {
        let mut active = self.active.lock().await;
        if let Some(prior) = active.take() {
            Self::wind_down(prior).await;
        }
    }

    /// Current lifecycle phase; `Idle` when nothing was ever activated.
    pub async fn phase(&self) -> SessionPhase {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|session| *session.phase_rx.borrow())
            .unwrap_or(SessionPhase::Idle)
    }

    /// Watch handle over the current session's phase, for hosts that react
    /// to lifecycle transitions. `None` when nothing is running.
    pub async fn phase_watch(&self) -> Option<watch::Receiver<SessionPhase>> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|session| session.phase_rx.clone())
    }

    async fn wind_down(mut session: ActiveSession) {
        if let Some(tx) = session.shutdown_tx.take() {
            // A send error means the task already finished its teardown.
            let _ = tx.send(());
        }
        let _ = session
            .phase_rx
            .wait_for(|phase| *phase == SessionPhase::Closed)
            .await;
    }
}

impl Drop for LiveController {
    fn drop(&mut self) {
        match self.active.try_lock() {
            Ok(mut guard) => {
                if let Some(session) = guard.as_mut() {
                    if let Some(tx) = session.shutdown_tx.take() {
                        if tx.send(()).is_ok() {
                            warn!(
                                "[Controller] Dropped without deactivate(); shutdown signal sent."
                            );
                        }
                    }
                }
            }
            Err(_) => warn!("[Controller] Dropped while busy; session may outlive the handle."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::builder::LiveControllerBuilder;
    use crate::client::capture::test_backends::{FakeCamera, FakeMicrophone};
    use crate::client::playback::test_sinks::RecordingSink;
    use crate::client::transport::test_link::ScriptedConnector;
    use crate::state::test_sinks::{RecordingLogSink, RecordingStateSink};
    use crate::types::{
        Blob, ClientMessage, Content, FunctionCall, Part, ServerContent, ServerMessage,
        SetupComplete, ToolCallMessage,
    };
    use base64::Engine as _;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::time::timeout;

    fn init_test_logger() {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            tracing_subscriber::fmt()
                .with_env_filter("debug")
                .with_test_writer()
                .init();
        });
    }

    struct Harness {
        controller: LiveController,
        connector: Arc<ScriptedConnector>,
        state: Arc<RecordingStateSink>,
        log: Arc<RecordingLogSink>,
        output: Arc<RecordingSink>,
        mic: Arc<std::sync::Mutex<Option<tokio::sync::mpsc::Sender<Vec<f32>>>>>,
        mic_started: Arc<std::sync::atomic::AtomicBool>,
    }

    fn harness(api_key: &str) -> Harness {
        init_test_logger();
        let connector = Arc::new(ScriptedConnector::new());
        let state = Arc::new(RecordingStateSink::default());
        let log = Arc::new(RecordingLogSink::default());
        let output = Arc::new(RecordingSink::new());
        let mic = FakeMicrophone::default();
        let mic_sender = mic.captured.clone();
        let mic_started = mic.started.clone();

        let controller = LiveControllerBuilder::new(api_key)
            .model("models/test")
            .connector(connector.clone())
            .microphone(Box::new(mic))
            .camera(Box::new(FakeCamera::with_solid_frame()))
            .state_sink(state.clone())
            .log_sink(log.clone())
            .output_sink(output.clone())
            .build()
            .unwrap();

        Harness {
            controller,
            connector,
            state,
            log,
            output,
            mic: mic_sender,
            mic_started,
        }
    }

    fn setup_complete() -> ServerMessage {
        ServerMessage {
            setup_complete: Some(SetupComplete {}),
            ..Default::default()
        }
    }

    fn tool_call_message(id: &str, args: serde_json::Value) -> ServerMessage {
        ServerMessage {
            tool_call: Some(ToolCallMessage {
                function_calls: vec![FunctionCall {
                    id: id.to_string(),
                    name: "setParticleState".to_string(),
                    args,
                }],
            }),
            ..Default::default()
        }
    }

    fn audio_message(samples: &[i16]) -> ServerMessage {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        ServerMessage {
            server_content: Some(ServerContent {
                model_turn: Some(Content {
                    parts: vec![Part {
                        inline_data: Some(Blob {
                            mime_type: "audio/pcm;rate=24000".to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(bytes),
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                interrupted: None,
            }),
            ..Default::default()
        }
    }

    fn interruption_message() -> ServerMessage {
        ServerMessage {
            server_content: Some(ServerContent {
                model_turn: None,
                interrupted: Some(true),
            }),
            ..Default::default()
        }
    }

    async fn wait_for_phase(controller: &LiveController, wanted: SessionPhase) {
        let mut rx = controller
            .phase_watch()
            .await
            .expect("no session running");
        timeout(Duration::from_secs(2), rx.wait_for(|p| *p == wanted))
            .await
            .expect("phase transition timed out")
            .expect("session task ended before the phase arrived");
    }

    #[tokio::test]
    async fn full_lifecycle_reaches_active_and_closes_cleanly() {
        let h = harness("key");
        let inbound = h.connector.prime();

        h.controller.activate().await.unwrap();
        inbound.send(Ok(setup_complete())).unwrap();
        wait_for_phase(&h.controller, SessionPhase::Active).await;

        // Session open registered exactly our control function.
        let setup = h
            .connector
            .link
            .wait_for_sent(|m| matches!(m, ClientMessage::Setup(_)))
            .await;
        let ClientMessage::Setup(setup) = setup else {
            unreachable!()
        };
        let declarations = &setup.tools.as_ref().unwrap()[0].function_declarations;
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].name, "setParticleState");

        assert!(h.mic_started.load(Ordering::SeqCst));
        assert!(
            h.log
                .messages_with(LogCategory::Info)
                .contains(&"Neural link established.".to_string())
        );

        h.controller.deactivate().await;
        assert_eq!(h.controller.phase().await, SessionPhase::Idle);
        assert!(h.connector.link.closed.load(Ordering::SeqCst));
        assert!(!h.mic_started.load(Ordering::SeqCst));
        // Teardown flushed playback.
        assert!(h.output.stopped.load(Ordering::SeqCst));
        assert!(
            h.log
                .messages_with(LogCategory::Info)
                .contains(&"Aetheris AI deactivated.".to_string())
        );
    }

    #[tokio::test]
    async fn out_of_range_tool_call_is_clamped_and_acked() {
        let h = harness("key");
        let inbound = h.connector.prime();
        h.controller.activate().await.unwrap();
        inbound.send(Ok(setup_complete())).unwrap();
        wait_for_phase(&h.controller, SessionPhase::Active).await;

        inbound
            .send(Ok(tool_call_message("1", serde_json::json!({ "scale": 10.0 }))))
            .unwrap();

        let ack = h
            .connector
            .link
            .wait_for_sent(|m| matches!(m, ClientMessage::ToolResponse(_)))
            .await;
        let ClientMessage::ToolResponse(ack) = ack else {
            unreachable!()
        };
        assert_eq!(ack.function_responses[0].id, "1");
        assert_eq!(
            ack.function_responses[0].response,
            serde_json::json!({ "result": "ok" })
        );

        let updates = h.state.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].scale, Some(3.0));
        drop(updates);

        h.controller.deactivate().await;
    }

    #[tokio::test]
    async fn missing_credential_fails_without_touching_the_network() {
        let h = harness("");
        let err = h.controller.activate().await.unwrap_err();
        assert!(matches!(err, LiveError::Config(_)));
        assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
        assert_eq!(h.controller.phase().await, SessionPhase::Idle);
        assert!(
            h.log
                .messages_with(LogCategory::Error)
                .contains(&"API Key missing".to_string())
        );
    }

    #[tokio::test]
    async fn connect_failure_settles_in_closed_with_an_error_entry() {
        let h = harness("key");
        h.connector.fail_connect.store(true, Ordering::SeqCst);
        h.controller.activate().await.unwrap();

        let mut rx = h.controller.phase_watch().await.unwrap();
        timeout(
            Duration::from_secs(2),
            rx.wait_for(|p| *p == SessionPhase::Closed),
        )
        .await
        .unwrap()
        .unwrap();

        let errors = h.log.messages_with(LogCategory::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Failed to start AI: "));
    }

    #[tokio::test]
    async fn transport_error_tears_down_through_failed() {
        let h = harness("key");
        let inbound = h.connector.prime();
        h.controller.activate().await.unwrap();
        inbound.send(Ok(setup_complete())).unwrap();
        wait_for_phase(&h.controller, SessionPhase::Active).await;

        // Subscribe first and park the teardown at the close step, otherwise
        // the watch channel coalesces the short-lived Failed value away.
        let mut rx = h.controller.phase_watch().await.unwrap();
        let release_close = h.connector.link.hold_close();
        inbound
            .send(Err(LiveError::Transport("link reset".to_string())))
            .unwrap();

        timeout(
            Duration::from_secs(2),
            rx.wait_for(|p| *p == SessionPhase::Failed),
        )
        .await
        .unwrap()
        .unwrap();

        release_close.send(()).unwrap();
        timeout(
            Duration::from_secs(2),
            rx.wait_for(|p| *p == SessionPhase::Closed),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(h.connector.link.closed.load(Ordering::SeqCst));
        assert!(!h.mic_started.load(Ordering::SeqCst));
        assert!(!h.log.messages_with(LogCategory::Error).is_empty());
    }

    #[tokio::test]
    async fn peer_close_ends_the_session_cleanly() {
        let h = harness("key");
        let inbound = h.connector.prime();
        h.controller.activate().await.unwrap();
        inbound.send(Ok(setup_complete())).unwrap();
        wait_for_phase(&h.controller, SessionPhase::Active).await;

        drop(inbound);

        let mut rx = h.controller.phase_watch().await.unwrap();
        timeout(
            Duration::from_secs(2),
            rx.wait_for(|p| *p == SessionPhase::Closed),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(
            h.log
                .messages_with(LogCategory::Info)
                .contains(&"AI connection closed.".to_string())
        );
    }

    #[tokio::test]
    async fn microphone_blocks_are_sent_as_pcm_chunks() {
        let h = harness("key");
        let inbound = h.connector.prime();
        h.controller.activate().await.unwrap();
        inbound.send(Ok(setup_complete())).unwrap();
        wait_for_phase(&h.controller, SessionPhase::Active).await;

        let blocks = h.mic.lock().unwrap().clone().expect("mic not started");
        blocks.send(vec![0.5_f32; 160]).await.unwrap();

        let chunk = h
            .connector
            .link
            .wait_for_sent(|m| match m {
                ClientMessage::RealtimeInput(input) => input
                    .media
                    .as_ref()
                    .is_some_and(|b| b.mime_type.starts_with("audio/pcm")),
                _ => false,
            })
            .await;
        let ClientMessage::RealtimeInput(input) = chunk else {
            unreachable!()
        };
        assert_eq!(input.media.unwrap().mime_type, "audio/pcm;rate=16000");

        h.controller.deactivate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_throttled_to_one_per_second() {
        let h = harness("key");
        let inbound = h.connector.prime();
        h.controller.activate().await.unwrap();
        inbound.send(Ok(setup_complete())).unwrap();
        wait_for_phase(&h.controller, SessionPhase::Active).await;

        tokio::time::sleep(Duration::from_millis(5_100)).await;

        let frames = h
            .connector
            .link
            .sent_snapshot()
            .into_iter()
            .filter(|m| match m {
                ClientMessage::RealtimeInput(input) => input
                    .media
                    .as_ref()
                    .is_some_and(|b| b.mime_type == "image/jpeg"),
                _ => false,
            })
            .count();
        assert!((4..=5).contains(&frames), "got {} frames", frames);

        h.controller.deactivate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn interruption_silences_playback() {
        let h = harness("key");
        let inbound = h.connector.prime();
        h.controller.activate().await.unwrap();
        inbound.send(Ok(setup_complete())).unwrap();
        wait_for_phase(&h.controller, SessionPhase::Active).await;

        // 500ms of synthesized audio, then barge-in while it plays.
        inbound.send(Ok(audio_message(&vec![1_i16; 12_000]))).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.output.plays.lock().unwrap().len(), 1);

        inbound.send(Ok(interruption_message())).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.output.stopped.load(Ordering::SeqCst));

        h.controller.deactivate().await;
    }

    #[tokio::test]
    async fn reactivation_replaces_the_running_session() {
        let h = harness("key");
        let first = h.connector.prime();
        h.controller.activate().await.unwrap();
        first.send(Ok(setup_complete())).unwrap();
        wait_for_phase(&h.controller, SessionPhase::Active).await;

        let second = h.connector.prime();
        h.controller.activate().await.unwrap();
        second.send(Ok(setup_complete())).unwrap();
        wait_for_phase(&h.controller, SessionPhase::Active).await;

        assert_eq!(h.connector.connects.load(Ordering::SeqCst), 2);
        // Old link was closed during the forced wind-down.
        assert!(h.connector.link.closed.load(Ordering::SeqCst));

        h.controller.deactivate().await;
    }

    #[tokio::test]
    async fn deactivate_is_idempotent() {
        let h = harness("key");
        h.controller.deactivate().await;
        h.controller.deactivate().await;
        assert_eq!(h.controller.phase().await, SessionPhase::Idle);
    }
}
