//! The session task: owns the duplex link for one activation, drives the
//! lifecycle state machine and multiplexes every producer feeding the session
//! (microphone blocks, the 1Hz frame timer, bridge acknowledgements, inbound
//! messages) through a single select loop.

use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::FRAME_INTERVAL;
use super::bridge::{CONTROL_FUNCTION_NAME, ToolCallBridge};
use super::capture::CapturePipeline;
use super::dispatch::{InboundEvent, classify};
use super::encoder::{audio_chunk_message, encode_frame, pcm16_from_f32, video_frame_message};
use super::playback::{OutputSink, PlaybackScheduler};
use super::transport::{Connector, Transport};
use crate::error::LiveError;
use crate::state::{LogCategory, LogSink, StateSink};
use crate::types::{
    ClientMessage, Content, FunctionDeclaration, Part, ServerMessage, SessionSetup, Tool,
};

pub(crate) const OUTGOING_CAPACITY: usize = 100;
const AUDIO_BLOCK_CAPACITY: usize = 32;
const TOOL_CALL_CAPACITY: usize = 32;

/// Lifecycle of one session. `Failed` is absorbing for the event loop but
/// always settles in `Closed` after the shared teardown runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
    Failed,
}

/// Everything a session task borrows from the controller. Shared across
/// activations; each activation gets fresh channels and a fresh transport.
pub(crate) struct SessionContext {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) system_instruction: Option<String>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) capture: Arc<TokioMutex<CapturePipeline>>,
    pub(crate) state_sink: Arc<dyn StateSink>,
    pub(crate) log_sink: Arc<dyn LogSink>,
    pub(crate) output_sink: Arc<dyn OutputSink>,
}

/// The one function the remote agent may call, registered at session open.
/// Parameter domains mirror the declared bounds in [`crate::state`].
pub(crate) fn control_function_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: CONTROL_FUNCTION_NAME.to_string(),
        description: Some(
            "Updates the visual parameters of the Aetheris particle system.".to_string(),
        ),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "shape": {
                    "type": "string",
                    "enum": ["sphere", "torus_knot", "heart", "mandala"],
                    "description": "The geometry to morph into."
                },
                "scale": {
                    "type": "number",
                    "description": "Size multiplier (0.5 to 3.0)."
                },
                "expansion": {
                    "type": "number",
                    "description": "Dispersion of particles (0.5 to 5.0)."
                },
                "speed": {
                    "type": "number",
                    "description": "Rotation/animation speed (0.01 to 0.2)."
                },
                "color": {
                    "type": "string",
                    "description": "Hex color code for the glow effect."
                }
            },
            "required": []
        }),
    }
}

fn setup_message(ctx: &SessionContext) -> ClientMessage {
    ClientMessage::Setup(SessionSetup {
        model: ctx.model.clone(),
        system_instruction: ctx.system_instruction.as_ref().map(|text| Content {
            parts: vec![Part {
                text: Some(text.clone()),
                ..Default::default()
            }],
            role: None,
        }),
        tools: Some(vec![Tool {
            function_declarations: vec![control_function_declaration()],
        }]),
    })
}

enum LinkOutcome {
    Open(Box<dyn Transport>),
    ShutdownRequested,
    Failed,
}

enum Handshake {
    Ready,
    ShutdownRequested,
    Failed(LiveError),
}

/// Runs one full session: `Connecting` through `Closed`. Resource release is
/// unconditional; every teardown step is attempted even when earlier ones
/// error.
pub(crate) async fn run_session(
    ctx: Arc<SessionContext>,
    mut shutdown_rx: oneshot::Receiver<()>,
    phase_tx: watch::Sender<SessionPhase>,
) {
    phase_tx.send_replace(SessionPhase::Connecting);
    ctx.log_sink
        .emit("Initializing Aetheris AI...", LogCategory::Info);
    info!("[Session] Connecting to live service.");

    let mut transport = match open_link(&ctx, &mut shutdown_rx).await {
        LinkOutcome::Open(transport) => transport,
        LinkOutcome::ShutdownRequested => {
            info!("[Session] Shutdown requested before the link opened.");
            phase_tx.send_replace(SessionPhase::Closing);
            phase_tx.send_replace(SessionPhase::Closed);
            return;
        }
        LinkOutcome::Failed => {
            // Nothing was acquired; settle without touching capture.
            phase_tx.send_replace(SessionPhase::Failed);
            phase_tx.send_replace(SessionPhase::Closed);
            return;
        }
    };

    let scheduler = PlaybackScheduler::new(Arc::clone(&ctx.output_sink));
    let failed = drive_session(
        &ctx,
        transport.as_mut(),
        &scheduler,
        &mut shutdown_rx,
        &phase_tx,
    )
    .await;

    phase_tx.send_replace(if failed {
        SessionPhase::Failed
    } else {
        SessionPhase::Closing
    });

    // Teardown, identical for deactivation and failure: frame timer and
    // bridge already stopped with the loop; close the link, release the
    // devices, flush playback.
    transport.close().await;
    ctx.capture.lock().await.release();
    scheduler.interrupt().await;

    phase_tx.send_replace(SessionPhase::Closed);
    if !failed {
        ctx.log_sink
            .emit("Aetheris AI deactivated.", LogCategory::Info);
    }
    info!("[Session] Teardown complete.");
}

async fn open_link(
    ctx: &SessionContext,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> LinkOutcome {
    tokio::select! {
        biased;
        _ = &mut *shutdown_rx => LinkOutcome::ShutdownRequested,
        connected = ctx.connector.connect(&ctx.api_key) => match connected {
            Ok(transport) => LinkOutcome::Open(transport),
            Err(e) => {
                error!("[Session] Connection failed: {}", e);
                ctx.log_sink
                    .emit(&format!("Failed to start AI: {}", e), LogCategory::Error);
                LinkOutcome::Failed
            }
        }
    }
}

async fn await_setup_complete(
    transport: &mut dyn Transport,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> Handshake {
    loop {
        tokio::select! {
            biased;
            _ = &mut *shutdown_rx => return Handshake::ShutdownRequested,
            inbound = transport.next_message() => match inbound {
                Some(Ok(message)) if message.setup_complete.is_some() => return Handshake::Ready,
                Some(Ok(message)) => {
                    debug!("[Session] Message before setup completion ignored: {:?}", message);
                }
                Some(Err(e)) => return Handshake::Failed(e),
                None => {
                    return Handshake::Failed(LiveError::Transport(
                        "link closed during session open".to_string(),
                    ));
                }
            }
        }
    }
}

/// Handshake plus the active event loop. Returns whether the session ended
/// in failure (drives `Closing` vs `Failed` in the caller).
async fn drive_session(
    ctx: &SessionContext,
    transport: &mut dyn Transport,
    scheduler: &PlaybackScheduler,
    shutdown_rx: &mut oneshot::Receiver<()>,
    phase_tx: &watch::Sender<SessionPhase>,
) -> bool {
    if let Err(e) = transport.send(setup_message(ctx)).await {
        error!("[Session] Failed to send session setup: {}", e);
        ctx.log_sink
            .emit(&format!("Failed to start AI: {}", e), LogCategory::Error);
        return true;
    }

    match await_setup_complete(transport, shutdown_rx).await {
        Handshake::Ready => {}
        Handshake::ShutdownRequested => return false,
        Handshake::Failed(e) => {
            error!("[Session] Session open was not acknowledged: {}", e);
            ctx.log_sink
                .emit(&format!("Failed to start AI: {}", e), LogCategory::Error);
            return true;
        }
    }

    phase_tx.send_replace(SessionPhase::Active);
    ctx.log_sink
        .emit("Neural link established.", LogCategory::Info);
    info!("[Session] Session active.");

    // Capture starts on entry to Active.
    let (block_tx, mut block_rx) = mpsc::channel(AUDIO_BLOCK_CAPACITY);
    if let Err(e) = ctx.capture.lock().await.acquire(block_tx) {
        error!("[Session] Capture acquisition failed: {}", e);
        ctx.log_sink
            .emit(&format!("Failed to start AI: {}", e), LogCategory::Error);
        return true;
    }

    let (call_tx, call_rx) = mpsc::channel(TOOL_CALL_CAPACITY);
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel(OUTGOING_CAPACITY);
    let bridge = ToolCallBridge::new(Arc::clone(&ctx.state_sink), Arc::clone(&ctx.log_sink));
    tokio::spawn(bridge.run(call_rx, outgoing_tx));

    let mut frames = tokio::time::interval_at(
        tokio::time::Instant::now() + FRAME_INTERVAL,
        FRAME_INTERVAL,
    );
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    enum Step {
        Shutdown,
        MicBlock(Vec<f32>),
        FrameTick,
        Outbound(ClientMessage),
        Inbound(Option<crate::error::Result<ServerMessage>>),
    }

    loop {
        let step = tokio::select! {
            biased;
            _ = &mut *shutdown_rx => Step::Shutdown,
            Some(message) = outgoing_rx.recv() => Step::Outbound(message),
            Some(block) = block_rx.recv() => Step::MicBlock(block),
            _ = frames.tick() => Step::FrameTick,
            inbound = transport.next_message() => Step::Inbound(inbound),
        };

        match step {
            Step::Shutdown => return false,
            Step::MicBlock(block) => {
                if block.is_empty() {
                    continue;
                }
                let chunk = audio_chunk_message(&pcm16_from_f32(&block));
                if let Err(e) = transport.send(chunk).await {
                    error!("[Session] Audio send failed: {}", e);
                    ctx.log_sink
                        .emit(&format!("AI Error: {}", e), LogCategory::Error);
                    return true;
                }
            }
            Step::FrameTick => {
                let frame = ctx.capture.lock().await.latest_frame();
                let Some(frame) = frame else {
                    debug!("[Session] No camera frame available at tick.");
                    continue;
                };
                match encode_frame(&frame) {
                    Ok(jpeg) => {
                        if let Err(e) = transport.send(video_frame_message(&jpeg)).await {
                            error!("[Session] Frame send failed: {}", e);
                            ctx.log_sink
                                .emit(&format!("AI Error: {}", e), LogCategory::Error);
                            return true;
                        }
                    }
                    // Encoder failures are skipped, never fatal to the session.
                    Err(e) => warn!("[Session] Frame skipped: {}", e),
                }
            }
            Step::Outbound(message) => {
                if let Err(e) = transport.send(message).await {
                    error!("[Session] Acknowledgement send failed: {}", e);
                    ctx.log_sink
                        .emit(&format!("AI Error: {}", e), LogCategory::Error);
                    return true;
                }
            }
            Step::Inbound(None) => {
                ctx.log_sink.emit("AI connection closed.", LogCategory::Info);
                return false;
            }
            Step::Inbound(Some(Err(e))) => {
                error!("[Session] Transport error: {}", e);
                ctx.log_sink
                    .emit(&format!("AI Error: {}", e), LogCategory::Error);
                return true;
            }
            Step::Inbound(Some(Ok(message))) => {
                for event in classify(message) {
                    match event {
                        InboundEvent::Interrupted => scheduler.interrupt().await,
                        InboundEvent::ToolCall(call) => {
                            if call_tx.send(call).await.is_err() {
                                warn!("[Session] Bridge is gone; tool call dropped.");
                            }
                        }
                        InboundEvent::Audio(buffer) => {
                            scheduler.enqueue(buffer).await;
                        }
                    }
                }
            }
        }
    }
}
