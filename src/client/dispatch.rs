//! Inbound message classification.
//!
//! Each server message demultiplexes into zero or more events. Within one
//! message the interruption signal comes first so barge-in always reaches the
//! scheduler before any audio payload of the same message; tool calls keep
//! their declaration order, which is the authoritative application order.

use base64::Engine as _;
use tracing::warn;

use super::OUTPUT_SAMPLE_RATE_HZ;
use super::encoder::pcm16_from_le_bytes;
use super::playback::PlaybackBuffer;
use crate::types::{FunctionCall, ServerMessage};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InboundEvent {
    Interrupted,
    ToolCall(FunctionCall),
    Audio(PlaybackBuffer),
}

pub(crate) fn classify(message: ServerMessage) -> Vec<InboundEvent> {
    let mut events = Vec::new();

    let interrupted = message
        .server_content
        .as_ref()
        .and_then(|c| c.interrupted)
        .unwrap_or(false);
    if interrupted {
        events.push(InboundEvent::Interrupted);
    }

    if let Some(tool_call) = message.tool_call {
        for call in tool_call.function_calls {
            events.push(InboundEvent::ToolCall(call));
        }
    }

    if let Some(turn) = message.server_content.and_then(|c| c.model_turn) {
        for part in turn.parts {
            let Some(blob) = part.inline_data else {
                continue;
            };
            if !blob.mime_type.starts_with("audio/pcm") {
                warn!(
                    "[Dispatcher] Ignoring inline data with unsupported mime type '{}'.",
                    blob.mime_type
                );
                continue;
            }
            match base64::engine::general_purpose::STANDARD.decode(&blob.data) {
                Ok(bytes) => events.push(InboundEvent::Audio(PlaybackBuffer {
                    samples: pcm16_from_le_bytes(&bytes),
                    sample_rate: OUTPUT_SAMPLE_RATE_HZ,
                })),
                Err(e) => warn!("[Dispatcher] Undecodable audio payload dropped: {}", e),
            }
        }
    }

    events
}
