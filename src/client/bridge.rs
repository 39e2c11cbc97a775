//! Tool call bridge: validates remote parameter-change requests and applies
//! them to the externally owned particle state.
//!
//! Calls arrive over a bounded channel in arrival order and each one is
//! acknowledged before the next is read. Application never suspends and never
//! fails the session: a malformed call degrades to a partial or no-op update
//! plus a logged warning, and out-of-range numerics clamp to the nearest
//! declared bound so the remote agent's imprecise output stays usable.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::state::{
    EXPANSION_BOUNDS, LogCategory, LogSink, ParticleUpdate, SCALE_BOUNDS, SPEED_BOUNDS, ShapeType,
    StateSink, clamp_to_bounds, is_valid_hex_color,
};
use crate::types::{ClientMessage, FunctionCall, FunctionResponse, ToolResponse};

/// Name of the single function declared to the service at session open.
pub(crate) const CONTROL_FUNCTION_NAME: &str = "setParticleState";

pub(crate) struct ToolCallBridge {
    state_sink: Arc<dyn StateSink>,
    log_sink: Arc<dyn LogSink>,
}

impl ToolCallBridge {
    pub(crate) fn new(state_sink: Arc<dyn StateSink>, log_sink: Arc<dyn LogSink>) -> Self {
        Self {
            state_sink,
            log_sink,
        }
    }

    /// Consumes calls in arrival order. The ack for call *n* is handed to the
    /// outgoing queue before call *n+1* is read, preserving the invariant of
    /// exactly one ordered acknowledgement per call.
    pub(crate) async fn run(
        self,
        mut calls: mpsc::Receiver<FunctionCall>,
        outgoing: mpsc::Sender<ClientMessage>,
    ) {
        while let Some(call) = calls.recv().await {
            let ack = self.apply(&call);
            if outgoing.send(ack).await.is_err() {
                // Session task is gone; remaining calls have nowhere to ack.
                return;
            }
        }
    }

    /// Validates and applies one call, returning its acknowledgement.
    pub(crate) fn apply(&self, call: &FunctionCall) -> ClientMessage {
        if call.name == CONTROL_FUNCTION_NAME {
            let update = self.validate(&call.args);
            if update.is_empty() {
                warn!(
                    "[Bridge] Call {} carried no applicable fields: {}",
                    call.id, call.args
                );
            } else {
                let summary =
                    serde_json::to_string(&update).unwrap_or_else(|_| "{}".to_string());
                self.state_sink.apply(update);
                info!("[Bridge] Applied call {}: {}", call.id, summary);
                self.log_sink
                    .emit(&format!("AI Action: {}", summary), LogCategory::Ai);
            }
        } else {
            warn!(
                "[Bridge] Unknown function '{}' in call {}; acknowledged without effect.",
                call.name, call.id
            );
        }

        ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response: serde_json::json!({ "result": "ok" }),
            }],
        })
    }

    /// Field-by-field tolerant validation: wrong-typed or out-of-domain
    /// fields are skipped with a warning, numerics clamp to their bounds.
    fn validate(&self, args: &serde_json::Value) -> ParticleUpdate {
        let mut update = ParticleUpdate::default();
        let Some(map) = args.as_object() else {
            if !args.is_null() {
                warn!("[Bridge] Tool call args are not an object: {}", args);
            }
            return update;
        };

        for (key, value) in map {
            match key.as_str() {
                "shape" => match value.as_str().and_then(ShapeType::parse) {
                    Some(shape) => update.shape = Some(shape),
                    None => warn!("[Bridge] Unrecognized shape {} skipped.", value),
                },
                "scale" => match value.as_f64() {
                    Some(v) => update.scale = Some(clamp_to_bounds(v, SCALE_BOUNDS)),
                    None => warn!("[Bridge] Non-numeric scale {} skipped.", value),
                },
                "expansion" => match value.as_f64() {
                    Some(v) => update.expansion = Some(clamp_to_bounds(v, EXPANSION_BOUNDS)),
                    None => warn!("[Bridge] Non-numeric expansion {} skipped.", value),
                },
                "speed" => match value.as_f64() {
                    Some(v) => update.speed = Some(clamp_to_bounds(v, SPEED_BOUNDS)),
                    None => warn!("[Bridge] Non-numeric speed {} skipped.", value),
                },
                "color" => match value.as_str() {
                    Some(c) if is_valid_hex_color(c) => update.color = Some(c.to_string()),
                    _ => warn!("[Bridge] Invalid color specification {} skipped.", value),
                },
                other => warn!("[Bridge] Unknown field '{}' skipped.", other),
            }
        }
        update
    }
}
