//! Builder for [`LiveController`].
//!
//! The credential, model and capture backends default to the production
//! setup; sinks have no sensible default because they are the host
//! application's side of the contract, so `build` requires them.

use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tracing::info;

use super::capture::{CameraBackend, CapturePipeline, CpalMicrophone, MicrophoneBackend};
use super::connection::SessionContext;
use super::handle::LiveController;
use super::playback::OutputSink;
use super::transport::{Connector, WsConnector};
use crate::error::{LiveError, Result};
use crate::state::{LogSink, StateSink};

/// Live model used when the host does not pick one.
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Persona and control guidance given to the model at session open.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Aetheris, a visionary interface. \
    Monitor the camera for hand gestures. If the user spreads their fingers, increase \
    \"expansion\". If they move their hands closer, decrease \"scale\". If they move them \
    apart, increase \"scale\". Call setParticleState frequently to reflect movement. \
    Speak poetically about the sacred geometry.";

pub struct LiveControllerBuilder {
    api_key: String,
    model: String,
    system_instruction: Option<String>,
    connector: Option<Arc<dyn Connector>>,
    microphone: Option<Box<dyn MicrophoneBackend>>,
    camera: Option<Box<dyn CameraBackend>>,
    state_sink: Option<Arc<dyn StateSink>>,
    log_sink: Option<Arc<dyn LogSink>>,
    output_sink: Option<Arc<dyn OutputSink>>,
}

impl LiveControllerBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            connector: None,
            microphone: None,
            camera: None,
            state_sink: None,
            log_sink: None,
            output_sink: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Replaces the production WebSocket connector, mainly for tests.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn microphone(mut self, microphone: Box<dyn MicrophoneBackend>) -> Self {
        self.microphone = Some(microphone);
        self
    }

    pub fn camera(mut self, camera: Box<dyn CameraBackend>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn state_sink(mut self, sink: Arc<dyn StateSink>) -> Self {
        self.state_sink = Some(sink);
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn output_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.output_sink = Some(sink);
        self
    }

    /// Assembles the controller. Fails with a configuration error when a
    /// required host-side piece (camera, sinks) was never supplied.
    pub fn build(self) -> Result<LiveController> {
        let state_sink = self
            .state_sink
            .ok_or_else(|| LiveError::Config("a state sink is required".to_string()))?;
        let log_sink = self
            .log_sink
            .ok_or_else(|| LiveError::Config("a log sink is required".to_string()))?;
        let output_sink = self
            .output_sink
            .ok_or_else(|| LiveError::Config("an output sink is required".to_string()))?;
        let camera = self
            .camera
            .ok_or_else(|| LiveError::Config("a camera backend is required".to_string()))?;
        let microphone = self
            .microphone
            .unwrap_or_else(|| Box::new(CpalMicrophone::new()));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector::new()));

        info!("[Controller] Built for model '{}'.", self.model);
        Ok(LiveController::new(Arc::new(SessionContext {
            api_key: self.api_key,
            model: self.model,
            system_instruction: self.system_instruction,
            connector,
            capture: Arc::new(TokioMutex::new(CapturePipeline::new(microphone, camera))),
            state_sink,
            log_sink,
            output_sink,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::capture::test_backends::{FakeCamera, FakeMicrophone};
    use crate::client::playback::test_sinks::RecordingSink;
    use crate::state::test_sinks::{RecordingLogSink, RecordingStateSink};

    #[tokio::test]
    async fn build_without_sinks_is_a_config_error() {
        let err = LiveControllerBuilder::new("key").build().err().unwrap();
        assert!(matches!(err, LiveError::Config(_)));
    }

    #[tokio::test]
    async fn build_with_full_wiring_succeeds() {
        let controller = LiveControllerBuilder::new("key")
            .model("models/test")
            .system_instruction("be terse")
            .microphone(Box::new(FakeMicrophone::default()))
            .camera(Box::new(FakeCamera::default()))
            .state_sink(Arc::new(RecordingStateSink::default()))
            .log_sink(Arc::new(RecordingLogSink::default()))
            .output_sink(Arc::new(RecordingSink::new()));
        assert!(controller.build().is_ok());
    }
}
