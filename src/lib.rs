//! Aetheris live session core.
//!
//! Drives a bidirectional streaming session against a remote reasoning
//! service: microphone audio and camera frames go up, synthesized speech and
//! tool calls come back down. Playback is gapless with barge-in, and the one
//! declared tool call lets the remote agent steer a host-owned particle
//! scene through validated, clamped updates.
//!
//! ```no_run
//! use std::sync::Arc;
//! use aetheris_live::{LiveControllerBuilder, LogCategory, LogSink, ParticleUpdate, StateSink};
//!
//! struct Scene;
//! impl StateSink for Scene {
//!     fn apply(&self, update: ParticleUpdate) {
//!         println!("scene <- {:?}", update);
//!     }
//! }
//!
//! struct Console;
//! impl LogSink for Console {
//!     fn emit(&self, message: &str, category: LogCategory) {
//!         println!("[{}] {}", category.as_str(), message);
//!     }
//! }
//!
//! # async fn run(camera: Box<dyn aetheris_live::CameraBackend>,
//! #              speaker: Arc<dyn aetheris_live::OutputSink>) -> aetheris_live::Result<()> {
//! let controller = LiveControllerBuilder::new(std::env::var("GEMINI_API_KEY").unwrap())
//!     .camera(camera)
//!     .state_sink(Arc::new(Scene))
//!     .log_sink(Arc::new(Console))
//!     .output_sink(speaker)
//!     .build()?;
//! controller.activate().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod state;
pub mod types;

pub use client::builder::{DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, LiveControllerBuilder};
pub use client::capture::{CameraBackend, CapturePipeline, CpalMicrophone, MicrophoneBackend, RawFrame};
pub use client::handle::LiveController;
pub use client::playback::{OutputSink, PlaybackBuffer, PlaybackScheduler};
pub use client::transport::{Connector, Transport, WsConnector};
pub use client::SessionPhase;
pub use error::{LiveError, Result};
pub use state::{
    LogCategory, LogSink, ParticleState, ParticleUpdate, ShapeType, StateSink,
    EXPANSION_BOUNDS, SCALE_BOUNDS, SPEED_BOUNDS,
};
