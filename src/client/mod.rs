pub mod builder;
pub mod capture;
pub mod handle;
pub mod playback;
pub mod transport;

mod bridge;
mod connection;
mod dispatch;
mod encoder;

pub use builder::LiveControllerBuilder;
pub use capture::{CameraBackend, CapturePipeline, CpalMicrophone, MicrophoneBackend, RawFrame};
pub use connection::SessionPhase;
pub use handle::LiveController;
pub use playback::{OutputSink, PlaybackBuffer, PlaybackScheduler};
pub use transport::{Connector, Transport, WsConnector};

/// Sample rate (16kHz mono) for audio streamed to the service.
pub(crate) const INPUT_SAMPLE_RATE_HZ: u32 = 16_000;
/// Sample rate (24kHz mono) of synthesized audio received from the service.
pub(crate) const OUTPUT_SAMPLE_RATE_HZ: u32 = 24_000;
/// Cadence of outbound camera frames. Faster frames are discarded, not queued.
pub(crate) const FRAME_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);
/// Outbound frames are downscaled to this fixed resolution before encoding.
pub(crate) const FRAME_WIDTH: u32 = 320;
pub(crate) const FRAME_HEIGHT: u32 = 240;
pub(crate) const JPEG_QUALITY: u8 = 60;
