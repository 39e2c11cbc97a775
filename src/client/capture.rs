//! Capture pipeline: microphone and camera acquisition.
//!
//! Device backends sit behind traits so the session core stays testable and
//! host platforms can bind their own camera stack. The crate ships a cpal
//! microphone backend; raw camera frames are pulled on demand, so at most one
//! unsent frame ever exists.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::INPUT_SAMPLE_RATE_HZ;
use crate::error::{LiveError, Result};

/// One uncompressed camera frame, tightly packed RGB8.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Microphone acquisition. `start` begins delivering blocks of f32 samples at
/// 16kHz mono into the supplied sender; `stop` must be idempotent.
pub trait MicrophoneBackend: Send {
    fn start(&mut self, blocks: mpsc::Sender<Vec<f32>>) -> Result<()>;
    fn stop(&mut self);
}

/// Camera acquisition. `latest_frame` returns the most recent frame, or
/// `None` when nothing new is available; `stop` must be idempotent.
pub trait CameraBackend: Send {
    fn start(&mut self) -> Result<()>;
    fn latest_frame(&mut self) -> Option<RawFrame>;
    fn stop(&mut self);
}

/// Owns both capture devices for the lifetime of a session.
///
/// Acquisition is all-or-none: a camera failure stops the already started
/// microphone before the error is returned, so a failed acquire leaves no
/// hardware indicator lit. `release` is safe to call repeatedly and safe to
/// call when `acquire` never succeeded.
pub struct CapturePipeline {
    microphone: Box<dyn MicrophoneBackend>,
    camera: Box<dyn CameraBackend>,
    acquired: bool,
}

impl CapturePipeline {
    pub fn new(microphone: Box<dyn MicrophoneBackend>, camera: Box<dyn CameraBackend>) -> Self {
        Self {
            microphone,
            camera,
            acquired: false,
        }
    }

    pub fn acquire(&mut self, blocks: mpsc::Sender<Vec<f32>>) -> Result<()> {
        if self.acquired {
            return Ok(());
        }
        self.microphone.start(blocks)?;
        if let Err(e) = self.camera.start() {
            self.microphone.stop();
            return Err(e);
        }
        self.acquired = true;
        info!("[Capture] Microphone and camera acquired.");
        Ok(())
    }

    pub fn latest_frame(&mut self) -> Option<RawFrame> {
        if !self.acquired {
            return None;
        }
        self.camera.latest_frame()
    }

    pub fn release(&mut self) {
        self.microphone.stop();
        self.camera.stop();
        if self.acquired {
            info!("[Capture] Devices released.");
        }
        self.acquired = false;
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }
}

enum WorkerCommand {
    Stop,
}

/// Microphone backend over the default cpal input device.
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread; the data
/// callback forwards sample blocks with `try_send` and drops blocks when the
/// session loop falls behind (best-effort transport, degraded not corrupted).
pub struct CpalMicrophone {
    worker: Option<(std_mpsc::Sender<WorkerCommand>, JoinHandle<()>)>,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self { worker: None }
    }

    fn run_stream(
        blocks: mpsc::Sender<Vec<f32>>,
        ready: std_mpsc::Sender<Result<()>>,
        commands: std_mpsc::Receiver<WorkerCommand>,
    ) {
        let stream = match Self::build_stream(blocks) {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        // Park until stop; the stream keeps capturing while this thread lives.
        while let Ok(command) = commands.recv() {
            match command {
                WorkerCommand::Stop => break,
            }
        }
        drop(stream);
    }

    fn build_stream(blocks: mpsc::Sender<Vec<f32>>) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| LiveError::Device("no input device available".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| LiveError::Device(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(INPUT_SAMPLE_RATE_HZ)
                    && c.max_sample_rate() >= SampleRate(INPUT_SAMPLE_RATE_HZ)
            })
            .ok_or_else(|| {
                LiveError::Device(format!(
                    "no f32 mono input config at {}Hz",
                    INPUT_SAMPLE_RATE_HZ
                ))
            })?;

        let config: StreamConfig = supported
            .with_sample_rate(SampleRate(INPUT_SAMPLE_RATE_HZ))
            .config();

        info!(
            "[Capture] Microphone: {} @ {}Hz mono",
            device.name().unwrap_or_default(),
            INPUT_SAMPLE_RATE_HZ
        );

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if data.is_empty() {
                        return;
                    }
                    match blocks.try_send(data.to_vec()) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!("[Capture] Audio block dropped: session loop is behind.");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {}
                    }
                },
                |err| error!("[Capture] Microphone stream error: {}", err),
                None,
            )
            .map_err(|e| LiveError::Device(e.to_string()))?;

        stream.play().map_err(|e| LiveError::Device(e.to_string()))?;
        Ok(stream)
    }
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrophoneBackend for CpalMicrophone {
    fn start(&mut self, blocks: mpsc::Sender<Vec<f32>>) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (command_tx, command_rx) = std_mpsc::channel();
        let handle = std::thread::spawn(move || Self::run_stream(blocks, ready_tx, command_rx));

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some((command_tx, handle));
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(LiveError::Device(
                    "microphone worker exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some((commands, handle)) = self.worker.take() {
            let _ = commands.send(WorkerCommand::Stop);
            let _ = handle.join();
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}
