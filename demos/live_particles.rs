//! Interactive demo: talk to Aetheris and watch it steer a (printed)
//! particle scene. Requires GEMINI_API_KEY, a microphone and speakers.
//!
//! ```sh
//! GEMINI_API_KEY=... cargo run --example live_particles
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use crossbeam_channel::{Sender, bounded};
use tracing::error;

use aetheris_live::{
    CameraBackend, LiveControllerBuilder, LogCategory, LogSink, OutputSink, ParticleState,
    ParticleUpdate, RawFrame, Result, StateSink,
};

/// Renders a drifting gradient so the model has something to look at even
/// without real camera hardware.
struct SyntheticCamera {
    tick: u8,
    running: bool,
}

impl SyntheticCamera {
    fn new() -> Self {
        Self {
            tick: 0,
            running: false,
        }
    }
}

impl CameraBackend for SyntheticCamera {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn latest_frame(&mut self) -> Option<RawFrame> {
        if !self.running {
            return None;
        }
        self.tick = self.tick.wrapping_add(16);
        let (width, height) = (320u32, 240u32);
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push((x as u8).wrapping_add(self.tick));
                pixels.push((y as u8).wrapping_sub(self.tick));
                pixels.push(self.tick);
            }
        }
        Some(RawFrame {
            width,
            height,
            pixels,
        })
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

/// Holds the scene state and prints every applied update.
#[derive(Default)]
struct PrintedScene {
    state: Mutex<ParticleState>,
}

impl StateSink for PrintedScene {
    fn apply(&self, update: ParticleUpdate) {
        let mut state = self.state.lock().unwrap();
        state.apply(&update);
        println!(
            "scene: shape={} scale={:.2} expansion={:.2} speed={:.3} color={}",
            state.shape.as_str(),
            state.scale,
            state.expansion,
            state.speed,
            state.color
        );
    }
}

struct ConsoleLog;

impl LogSink for ConsoleLog {
    fn emit(&self, message: &str, category: LogCategory) {
        println!(
            "{} [{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            category.as_str(),
            message
        );
    }
}

enum SpeakerCommand {
    Play(Vec<i16>),
    StopAll,
}

/// Output sink over the default cpal device. The stream lives on its own
/// thread; playback is a shared sample queue drained by the device callback.
struct Speaker {
    commands: Sender<SpeakerCommand>,
}

impl Speaker {
    fn spawn(sample_rate: u32) -> Self {
        let (tx, rx) = bounded::<SpeakerCommand>(100);
        std::thread::spawn(move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .expect("no output device available");
            let config = StreamConfig {
                channels: 1,
                sample_rate: SampleRate(sample_rate),
                buffer_size: BufferSize::Default,
            };

            let queue = Arc::new(Mutex::new(VecDeque::<i16>::new()));
            let callback_queue = Arc::clone(&queue);
            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut queue = callback_queue.lock().unwrap();
                        for slot in data.iter_mut() {
                            *slot = queue
                                .pop_front()
                                .map(|s| s as f32 / 32768.0)
                                .unwrap_or(0.0);
                        }
                    },
                    |err| error!("output stream error: {}", err),
                    None,
                )
                .expect("failed to build output stream");
            stream.play().expect("failed to start output stream");

            while let Ok(command) = rx.recv() {
                match command {
                    SpeakerCommand::Play(samples) => queue.lock().unwrap().extend(samples),
                    SpeakerCommand::StopAll => queue.lock().unwrap().clear(),
                }
            }
        });
        Self { commands: tx }
    }
}

impl OutputSink for Speaker {
    fn play(&self, samples: &[i16], _sample_rate: u32) {
        let _ = self.commands.try_send(SpeakerCommand::Play(samples.to_vec()));
    }

    fn stop_all(&self) {
        let _ = self.commands.try_send(SpeakerCommand::StopAll);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let api_key = std::env::var("GEMINI_API_KEY")
        .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY not set"))?;

    let controller = LiveControllerBuilder::new(api_key)
        .camera(Box::new(SyntheticCamera::new()))
        .state_sink(Arc::new(PrintedScene::default()))
        .log_sink(Arc::new(ConsoleLog))
        .output_sink(Arc::new(Speaker::spawn(24_000)))
        .build()?;

    controller.activate().await?;
    println!("Session running. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    controller.deactivate().await;
    Ok(())
}
