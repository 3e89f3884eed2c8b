//! Mikrofon-Backend - echte Audio-Aufnahme über cpal
//!
//! Nur für Audio-Constraints; Video wird abgelehnt.
//! Der cpal-Stream lebt auf einem eigenen Thread (Stream ist nicht überall
//! `Send`) und wird beim Stoppen des Tracks dort gedroppt.

use super::{
    MediaConstraints, MediaDevices, MediaError, MediaStream, MediaTrack, TrackKind, TrackSource,
};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig, SupportedStreamConfigRange};
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tokio::sync::oneshot;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Sample Rate (48kHz ist der Standard für beste Qualität)
pub const SAMPLE_RATE: u32 = 48000;

/// Frame Size in Samples (20ms @ 48kHz = 960 samples)
pub const FRAME_SIZE: usize = 960;

/// Buffer Size für Audio-Ring-Buffer
const RING_BUFFER_SIZE: usize = FRAME_SIZE * 10;

// ============================================================================
// TRACK SOURCE
// ============================================================================

/// Verbindung zwischen Audio-Track und Capture-Thread
struct MicrophoneSource {
    enabled: Arc<AtomicBool>,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl TrackSource for MicrophoneSource {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        tracing::debug!("Microphone enabled: {}", enabled);
    }

    fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// MICROPHONE DEVICES
// ============================================================================

/// Capture-Backend für das Standard-Eingabegerät
pub struct MicrophoneDevices {
    /// Ring-Buffer für aufgenommenes Audio (Mono PCM, 48kHz)
    capture_buffer: Arc<Mutex<HeapRb<f32>>>,

    /// Audio Level (0.0 - 1.0) für Visualisierung
    input_level: Arc<Mutex<f32>>,
}

impl MicrophoneDevices {
    pub fn new() -> Self {
        Self {
            capture_buffer: Arc::new(Mutex::new(HeapRb::new(RING_BUFFER_SIZE))),
            input_level: Arc::new(Mutex::new(0.0)),
        }
    }

    /// Liest einen Frame von aufgenommenem Audio
    pub fn read_frame(&self) -> Option<Vec<f32>> {
        let mut buffer = self.capture_buffer.lock();
        if buffer.occupied_len() < FRAME_SIZE {
            return None;
        }

        let mut frame = Vec::with_capacity(FRAME_SIZE);
        for _ in 0..FRAME_SIZE {
            if let Some(sample) = buffer.try_pop() {
                frame.push(sample);
            }
        }
        Some(frame)
    }

    /// Aktueller Eingangspegel
    pub fn input_level(&self) -> f32 {
        *self.input_level.lock()
    }
}

impl Default for MicrophoneDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for MicrophoneDevices {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<MediaStream, MediaError> {
        if constraints.wants_video() {
            return Err(MediaError::Unsatisfiable(
                "microphone backend cannot capture video".to_string(),
            ));
        }
        if !constraints.audio {
            return Err(MediaError::Unsatisfiable("no audio requested".to_string()));
        }

        let enabled = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel();

        let capture = Capture {
            enabled: Arc::clone(&enabled),
            buffer: Arc::clone(&self.capture_buffer),
            level: Arc::clone(&self.input_level),
        };

        std::thread::Builder::new()
            .name("microphone-capture".to_string())
            .spawn(move || capture.run(ready_tx, stop_rx))
            .map_err(|e| MediaError::Backend(e.to_string()))?;

        let label = ready_rx
            .await
            .map_err(|_| MediaError::Backend("capture thread exited".to_string()))??;

        let source = Arc::new(MicrophoneSource {
            enabled,
            stop_tx: Mutex::new(Some(stop_tx)),
        });

        tracing::info!("Microphone capture started on '{}'", label);
        Ok(MediaStream::new(vec![MediaTrack::new(
            TrackKind::Audio,
            label,
            source,
        )]))
    }
}

// ============================================================================
// CAPTURE THREAD
// ============================================================================

struct Capture {
    enabled: Arc<AtomicBool>,
    buffer: Arc<Mutex<HeapRb<f32>>>,
    level: Arc<Mutex<f32>>,
}

impl Capture {
    /// Öffnet das Gerät, meldet das Ergebnis und blockiert bis zum Stopp
    fn run(
        self,
        ready_tx: oneshot::Sender<Result<String, MediaError>>,
        stop_rx: mpsc::Receiver<()>,
    ) {
        let stream = match self.open() {
            Ok((stream, label)) => {
                let _ = ready_tx.send(Ok(label));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        // Endet bei stop() oder wenn die Source gedroppt wurde
        let _ = stop_rx.recv();
        drop(stream);
        tracing::info!("Microphone capture stopped");
    }

    fn open(self) -> Result<(cpal::Stream, String), MediaError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(MediaError::NoInputDevice)?;
        let label = device
            .name()
            .unwrap_or_else(|_| "Default microphone".to_string());

        let configs = device
            .supported_input_configs()
            .map_err(|e| MediaError::Unsatisfiable(e.to_string()))?;
        let config = select_best_config(configs.collect())?;

        tracing::info!(
            "Starting audio capture: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        let source_rate = config.sample_rate.0;
        let channels = config.channels as usize;
        let Capture {
            enabled,
            buffer,
            level,
        } = self;

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if data.is_empty() {
                        return;
                    }

                    // Audio Level berechnen (RMS)
                    let rms: f32 =
                        (data.iter().map(|s| s * s).sum::<f32>() / data.len() as f32).sqrt();
                    *level.lock() = rms.min(1.0);

                    // Deaktivierter Track = stummgeschaltet
                    if !enabled.load(Ordering::Relaxed) {
                        return;
                    }

                    let mono = downmix(data, channels);
                    let samples = resample(&mono, source_rate, SAMPLE_RATE);

                    let mut buffer = buffer.lock();
                    for sample in samples {
                        let _ = buffer.try_push(sample);
                    }
                },
                |err| {
                    tracing::error!("Audio capture error: {}", err);
                },
                None,
            )
            .map_err(|e| MediaError::Backend(e.to_string()))?;

        stream
            .play()
            .map_err(|e| MediaError::Backend(e.to_string()))?;

        Ok((stream, label))
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Mittelt interleaved Kanäle zu Mono
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Einfaches Linear-Resampling
fn resample(data: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 {
        return data.to_vec();
    }

    let ratio = target_rate as f32 / source_rate as f32;
    let new_len = (data.len() as f32 * ratio) as usize;
    (0..new_len)
        .map(|i| {
            let src_idx = i as f32 / ratio;
            let idx = src_idx as usize;
            let frac = src_idx - idx as f32;
            let s1 = data.get(idx).copied().unwrap_or(0.0);
            let s2 = data.get(idx + 1).copied().unwrap_or(s1);
            s1 + (s2 - s1) * frac
        })
        .collect()
}

/// Wählt die beste Konfiguration aus einer Liste
///
/// Priorität: 48kHz > andere, F32 > andere
fn select_best_config(configs: Vec<SupportedStreamConfigRange>) -> Result<StreamConfig, MediaError> {
    let target_rate = cpal::SampleRate(SAMPLE_RATE);
    let supports_target = |c: &SupportedStreamConfigRange| {
        c.min_sample_rate() <= target_rate && c.max_sample_rate() >= target_rate
    };

    if let Some(config) = configs
        .iter()
        .find(|c| supports_target(*c) && c.sample_format() == SampleFormat::F32)
    {
        return Ok(config.with_sample_rate(target_rate).into());
    }

    if let Some(config) = configs.iter().find(|c| c.sample_format() == SampleFormat::F32) {
        return Ok(config.with_max_sample_rate().into());
    }

    configs
        .first()
        .map(|c| c.with_max_sample_rate().into())
        .ok_or_else(|| {
            MediaError::Unsatisfiable("No suitable audio configuration found".to_string())
        })
}

// ============================================================================
// TESTS
// ============================================================================
