//! Media Module - lokale Aufnahme
//!
//! Dieses Modul verwaltet:
//! - Capture-Constraints (Audio, Video, Kamera-Ausrichtung)
//! - MediaStream / MediaTrack Handles
//! - Das Capture-Backend als Trait (simuliert oder Mikrofon via cpal)

mod constraints;
mod devices;
#[cfg(feature = "device-capture")]
mod microphone;
mod simulated;
mod stream;

pub use constraints::{FacingMode, MediaConstraints, VideoConstraints, DEFAULT_FRAME_RATE};
pub use devices::{MediaDevices, MediaError};
#[cfg(feature = "device-capture")]
pub use microphone::{MicrophoneDevices, FRAME_SIZE, SAMPLE_RATE};
pub use simulated::{AcquisitionGate, SimulatedDevices};
pub use stream::{MediaStream, MediaTrack, ReadyState, TrackKind, TrackSource};
