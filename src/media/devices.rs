//! Capture-Backend Schnittstelle

use super::{MediaConstraints, MediaStream};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Capture device is busy")]
    DeviceBusy,

    #[error("Constraints cannot be satisfied: {0}")]
    Unsatisfiable(String),

    #[error("No audio input device found")]
    NoInputDevice,

    #[error("Capture backend error: {0}")]
    Backend(String),
}

// ============================================================================
// MEDIA DEVICES
// ============================================================================

/// Liefert lokale Media-Streams (Kamera, Mikrofon)
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Startet eine Aufnahme gemäß `constraints`.
    ///
    /// Der zurückgegebene Stream gehört dem Aufrufer, der ihn auch stoppen muss.
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<MediaStream, MediaError>;
}
