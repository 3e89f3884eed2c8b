//! Simuliertes Capture-Backend
//!
//! Liefert Streams ohne Hardware. Für die Demo und für Tests:
//! Anfragen werden protokolliert, die nächste Aufnahme kann fehlschlagen
//! oder bis zur Freigabe hängen bleiben.

use super::{
    MediaConstraints, MediaDevices, MediaError, MediaStream, MediaTrack, TrackKind, TrackSource,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

struct SimulatedSource;

impl TrackSource for SimulatedSource {
    fn set_enabled(&self, _enabled: bool) {}

    fn stop(&self) {}
}

#[derive(Default)]
struct DeviceState {
    requests: Vec<MediaConstraints>,
    failures: VecDeque<MediaError>,
    gates: VecDeque<oneshot::Receiver<()>>,
    issued: Vec<MediaStream>,
}

/// Hält eine Aufnahme an, bis `release()` aufgerufen oder das Gate gedroppt wird
pub struct AcquisitionGate {
    tx: oneshot::Sender<()>,
}

impl AcquisitionGate {
    pub fn release(self) {
        let _ = self.tx.send(());
    }
}

#[derive(Default)]
pub struct SimulatedDevices {
    state: Mutex<DeviceState>,
}

impl SimulatedDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Die nächste Aufnahme schlägt mit `error` fehl
    pub fn fail_next(&self, error: MediaError) {
        self.state.lock().failures.push_back(error);
    }

    /// Die nächste Aufnahme wartet auf das zurückgegebene Gate
    pub fn hold_next(&self) -> AcquisitionGate {
        let (tx, rx) = oneshot::channel();
        self.state.lock().gates.push_back(rx);
        AcquisitionGate { tx }
    }

    /// Alle bisherigen Anfragen
    pub fn requests(&self) -> Vec<MediaConstraints> {
        self.state.lock().requests.clone()
    }

    /// Alle ausgegebenen Streams (teilen sich den Zustand mit dem Original)
    pub fn issued(&self) -> Vec<MediaStream> {
        self.state.lock().issued.clone()
    }
}

#[async_trait]
impl MediaDevices for SimulatedDevices {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<MediaStream, MediaError> {
        let (gate, failure) = {
            let mut state = self.state.lock();
            state.requests.push(constraints.clone());
            (state.gates.pop_front(), state.failures.pop_front())
        };

        if let Some(gate) = gate {
            tracing::debug!("Simulated acquisition held until released");
            let _ = gate.await;
        }

        if let Some(error) = failure {
            tracing::warn!("Simulated acquisition failed: {}", error);
            return Err(error);
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(
                TrackKind::Audio,
                "Simulated microphone",
                Arc::new(SimulatedSource),
            ));
        }
        if let Some(video) = &constraints.video {
            let label = if video.facing_mode.is_front() {
                "Simulated front camera"
            } else {
                "Simulated back camera"
            };
            tracks.push(MediaTrack::new(
                TrackKind::Video,
                label,
                Arc::new(SimulatedSource),
            ));
        }

        if tracks.is_empty() {
            return Err(MediaError::Unsatisfiable(
                "neither audio nor video requested".to_string(),
            ));
        }

        let stream = MediaStream::new(tracks);
        tracing::debug!(
            "Simulated stream {} with {} track(s)",
            stream.id(),
            stream.tracks().len()
        );
        self.state.lock().issued.push(stream.clone());
        Ok(stream)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FacingMode;

    #[tokio::test]
    async fn test_acquire_builds_tracks_from_constraints() {
        let devices = SimulatedDevices::new();

        let stream = devices
            .acquire(&MediaConstraints::video_call(FacingMode::Environment, 30))
            .await
            .unwrap();

        assert_eq!(stream.audio_tracks().count(), 1);
        let video: Vec<_> = stream.video_tracks().collect();
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].label(), "Simulated back camera");
        assert_eq!(devices.requests().len(), 1);
        assert_eq!(devices.issued()[0].id(), stream.id());
    }

    #[tokio::test]
    async fn test_fail_next_only_once() {
        let devices = SimulatedDevices::new();
        devices.fail_next(MediaError::DeviceBusy);

        let first = devices.acquire(&MediaConstraints::audio_only()).await;
        let second = devices.acquire(&MediaConstraints::audio_only()).await;

        assert_eq!(first.unwrap_err(), MediaError::DeviceBusy);
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_empty_constraints_are_unsatisfiable() {
        let devices = SimulatedDevices::new();
        let constraints = MediaConstraints {
            audio: false,
            video: None,
        };

        let result = devices.acquire(&constraints).await;
        assert!(matches!(result, Err(MediaError::Unsatisfiable(_))));
    }

    #[tokio::test]
    async fn test_held_acquisition_waits_for_release() {
        let devices = Arc::new(SimulatedDevices::new());
        let gate = devices.hold_next();

        let task = tokio::spawn({
            let devices = Arc::clone(&devices);
            async move { devices.acquire(&MediaConstraints::audio_only()).await }
        });

        while devices.requests().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(devices.issued().is_empty());

        gate.release();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(devices.issued().len(), 1);
    }
}
