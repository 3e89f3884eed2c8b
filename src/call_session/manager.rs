//! Call Session Manager
//!
//! Besitzt den lokalen MediaStream eines Anrufs und koordiniert
//! Berechtigungen, Capture-Backend und Audio-Routing.
//!
//! Jede Aufnahme wird mit der aktuellen Epoche gestartet. `end_call` und
//! `teardown` erhöhen die Epoche; ein Stream, der danach noch eintrifft,
//! wird sofort gestoppt statt installiert.

use super::routing::{AudioRouting, MediaMode, RoutingSession};
use crate::config::SessionConfig;
use crate::media::{FacingMode, MediaConstraints, MediaDevices, MediaError, MediaStream, TrackKind};
use crate::permissions::PermissionService;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallSessionError {
    #[error("Camera/microphone permission denied")]
    PermissionDenied,

    #[error("Media acquisition failed: {0}")]
    Acquisition(#[from] MediaError),

    #[error("Another media acquisition is still pending")]
    AcquisitionPending,

    #[error("Already in a call")]
    AlreadyInCall,

    #[error("Audio routing not initialized")]
    NotInitialized,

    /// Session wurde während der Aufnahme beendet; der Stream ist bereits gestoppt
    #[error("Call session ended while acquiring media")]
    Cancelled,
}

// ============================================================================
// SNAPSHOT & EVENTS
// ============================================================================

/// Zustand für die Darstellung
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub has_stream: bool,
    /// Renderbare Referenz des aktuellen Streams
    pub stream_url: Option<String>,
    pub is_muted: bool,
    pub is_camera_on: bool,
    pub is_front_camera: bool,
    pub audio_routing_active: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// Events die vom CallSessionManager ausgelöst werden
#[derive(Debug, Clone)]
pub enum CallEvent {
    StateChanged(SessionSnapshot),
    Error(String),
}

// ============================================================================
// CALL SESSION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquisition {
    Start,
    SwitchCamera,
}

/// Laufende Aufnahme; blockiert weitere bis sie zurückkehrt
#[derive(Debug, Clone, Copy)]
struct Pending {
    id: u64,
    acquisition: Acquisition,
}

struct CallSession {
    stream: Option<MediaStream>,
    is_muted: bool,
    is_camera_on: bool,
    is_front_camera: bool,
    routing: Option<RoutingSession>,
    mode: MediaMode,
    started_at: Option<DateTime<Utc>>,
    epoch: u64,
    pending: Option<Pending>,
    next_acquisition_id: u64,
}

impl CallSession {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            has_stream: self.stream.is_some(),
            stream_url: self.stream.as_ref().map(MediaStream::to_url),
            is_muted: self.is_muted,
            is_camera_on: self.is_camera_on,
            is_front_camera: self.is_front_camera,
            audio_routing_active: self.routing.is_some(),
            started_at: self.started_at,
        }
    }

    /// Reserviert den Aufnahme-Slot. Liefert (Slot-ID, aktuelle Epoche).
    ///
    /// Auch eine veraltete Aufnahme hält den Slot, bis sie zurückkehrt.
    fn begin(&mut self, acquisition: Acquisition) -> Result<(u64, u64), CallSessionError> {
        if let Some(pending) = self.pending {
            tracing::warn!(
                "Rejecting {:?}: {:?} still in flight",
                acquisition,
                pending.acquisition
            );
            return Err(CallSessionError::AcquisitionPending);
        }
        let id = self.next_acquisition_id;
        self.next_acquisition_id = self.next_acquisition_id.wrapping_add(1);
        self.pending = Some(Pending { id, acquisition });
        Ok((id, self.epoch))
    }

    /// Gibt den Slot frei, falls er noch zu `id` gehört
    fn release(&mut self, id: u64) {
        if self.pending.map(|p| p.id) == Some(id) {
            self.pending = None;
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Macht laufende Aufnahmen ungültig; ihre Streams werden bei Ankunft gestoppt
    fn invalidate(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn take_stream(&mut self) -> Option<MediaStream> {
        self.is_muted = false;
        self.is_camera_on = true;
        self.started_at = None;
        self.stream.take()
    }
}

// ============================================================================
// ACQUISITION SLOT
// ============================================================================

/// Hält den Aufnahme-Slot für die Dauer einer Start-/Wechsel-Operation.
///
/// Wird das Future vorzeitig gedroppt (Timeout, `select!`) oder endet die
/// Operation mit einem Fehler, gibt Drop den Slot frei und stoppt einen
/// bereits gestarteten Klingelton.
struct AcquisitionSlot<'a> {
    manager: &'a CallSessionManager,
    id: u64,
    epoch: u64,
    ringtone: bool,
    completed: bool,
}

impl<'a> AcquisitionSlot<'a> {
    fn new(manager: &'a CallSessionManager, id: u64, epoch: u64) -> Self {
        Self {
            manager,
            id,
            epoch,
            ringtone: false,
            completed: false,
        }
    }

    fn ringtone_started(&mut self) {
        self.ringtone = true;
    }

    fn is_current(&self) -> bool {
        self.manager.session.lock().is_current(self.epoch)
    }

    /// Gibt den Slot frei; `false` wenn die Session inzwischen beendet wurde
    fn complete(&mut self, session: &mut CallSession) -> bool {
        self.completed = true;
        session.release(self.id);
        session.is_current(self.epoch)
    }
}

impl Drop for AcquisitionSlot<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        let current = {
            let mut session = self.manager.session.lock();
            session.release(self.id);
            session.is_current(self.epoch)
        };

        // Nach end_call/teardown ist der Klingelton schon aus
        if self.ringtone && current {
            self.manager.routing.stop_ringtone();
        }
        tracing::debug!("Acquisition {} abandoned", self.id);
    }
}

// ============================================================================
// CALL SESSION MANAGER
// ============================================================================

pub struct CallSessionManager {
    session: Mutex<CallSession>,
    routing: Arc<dyn AudioRouting>,
    devices: Arc<dyn MediaDevices>,
    permissions: Arc<dyn PermissionService>,
    config: SessionConfig,
    event_tx: broadcast::Sender<CallEvent>,
}

impl CallSessionManager {
    pub fn new(
        routing: Arc<dyn AudioRouting>,
        devices: Arc<dyn MediaDevices>,
        permissions: Arc<dyn PermissionService>,
        config: SessionConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            session: Mutex::new(CallSession {
                stream: None,
                is_muted: false,
                is_camera_on: true,
                is_front_camera: config.front_camera,
                routing: None,
                mode: config.media_mode,
                started_at: None,
                epoch: 0,
                pending: None,
                next_acquisition_id: 0,
            }),
            routing,
            devices,
            permissions,
            config,
            event_tx,
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().snapshot()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mode(&self) -> MediaMode {
        self.session.lock().mode
    }

    pub fn has_stream(&self) -> bool {
        self.session.lock().stream.is_some()
    }

    /// Handle auf den aktuellen Stream (für die Darstellung)
    pub fn current_stream(&self) -> Option<MediaStream> {
        self.session.lock().stream.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.session.lock().is_muted
    }

    pub fn is_camera_on(&self) -> bool {
        self.session.lock().is_camera_on
    }

    pub fn is_front_camera(&self) -> bool {
        self.session.lock().is_front_camera
    }

    /// Startet das Audio-Routing im gegebenen Modus.
    ///
    /// Solange das Routing läuft, ist ein weiterer Aufruf wirkungslos.
    pub fn initialize(&self, mode: MediaMode) {
        {
            let mut session = self.session.lock();
            if let Some(routing) = &session.routing {
                tracing::debug!("Audio routing already active ({}), ignoring", routing.mode());
                return;
            }
            session.routing = Some(RoutingSession::start(Arc::clone(&self.routing), mode));
            session.mode = mode;
        }

        self.emit_state();
    }

    /// Stoppt Audio-Routing und alle Tracks.
    ///
    /// Läuft auch implizit beim Drop des Managers. Eine noch laufende
    /// Aufnahme wird verworfen, sobald sie eintrifft.
    pub fn teardown(&self) {
        let (routing, stream) = {
            let mut session = self.session.lock();
            session.invalidate();
            (session.routing.take(), session.take_stream())
        };

        if routing.is_none() && stream.is_none() {
            return;
        }

        if let Some(routing) = routing {
            routing.stop();
        }
        if let Some(stream) = stream {
            stream.stop();
            tracing::info!("Stream {} released on teardown", stream.id());
        }

        self.emit_state();
    }

    /// Startet einen Anruf: Berechtigungen, Klingelton, Aufnahme
    pub async fn start_call(&self) -> Result<(), CallSessionError> {
        self.try_start_call().await.map_err(|e| self.report(e))
    }

    /// Beendet den Anruf und gibt den Stream frei (idempotent)
    pub fn end_call(&self) {
        self.routing.stop_ringtone();

        let stream = {
            let mut session = self.session.lock();
            session.invalidate();
            session.take_stream()
        };

        match stream {
            Some(stream) => {
                stream.stop();
                tracing::info!("Call ended, stream {} released", stream.id());
            }
            None => tracing::debug!("end_call without active stream"),
        }

        self.emit_state();
    }

    /// Schaltet alle Audio-Tracks stumm bzw. wieder an.
    ///
    /// Gibt den neuen Mute-Status zurück, `None` ohne aktiven Stream.
    pub fn toggle_mute(&self) -> Option<bool> {
        let muted = {
            let mut session = self.session.lock();
            let Some(stream) = session.stream.as_ref() else {
                tracing::debug!("toggle_mute without active stream");
                return None;
            };
            let muted = !session.is_muted;
            stream.set_enabled(TrackKind::Audio, !muted);
            session.is_muted = muted;
            muted
        };

        tracing::info!("Audio muted: {}", muted);
        self.emit_state();
        Some(muted)
    }

    /// Schaltet alle Video-Tracks an bzw. aus.
    ///
    /// Gibt den neuen Kamera-Status zurück, `None` ohne aktiven Stream.
    pub fn toggle_camera(&self) -> Option<bool> {
        let camera_on = {
            let mut session = self.session.lock();
            let Some(stream) = session.stream.as_ref() else {
                tracing::debug!("toggle_camera without active stream");
                return None;
            };
            let camera_on = !session.is_camera_on;
            stream.set_enabled(TrackKind::Video, camera_on);
            session.is_camera_on = camera_on;
            camera_on
        };

        tracing::info!("Camera on: {}", camera_on);
        self.emit_state();
        Some(camera_on)
    }

    /// Wechselt zwischen Front- und Rückkamera.
    ///
    /// Der neue Stream wird erst installiert, dann wird der alte gestoppt.
    /// Schlägt die Aufnahme fehl, bleibt der alte Stream unverändert aktiv.
    pub async fn switch_camera(&self) -> Result<(), CallSessionError> {
        self.try_switch_camera().await.map_err(|e| self.report(e))
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    async fn try_start_call(&self) -> Result<(), CallSessionError> {
        let (id, epoch, mode, facing) = {
            let mut session = self.session.lock();
            if session.routing.is_none() {
                return Err(CallSessionError::NotInitialized);
            }
            if session.stream.is_some() {
                return Err(CallSessionError::AlreadyInCall);
            }
            let (id, epoch) = session.begin(Acquisition::Start)?;
            (
                id,
                epoch,
                session.mode,
                FacingMode::from_front(session.is_front_camera),
            )
        };
        let mut slot = AcquisitionSlot::new(self, id, epoch);

        tracing::info!("Starting {} call", mode);

        let granted = self
            .permissions
            .request_all(mode.required_permissions())
            .await;

        // Während des Berechtigungsdialogs beendet?
        if !slot.is_current() {
            return Err(CallSessionError::Cancelled);
        }
        if !granted {
            return Err(CallSessionError::PermissionDenied);
        }

        self.routing.start_ringtone(&self.config.ringtone);
        slot.ringtone_started();

        let constraints = match mode {
            MediaMode::Video => MediaConstraints::video_call(facing, self.config.frame_rate),
            MediaMode::Audio => MediaConstraints::audio_only(),
        };

        // Bei Fehler stoppt der Slot den Klingelton
        let stream = match self.devices.acquire(&constraints).await {
            Ok(stream) => stream,
            Err(_) if !slot.is_current() => return Err(CallSessionError::Cancelled),
            Err(e) => return Err(e.into()),
        };

        let snapshot = {
            let mut session = self.session.lock();
            if !slot.complete(&mut session) {
                drop(session);
                stream.stop();
                tracing::debug!("Discarding stream {} acquired after session ended", stream.id());
                return Err(CallSessionError::Cancelled);
            }

            stream.set_enabled(TrackKind::Audio, true);
            stream.set_enabled(TrackKind::Video, true);
            tracing::info!(
                "Call started with stream {} ({} track(s))",
                stream.id(),
                stream.tracks().len()
            );

            session.stream = Some(stream);
            session.is_muted = false;
            session.is_camera_on = true;
            session.started_at = Some(Utc::now());
            session.snapshot()
        };

        let _ = self.event_tx.send(CallEvent::StateChanged(snapshot));
        Ok(())
    }

    async fn try_switch_camera(&self) -> Result<(), CallSessionError> {
        let (id, epoch, facing) = {
            let mut session = self.session.lock();
            if session.stream.is_none() {
                tracing::debug!("switch_camera without active stream");
                return Ok(());
            }
            if session.mode == MediaMode::Audio {
                tracing::debug!("switch_camera in audio call, nothing to switch");
                return Ok(());
            }
            let (id, epoch) = session.begin(Acquisition::SwitchCamera)?;
            (
                id,
                epoch,
                FacingMode::from_front(session.is_front_camera).opposite(),
            )
        };
        let mut slot = AcquisitionSlot::new(self, id, epoch);

        let constraints = MediaConstraints::camera_switch(facing);
        let stream = match self.devices.acquire(&constraints).await {
            Ok(stream) => stream,
            Err(_) if !slot.is_current() => return Err(CallSessionError::Cancelled),
            Err(e) => {
                tracing::warn!("Camera switch failed, keeping current stream: {}", e);
                return Err(e.into());
            }
        };

        let previous = {
            let mut session = self.session.lock();
            if !slot.complete(&mut session) {
                drop(session);
                stream.stop();
                tracing::debug!("Discarding stream {} acquired after session ended", stream.id());
                return Err(CallSessionError::Cancelled);
            }

            // Mute-/Kamera-Status auf den neuen Stream übertragen
            stream.set_enabled(TrackKind::Audio, !session.is_muted);
            stream.set_enabled(TrackKind::Video, session.is_camera_on);
            session.is_front_camera = facing.is_front();
            session.stream.replace(stream)
        };

        if let Some(previous) = previous {
            previous.stop();
            tracing::debug!("Previous stream {} stopped", previous.id());
        }

        tracing::info!("Switched camera to {:?}", facing);
        self.emit_state();
        Ok(())
    }

    /// Meldet einen Fehler an die Darstellung (ausser Abbrüchen)
    fn report(&self, err: CallSessionError) -> CallSessionError {
        match err {
            CallSessionError::Cancelled => tracing::debug!("{}", err),
            _ => {
                tracing::warn!("Call session error: {}", err);
                let _ = self.event_tx.send(CallEvent::Error(err.to_string()));
            }
        }
        err
    }

    fn emit_state(&self) {
        let snapshot = self.snapshot();
        let _ = self.event_tx.send(CallEvent::StateChanged(snapshot));
    }
}

impl Drop for CallSessionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for CallSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSessionManager")
            .field("snapshot", &self.snapshot())
            .field("mode", &self.mode())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
