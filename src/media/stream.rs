//! MediaStream und MediaTrack
//!
//! Ein Stream ist eine Menge von Tracks aus einer einzigen Aufnahme.
//! Tracks sind günstig klonbar; alle Klone teilen sich denselben Zustand,
//! d.h. ein gestoppter Track ist für jeden Halter gestoppt.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Live,
    Ended,
}

/// Steuerung der Hardware hinter einem Track (vom Capture-Backend geliefert)
pub trait TrackSource: Send + Sync {
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);
}

// ============================================================================
// MEDIA TRACK
// ============================================================================

struct TrackState {
    enabled: bool,
    ready_state: ReadyState,
}

#[derive(Clone)]
pub struct MediaTrack {
    id: Uuid,
    kind: TrackKind,
    label: String,
    state: Arc<Mutex<TrackState>>,
    source: Arc<dyn TrackSource>,
}

impl MediaTrack {
    /// Erstellt einen neuen, aktiven Track
    pub fn new(kind: TrackKind, label: impl Into<String>, source: Arc<dyn TrackSource>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            label: label.into(),
            state: Arc::new(Mutex::new(TrackState {
                enabled: true,
                ready_state: ReadyState::Live,
            })),
            source,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    pub fn is_live(&self) -> bool {
        self.ready_state() == ReadyState::Live
    }

    /// Aktiviert/deaktiviert den Track. Auf einem beendeten Track wirkungslos.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        if state.ready_state == ReadyState::Ended || state.enabled == enabled {
            return;
        }
        state.enabled = enabled;
        self.source.set_enabled(enabled);
    }

    /// Beendet den Track endgültig (idempotent)
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if state.ready_state == ReadyState::Ended {
                return;
            }
            state.ready_state = ReadyState::Ended;
            state.enabled = false;
        }

        self.source.stop();
        tracing::debug!("Stopped {:?} track {} ({})", self.kind, self.id, self.label);
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("enabled", &state.enabled)
            .field("ready_state", &state.ready_state)
            .finish()
    }
}

// ============================================================================
// MEDIA STREAM
// ============================================================================

#[derive(Debug, Clone)]
pub struct MediaStream {
    id: Uuid,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Alle Tracks
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks_of(TrackKind::Video)
    }

    /// Setzt `enabled` auf allen Tracks einer Art
    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.tracks_of(kind) {
            track.set_enabled(enabled);
        }
    }

    /// Stoppt alle Tracks
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// true solange mindestens ein Track läuft
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }

    /// Referenz für die Darstellung (Video-Surface)
    pub fn to_url(&self) -> String {
        format!("stream://{}", self.id)
    }
}

// ============================================================================
// TESTS
// ============================================================================
