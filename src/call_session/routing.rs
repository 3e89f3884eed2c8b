//! Audio-Routing (Lautsprecher/Hörmuschel) und Klingelton
//!
//! Das Routing läuft solange ein `RoutingSession` Handle existiert.

use crate::permissions::PermissionKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// MEDIA MODE
// ============================================================================

/// Art des Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    Audio,
    Video,
}

impl MediaMode {
    /// Berechtigungen, die vor der Aufnahme vorliegen müssen
    pub fn required_permissions(self) -> &'static [PermissionKind] {
        match self {
            MediaMode::Audio => &[PermissionKind::Microphone],
            MediaMode::Video => &[PermissionKind::Camera, PermissionKind::Microphone],
        }
    }
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaMode::Audio => f.write_str("audio"),
            MediaMode::Video => f.write_str("video"),
        }
    }
}

impl FromStr for MediaMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaMode::Audio),
            "video" => Ok(MediaMode::Video),
            other => Err(format!("unknown media mode '{}'", other)),
        }
    }
}

// ============================================================================
// AUDIO ROUTING
// ============================================================================

/// Externer In-Call Audio-Dienst (fire-and-forget)
pub trait AudioRouting: Send + Sync {
    fn start(&self, mode: MediaMode);
    fn stop(&self);
    fn start_ringtone(&self, tone_id: &str);
    fn stop_ringtone(&self);
}

/// Besitz-Handle für laufendes Audio-Routing.
///
/// Wird von `start` erzeugt; `stop` oder Drop beenden das Routing genau einmal.
pub struct RoutingSession {
    routing: Arc<dyn AudioRouting>,
    mode: MediaMode,
    active: bool,
}

impl RoutingSession {
    pub fn start(routing: Arc<dyn AudioRouting>, mode: MediaMode) -> Self {
        routing.start(mode);
        tracing::info!("Audio routing started ({})", mode);
        Self {
            routing,
            mode,
            active: true,
        }
    }

    pub fn mode(&self) -> MediaMode {
        self.mode
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.active {
            self.active = false;
            self.routing.stop();
            tracing::info!("Audio routing stopped");
        }
    }
}

impl Drop for RoutingSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for RoutingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingSession")
            .field("mode", &self.mode)
            .field("active", &self.active)
            .finish()
    }
}

// ============================================================================
// SIMULATED ROUTING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingCall {
    Start(MediaMode),
    Stop,
    StartRingtone(String),
    StopRingtone,
}

/// Protokolliert alle Aufrufe statt Audio umzuleiten
#[derive(Default)]
pub struct SimulatedRouting {
    calls: Mutex<Vec<RoutingCall>>,
}

impl SimulatedRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RoutingCall> {
        self.calls.lock().clone()
    }

    /// Routing gestartet und noch nicht gestoppt
    pub fn is_active(&self) -> bool {
        self.calls
            .lock()
            .iter()
            .rev()
            .find_map(|c| match c {
                RoutingCall::Start(_) => Some(true),
                RoutingCall::Stop => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// Klingelton läuft
    pub fn is_ringing(&self) -> bool {
        self.calls
            .lock()
            .iter()
            .rev()
            .find_map(|c| match c {
                RoutingCall::StartRingtone(_) => Some(true),
                RoutingCall::StopRingtone => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }
}

impl AudioRouting for SimulatedRouting {
    fn start(&self, mode: MediaMode) {
        tracing::debug!("[routing] start media={}", mode);
        self.calls.lock().push(RoutingCall::Start(mode));
    }

    fn stop(&self) {
        tracing::debug!("[routing] stop");
        self.calls.lock().push(RoutingCall::Stop);
    }

    fn start_ringtone(&self, tone_id: &str) {
        tracing::debug!("[routing] start ringtone '{}'", tone_id);
        self.calls
            .lock()
            .push(RoutingCall::StartRingtone(tone_id.to_string()));
    }

    fn stop_ringtone(&self) {
        tracing::debug!("[routing] stop ringtone");
        self.calls.lock().push(RoutingCall::StopRingtone);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_session_stops_once() {
        let routing = Arc::new(SimulatedRouting::new());

        let session = RoutingSession::start(routing.clone(), MediaMode::Video);
        assert!(routing.is_active());
        assert_eq!(session.mode(), MediaMode::Video);

        session.stop();

        assert!(!routing.is_active());
        assert_eq!(
            routing.calls(),
            vec![RoutingCall::Start(MediaMode::Video), RoutingCall::Stop]
        );
    }

    #[test]
    fn test_routing_session_stops_on_drop() {
        let routing = Arc::new(SimulatedRouting::new());
        {
            let _session = RoutingSession::start(routing.clone(), MediaMode::Audio);
        }
        assert_eq!(routing.calls().last(), Some(&RoutingCall::Stop));
    }

    #[test]
    fn test_ringtone_tracking() {
        let routing = SimulatedRouting::new();
        assert!(!routing.is_ringing());

        routing.start_ringtone("_BUNDLE_");
        assert!(routing.is_ringing());

        routing.stop_ringtone();
        assert!(!routing.is_ringing());
    }

    #[test]
    fn test_media_mode_parsing() {
        assert_eq!("Video".parse::<MediaMode>(), Ok(MediaMode::Video));
        assert_eq!(" audio ".parse::<MediaMode>(), Ok(MediaMode::Audio));
        assert!("screen".parse::<MediaMode>().is_err());
        assert_eq!(
            MediaMode::Audio.required_permissions(),
            &[PermissionKind::Microphone]
        );
    }
}
