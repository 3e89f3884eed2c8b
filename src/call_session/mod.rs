//! Call Session Module - lokale Medien eines Anrufs
//!
//! Dieses Modul verwaltet:
//! - Den aktuellen lokalen MediaStream (Mikrofon, Kamera)
//! - Mute / Kamera an-aus / Kamerawechsel
//! - Audio-Routing und Klingelton
//! - Freigabe aller Capture-Ressourcen bei jedem Übergang

mod manager;
mod routing;

pub use manager::{CallEvent, CallSessionError, CallSessionManager, SessionSnapshot};
pub use routing::{AudioRouting, MediaMode, RoutingCall, RoutingSession, SimulatedRouting};
