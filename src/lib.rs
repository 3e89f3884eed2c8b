//! Pulse InCall - lokale Call-Session
//!
//! Demo-Harness für den Auf- und Abbau eines Audio-/Videoanrufs:
//! - Audio-Routing und Klingelton über einen externen In-Call Dienst
//! - Kamera-/Mikrofon-Berechtigungen
//! - Lokale Aufnahme (MediaStream) mit Mute, Kamera an/aus und Kamerawechsel
//! - Deterministische Freigabe aller Capture-Ressourcen

pub mod call_session;
pub mod config;
pub mod media;
pub mod permissions;

use call_session::{CallEvent, CallSessionManager, MediaMode, SimulatedRouting};
use config::SessionConfig;
use media::{MediaDevices, SimulatedDevices};
use permissions::StaticPermissions;
use std::sync::Arc;
use tokio::sync::broadcast;

// ============================================================================
// LOGGING
// ============================================================================

/// Initialisiert das Logging (RUST_LOG überschreibt die Defaults)
pub fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("incall_lib=debug".parse()?)
                .add_directive("pulse_incall=debug".parse()?),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

// ============================================================================
// DEMO
// ============================================================================

/// Liest die bisher aufgenommenen Mikrofon-Frames aus
#[cfg(feature = "device-capture")]
async fn monitor_microphone(microphone: &media::MicrophoneDevices) {
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let mut frames = 0;
    while microphone.read_frame().is_some() {
        frames += 1;
    }
    tracing::info!(
        "Captured {} frame(s), input level {:.3}",
        frames,
        microphone.input_level()
    );
}

/// Gibt alle angefallenen Events aus
fn log_events(events: &mut broadcast::Receiver<CallEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            CallEvent::StateChanged(snapshot) => {
                tracing::info!(
                    "Session state: {}",
                    serde_json::to_string(&snapshot).unwrap_or_default()
                );
            }
            CallEvent::Error(err) => {
                tracing::error!("Call error: {}", err);
            }
        }
    }
}

/// Spielt einen kompletten Anruf durch: Start, Mute, Kamera, Wechsel, Ende
pub async fn run_demo(config: SessionConfig) -> anyhow::Result<()> {
    let mode = config.media_mode;

    // Audioanrufe nehmen mit Feature "device-capture" echt vom Mikrofon auf
    #[cfg(feature = "device-capture")]
    let microphone = Arc::new(media::MicrophoneDevices::new());
    #[cfg(feature = "device-capture")]
    let devices: Arc<dyn MediaDevices> = if mode == MediaMode::Audio {
        Arc::clone(&microphone) as Arc<dyn MediaDevices>
    } else {
        Arc::new(SimulatedDevices::new())
    };
    #[cfg(not(feature = "device-capture"))]
    let devices: Arc<dyn MediaDevices> = {
        tracing::debug!("Using simulated capture for {} call", mode);
        Arc::new(SimulatedDevices::new())
    };

    let manager = CallSessionManager::new(
        Arc::new(SimulatedRouting::new()),
        devices,
        Arc::new(StaticPermissions::granted()),
        config,
    );
    let mut events = manager.subscribe();

    manager.initialize(mode);
    log_events(&mut events);

    manager.start_call().await?;
    log_events(&mut events);

    #[cfg(feature = "device-capture")]
    {
        if mode == MediaMode::Audio {
            monitor_microphone(&microphone).await;
        }
    }

    manager.toggle_mute();
    manager.toggle_mute();
    if mode == MediaMode::Video {
        manager.toggle_camera();
        manager.toggle_camera();
        manager.switch_camera().await?;
    }
    log_events(&mut events);

    manager.end_call();
    manager.teardown();
    log_events(&mut events);

    tracing::info!("Demo finished");
    Ok(())
}

/// Startet die Demo mit Konfiguration aus der Umgebung
pub fn run() -> anyhow::Result<()> {
    init_logging()?;

    let config = SessionConfig::from_env()?;
    tracing::info!("Starting in-call demo ({} call)", config.media_mode);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_demo(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_runs_for_both_modes() {
        for mode in [MediaMode::Video, MediaMode::Audio] {
            let config = SessionConfig {
                media_mode: mode,
                ..SessionConfig::default()
            };
            // Mikrofon-Backend braucht echte Hardware
            #[cfg(feature = "device-capture")]
            {
                if mode == MediaMode::Audio {
                    continue;
                }
            }
            run_demo(config).await.unwrap();
        }
    }
}
