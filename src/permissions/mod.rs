//! Permissions Module
//!
//! Kamera-/Mikrofon-Berechtigungen. Die Plattform fragt, wir werten nur
//! das boolesche Ergebnis aus.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Camera,
    Microphone,
}

/// Berechtigungs-Dialog der Plattform
#[async_trait]
pub trait PermissionService: Send + Sync {
    /// `true` nur wenn alle `kinds` gewährt wurden
    async fn request_all(&self, kinds: &[PermissionKind]) -> bool;
}

/// Offener Berechtigungsdialog; antwortet erst nach `release()` oder Drop
pub struct PendingPrompt {
    tx: oneshot::Sender<()>,
}

impl PendingPrompt {
    pub fn release(self) {
        let _ = self.tx.send(());
    }
}

/// Feste Antwort auf jede Anfrage.
///
/// `StaticPermissions::granted()` entspricht Plattformen ohne
/// Berechtigungsmodell.
pub struct StaticPermissions {
    granted: AtomicBool,
    requests: Mutex<Vec<Vec<PermissionKind>>>,
    prompts: Mutex<VecDeque<oneshot::Receiver<()>>>,
}

impl StaticPermissions {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            requests: Mutex::new(Vec::new()),
            prompts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn granted() -> Self {
        Self::new(true)
    }

    pub fn denied() -> Self {
        Self::new(false)
    }

    /// Ändert die Antwort für folgende Anfragen
    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// Die nächste Anfrage bleibt offen, bis der Dialog freigegeben wird
    pub fn hold_next(&self) -> PendingPrompt {
        let (tx, rx) = oneshot::channel();
        self.prompts.lock().push_back(rx);
        PendingPrompt { tx }
    }

    /// Alle bisherigen Anfragen
    pub fn requests(&self) -> Vec<Vec<PermissionKind>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PermissionService for StaticPermissions {
    async fn request_all(&self, kinds: &[PermissionKind]) -> bool {
        self.requests.lock().push(kinds.to_vec());

        let prompt = self.prompts.lock().pop_front();
        if let Some(prompt) = prompt {
            tracing::debug!("Permission prompt for {:?} waiting", kinds);
            let _ = prompt.await;
        }

        // Antwort gilt zum Zeitpunkt der Entscheidung
        let granted = self.granted.load(Ordering::SeqCst);
        tracing::debug!("Permissions {:?} granted: {}", kinds, granted);
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_permissions_record_requests() {
        let permissions = StaticPermissions::denied();

        assert!(!permissions.request_all(&[PermissionKind::Microphone]).await);
        permissions.set_granted(true);
        assert!(
            permissions
                .request_all(&[PermissionKind::Camera, PermissionKind::Microphone])
                .await
        );

        assert_eq!(
            permissions.requests(),
            vec![
                vec![PermissionKind::Microphone],
                vec![PermissionKind::Camera, PermissionKind::Microphone],
            ]
        );
    }

    #[tokio::test]
    async fn test_held_prompt_answers_after_release() {
        let permissions = std::sync::Arc::new(StaticPermissions::denied());
        let prompt = permissions.hold_next();

        let task = {
            let permissions = std::sync::Arc::clone(&permissions);
            tokio::spawn(async move { permissions.request_all(&[PermissionKind::Camera]).await })
        };
        while permissions.requests().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(!task.is_finished());

        permissions.set_granted(true);
        prompt.release();

        assert!(task.await.unwrap());
        assert!(permissions.request_all(&[PermissionKind::Camera]).await);
    }
}
