//! Session lifecycle events for the UI layer.
//!
//! `Expired` replaces a hard redirect to the login page: the UI subscribes and
//! decides where to send the user.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, info};

/// Broadcast channel capacity for session events.
const SESSION_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A credential was installed by a login.
    Authenticated,
    /// The access token was renewed.
    Renewed,
    /// Renewal failed or was impossible; the credential has been cleared.
    Expired,
    /// The user logged out.
    LoggedOut,
}

pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
    /// Set once `Expired` went out for the current session.
    expired: AtomicBool,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            tx,
            expired: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event.
    ///
    /// `Expired` goes out at most once until the next `Authenticated`, however
    /// many requests run into the dead session.
    pub fn emit(&self, event: SessionEvent) {
        match event {
            SessionEvent::Expired => {
                if self.expired.swap(true, Ordering::AcqRel) {
                    debug!("Session expiry already announced");
                    return;
                }
                info!("Session expired; login required");
            }
            SessionEvent::Authenticated => {
                self.expired.store(false, Ordering::Release);
            }
            SessionEvent::Renewed | SessionEvent::LoggedOut => {}
        }

        // Ignore errors - just means no subscribers currently
        let _ = self.tx.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
