//! Single-flight credential renewal.
//!
//! State machine: `Idle -> Refreshing -> Idle` on success, or
//! `Refreshing -> Failed -> Idle` when renewal is impossible. Callers that
//! arrive while an exchange is `Refreshing` (or its failure is being
//! committed) attach to it instead of starting their own.
//!
//! The coordinator is the only writer of the credential store. Logins and
//! logouts go through [`RefreshCoordinator::install`] and
//! [`RefreshCoordinator::logout`], which take the same write lock the
//! renewal commit holds.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::events::{SessionEvent, SessionEvents};
use super::renewer::TokenRenewer;
use super::store::CredentialStore;
use super::types::Credential;
use crate::error::{ApiError, CredentialError};
use crate::utils::InFlight;

type RenewalOutcome = Result<Credential, ApiError>;
type RenewalFlight = Arc<InFlight<RenewalOutcome>>;

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Failed,
}

enum Phase {
    Idle,
    Refreshing(RenewalFlight),
    Failed(RenewalFlight),
}

pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    renewer: Arc<dyn TokenRenewer>,
    events: Arc<SessionEvents>,
    phase: Mutex<Phase>,
    /// Held for the whole exchange and by every other store writer.
    write_lock: tokio::sync::Mutex<()>,
    exchanges: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        renewer: Arc<dyn TokenRenewer>,
        events: Arc<SessionEvents>,
    ) -> Self {
        Self {
            store,
            renewer,
            events,
            phase: Mutex::new(Phase::Idle),
            write_lock: tokio::sync::Mutex::new(()),
            exchanges: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> RefreshState {
        match &*self.phase.lock() {
            Phase::Idle => RefreshState::Idle,
            Phase::Refreshing(_) => RefreshState::Refreshing,
            Phase::Failed(_) => RefreshState::Failed,
        }
    }

    /// Number of renewal exchanges sent to the server so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Obtain a renewed credential.
    ///
    /// Starts a renewal exchange when none is running, otherwise waits for the
    /// running one. Fails with [`ApiError::AuthExpired`] when no refresh token
    /// is stored (without contacting the server) or when the exchange fails;
    /// in both cases the store has been cleared by the time this returns.
    pub async fn ensure(self: &Arc<Self>) -> Result<Credential, ApiError> {
        self.ensure_replacing(None).await
    }

    /// Like [`ensure`](Self::ensure), for a caller whose request was rejected
    /// while carrying `rejected_access_token`.
    ///
    /// If the stored access token has changed since that request went out,
    /// someone else already renewed and the caller gets the current
    /// credential without another exchange.
    pub async fn ensure_replacing(
        self: &Arc<Self>,
        rejected_access_token: Option<&str>,
    ) -> Result<Credential, ApiError> {
        let flight = {
            let mut phase = self.phase.lock();
            match &*phase {
                Phase::Refreshing(flight) | Phase::Failed(flight) => {
                    debug!("Renewal already in flight; waiting for it");
                    Arc::clone(flight)
                }
                Phase::Idle => {
                    let flight: RenewalFlight = Arc::new(InFlight::new());
                    *phase = Phase::Refreshing(Arc::clone(&flight));

                    // The exchange runs detached so queued callers are released
                    // even if the caller that started it goes away.
                    let coordinator = Arc::clone(self);
                    let leader_flight = Arc::clone(&flight);
                    let rejected = rejected_access_token.map(str::to_string);
                    tokio::spawn(
                        async move { coordinator.run_exchange(leader_flight, rejected).await }
                            .instrument(info_span!("credential_renewal")),
                    );
                    flight
                }
            }
        };

        flight.wait().await
    }

    async fn run_exchange(&self, flight: RenewalFlight, rejected: Option<String>) {
        let _write = self.write_lock.lock().await;

        let outcome = self.exchange(rejected.as_deref()).await;

        if outcome.is_err() {
            *self.phase.lock() = Phase::Failed(Arc::clone(&flight));
            if let Err(e) = self.store.clear().await {
                error!(error = %e, "Failed to clear credential store after failed renewal");
            }
            self.events.emit(SessionEvent::Expired);
        }

        *self.phase.lock() = Phase::Idle;
        flight.set_result(outcome);
    }

    async fn exchange(&self, rejected: Option<&str>) -> RenewalOutcome {
        let current = self.store.read().await;

        if let (Some(rejected), Some(current)) = (rejected, current.as_ref())
            && current.access_token != rejected
        {
            debug!("Credential already renewed since the request was sent");
            return Ok(current.clone());
        }

        let Some(current) = current.filter(Credential::has_refresh_token) else {
            warn!("No refresh token stored; cannot renew");
            return Err(ApiError::AuthExpired);
        };

        self.exchanges.fetch_add(1, Ordering::Relaxed);
        info!("Renewing access token");

        match self.renewer.renew(&current.refresh_token).await {
            Ok(renewed) => {
                if let Err(e) = self.store.write(&renewed).await {
                    // Waiters still replay with it; the store keeps the previous pair.
                    warn!(error = %e, "Failed to persist renewed credential");
                }
                info!("Access token renewed");
                self.events.emit(SessionEvent::Renewed);
                Ok(renewed)
            }
            Err(e) => {
                warn!(error = %e, "Credential renewal failed");
                Err(ApiError::AuthExpired)
            }
        }
    }

    /// Install a credential obtained by logging in.
    ///
    /// Waits for any outstanding renewal to commit first.
    pub async fn install(&self, credential: &Credential) -> Result<(), CredentialError> {
        let _write = self.write_lock.lock().await;
        self.store.write(credential).await?;
        self.events.emit(SessionEvent::Authenticated);
        info!("Credential installed");
        Ok(())
    }

    /// Clear the credential because the user logged out.
    pub async fn logout(&self) -> Result<(), CredentialError> {
        let _write = self.write_lock.lock().await;
        self.store.clear().await?;
        self.events.emit(SessionEvent::LoggedOut);
        info!("Logged out");
        Ok(())
    }

    /// Clear the credential because the server keeps rejecting it.
    pub async fn expire(&self) {
        let _write = self.write_lock.lock().await;
        if let Err(e) = self.store.clear().await {
            error!(error = %e, "Failed to clear credential store on session expiry");
        }
        self.events.emit(SessionEvent::Expired);
    }
}
