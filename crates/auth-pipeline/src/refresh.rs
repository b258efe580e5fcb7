//! Single-flight credential renewal
//!
//! At most one refresh exchange is in flight per coordinator. The first
//! caller to arrive drives the exchange; everyone who arrives while it is
//! pending parks on a oneshot channel and receives a clone of the same
//! outcome. When the cycle settles the coordinator returns to idle, so the
//! next expiry starts a fresh exchange.
//!
//! Outcome handling happens before waiters are released:
//! - success: the new access token is persisted and published first, so a
//!   replay always reads the renewed token from the store
//! - failure: credentials are cleared
//! - session logged out or replaced mid-exchange: nothing is written, the
//!   newer state wins and waiters get `SessionChanged`
//! - driver dropped mid-exchange: waiters get `Abandoned` and credentials are
//!   left alone
//!
//! The state lock is a `std::sync::Mutex` and is never held across an await.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::Secret;
use session_auth::{CredentialStore, parse_access_token, refresh_request};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use transport::Transport;

use crate::error::RefreshFailure;
use crate::metrics;

/// What every participant of one refresh cycle receives.
pub type RefreshOutcome = Result<Secret<String>, RefreshFailure>;

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialStore>,
    refresh_url: String,
    timeout: Duration,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialStore>,
        refresh_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            credentials,
            refresh_url: refresh_url.into(),
            timeout,
            state: Mutex::new(RefreshState::Idle),
        }
    }

    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Obtain a renewed access token, joining the in-flight exchange if
    /// there is one.
    pub async fn refresh(&self) -> RefreshOutcome {
        let joined = {
            let mut state = self.lock_state();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        waiters: Vec::new(),
                    };
                    None
                }
            }
        };

        match joined {
            Some(rx) => {
                debug!("joining in-flight refresh");
                // Sender dropped without a value means the cycle was torn down
                rx.await.unwrap_or(Err(RefreshFailure::Abandoned))
            }
            None => self.drive().await,
        }
    }

    async fn drive(&self) -> RefreshOutcome {
        let guard = SettleGuard {
            coordinator: self,
            settled: false,
        };

        // Outcomes only apply to the session that was current when the
        // exchange started
        let refresh_token = self.credentials.refresh_token().await;
        let outcome = match &refresh_token {
            None => Err(RefreshFailure::NoRefreshToken),
            Some(token) => {
                match tokio::time::timeout(self.timeout, self.exchange(token)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RefreshFailure::Rejected(format!(
                        "no response from refresh endpoint within {}s",
                        self.timeout.as_secs_f64()
                    ))),
                }
            }
        };

        let outcome = match (outcome, &refresh_token) {
            (Ok(access), Some(expected)) => {
                match self.credentials.set_access_if(expected, access.clone()).await {
                    Ok(true) => {
                        info!("access token renewed");
                        Ok(access)
                    }
                    Ok(false) => {
                        info!("session changed during refresh, discarding renewed token");
                        Err(RefreshFailure::SessionChanged)
                    }
                    Err(e) => Err(RefreshFailure::Rejected(format!(
                        "failed to store renewed access token: {e}"
                    ))),
                }
            }
            (Ok(_), None) => Err(RefreshFailure::NoRefreshToken),
            (Err(failure), _) => Err(failure),
        };

        match &outcome {
            Ok(_) | Err(RefreshFailure::SessionChanged) => {}
            Err(failure) => {
                warn!(outcome = failure.label(), error = %failure, "refresh failed, clearing session");
                // clear_if() drops in-memory tokens even when persisting fails, and logs it
                if let Ok(false) = self.credentials.clear_if(refresh_token.as_ref()).await {
                    info!("session changed during refresh, keeping it");
                }
            }
        }

        metrics::record_refresh(outcome.as_ref().err());
        guard.settle(outcome.clone());
        outcome
    }

    async fn exchange(&self, refresh_token: &Secret<String>) -> RefreshOutcome {
        let request = refresh_request(self.refresh_url.as_str(), refresh_token)
            .map_err(|e| RefreshFailure::Rejected(e.to_string()))?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RefreshFailure::Rejected(e.to_string()))?;

        if !response.is_success() {
            return Err(RefreshFailure::Rejected(format!(
                "refresh endpoint returned {}",
                response.status.as_u16()
            )));
        }

        parse_access_token(&response.body).map_err(|e| RefreshFailure::Rejected(e.to_string()))
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return to idle and hand `outcome` to every parked waiter.
    fn release(&self, outcome: &RefreshOutcome) {
        let waiters = match std::mem::replace(&mut *self.lock_state(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "releasing refresh waiters");
        }
        for waiter in waiters {
            // A waiter that gave up has dropped its receiver
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Releases waiters even if the driving future is dropped before settling.
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl SettleGuard<'_> {
    fn settle(mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.coordinator.release(&outcome);
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("refresh driver dropped before settling");
            self.coordinator.release(&Err(RefreshFailure::Abandoned));
        }
    }
}
