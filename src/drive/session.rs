//! Cloud session lifecycle: bootstraps the Drive client and the OAuth identity
//! client together, tracks readiness, and hands out access tokens through the
//! interactive account picker.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::error::SessionError;

/// Default bound on the combined bootstrap of both clients.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

/// Short-lived OAuth access token. Never persisted.
#[derive(Clone)]
pub struct AuthorizedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

impl std::fmt::Debug for AuthorizedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Resource-access half of readiness (the Drive API client).
#[async_trait::async_trait]
pub trait StorageBootstrap: Send + Sync {
    async fn initialize(&self) -> Result<(), SessionError>;
}

/// Identity half of readiness (the OAuth token client).
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn initialize(&self) -> Result<(), SessionError>;

    /// Run the interactive account picker and return a fresh token.
    async fn request_token(&self, scope: &str) -> Result<AuthorizedToken, SessionError>;
}

struct PhaseState {
    phase: SessionPhase,
    /// Cause of the last failed initialization.
    failure: Option<SessionError>,
    /// Bumped every time an initialization finishes, successful or not.
    completed_inits: u64,
}

/// Explicit session context shared by the driver and the sync engine.
pub struct CloudSession {
    storage: Arc<dyn StorageBootstrap>,
    identity: Arc<dyn IdentityProvider>,
    state: Mutex<PhaseState>,
    init_lock: tokio::sync::Mutex<()>,
    /// Only one account-picker flow may be in flight.
    auth_lock: tokio::sync::Mutex<()>,
    init_timeout: Duration,
}

impl std::fmt::Debug for CloudSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSession")
            .field("phase", &self.phase())
            .field("init_timeout", &self.init_timeout)
            .finish_non_exhaustive()
    }
}

impl CloudSession {
    pub fn new(
        storage: Arc<dyn StorageBootstrap>,
        identity: Arc<dyn IdentityProvider>,
        init_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            identity,
            state: Mutex::new(PhaseState {
                phase: SessionPhase::Uninitialized,
                failure: None,
                completed_inits: 0,
            }),
            init_lock: tokio::sync::Mutex::new(()),
            auth_lock: tokio::sync::Mutex::new(()),
            init_timeout,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PhaseState> {
        // A poisoned lock only means a panic elsewhere; the phase is still valid.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock_state().phase.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.lock_state().phase == SessionPhase::Ready
    }

    /// Forget readiness so the next `ensure_ready` bootstraps again.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        if state.phase != SessionPhase::Initializing {
            state.phase = SessionPhase::Uninitialized;
            state.failure = None;
        }
    }

    /// Bootstrap both clients concurrently, bounded by the init timeout.
    ///
    /// No-op once `Ready`. Callers arriving while another initialization is in
    /// flight wait for it and share its outcome instead of starting another.
    pub async fn ensure_ready(&self) -> Result<(), SessionError> {
        let seen = {
            let state = self.lock_state();
            if state.phase == SessionPhase::Ready {
                return Ok(());
            }
            state.completed_inits
        };

        let _guard = self.init_lock.lock().await;

        {
            let mut state = self.lock_state();
            if state.completed_inits != seen {
                return match &state.phase {
                    SessionPhase::Ready => Ok(()),
                    SessionPhase::Failed(reason) => Err(state.failure.clone().unwrap_or_else(
                        || SessionError::InitFailed {
                            subsystem: "Google Drive",
                            reason: reason.clone(),
                        },
                    )),
                    _ => Err(SessionError::NotReady),
                };
            }
            if state.phase == SessionPhase::Ready {
                return Ok(());
            }
            state.phase = SessionPhase::Initializing;
        }

        tracing::debug!(timeout = ?self.init_timeout, "Initializing Google Drive session");
        let both = async {
            tokio::try_join!(self.storage.initialize(), self.identity.initialize())
        };
        let outcome = match tokio::time::timeout(self.init_timeout, both).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SessionError::Timeout(self.init_timeout)),
        };

        let mut state = self.lock_state();
        state.completed_inits += 1;
        match &outcome {
            Ok(()) => {
                tracing::info!("Google Drive session ready");
                state.phase = SessionPhase::Ready;
                state.failure = None;
            }
            Err(e) => {
                tracing::warn!("Google Drive session initialization failed: {}", e);
                state.phase = SessionPhase::Failed(e.to_string());
                state.failure = Some(e.clone());
            }
        }
        outcome
    }

    /// Prompt for an account and return a fresh token for `scope`.
    ///
    /// Fails with `NotReady` unless `ensure_ready` has succeeded.
    pub async fn request_authorization(
        &self,
        scope: &str,
    ) -> Result<AuthorizedToken, SessionError> {
        if !self.is_ready() {
            return Err(SessionError::NotReady);
        }

        let _guard = self.auth_lock.lock().await;
        match self.identity.request_token(scope).await {
            Ok(token) => {
                tracing::debug!(expires_at = ?token.expires_at, "Authorization granted");
                Ok(token)
            }
            Err(e) => {
                tracing::error!("Auth error: {}", e);
                Err(e)
            }
        }
    }
}
