//! Session ownership: which credential is current, and the impersonation
//! state machine layered on top of it.
//!
//! All persisted session data goes through the named [`Slot`]s. The current
//! credential is re-derived from the store on every read, and a delegate
//! credential is only ever treated as current when the impersonation flag and
//! the parked operator session are both present.

pub mod navigator;
pub mod types;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::store::{KeyValueStore, Slot, StoreError};

pub use navigator::{Destination, NavigationEvent, Navigator, RecordingNavigator, TracingNavigator};
pub use types::{
    Credential, EndOutcome, ImpersonationInfo, Scope, SessionStatus, StoredSession, Subject,
    SubjectSummary,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("No operator session is signed in")]
    NotSignedIn,

    #[error("An impersonation session is already open")]
    AlreadyImpersonating,

    #[error("Failed to encode session record: {0}")]
    Encode(#[from] serde_json::Error),
}

const FLAG_SET: &str = "true";

struct SessionInner {
    store: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    status_tx: watch::Sender<SessionStatus>,
}

/// One session context. Clones share the context; separate instances over
/// the same store model separate contexts sharing storage.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>, navigator: Arc<dyn Navigator>) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        let manager = Self {
            inner: Arc::new(SessionInner {
                store,
                navigator,
                status_tx,
            }),
        };
        manager.publish();
        manager
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.compute_status()
    }

    /// Install an operator credential obtained from the login endpoint.
    pub fn sign_in(&self, token: impl Into<String>, subject: Subject) -> Result<(), SessionError> {
        if self.raw_flag()? {
            return Err(SessionError::AlreadyImpersonating);
        }

        let session = StoredSession {
            credential: Credential::new(Scope::Operator, token, subject.id.clone()),
            subject,
        };
        self.write_session(Slot::CurrentSession, &session)?;
        self.inner.store.remove(Slot::OperatorSession.key())?;

        info!("Signed in as operator {}", session.subject.id);
        self.publish();
        Ok(())
    }

    /// Drop every session slot and send the context to the login page.
    pub fn sign_out(&self) -> Result<(), SessionError> {
        for slot in Slot::ALL {
            self.inner.store.remove(slot.key())?;
        }

        info!("Signed out");
        self.publish();
        self.inner.navigator.navigate(Destination::Login);
        Ok(())
    }

    /// Park the operator session and make `token` the current credential.
    /// Opens a new context for the delegate; this context stays put.
    pub fn begin_impersonation(
        &self,
        token: impl Into<String>,
        subject: Subject,
    ) -> Result<(), SessionError> {
        if self.is_impersonating() {
            return Err(SessionError::AlreadyImpersonating);
        }

        let raw_operator = self
            .inner
            .store
            .get(Slot::CurrentSession.key())?
            .ok_or(SessionError::NotSignedIn)?;
        match serde_json::from_str::<StoredSession>(&raw_operator) {
            Ok(session) if session.credential.scope == Scope::Operator => {}
            Ok(_) => return Err(SessionError::NotSignedIn),
            Err(e) => {
                warn!("Current session record is malformed, refusing to impersonate: {}", e);
                return Err(SessionError::NotSignedIn);
            }
        }

        let delegate = StoredSession {
            credential: Credential::new(Scope::Delegate, token, subject.id.clone()),
            subject,
        };

        // Park first so the flag never points at a missing operator session
        self.inner.store.set(Slot::OperatorSession.key(), &raw_operator)?;
        self.write_session(Slot::CurrentSession, &delegate)?;
        self.inner.store.set(Slot::ImpersonationFlag.key(), FLAG_SET)?;

        info!("Impersonation started for subject {}", delegate.subject.id);
        self.publish();
        self.inner
            .navigator
            .open_context(Destination::DelegateArea, &delegate.credential);
        Ok(())
    }

    /// Restore the parked operator session. A missing flag or a missing
    /// parked session is logged and leaves everything untouched.
    pub fn end_impersonation(&self) -> Result<EndOutcome, SessionError> {
        if !self.raw_flag()? {
            warn!("end_impersonation called with no impersonation session open");
            return Ok(EndOutcome::NotImpersonating);
        }

        let Some(raw_operator) = self.inner.store.get(Slot::OperatorSession.key())? else {
            warn!("Impersonation flag is set but the operator session is missing; nothing to restore");
            return Ok(EndOutcome::NotImpersonating);
        };

        // Byte-for-byte copy keeps the restored credential identical
        self.inner.store.set(Slot::CurrentSession.key(), &raw_operator)?;
        self.inner.store.remove(Slot::OperatorSession.key())?;
        self.inner.store.remove(Slot::ImpersonationFlag.key())?;

        info!("Impersonation ended");
        self.publish();
        self.inner.navigator.navigate(Destination::OperatorRoot);
        Ok(EndOutcome::Ended)
    }

    /// True only when the flag is set and both the delegate and the parked
    /// operator sessions are present and well-formed.
    pub fn is_impersonating(&self) -> bool {
        self.impersonation_pair().is_some()
    }

    pub fn impersonation_info(&self) -> Option<ImpersonationInfo> {
        self.impersonation_pair().map(|(delegate, operator)| ImpersonationInfo {
            delegate: delegate.subject.summary(),
            operator: operator.subject.summary(),
        })
    }

    /// Credential for the next outgoing request: the delegate while a valid
    /// impersonation session is open, otherwise the operator.
    pub fn current_credential(&self) -> Option<Credential> {
        if let Some((delegate, _)) = self.impersonation_pair() {
            return Some(delegate.credential);
        }

        match self.read_session(Slot::CurrentSession) {
            Some(session) if session.credential.scope == Scope::Operator => {
                return Some(session.credential);
            }
            Some(_) => {
                debug!("Ignoring delegate credential without a valid impersonation session");
            }
            None => {}
        }

        // Flag set but delegate gone: the parked operator is still ours
        self.read_session(Slot::OperatorSession)
            .filter(|session| session.credential.scope == Scope::Operator)
            .map(|session| session.credential)
    }

    /// Remove only the current credential. A parked operator session and the
    /// flag survive so impersonation can still be ended cleanly.
    pub fn clear_active_credential(&self) -> Result<(), SessionError> {
        self.inner.store.remove(Slot::CurrentSession.key())?;
        self.publish();
        Ok(())
    }

    /// Authentication failure side effect: clear the current credential and
    /// send the context to login. Never fails; storage errors are logged.
    pub fn force_logout(&self, reason: &str) {
        warn!("Forcing logout: {}", reason);
        if let Err(e) = self.clear_active_credential() {
            error!("Failed to clear active credential during forced logout: {}", e);
        }
        self.inner.navigator.navigate(Destination::Login);
    }

    /// `force_logout` for a credential the backend rejected. Does nothing if
    /// the session has moved on since that credential was attached, so a late
    /// failure cannot clear a credential it was never sent with.
    pub fn force_logout_for(&self, rejected: &Credential, reason: &str) -> bool {
        let still_current = self
            .current_credential()
            .is_some_and(|current| current.token == rejected.token);
        if !still_current {
            warn!(
                "Ignoring auth failure for a {} credential that is no longer current: {}",
                rejected.scope, reason
            );
            return false;
        }

        self.force_logout(reason);
        true
    }

    fn impersonation_pair(&self) -> Option<(StoredSession, StoredSession)> {
        match self.raw_flag() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                error!("Failed to read impersonation flag: {}", e);
                return None;
            }
        }

        let delegate = self
            .read_session(Slot::CurrentSession)
            .filter(|s| s.credential.scope == Scope::Delegate);
        let operator = self
            .read_session(Slot::OperatorSession)
            .filter(|s| s.credential.scope == Scope::Operator);

        match (delegate, operator) {
            (Some(delegate), Some(operator)) => Some((delegate, operator)),
            _ => {
                debug!("Impersonation flag set without both sessions; treating as not impersonating");
                None
            }
        }
    }

    fn raw_flag(&self) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .store
            .get(Slot::ImpersonationFlag.key())?
            .is_some_and(|v| v == FLAG_SET))
    }

    /// Missing, unreadable, and malformed records all read as `None`.
    fn read_session(&self, slot: Slot) -> Option<StoredSession> {
        let raw = match self.inner.store.get(slot.key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error!("Failed to read {}: {}", slot.key(), e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Malformed session record in {}: {}", slot.key(), e);
                None
            }
        }
    }

    fn write_session(&self, slot: Slot, session: &StoredSession) -> Result<(), SessionError> {
        let raw = serde_json::to_string(session)?;
        self.inner.store.set(slot.key(), &raw)?;
        Ok(())
    }

    fn compute_status(&self) -> SessionStatus {
        let info = self.impersonation_info();
        SessionStatus {
            scope: self.current_credential().map(|c| c.scope),
            impersonating: info.is_some(),
            info,
        }
    }

    fn publish(&self) {
        let status = self.compute_status();
        self.inner.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}
