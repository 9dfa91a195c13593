//! The shared store client and its authentication gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vitalsync_store::{IdentityProvider, RemoteStore, Session};

/// Pause between renewal attempts after one fails.
pub const RENEW_RETRY: Duration = Duration::from_secs(30);

/// Memoized anonymous sign-in.
///
/// The first caller triggers a single sign-in attempt; every concurrent or
/// later caller waits on and shares its outcome. A failed attempt is logged
/// and remembered as "no session": callers carry on unauthenticated and the
/// store's access rules decide what they may read.
///
/// A session is renewed through [`IdentityProvider::refresh`] once 90% of
/// its token lifetime has passed, or as soon as the store reports that it
/// turned the token away. Renewal is single-flight as well. A failed
/// renewal keeps the current token and is retried after [`RENEW_RETRY`].
#[derive(Debug)]
pub struct AuthGate {
    identity: Arc<dyn IdentityProvider>,
    state: Mutex<GateState>,
    resolved: AtomicBool,
}

#[derive(Debug)]
enum GateState {
    Pending,
    /// The sign-in attempt failed.
    SignedOut,
    Active {
        session: Session,
        renew_at: Option<Instant>,
        hold_until: Option<Instant>,
    },
}

impl GateState {
    fn active(store: &dyn RemoteStore, session: Session) -> Self {
        store.authorize(&session);
        let renew_at = session
            .expires_in
            .map(|lifetime| Instant::now() + lifetime - lifetime / 10);
        GateState::Active {
            session,
            renew_at,
            hold_until: None,
        }
    }

    /// The session to renew, if renewal is due and not on hold.
    fn renewal_due(&self, store: &dyn RemoteStore) -> Option<Session> {
        let GateState::Active {
            session,
            renew_at,
            hold_until,
        } = self
        else {
            return None;
        };

        let now = Instant::now();
        if hold_until.is_some_and(|until| now < until) {
            return None;
        }
        let expiring = renew_at.is_some_and(|at| now >= at);
        (expiring || store.session_rejected()).then(|| session.clone())
    }

    fn session(&self) -> Option<&Session> {
        match self {
            GateState::Active { session, .. } => Some(session),
            _ => None,
        }
    }
}

impl AuthGate {
    /// Create a gate that has not signed in yet.
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            state: Mutex::new(GateState::Pending),
            resolved: AtomicBool::new(false),
        }
    }

    /// Resolve the gate, signing in on first use and renewing the session
    /// when it is due.
    ///
    /// Every new session is handed to `store` before any waiter is
    /// released.
    pub async fn ready(&self, store: &dyn RemoteStore) -> Option<Session> {
        let mut state = self.state.lock().await;

        if matches!(*state, GateState::Pending) {
            *state = match self.identity.sign_in_anonymously().await {
                Ok(session) => {
                    info!(uid = %session.uid, "Signed in anonymously");
                    GateState::active(store, session)
                }
                Err(e) => {
                    warn!(error = %e, "Anonymous sign-in failed, continuing without a session");
                    GateState::SignedOut
                }
            };
            self.resolved.store(true, Ordering::SeqCst);
        } else if let Some(current) = state.renewal_due(store) {
            *state = match self.identity.refresh(&current).await {
                Ok(session) => {
                    debug!(uid = %session.uid, "Session renewed");
                    GateState::active(store, session)
                }
                Err(e) => {
                    warn!(error = %e, "Session renewal failed, keeping the current token");
                    let now = Instant::now();
                    GateState::Active {
                        session: current,
                        renew_at: Some(now),
                        hold_until: Some(now + RENEW_RETRY),
                    }
                }
            };
        }

        state.session().cloned()
    }

    /// True once the sign-in attempt has finished, whatever its outcome.
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }
}

/// Store handle shared by the reader, the recorder, the history query and
/// the HTTP service.
///
/// Built once at startup and passed around in an `Arc`.
#[derive(Debug)]
pub struct VitalsClient {
    store: Arc<dyn RemoteStore>,
    auth: AuthGate,
}

impl VitalsClient {
    pub fn new(store: Arc<dyn RemoteStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            auth: AuthGate::new(identity),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Wait for the authentication gate.
    pub async fn ensure_auth(&self) -> Option<Session> {
        self.auth.ready(self.store.as_ref()).await
    }

    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalsync_store::{MemoryIdentity, MemoryStore};

    #[tokio::test]
    async fn test_concurrent_callers_share_one_sign_in() {
        let identity = MemoryIdentity::new();
        let client = Arc::new(VitalsClient::new(
            Arc::new(MemoryStore::new()),
            Arc::new(identity.clone()),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.ensure_auth().await.map(|s| s.uid) })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().as_deref(), Some("anonymous-1"));
        }
        assert_eq!(identity.attempts(), 1);
        assert!(client.auth().is_resolved());
    }

    #[tokio::test]
    async fn test_failed_sign_in_is_remembered() {
        let identity = MemoryIdentity::failing();
        let client = VitalsClient::new(Arc::new(MemoryStore::new()), Arc::new(identity.clone()));

        assert!(client.ensure_auth().await.is_none());
        assert!(client.ensure_auth().await.is_none());
        assert_eq!(identity.attempts(), 1);
        assert_eq!(identity.refreshes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiring_session_renewed_before_expiry() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::expiring(Duration::from_secs(3600));
        let client = VitalsClient::new(Arc::new(store.clone()), Arc::new(identity.clone()));

        let first = client.ensure_auth().await.unwrap();
        assert_eq!(store.token().as_deref(), Some("token-1"));

        tokio::time::advance(Duration::from_secs(3000)).await;
        assert_eq!(client.ensure_auth().await.unwrap(), first);
        assert_eq!(identity.refreshes(), 0);

        tokio::time::advance(Duration::from_secs(300)).await;
        let renewed = client.ensure_auth().await.unwrap();
        assert_eq!(renewed.uid, first.uid);
        assert_eq!(renewed.id_token, "refreshed-1");
        assert_eq!(store.token().as_deref(), Some("refreshed-1"));
        assert_eq!(identity.attempts(), 1);
        assert_eq!(identity.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_rejected_session_renewed_once_for_concurrent_callers() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        let client = Arc::new(VitalsClient::new(
            Arc::new(store.clone()),
            Arc::new(identity.clone()),
        ));
        client.ensure_auth().await;

        store.reject_session();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.ensure_auth().await.map(|s| s.id_token) })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().as_deref(), Some("refreshed-1"));
        }
        assert_eq!(identity.refreshes(), 1);
        assert!(!store.session_rejected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewal_keeps_token_and_retries_later() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        let client = VitalsClient::new(Arc::new(store.clone()), Arc::new(identity.clone()));
        client.ensure_auth().await;

        identity.set_failing(true);
        store.reject_session();
        assert_eq!(client.ensure_auth().await.unwrap().id_token, "token-1");
        assert_eq!(client.ensure_auth().await.unwrap().id_token, "token-1");
        assert_eq!(identity.refreshes(), 1);

        identity.set_failing(false);
        tokio::time::advance(RENEW_RETRY).await;
        assert_eq!(client.ensure_auth().await.unwrap().id_token, "refreshed-2");
        assert_eq!(identity.refreshes(), 2);
        assert_eq!(store.token().as_deref(), Some("refreshed-2"));
    }
}
