//! The remote store and identity provider interfaces.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::StoreError;

/// Identifies a live subscription so it can be cancelled.
pub type SubscriptionId = u64;

/// A value-change event: the full current value of the subscribed path,
/// or `None` when the path does not exist.
pub type ValueChange = Option<Value>;

/// A live subscription to a path in the remote store.
///
/// The first event delivered is the path's current value; every later event
/// is the new value after a change. Pass [`Subscription::id`] to
/// [`RemoteStore::unsubscribe`] to stop delivery. The event stream ends when
/// the store cancels the subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    path: String,
    events: mpsc::UnboundedReceiver<ValueChange>,
}

impl Subscription {
    /// Create a subscription from its parts.
    ///
    /// Store implementations keep the sending half and push a
    /// [`ValueChange`] whenever the subtree at `path` changes.
    pub fn new(
        id: SubscriptionId,
        path: impl Into<String>,
        events: mpsc::UnboundedReceiver<ValueChange>,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            events,
        }
    }

    /// The subscription's identifier.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The subscribed path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the next value-change event.
    ///
    /// Returns `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<ValueChange> {
        self.events.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_next(&mut self) -> Option<ValueChange> {
        self.events.try_recv().ok()
    }
}

/// An authenticated session with the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Stable identity of the session.
    pub uid: String,
    /// Bearer token presented to the store.
    pub id_token: String,
    /// Exchanged for a new `id_token` by [`IdentityProvider::refresh`].
    pub refresh_token: Option<String>,
    /// Lifetime of `id_token`, counted from when the session was issued.
    /// `None` for tokens that do not expire.
    pub expires_in: Option<Duration>,
}

impl Session {
    /// A session whose token does not expire.
    pub fn new(uid: impl Into<String>, id_token: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            id_token: id_token.into(),
            refresh_token: None,
            expires_in: None,
        }
    }

    /// Set the refresh token and token lifetime.
    pub fn expiring(mut self, refresh_token: Option<String>, expires_in: Duration) -> Self {
        self.refresh_token = refresh_token;
        self.expires_in = Some(expires_in);
        self
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("uid", &self.uid)
            .field("id_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// A hosted hierarchical key-value database.
///
/// Paths are slash-separated (`"sensors/heart"`); leading and trailing
/// slashes are ignored.
#[async_trait]
pub trait RemoteStore: Send + Sync + Debug {
    /// Point read of a path. `None` means the path does not exist.
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Subscribe to changes of a path's subtree.
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;

    /// Cancel a subscription. Unknown or already-cancelled ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Read the last `limit` children of `path`, ordered by the numeric
    /// child field `order_by`.
    ///
    /// The returned map is keyed by the children's store keys; its order
    /// says nothing about `order_by`, so callers must sort.
    async fn query_last(
        &self,
        path: &str,
        order_by: &str,
        limit: usize,
    ) -> Result<BTreeMap<String, Value>, StoreError>;

    /// Write `value` under a new, store-generated key beneath `path`.
    ///
    /// Returns the generated key.
    async fn append(&self, path: &str, value: Value) -> Result<String, StoreError>;

    /// Present a session to the store for subsequent requests.
    fn authorize(&self, _session: &Session) {}

    /// True when the store has turned the current session away (a 401 or a
    /// revoked stream) since the last [`authorize`](Self::authorize).
    fn session_rejected(&self) -> bool {
        false
    }
}

/// A source of anonymous sessions.
#[async_trait]
pub trait IdentityProvider: Send + Sync + Debug {
    /// Sign in anonymously and return the new session.
    async fn sign_in_anonymously(&self) -> Result<Session, StoreError>;

    /// Obtain a fresh token for `session`'s user.
    ///
    /// Providers without refresh tokens sign in again.
    async fn refresh(&self, _session: &Session) -> Result<Session, StoreError> {
        self.sign_in_anonymously().await
    }
}
