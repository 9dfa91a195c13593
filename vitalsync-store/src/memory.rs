//! In-process store with the same semantics as the hosted one.
//!
//! Useful for tests and demos: sensor writes are simulated with
//! [`MemoryStore::set`], and [`MemoryStore::set_offline`] makes every
//! operation fail the way an unreachable store would.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::store::{IdentityProvider, RemoteStore, Session, Subscription, SubscriptionId, ValueChange};
use crate::tree;
use crate::StoreError;

/// An in-memory remote store.
///
/// Cloning yields another handle to the same data.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use vitalsync_store::{MemoryStore, RemoteStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// store.set("sensors/heart", json!({ "bpm": 72 }));
///
/// let heart = store.read("sensors/heart").await.unwrap();
/// assert_eq!(heart, Some(json!({ "bpm": 72 })));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    root: Value,
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
    next_subscription: SubscriptionId,
    next_key: u64,
    offline: bool,
    token: Option<String>,
    session_rejected: bool,
}

#[derive(Debug)]
struct Subscriber {
    path: Vec<String>,
    tx: mpsc::UnboundedSender<ValueChange>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value at `path`, notifying affected subscribers.
    ///
    /// Works even while offline; it models the sensor side writing.
    pub fn set(&self, path: &str, value: Value) {
        let mut state = self.state.lock();
        let segments = tree::segments(path);
        state.write(|root| tree::set(root, &segments, value));
    }

    /// Current value at `path`, bypassing the offline switch.
    pub fn get(&self, path: &str) -> Option<Value> {
        let state = self.state.lock();
        tree::get(&state.root, &tree::segments(path)).cloned()
    }

    /// Number of children beneath `path`.
    pub fn child_count(&self, path: &str) -> usize {
        self.get(path)
            .as_ref()
            .and_then(Value::as_object)
            .map_or(0, |children| children.len())
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Token of the last authorized session.
    pub fn token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    /// Simulate the store turning the current session away, as the hosted
    /// store does once a token expires or is revoked.
    pub fn reject_session(&self) {
        self.state.lock().session_rejected = true;
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.state.lock().offline {
            return Err(StoreError::Connection("store unreachable".to_string()));
        }
        Ok(())
    }
}

impl State {
    /// Apply a mutation to the tree and push the new value to every
    /// subscriber whose subtree changed.
    fn write(&mut self, mutate: impl FnOnce(&mut Value)) {
        let before: Vec<(SubscriptionId, Option<Value>)> = self
            .subscribers
            .iter()
            .map(|(id, sub)| (*id, lookup(&self.root, &sub.path)))
            .collect();

        mutate(&mut self.root);

        let mut closed = Vec::new();
        for (id, old) in before {
            let Some(sub) = self.subscribers.get(&id) else {
                continue;
            };
            let new = lookup(&self.root, &sub.path);
            if new != old && sub.tx.send(new).is_err() {
                closed.push(id);
            }
        }
        for id in closed {
            self.subscribers.remove(&id);
        }
    }
}

fn lookup(root: &Value, path: &[String]) -> Option<Value> {
    let segments: Vec<&str> = path.iter().map(String::as_str).collect();
    tree::get(root, &segments).cloned()
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_online()?;
        Ok(self.get(path))
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        self.ensure_online()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let id = state.next_subscription;
        state.next_subscription += 1;

        let segments: Vec<String> = tree::segments(path).into_iter().map(String::from).collect();
        // Current value first, as the hosted store does.
        let _ = tx.send(lookup(&state.root, &segments));
        state.subscribers.insert(id, Subscriber { path: segments, tx });

        Ok(Subscription::new(id, path, rx))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.state.lock().subscribers.remove(&id);
    }

    async fn query_last(
        &self,
        path: &str,
        order_by: &str,
        limit: usize,
    ) -> Result<BTreeMap<String, Value>, StoreError> {
        self.ensure_online()?;

        let Some(Value::Object(children)) = self.get(path) else {
            return Ok(BTreeMap::new());
        };

        // Children without a numeric ordering field sort first, then by
        // value, then by key.
        let mut ordered: Vec<(String, Value)> = children.into_iter().collect();
        ordered.sort_by(|(ka, a), (kb, b)| {
            let va = a.get(order_by).and_then(Value::as_f64);
            let vb = b.get(order_by).and_then(Value::as_f64);
            va.partial_cmp(&vb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ka.cmp(kb))
        });

        let skip = ordered.len().saturating_sub(limit);
        Ok(ordered.into_iter().skip(skip).collect())
    }

    async fn append(&self, path: &str, value: Value) -> Result<String, StoreError> {
        self.ensure_online()?;

        let mut state = self.state.lock();
        let key = format!("-M{:018}", state.next_key);
        state.next_key += 1;

        let mut segments = tree::segments(path);
        segments.push(&key);
        state.write(|root| tree::set(root, &segments, value));

        Ok(key)
    }

    fn authorize(&self, session: &Session) {
        let mut state = self.state.lock();
        state.token = Some(session.id_token.clone());
        state.session_rejected = false;
    }

    fn session_rejected(&self) -> bool {
        self.state.lock().session_rejected
    }
}

/// An identity provider that hands out local anonymous sessions.
///
/// Counts sign-in attempts and can be told to fail, which makes it a
/// convenient stand-in for the hosted provider in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentity {
    attempts: Arc<AtomicUsize>,
    refreshes: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    expires_in: Option<Duration>,
}

impl MemoryIdentity {
    /// Create a provider that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider whose sign-ins always fail.
    pub fn failing() -> Self {
        let identity = Self::default();
        identity.failing.store(true, Ordering::SeqCst);
        identity
    }

    /// Create a provider whose sessions expire after `expires_in`.
    pub fn expiring(expires_in: Duration) -> Self {
        Self {
            expires_in: Some(expires_in),
            ..Self::default()
        }
    }

    /// Make later sign-ins and refreshes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of sign-in attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of refresh attempts so far.
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn issue(&self, uid: String, id_token: String) -> Session {
        let session = Session::new(uid, id_token);
        match self.expires_in {
            Some(expires_in) => {
                let refresh_token = format!("refresh-{}", session.uid);
                session.expiring(Some(refresh_token), expires_in)
            }
            None => session,
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_in_anonymously(&self) -> Result<Session, StoreError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        // Yield so concurrent callers get a chance to pile up.
        tokio::task::yield_now().await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Auth("anonymous sign-in disabled".to_string()));
        }

        Ok(self.issue(format!("anonymous-{}", attempt), format!("token-{}", attempt)))
    }

    async fn refresh(&self, session: &Session) -> Result<Session, StoreError> {
        let refresh = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::task::yield_now().await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Auth("token refresh rejected".to_string()));
        }

        Ok(self.issue(session.uid.clone(), format!("refreshed-{}", refresh)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_missing_path() {
        let store = MemoryStore::new();
        assert_eq!(store.read("sensors/heart").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_then_changes() {
        let store = MemoryStore::new();
        store.set("sensors/heart", json!({ "bpm": 70 }));

        let mut sub = store.subscribe("sensors/heart").await.unwrap();
        assert_eq!(sub.next().await, Some(Some(json!({ "bpm": 70 }))));

        store.set("sensors/heart/bpm", json!(71));
        assert_eq!(sub.next().await, Some(Some(json!({ "bpm": 71 }))));

        store.set("sensors/heart", Value::Null);
        assert_eq!(sub.next().await, Some(None));
    }

    #[tokio::test]
    async fn test_unrelated_writes_do_not_notify() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("sensors/heart").await.unwrap();
        assert_eq!(sub.next().await, Some(None));

        store.set("sensors/dht11/temperature", json!(37.0));
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let store = MemoryStore::new();
        let sub = store.subscribe("text").await.unwrap();
        assert_eq!(store.subscriber_count(), 1);

        store.unsubscribe(sub.id());
        store.unsubscribe(sub.id());
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_append_generates_ordered_keys() {
        let store = MemoryStore::new();
        let first = store.append("history", json!({ "ts": 1 })).await.unwrap();
        let second = store.append("history", json!({ "ts": 2 })).await.unwrap();

        assert!(first < second);
        assert_eq!(store.child_count("history"), 2);
        assert_eq!(store.get(&format!("history/{}", second)), Some(json!({ "ts": 2 })));
    }

    #[tokio::test]
    async fn test_query_last_limits_by_order_field() {
        let store = MemoryStore::new();
        for ts in [3, 1, 5, 2, 4] {
            store.append("history", json!({ "ts": ts })).await.unwrap();
        }

        let last = store.query_last("history", "ts", 3).await.unwrap();
        let mut stamps: Vec<i64> = last.values().filter_map(|v| v["ts"].as_i64()).collect();
        stamps.sort();
        assert_eq!(stamps, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_query_last_on_empty_path() {
        let store = MemoryStore::new();
        assert!(store.query_last("history", "ts", 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_offline(true);

        assert!(matches!(store.read("text").await, Err(StoreError::Connection(_))));
        assert!(store.subscribe("text").await.is_err());
        assert!(store.query_last("history", "ts", 1).await.is_err());
        assert!(store.append("history", json!({})).await.is_err());

        store.set_offline(false);
        assert!(store.read("text").await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_identity() {
        let identity = MemoryIdentity::new();
        let session = identity.sign_in_anonymously().await.unwrap();
        assert_eq!(session.uid, "anonymous-1");
        assert_eq!(identity.attempts(), 1);

        let failing = MemoryIdentity::failing();
        assert!(failing.sign_in_anonymously().await.is_err());
        assert_eq!(failing.attempts(), 1);
    }

    #[tokio::test]
    async fn test_memory_identity_refresh_keeps_uid() {
        let identity = MemoryIdentity::expiring(Duration::from_secs(60));
        let session = identity.sign_in_anonymously().await.unwrap();
        assert_eq!(session.expires_in, Some(Duration::from_secs(60)));

        let refreshed = identity.refresh(&session).await.unwrap();
        assert_eq!(refreshed.uid, session.uid);
        assert_eq!(refreshed.id_token, "refreshed-1");
        assert_eq!(identity.refreshes(), 1);
        assert_eq!(identity.attempts(), 1);
    }

    #[tokio::test]
    async fn test_authorize_clears_rejection() {
        let store = MemoryStore::new();
        assert!(!store.session_rejected());

        store.reject_session();
        assert!(store.session_rejected());

        store.authorize(&Session::new("u", "tok"));
        assert!(!store.session_rejected());
        assert_eq!(store.token().as_deref(), Some("tok"));
    }
}
