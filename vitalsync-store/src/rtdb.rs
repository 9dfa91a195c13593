//! Hosted realtime database client using the REST and streaming API.
//!
//! Point reads, ordered queries and appends are plain JSON requests against
//! `{url}/{path}.json`. Subscriptions hold a `text/event-stream` request
//! open per path and mirror the subtree locally, reconnecting with backoff
//! when the stream drops.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vitalsync_store::rtdb::{AnonymousAuth, RtdbClient};
//! use vitalsync_store::{IdentityProvider, RemoteStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RtdbClient::builder()
//!         .url("https://example-default-rtdb.firebaseio.com")
//!         .build()?;
//!     let auth = AnonymousAuth::builder().api_key("web-api-key").build()?;
//!
//!     let session = auth.sign_in_anonymously().await?;
//!     store.authorize(&session);
//!
//!     let heart = store.read("sensors/heart").await?;
//!     println!("heart: {:?}", heart);
//!     Ok(())
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::sse::{Applied, EventParser, Mirror};
use crate::store::{IdentityProvider, RemoteStore, Session, Subscription, SubscriptionId, ValueChange};
use crate::StoreError;

const DEFAULT_URL: &str = "http://localhost:9000";
const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Realtime database client.
///
/// Cloning yields another handle sharing the same session and
/// subscriptions.
#[derive(Clone)]
pub struct RtdbClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    stream_client: Client,
    url: String,
    token: RwLock<Option<String>>,
    session_rejected: AtomicBool,
    streams: Mutex<HashMap<SubscriptionId, AbortHandle>>,
    next_subscription: AtomicU64,
    reconnect_delay: Duration,
}

impl std::fmt::Debug for RtdbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtdbClient")
            .field("url", &self.inner.url)
            .field("authorized", &self.inner.token.read().is_some())
            .field("streams", &self.inner.streams.lock().len())
            .finish()
    }
}

impl RtdbClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> RtdbClientBuilder {
        RtdbClientBuilder::default()
    }

    /// The database root URL.
    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

impl Inner {
    fn endpoint(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            format!("{}/.json", self.url)
        } else {
            format!("{}/{}.json", self.url, path)
        }
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }

    /// Map a response status, remembering when the session was refused.
    fn check(&self, status: StatusCode) -> Result<(), StoreError> {
        let result = check_status(status);
        if matches!(result, Err(StoreError::Auth(_))) {
            self.session_rejected.store(true, Ordering::SeqCst);
        }
        result
    }
}

#[async_trait]
impl RemoteStore for RtdbClient {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let request = self.inner.client.get(self.inner.endpoint(path));
        let response = self.inner.with_auth(request).send().await?;
        self.inner.check(response.status())?;

        let value: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        Ok((!value.is_null()).then_some(value))
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_stream(Arc::clone(&self.inner), path.to_string(), tx));
        self.inner.streams.lock().insert(id, task.abort_handle());
        debug!(id, path, "Opened subscription stream");

        Ok(Subscription::new(id, path, rx))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(handle) = self.inner.streams.lock().remove(&id) {
            handle.abort();
            debug!(id, "Closed subscription stream");
        }
    }

    async fn query_last(
        &self,
        path: &str,
        order_by: &str,
        limit: usize,
    ) -> Result<BTreeMap<String, Value>, StoreError> {
        let request = self.inner.client.get(self.inner.endpoint(path)).query(&[
            ("orderBy", format!("\"{}\"", order_by)),
            ("limitToLast", limit.to_string()),
        ]);
        let response = self.inner.with_auth(request).send().await?;
        self.inner.check(response.status())?;

        let value: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        Ok(children(value))
    }

    async fn append(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let request = self.inner.client.post(self.inner.endpoint(path)).json(&value);
        let response = self.inner.with_auth(request).send().await?;
        self.inner.check(response.status())?;

        let pushed: PushResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        Ok(pushed.name)
    }

    fn authorize(&self, session: &Session) {
        *self.inner.token.write() = Some(session.id_token.clone());
        self.inner.session_rejected.store(false, Ordering::SeqCst);
    }

    fn session_rejected(&self) -> bool {
        self.inner.session_rejected.load(Ordering::SeqCst)
    }
}

/// Builder for RtdbClient.
#[derive(Debug, Default)]
pub struct RtdbClientBuilder {
    url: Option<String>,
    timeout: Option<Duration>,
    reconnect_delay: Option<Duration>,
}

impl RtdbClientBuilder {
    /// Set the database root URL (e.g., "https://my-db.firebaseio.com").
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    ///
    /// Subscription streams only use it as a connect timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the first reconnect delay for dropped streams (default: 1 second).
    /// It doubles on each consecutive failure, up to 30 seconds.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<RtdbClient, StoreError> {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let client = Client::builder().timeout(timeout).build()?;
        let stream_client = Client::builder().connect_timeout(timeout).build()?;

        let url = self.url.unwrap_or_else(|| DEFAULT_URL.to_string());

        Ok(RtdbClient {
            inner: Arc::new(Inner {
                client,
                stream_client,
                url: url.trim_end_matches('/').to_string(),
                token: RwLock::new(None),
                session_rejected: AtomicBool::new(false),
                streams: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                reconnect_delay: self.reconnect_delay.unwrap_or(DEFAULT_RECONNECT_DELAY),
            }),
        })
    }
}

/// Anonymous sign-in against an identity-toolkit style endpoint.
#[derive(Debug, Clone)]
pub struct AnonymousAuth {
    client: Client,
    auth_url: String,
    token_url: String,
    api_key: String,
}

impl AnonymousAuth {
    /// Create a new builder for configuring the provider.
    pub fn builder() -> AnonymousAuthBuilder {
        AnonymousAuthBuilder::default()
    }

    fn sign_up_url(&self) -> String {
        format!("{}/accounts:signUp", self.auth_url)
    }

    fn refresh_url(&self) -> String {
        format!("{}/token", self.token_url)
    }
}

async fn auth_failure(action: &str, response: reqwest::Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    StoreError::Auth(format!("{} returned status {}: {}", action, status, body))
}

/// Token lifetimes arrive as decimal strings ("3600").
fn lifetime(expires_in: Option<&str>) -> Option<Duration> {
    expires_in
        .and_then(|secs| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl IdentityProvider for AnonymousAuth {
    async fn sign_in_anonymously(&self) -> Result<Session, StoreError> {
        let response = self
            .client
            .post(self.sign_up_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({ "returnSecureToken": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(auth_failure("sign-in", response).await);
        }

        let signed_up: SignUpResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        let mut session = Session::new(signed_up.local_id, signed_up.id_token);
        session.refresh_token = signed_up.refresh_token;
        session.expires_in = lifetime(signed_up.expires_in.as_deref());
        Ok(session)
    }

    async fn refresh(&self, session: &Session) -> Result<Session, StoreError> {
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            return self.sign_in_anonymously().await;
        };

        let response = self
            .client
            .post(self.refresh_url())
            .query(&[("key", self.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(auth_failure("token refresh", response).await);
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        let mut next = Session::new(
            refreshed.user_id.unwrap_or_else(|| session.uid.clone()),
            refreshed.id_token,
        );
        next.refresh_token = refreshed.refresh_token.or_else(|| session.refresh_token.clone());
        next.expires_in = lifetime(refreshed.expires_in.as_deref());
        Ok(next)
    }
}

/// Builder for AnonymousAuth.
#[derive(Debug, Default)]
pub struct AnonymousAuthBuilder {
    auth_url: Option<String>,
    token_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl AnonymousAuthBuilder {
    /// Set the identity service base URL
    /// (default: "https://identitytoolkit.googleapis.com/v1").
    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    /// Set the token refresh service base URL
    /// (default: "https://securetoken.googleapis.com/v1").
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    /// Set the project's web API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the provider.
    pub fn build(self) -> Result<AnonymousAuth, StoreError> {
        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(AnonymousAuth {
            client,
            auth_url: self
                .auth_url
                .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            token_url: self
                .token_url
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: self.api_key.unwrap_or_default(),
        })
    }
}

fn check_status(status: StatusCode) -> Result<(), StoreError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(StoreError::Auth("Permission denied".to_string()));
    }

    if !status.is_success() {
        return Err(StoreError::Http(format!("store returned status {}", status)));
    }

    Ok(())
}

/// Children of a query result keyed by store key.
///
/// Keys that look like array indices come back as a JSON array with holes.
fn children(value: Value) -> BTreeMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => BTreeMap::new(),
    }
}

enum StreamEnd {
    Eof,
    Closed(String),
    ReceiverGone,
}

async fn run_stream(inner: Arc<Inner>, path: String, tx: mpsc::UnboundedSender<ValueChange>) {
    let mut last = None;
    let mut delay = inner.reconnect_delay;

    loop {
        match stream_once(&inner, &path, &tx, &mut last).await {
            Ok(StreamEnd::ReceiverGone) => return,
            Ok(StreamEnd::Closed(reason)) => {
                warn!(path = %path, reason = %reason, "Store closed subscription stream");
                delay = inner.reconnect_delay;
            }
            Ok(StreamEnd::Eof) => {
                debug!(path = %path, "Subscription stream ended");
                delay = inner.reconnect_delay;
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Subscription stream failed");
                delay = (delay * 2).min(MAX_RECONNECT_DELAY);
            }
        }

        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}

/// Hold one streaming request open, forwarding every distinct value.
///
/// `last` survives reconnects so a replayed initial value is not
/// delivered twice.
async fn stream_once(
    inner: &Inner,
    path: &str,
    tx: &mpsc::UnboundedSender<ValueChange>,
    last: &mut Option<ValueChange>,
) -> Result<StreamEnd, StoreError> {
    let request = inner
        .stream_client
        .get(inner.endpoint(path))
        .header(ACCEPT, "text/event-stream");
    let response = inner.with_auth(request).send().await?;
    inner.check(response.status())?;

    let mut body = response.bytes_stream();
    let mut parser = EventParser::new();
    let mut mirror = Mirror::new();

    loop {
        let chunk = tokio::select! {
            _ = tx.closed() => return Ok(StreamEnd::ReceiverGone),
            chunk = body.next() => match chunk {
                Some(chunk) => chunk?,
                None => break,
            },
        };
        for event in parser.feed(&chunk) {
            match mirror.apply(&event)? {
                Applied::Changed => {
                    let current = mirror.current();
                    if last.as_ref() == Some(&current) {
                        continue;
                    }
                    if tx.send(current.clone()).is_err() {
                        return Ok(StreamEnd::ReceiverGone);
                    }
                    *last = Some(current);
                }
                Applied::Ignored => {}
                Applied::Closed(reason) => return Ok(StreamEnd::Closed(reason)),
                Applied::AuthRevoked => {
                    inner.session_rejected.store(true, Ordering::SeqCst);
                    return Ok(StreamEnd::Closed("auth token revoked".to_string()));
                }
            }
        }
    }

    Ok(StreamEnd::Eof)
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
    id_token: String,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

/// The token service answers in snake_case.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Accept one connection, capture its request head, write `response`
    /// and keep the socket open until the test ends.
    async fn serve_once(response: String) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (head_tx, head_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let _ = head_tx.send(String::from_utf8_lossy(&head).to_string());
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            std::future::pending::<()>().await;
        });

        (url, head_rx)
    }

    fn json_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    #[test]
    fn test_builder_defaults() {
        let client = RtdbClient::builder().build().unwrap();
        assert_eq!(client.url(), "http://localhost:9000");
        assert_eq!(client.inner.reconnect_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_endpoint() {
        let client = RtdbClient::builder()
            .url("https://vitals.example.com/")
            .build()
            .unwrap();

        assert_eq!(
            client.inner.endpoint("/sensors/heart/"),
            "https://vitals.example.com/sensors/heart.json"
        );
        assert_eq!(client.inner.endpoint(""), "https://vitals.example.com/.json");
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(StoreError::Auth(_))
        ));
        assert!(matches!(
            check_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(StoreError::Http(_))
        ));
    }

    #[test]
    fn test_children_from_object_and_array() {
        let from_object = children(json!({ "-Ma": { "ts": 1 }, "-Mb": { "ts": 2 } }));
        assert_eq!(from_object.len(), 2);
        assert_eq!(from_object["-Mb"], json!({ "ts": 2 }));

        let from_array = children(json!([null, { "ts": 1 }, { "ts": 2 }]));
        assert_eq!(from_array.keys().collect::<Vec<_>>(), vec!["1", "2"]);

        assert!(children(Value::Null).is_empty());
    }

    #[test]
    fn test_debug_hides_token() {
        let client = RtdbClient::builder().build().unwrap();
        client.authorize(&Session::new("u", "secret-token"));

        let debug = format!("{:?}", client);
        assert!(debug.contains("authorized: true"));
        assert!(!debug.contains("secret-token"));
    }

    #[tokio::test]
    async fn test_read_sends_auth_token() {
        let (url, head) = serve_once(json_response("200 OK", r#"{"bpm":"72","spo2":98}"#)).await;
        let client = RtdbClient::builder().url(url).build().unwrap();
        client.authorize(&Session::new("u", "tok"));

        let value = client.read("sensors/heart").await.unwrap();
        assert_eq!(value, Some(json!({ "bpm": "72", "spo2": 98 })));

        let head = head.await.unwrap();
        assert!(head.starts_with("GET /sensors/heart.json?auth=tok "));
    }

    #[tokio::test]
    async fn test_read_missing_path() {
        let (url, _head) = serve_once(json_response("200 OK", "null")).await;
        let client = RtdbClient::builder().url(url).build().unwrap();
        assert_eq!(client.read("text").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_permission_denied() {
        let (url, _head) = serve_once(json_response(
            "401 Unauthorized",
            r#"{"error":"Permission denied"}"#,
        ))
        .await;
        let client = RtdbClient::builder().url(url).build().unwrap();

        assert!(matches!(
            client.read("sensors/heart").await,
            Err(StoreError::Auth(_))
        ));
        assert!(client.session_rejected());

        client.authorize(&Session::new("u", "fresh"));
        assert!(!client.session_rejected());
    }

    #[tokio::test]
    async fn test_query_last_sends_ordering() {
        let body = r#"{"-Ma":{"ts":1,"hr":70},"-Mb":{"ts":2,"hr":71}}"#;
        let (url, head) = serve_once(json_response("200 OK", body)).await;
        let client = RtdbClient::builder().url(url).build().unwrap();

        let last = client.query_last("history", "ts", 20).await.unwrap();
        assert_eq!(last.len(), 2);

        let head = head.await.unwrap();
        assert!(head.contains("orderBy=%22ts%22"));
        assert!(head.contains("limitToLast=20"));
    }

    #[tokio::test]
    async fn test_subscribe_streams_mirrored_values() {
        let stream = concat!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\n",
            "event: put\ndata: {\"path\":\"/\",\"data\":{\"bpm\":70}}\n\n",
            "event: keep-alive\ndata: null\n\n",
            "event: patch\ndata: {\"path\":\"/\",\"data\":{\"spo2\":97}}\n\n",
        );
        let (url, head) = serve_once(stream.to_string()).await;
        let client = RtdbClient::builder().url(url).build().unwrap();

        let mut sub = client.subscribe("sensors/heart").await.unwrap();
        assert_eq!(sub.next().await, Some(Some(json!({ "bpm": 70 }))));
        assert_eq!(sub.next().await, Some(Some(json!({ "bpm": 70, "spo2": 97 }))));

        let head = head.await.unwrap();
        assert!(head.to_ascii_lowercase().contains("accept: text/event-stream"));

        client.unsubscribe(sub.id());
        client.unsubscribe(sub.id());
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_anonymous_sign_in() {
        let body = r#"{"localId":"uid-1","idToken":"token-1","expiresIn":"3600"}"#;
        let (url, head) = serve_once(json_response("200 OK", body)).await;
        let auth = AnonymousAuth::builder()
            .auth_url(url)
            .api_key("key-1")
            .build()
            .unwrap();

        let session = auth.sign_in_anonymously().await.unwrap();
        assert_eq!(session.uid, "uid-1");
        assert_eq!(session.id_token, "token-1");
        assert_eq!(session.refresh_token, None);
        assert_eq!(session.expires_in, Some(Duration::from_secs(3600)));

        let head = head.await.unwrap();
        assert!(head.starts_with("POST /accounts:signUp?key=key-1 "));
    }

    #[tokio::test]
    async fn test_refresh_exchanges_refresh_token() {
        let body = r#"{"id_token":"token-2","refresh_token":"refresh-2","expires_in":"3600","user_id":"uid-1"}"#;
        let (url, head) = serve_once(json_response("200 OK", body)).await;
        let auth = AnonymousAuth::builder()
            .token_url(url)
            .api_key("key-1")
            .build()
            .unwrap();

        let session = Session::new("uid-1", "token-1")
            .expiring(Some("refresh-1".to_string()), Duration::from_secs(3600));
        let refreshed = auth.refresh(&session).await.unwrap();

        assert_eq!(refreshed.uid, "uid-1");
        assert_eq!(refreshed.id_token, "token-2");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-2"));
        assert_eq!(refreshed.expires_in, Some(Duration::from_secs(3600)));

        let head = head.await.unwrap();
        assert!(head.starts_with("POST /token?key=key-1 "));
        assert!(head
            .to_ascii_lowercase()
            .contains("content-type: application/x-www-form-urlencoded"));
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let body = r#"{"error":{"message":"TOKEN_EXPIRED"}}"#;
        let (url, _head) = serve_once(json_response("400 Bad Request", body)).await;
        let auth = AnonymousAuth::builder().token_url(url).build().unwrap();

        let session = Session::new("uid-1", "token-1")
            .expiring(Some("refresh-1".to_string()), Duration::from_secs(3600));
        let err = auth.refresh(&session).await.unwrap_err();
        assert!(matches!(err, StoreError::Auth(ref msg) if msg.contains("TOKEN_EXPIRED")));
    }

    #[tokio::test]
    async fn test_revoked_stream_marks_session_rejected() {
        let stream = concat!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\n",
            "event: put\ndata: {\"path\":\"/\",\"data\":{\"bpm\":70}}\n\n",
            "event: auth_revoked\ndata: \"credential is no longer valid\"\n\n",
        );
        let (url, _head) = serve_once(stream.to_string()).await;
        let client = RtdbClient::builder().url(url).build().unwrap();
        client.authorize(&Session::new("u", "old"));

        let mut sub = client.subscribe("sensors/heart").await.unwrap();
        assert_eq!(sub.next().await, Some(Some(json!({ "bpm": 70 }))));

        for _ in 0..100 {
            if client.session_rejected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(client.session_rejected());
        client.unsubscribe(sub.id());
    }

    #[tokio::test]
    async fn test_anonymous_sign_in_rejected() {
        let body = r#"{"error":{"message":"ADMIN_ONLY_OPERATION"}}"#;
        let (url, _head) = serve_once(json_response("400 Bad Request", body)).await;
        let auth = AnonymousAuth::builder().auth_url(url).build().unwrap();

        let err = auth.sign_in_anonymously().await.unwrap_err();
        assert!(matches!(err, StoreError::Auth(ref msg) if msg.contains("ADMIN_ONLY_OPERATION")));
    }
}
