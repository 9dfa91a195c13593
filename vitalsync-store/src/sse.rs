//! Server-sent event stream parsing for realtime database subscriptions.
//!
//! The hosted database streams a subscribed path as `text/event-stream`.
//! Each event is one of:
//!
//! - `put`: `{"path": "/a/b", "data": ...}` replaces the value at `path`
//! - `patch`: `{"path": "/a", "data": {"k": v}}` replaces each child `k`
//! - `keep-alive`: no payload
//! - `cancel` / `auth_revoked`: the server is closing the subscription
//!
//! [`Mirror`] applies these to a local copy of the subtree so a subscriber
//! always sees the full current value.

use serde::Deserialize;
use serde_json::Value;

use crate::tree;
use crate::StoreError;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser.
///
/// Feed it raw chunks as they arrive; it buffers partial lines (including
/// UTF-8 sequences split across chunks) and returns complete events.
#[derive(Debug, Default)]
pub struct EventParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of the stream and return every completed event.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ServerEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            let (name, value) = match line.split_once(':') {
                Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match name {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<ServerEvent> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if event.is_none() && data.is_empty() {
            return None;
        }

        Some(ServerEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: data.join("\n"),
        })
    }
}

/// What applying an event did to the mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The mirrored value changed (or was delivered for the first time).
    Changed,
    /// Nothing to deliver.
    Ignored,
    /// The server ended the subscription.
    Closed(String),
    /// The server ended the subscription because the token is no longer
    /// valid.
    AuthRevoked,
}

#[derive(Debug, Deserialize)]
struct Payload {
    path: String,
    data: Value,
}

/// Local copy of a subscribed subtree.
#[derive(Debug, Default)]
pub struct Mirror {
    value: Value,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current mirrored value, `None` if the path does not exist.
    pub fn current(&self) -> Option<Value> {
        (!self.value.is_null()).then(|| self.value.clone())
    }

    /// Apply one server event.
    pub fn apply(&mut self, event: &ServerEvent) -> Result<Applied, StoreError> {
        match event.event.as_str() {
            "put" => {
                let payload = parse_payload(&event.data)?;
                tree::set(&mut self.value, &tree::segments(&payload.path), payload.data);
                Ok(Applied::Changed)
            }
            "patch" => {
                let payload = parse_payload(&event.data)?;
                let Value::Object(update) = payload.data else {
                    return Err(StoreError::Parse("patch data is not an object".to_string()));
                };
                tree::merge(&mut self.value, &tree::segments(&payload.path), update);
                Ok(Applied::Changed)
            }
            "cancel" => Ok(Applied::Closed("cancelled by server".to_string())),
            "auth_revoked" => Ok(Applied::AuthRevoked),
            _ => Ok(Applied::Ignored),
        }
    }
}

fn parse_payload(data: &str) -> Result<Payload, StoreError> {
    serde_json::from_str(data).map_err(|e| StoreError::Parse(e.to_string()))
}
