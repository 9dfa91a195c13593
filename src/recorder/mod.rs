//! Live subscriptions and the change-gated history recorder.
//!
//! A recorder is one tokio task. It signs in through the shared
//! [`AuthGate`](crate::client::AuthGate), subscribes to the four sensor
//! feeds and keeps their latest values in a cache it alone owns. On every
//! tick it samples the cache and appends a history point when the values
//! differ from the last recorded ones.
//!
//! ```text
//!   heart ───────────┐
//!   environment ─────┤  push   ┌──────────────┐  tick  ┌────────────┐  append
//!   transcript ──────┼───────▶ │ LatestValues │ ─────▶ │ ChangeGate │ ───────▶ history
//!   fallback text ───┘         └──────────────┘        └────────────┘
//! ```
//!
//! Pushes, ticks and the stop signal are multiplexed with a biased
//! `select!`, so the cache is never touched by two things at once. Appends
//! run in their own tasks; a failed append is logged and not retried. A
//! slower timer lets the gate renew an expiring session while the recorder
//! runs.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vitalsync::client::VitalsClient;
//! use vitalsync::recorder::{Recorder, SubscriptionState};
//! use vitalsync::source::SensorPaths;
//! use vitalsync_store::{MemoryIdentity, MemoryStore};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! let client = Arc::new(VitalsClient::new(
//!     Arc::new(store.clone()),
//!     Arc::new(MemoryIdentity::new()),
//! ));
//!
//! let handle = Recorder::start(client, SensorPaths::default(), Duration::from_secs(5));
//! let mut state = handle.state();
//! state.wait_for(|s| *s == SubscriptionState::Subscribed).await.unwrap();
//!
//! handle.stop();
//! # });
//! ```

mod cache;
mod gate;

pub use cache::{Feed, LatestValues};
pub use gate::ChangeGate;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use vitalsync_store::{RemoteStore, Subscription, SubscriptionId, ValueChange};
use vitalsync_types::{current_timestamp_ms, HistoryPoint};

use crate::client::VitalsClient;
use crate::source::SensorPaths;

/// Default time between samples.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// How often the recorder lets the auth gate renew a due session.
pub const AUTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Progress of the recorder's subscription setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// The task has not started yet.
    Uninitialized,
    /// Waiting on the authentication gate.
    Authenticating,
    /// Subscriptions are set up (some may have failed) and ticks run.
    Subscribed,
}

/// The recorder task's state.
#[derive(Debug)]
pub struct Recorder {
    client: Arc<VitalsClient>,
    paths: SensorPaths,
    cache: LatestValues,
    gate: ChangeGate,
}

impl Recorder {
    /// Spawn a recorder sampling every `interval`.
    ///
    /// The first sample is taken one full interval after the call. Returns
    /// a handle that stops the recorder when stopped or dropped.
    pub fn start(client: Arc<VitalsClient>, paths: SensorPaths, interval: Duration) -> RecorderHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Uninitialized);

        // A zero period would make the interval panic.
        let interval = interval.max(Duration::from_millis(1));

        let recorder = Recorder {
            client,
            paths,
            cache: LatestValues::default(),
            gate: ChangeGate::new(),
        };
        let task = tokio::spawn(recorder.run(interval, state_tx, stop_rx));

        RecorderHandle {
            stop_tx,
            state_rx,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        interval: Duration,
        state_tx: watch::Sender<SubscriptionState>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut auth_check =
            tokio::time::interval_at(Instant::now() + AUTH_CHECK_INTERVAL, AUTH_CHECK_INTERVAL);
        auth_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        state_tx.send_replace(SubscriptionState::Authenticating);
        tokio::select! {
            biased;
            _ = stopped(&mut stop_rx) => {
                debug!("Recorder stopped before sign-in finished");
                return;
            }
            _ = self.client.ensure_auth() => {}
        }

        let store = Arc::clone(self.client.store());
        let mut heart = subscribe(store.as_ref(), &self.paths.heart).await;
        let mut environment = subscribe(store.as_ref(), &self.paths.environment).await;
        let mut transcript = subscribe(store.as_ref(), &self.paths.transcript).await;
        let mut fallback = subscribe(store.as_ref(), &self.paths.transcript_fallback).await;

        let ids: Vec<SubscriptionId> = [&heart, &environment, &transcript, &fallback]
            .into_iter()
            .flatten()
            .map(Subscription::id)
            .collect();

        state_tx.send_replace(SubscriptionState::Subscribed);
        info!(
            subscriptions = ids.len(),
            interval_ms = interval.as_millis() as u64,
            "Recorder running"
        );

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut stop_rx) => break,
                change = next_change(&mut heart) => self.cache.apply(Feed::Heart, change.as_ref()),
                change = next_change(&mut environment) => self.cache.apply(Feed::Environment, change.as_ref()),
                change = next_change(&mut transcript) => self.cache.apply(Feed::Transcript, change.as_ref()),
                change = next_change(&mut fallback) => self.cache.apply(Feed::TranscriptFallback, change.as_ref()),
                _ = ticker.tick() => self.tick(&store),
                _ = auth_check.tick() => self.renew_session(),
            }
        }

        for id in ids {
            store.unsubscribe(id);
        }
        info!("Recorder stopped");
    }

    /// Sample the cache and append the point if its values changed.
    fn tick(&mut self, store: &Arc<dyn RemoteStore>) {
        let point = self.cache.sample(current_timestamp_ms());
        if !self.gate.admit(&point) {
            debug!("Vitals unchanged, skipping write");
            return;
        }

        debug!(ts = point.recorded_at, "Vitals changed, appending history point");
        tokio::spawn(append(Arc::clone(store), self.paths.history.clone(), point));
    }

    /// Give the auth gate a chance to renew the session off the loop.
    fn renew_session(&self) {
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            client.ensure_auth().await;
        });
    }
}

async fn append(store: Arc<dyn RemoteStore>, path: String, point: HistoryPoint) {
    let value = match serde_json::to_value(&point) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to encode history point");
            return;
        }
    };

    match store.append(&path, value).await {
        Ok(key) => debug!(key = %key, "History point written"),
        Err(e) => warn!(error = %e, path = %path, "Failed to append history point"),
    }
}

async fn subscribe(store: &dyn RemoteStore, path: &str) -> Option<Subscription> {
    match store.subscribe(path).await {
        Ok(subscription) => Some(subscription),
        Err(e) => {
            warn!(error = %e, path, "Subscription failed, the path stays absent");
            None
        }
    }
}

/// Wait for the next push on a feed. Never resolves for a missing or
/// ended subscription.
async fn next_change(slot: &mut Option<Subscription>) -> ValueChange {
    loop {
        let Some(subscription) = slot.as_mut() else {
            return std::future::pending().await;
        };
        match subscription.next().await {
            Some(change) => return change,
            None => {
                warn!(path = subscription.path(), "Subscription ended by the store");
                *slot = None;
            }
        }
    }
}

/// Resolve once a stop is requested or the handle is gone.
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    while !*stop_rx.borrow_and_update() {
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Handle for controlling a running recorder.
///
/// Drop this handle to stop the recorder, or call `stop()` explicitly.
#[derive(Debug)]
pub struct RecorderHandle {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<SubscriptionState>,
    task: Option<JoinHandle<()>>,
}

impl RecorderHandle {
    /// Stop the recorder: cancel the timer and unsubscribe every feed.
    ///
    /// Calling it again has no effect. Appends already in flight may still
    /// complete.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// True once `stop` was called.
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Watch the subscription state.
    pub fn state(&self) -> watch::Receiver<SubscriptionState> {
        self.state_rx.clone()
    }

    /// Wait for the recorder task to finish. Call `stop` first.
    pub async fn wait(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Recorder task failed");
            }
        }
    }
}

impl Drop for RecorderHandle {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}
