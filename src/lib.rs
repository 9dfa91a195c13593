//! # vitalsync
//!
//! Patient vitals pipeline over a realtime key-value store.
//!
//! Sensors write heart rate, SpO2, skin temperature and a speech
//! transcript to fixed paths in the store. This crate reads them back,
//! records a change-gated history, serves both over HTTP and produces
//! AI summaries and prescription PDFs.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌─────────────────────────────────┐
//!  sensors ──write──▶  │ remote store (vitalsync-store)  │
//!                      └──┬──────────┬──────────▲────────┘
//!                  read   │  push    │   append │ query_last
//!                         ▼          ▼          │
//!                   ┌──────────┐ ┌──────────┐   │   ┌──────────────┐
//!                   │  source  │ │ recorder │───┘   │ data::history│
//!                   │LiveReader│ │ Recorder │       │ HistoryQuery │
//!                   └────┬─────┘ └──────────┘       └──────┬───────┘
//!                        └──────────────┬──────────────────┘
//!                                       ▼
//!                          server (HTTP) / vitalsync CLI
//!                          summary ─ document
//! ```
//!
//! - **[`client`]**: the shared store handle and the renewable sign-in gate
//! - **[`source`]**: sensor paths and one-shot live reads ([`LiveReader`])
//! - **[`recorder`]**: push subscriptions and the change-gated [`Recorder`]
//! - **[`data`]**: history windows, unit display and duration parsing
//! - **[`summary`]**: chat-completion summaries of transcript and vitals
//! - **[`document`]**: prescription form filling
//! - **[`server`]**: the backend HTTP API
//! - **[`config`]**: layered settings
//!
//! Values on the wire are loosely typed; everything passes through
//! [`vitalsync_types::normalize`] before use.
//!
//! ## Usage
//!
//! ```bash
//! # Latest vitals
//! VITALSYNC_STORE__URL=https://example.firebaseio.com vitalsync latest
//!
//! # Serve the API and record history in the same process
//! vitalsync --config vitalsync.toml serve --record
//! ```
//!
//! ### As a library
//!
//! ```
//! use std::sync::Arc;
//! use vitalsync::{HistoryQuery, LiveReader, SensorPaths, VitalsClient};
//! use vitalsync_store::{MemoryIdentity, MemoryStore};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! store.set("sensors/heart", serde_json::json!({ "bpm": 64, "spo2": 97 }));
//!
//! let client = Arc::new(VitalsClient::new(
//!     Arc::new(store),
//!     Arc::new(MemoryIdentity::new()),
//! ));
//! let paths = SensorPaths::default();
//!
//! let snapshot = LiveReader::new(Arc::clone(&client), paths.clone())
//!     .fetch_latest("bed-4")
//!     .await;
//! assert_eq!(snapshot.heart_rate, Some(64.0));
//!
//! let window = HistoryQuery::new(client, paths.history).recent(20).await;
//! assert!(window.is_empty());
//! # });
//! ```

pub mod client;
pub mod config;
pub mod data;
pub mod document;
pub mod recorder;
pub mod server;
pub mod source;
pub mod summary;

pub use client::{AuthGate, VitalsClient};
pub use config::Settings;
pub use data::{HistoryQuery, HistoryWindow};
pub use document::{DocumentFiller, PdfFormFiller, Prescription};
pub use recorder::{Recorder, RecorderHandle, SubscriptionState};
pub use source::{LiveReader, SensorPaths};
pub use summary::{ChatSummarizer, SummaryPanel, SummaryRequest, Summarizer};
