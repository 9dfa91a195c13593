//! # vitalsync-store
//!
//! Clients for the hosted key-tree database that holds sensor readings and
//! the vitals history log, plus the anonymous identity provider that
//! guards it.
//!
//! Everything above this crate talks to the [`RemoteStore`] and
//! [`IdentityProvider`] traits:
//!
//! - [`rtdb::RtdbClient`] / [`rtdb::AnonymousAuth`] (`rtdb` feature) speak
//!   the hosted REST and streaming API
//! - [`MemoryStore`] / [`MemoryIdentity`] keep everything in process, for
//!   tests and demos
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use vitalsync_store::{MemoryStore, RemoteStore};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! let mut heart = store.subscribe("sensors/heart").await.unwrap();
//! assert_eq!(heart.next().await, Some(None));
//!
//! store.set("sensors/heart", json!({ "bpm": "72", "spo2": 98 }));
//! assert_eq!(heart.next().await, Some(Some(json!({ "bpm": "72", "spo2": 98 }))));
//!
//! store.unsubscribe(heart.id());
//! # });
//! ```

pub mod error;
mod memory;
mod store;
pub mod tree;

#[cfg(feature = "rtdb")]
pub mod rtdb;

#[cfg(feature = "rtdb")]
mod sse;

pub use error::StoreError;
pub use memory::{MemoryIdentity, MemoryStore};
pub use store::{IdentityProvider, RemoteStore, Session, Subscription, SubscriptionId, ValueChange};
