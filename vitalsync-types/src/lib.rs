//! # vitalsync-types
//!
//! Canonical record types for the vitalsync pipeline, plus the normalizer
//! that turns untyped remote values into them.
//!
//! Everything read from the realtime store arrives as an arbitrary JSON
//! tree: numbers may be strings, fields may be missing, and a sensor that
//! glitches can publish `NaN`. The [`normalize`] module is the one place
//! where that data is decoded. Every type in this crate holds only values
//! that passed through it:
//!
//! - [`VitalsSnapshot`]: the transient, merged view of the live readings
//! - [`HistoryPoint`]: one immutable, timestamped, persisted sample
//! - [`ChangeSignature`]: fingerprint of a point's values, ignoring time
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use vitalsync_types::{normalize, HistoryPoint};
//!
//! let heart = json!({ "bpm": "72", "spo2": 98 });
//! let bpm = normalize::normalize_number(normalize::field(Some(&heart), "bpm"));
//! assert_eq!(bpm, Some(72.0));
//!
//! let a = HistoryPoint::new(1_000, bpm, Some(98.0), None, None);
//! let b = HistoryPoint::new(2_000, bpm, Some(98.0), None, None);
//! assert_eq!(a.signature(), b.signature());
//! ```

pub mod normalize;

mod history;
mod snapshot;

pub use history::{ChangeSignature, HistoryPoint};
pub use snapshot::{VitalsSnapshot, VitalsSnapshotBuilder};

/// Get current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
