//! Where live readings come from.
//!
//! The sensors write into a handful of fixed paths in the remote store.
//! [`SensorPaths`] names them and [`LiveReader`] turns a one-shot read of
//! all of them into a [`VitalsSnapshot`](vitalsync_types::VitalsSnapshot).
//! The long-lived, push-driven counterpart is the
//! [`recorder`](crate::recorder).

mod reader;

pub use reader::LiveReader;

use serde::Deserialize;

/// Store paths the sensors publish to.
///
/// | Path | Fields |
/// |------|--------|
/// | `heart` | `bpm`, `spo2` |
/// | `environment` | `temperature` (°C) |
/// | `transcript` | plain text |
/// | `transcript_fallback` | plain text, used when `transcript` is absent |
/// | `history` | append-only log of history points |
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SensorPaths {
    pub heart: String,
    pub environment: String,
    pub transcript: String,
    pub transcript_fallback: String,
    pub history: String,
}

impl Default for SensorPaths {
    fn default() -> Self {
        Self {
            heart: "sensors/heart".to_string(),
            environment: "sensors/dht11".to_string(),
            transcript: "text".to_string(),
            transcript_fallback: "sensors/text".to_string(),
            history: "history".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let paths = SensorPaths::default();
        assert_eq!(paths.heart, "sensors/heart");
        assert_eq!(paths.environment, "sensors/dht11");
        assert_eq!(paths.transcript, "text");
        assert_eq!(paths.transcript_fallback, "sensors/text");
        assert_eq!(paths.history, "history");
    }

    #[test]
    fn test_partial_override() {
        let paths: SensorPaths = serde_json::from_str(r#"{ "heart": "ward3/heart" }"#).unwrap();
        assert_eq!(paths.heart, "ward3/heart");
        assert_eq!(paths.environment, "sensors/dht11");
    }
}
