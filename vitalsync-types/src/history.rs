//! History points and change signatures.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::{field, normalize_number, normalize_text};

/// One persisted vitals sample.
///
/// History points are appended to the store's history log and never
/// updated. The serialized field names (`ts`, `hr`, `spo2`, `temp`,
/// `text`) are the ones already present in deployed history logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Producer-assigned time, milliseconds since Unix epoch.
    #[serde(rename = "ts")]
    pub recorded_at: u64,

    /// Beats per minute.
    #[serde(rename = "hr")]
    pub heart_rate: Option<f64>,

    /// Oxygen saturation, percent.
    pub spo2: Option<f64>,

    /// Skin temperature in degrees Celsius.
    #[serde(rename = "temp")]
    pub temperature_c: Option<f64>,

    /// Transcript at the time of the sample.
    #[serde(rename = "text")]
    pub transcript: Option<String>,
}

impl HistoryPoint {
    /// Create a new history point.
    pub fn new(
        recorded_at: u64,
        heart_rate: Option<f64>,
        spo2: Option<f64>,
        temperature_c: Option<f64>,
        transcript: Option<String>,
    ) -> Self {
        Self {
            recorded_at,
            heart_rate,
            spo2,
            temperature_c,
            transcript,
        }
    }

    /// Decode a point read back from the store.
    ///
    /// Values go through the normalizer. Returns `None` when the value is
    /// not an object or carries no usable timestamp.
    pub fn from_remote(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let ts = normalize_number(field(Some(value), "ts"))?;
        if ts < 0.0 {
            return None;
        }

        Some(Self {
            recorded_at: ts as u64,
            heart_rate: normalize_number(field(Some(value), "hr")),
            spo2: normalize_number(field(Some(value), "spo2")),
            temperature_c: normalize_number(field(Some(value), "temp")),
            transcript: normalize_text(field(Some(value), "text")),
        })
    }

    /// True when no vital sign and no transcript is present.
    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_none()
            && self.spo2.is_none()
            && self.temperature_c.is_none()
            && self.transcript.is_none()
    }

    /// Compute the change signature of this point.
    ///
    /// The signature covers the vitals and the transcript, never
    /// `recorded_at`.
    pub fn signature(&self) -> ChangeSignature {
        let fields = SignatureFields {
            hr: self.heart_rate,
            spo2: self.spo2,
            temp: self.temperature_c,
            text: self.transcript.as_deref(),
        };
        // Serializing plain options and a str cannot fail.
        ChangeSignature(serde_json::to_string(&fields).unwrap_or_default())
    }
}

#[derive(Serialize)]
struct SignatureFields<'a> {
    hr: Option<f64>,
    spo2: Option<f64>,
    temp: Option<f64>,
    text: Option<&'a str>,
}

/// Fingerprint of a sample's values, used for change detection.
///
/// Two points with the same vitals and transcript have equal signatures,
/// whatever their timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeSignature(String);

impl ChangeSignature {
    /// The canonical serialization this signature was built from.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_ignores_timestamp() {
        let a = HistoryPoint::new(1, Some(72.0), Some(98.0), Some(37.2), None);
        let b = HistoryPoint::new(999_999, Some(72.0), Some(98.0), Some(37.2), None);
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn signature_tracks_every_value_field() {
        let base = HistoryPoint::new(1, Some(72.0), Some(98.0), Some(37.2), None);

        let mut hr = base.clone();
        hr.heart_rate = Some(73.0);
        let mut spo2 = base.clone();
        spo2.spo2 = None;
        let mut temp = base.clone();
        temp.temperature_c = Some(37.3);
        let mut text = base.clone();
        text.transcript = Some("hello".to_string());

        for changed in [hr, spo2, temp, text] {
            assert_ne!(base.signature(), changed.signature());
        }
    }

    #[test]
    fn serializes_with_stored_field_names() {
        let point = HistoryPoint::new(1703160000000, Some(72.0), None, Some(37.2), None);
        let json = serde_json::to_value(&point).unwrap();

        assert_eq!(
            json,
            json!({ "ts": 1703160000000u64, "hr": 72.0, "spo2": null, "temp": 37.2, "text": null })
        );
    }

    #[test]
    fn from_remote_normalizes_dirty_values() {
        let value = json!({ "ts": 1703160000000u64, "hr": "72", "spo2": "NaN", "text": "  ok " });
        let point = HistoryPoint::from_remote(&value).unwrap();

        assert_eq!(point.recorded_at, 1703160000000);
        assert_eq!(point.heart_rate, Some(72.0));
        assert_eq!(point.spo2, None);
        assert_eq!(point.temperature_c, None);
        assert_eq!(point.transcript.as_deref(), Some("ok"));
    }

    #[test]
    fn from_remote_requires_a_timestamp() {
        assert!(HistoryPoint::from_remote(&json!({ "hr": 72 })).is_none());
        assert!(HistoryPoint::from_remote(&json!({ "ts": "soon" })).is_none());
        assert!(HistoryPoint::from_remote(&json!({ "ts": -5 })).is_none());
        assert!(HistoryPoint::from_remote(&json!(42)).is_none());
        assert!(HistoryPoint::from_remote(&Value::Null).is_none());
    }

    #[test]
    fn empty_point() {
        assert!(HistoryPoint::new(1, None, None, None, None).is_empty());
        assert!(!HistoryPoint::new(1, None, Some(97.0), None, None).is_empty());
    }
}
