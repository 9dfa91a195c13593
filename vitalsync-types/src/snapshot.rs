//! VitalsSnapshot - the current, merged view of live readings.

use serde::{Deserialize, Serialize};

/// A point-in-time view of the live vital signs.
///
/// Snapshots are rebuilt on every read and never persisted as-is. Every
/// numeric field is either finite or `None`. The serialized field names
/// match what display surfaces already consume.
///
/// # Example
///
/// ```rust
/// use vitalsync_types::VitalsSnapshot;
///
/// let snapshot = VitalsSnapshot::builder()
///     .heart_rate(72.0)
///     .spo2(98.0)
///     .captured_at(1_703_160_000_000)
///     .build();
///
/// assert!(!snapshot.is_unknown());
/// assert_eq!(snapshot.skin_temperature_c, None);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VitalsSnapshot {
    /// Beats per minute.
    #[serde(rename = "hr")]
    pub heart_rate: Option<f64>,

    /// Peripheral oxygen saturation, percent.
    pub spo2: Option<f64>,

    /// Skin temperature in degrees Celsius.
    #[serde(rename = "skinTemp")]
    pub skin_temperature_c: Option<f64>,

    /// Latest patient transcript.
    pub transcript: Option<String>,

    /// Local time of the read, milliseconds since Unix epoch.
    #[serde(rename = "ts")]
    pub captured_at: Option<u64>,
}

impl VitalsSnapshot {
    /// A snapshot where nothing is known, not even the capture time.
    ///
    /// Readers return this when the store cannot be reached.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Create a builder for constructing snapshots.
    pub fn builder() -> VitalsSnapshotBuilder {
        VitalsSnapshotBuilder::default()
    }

    /// True when every field, including the capture time, is absent.
    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }

    /// True when at least one vital sign is present.
    pub fn has_vitals(&self) -> bool {
        self.heart_rate.is_some() || self.spo2.is_some() || self.skin_temperature_c.is_some()
    }
}

/// Builder for constructing `VitalsSnapshot` instances.
///
/// Non-finite numbers passed to the builder are dropped, so a built
/// snapshot always upholds the finite-or-absent invariant.
#[derive(Debug, Default)]
pub struct VitalsSnapshotBuilder {
    snapshot: VitalsSnapshot,
}

impl VitalsSnapshotBuilder {
    /// Set the heart rate.
    pub fn heart_rate(mut self, bpm: f64) -> Self {
        self.snapshot.heart_rate = finite(bpm);
        self
    }

    /// Set the oxygen saturation.
    pub fn spo2(mut self, percent: f64) -> Self {
        self.snapshot.spo2 = finite(percent);
        self
    }

    /// Set the skin temperature in Celsius.
    pub fn skin_temperature_c(mut self, celsius: f64) -> Self {
        self.snapshot.skin_temperature_c = finite(celsius);
        self
    }

    /// Set the transcript.
    pub fn transcript(mut self, text: impl Into<String>) -> Self {
        self.snapshot.transcript = Some(text.into());
        self
    }

    /// Set the capture time (milliseconds since Unix epoch).
    pub fn captured_at(mut self, ts: u64) -> Self {
        self.snapshot.captured_at = Some(ts);
        self
    }

    /// Build the snapshot.
    pub fn build(self) -> VitalsSnapshot {
        self.snapshot
    }
}

fn finite(n: f64) -> Option<f64> {
    n.is_finite().then_some(n)
}
