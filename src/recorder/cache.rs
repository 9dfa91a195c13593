//! Latest-value cache fed by subscription pushes.

use serde_json::Value;
use vitalsync_types::normalize::{field, normalize_number, normalize_text};
use vitalsync_types::HistoryPoint;

/// The four subscribed feeds and the cache slots each one owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// `bpm` and `spo2`.
    Heart,
    /// `temperature`.
    Environment,
    /// The primary transcript.
    Transcript,
    /// The fallback transcript.
    TranscriptFallback,
}

/// Most recent normalized value of every subscribed field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestValues {
    heart_rate: Option<f64>,
    spo2: Option<f64>,
    temperature_c: Option<f64>,
    transcript: Option<String>,
    /// The primary path exists, whether or not it held usable text.
    primary_present: bool,
    transcript_fallback: Option<String>,
}

impl LatestValues {
    /// Apply a push from `feed`. `None` means the path no longer exists and
    /// clears that feed's slots.
    pub fn apply(&mut self, feed: Feed, value: Option<&Value>) {
        match feed {
            Feed::Heart => {
                self.heart_rate = normalize_number(field(value, "bpm"));
                self.spo2 = normalize_number(field(value, "spo2"));
            }
            Feed::Environment => {
                self.temperature_c = normalize_number(field(value, "temperature"));
            }
            Feed::Transcript => {
                self.primary_present = value.is_some();
                self.transcript = normalize_text(value);
            }
            Feed::TranscriptFallback => self.transcript_fallback = normalize_text(value),
        }
    }

    /// Primary transcript while its path exists, else the fallback.
    pub fn transcript(&self) -> Option<&str> {
        if self.primary_present {
            self.transcript.as_deref()
        } else {
            self.transcript_fallback.as_deref()
        }
    }

    /// Build a history point from the cached values.
    pub fn sample(&self, recorded_at: u64) -> HistoryPoint {
        HistoryPoint::new(
            recorded_at,
            self.heart_rate,
            self.spo2,
            self.temperature_c,
            self.transcript().map(str::to_string),
        )
    }
}
