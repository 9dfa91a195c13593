//! One-shot reads of the latest live values.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use vitalsync_store::StoreError;
use vitalsync_types::normalize::{field, normalize_number, normalize_text};
use vitalsync_types::{current_timestamp_ms, VitalsSnapshot};

use super::SensorPaths;
use crate::client::VitalsClient;

/// Reads the current sensor values into a [`VitalsSnapshot`].
///
/// A read never fails from the caller's point of view: if the store cannot
/// be reached, the result is [`VitalsSnapshot::unknown`].
#[derive(Debug, Clone)]
pub struct LiveReader {
    client: Arc<VitalsClient>,
    paths: SensorPaths,
}

impl LiveReader {
    pub fn new(client: Arc<VitalsClient>, paths: SensorPaths) -> Self {
        Self { client, paths }
    }

    /// Fetch the latest readings.
    ///
    /// `subject_id` is logged but does not scope the read: every subject
    /// shares the one set of sensor paths.
    pub async fn fetch_latest(&self, subject_id: &str) -> VitalsSnapshot {
        debug!(subject = subject_id, "Reading latest vitals (paths are not per subject)");

        match self.read_all().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Live read failed, reporting unknown vitals");
                VitalsSnapshot::unknown()
            }
        }
    }

    async fn read_all(&self) -> Result<VitalsSnapshot, StoreError> {
        self.client.ensure_auth().await;
        let store = self.client.store();

        let heart = store.read(&self.paths.heart).await?;
        let environment = store.read(&self.paths.environment).await?;
        // An existing primary wins even when it holds nothing usable.
        let transcript: Option<Value> = match store.read(&self.paths.transcript).await? {
            Some(primary) => Some(primary),
            None => store.read(&self.paths.transcript_fallback).await?,
        };

        Ok(VitalsSnapshot {
            heart_rate: normalize_number(field(heart.as_ref(), "bpm")),
            spo2: normalize_number(field(heart.as_ref(), "spo2")),
            skin_temperature_c: normalize_number(field(environment.as_ref(), "temperature")),
            transcript: normalize_text(transcript.as_ref()),
            captured_at: Some(current_timestamp_ms()),
        })
    }
}
