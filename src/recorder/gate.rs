use vitalsync_types::{ChangeSignature, HistoryPoint};

/// Admits a sample only when its values differ from the last admitted one.
#[derive(Debug, Default)]
pub struct ChangeGate {
    last: Option<ChangeSignature>,
}

impl ChangeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `point` against the last admitted signature.
    ///
    /// Returns `true` and remembers the new signature when the values
    /// changed (or nothing was admitted yet). Timestamps are ignored.
    pub fn admit(&mut self, point: &HistoryPoint) -> bool {
        let signature = point.signature();
        if self.last.as_ref() == Some(&signature) {
            return false;
        }
        self.last = Some(signature);
        true
    }

    /// Signature of the last admitted sample.
    pub fn last(&self) -> Option<&ChangeSignature> {
        self.last.as_ref()
    }
}
