use std::sync::{Mutex, PoisonError};

use crate::telemetry::Prediction;

/// Holds the most recently accepted prediction. Not persisted.
#[derive(Debug, Default)]
pub struct PredictionCache {
    latest: Mutex<Option<Prediction>>,
}

impl PredictionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces both fields at once; readers never see a mix of two writes.
    pub fn set_prediction(&self, prediction: Prediction) {
        // A poisoned lock still holds a whole value, assignment can't tear it.
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(prediction);
    }

    pub fn get_prediction(&self) -> Option<Prediction> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
