use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use strata_rs_config::{FieldError, SchemaValidator};

/// Validator that records every tree it is handed.
///
/// It accepts everything unless built with [`RecordingValidator::rejecting`].
#[derive(Clone, Default)]
pub struct RecordingValidator {
    errors: Vec<FieldError>,
    seen: Arc<Mutex<Vec<Value>>>,
}

impl RecordingValidator {
    /// Validator that accepts everything, plus the sink of values it saw.
    pub fn new() -> (Self, Arc<Mutex<Vec<Value>>>) {
        let validator = Self::default();
        let seen = validator.seen.clone();
        (validator, seen)
    }

    /// Validator that records values and then fails with `errors`.
    pub fn rejecting(errors: Vec<FieldError>) -> (Self, Arc<Mutex<Vec<Value>>>) {
        let (mut validator, seen) = Self::new();
        validator.errors = errors;
        (validator, seen)
    }
}

impl SchemaValidator for RecordingValidator {
    type Output = Value;

    fn validate(&self, value: &Value) -> Result<Value, Vec<FieldError>> {
        self.seen.lock().push(value.clone());
        if self.errors.is_empty() {
            Ok(value.clone())
        } else {
            Err(self.errors.clone())
        }
    }
}
