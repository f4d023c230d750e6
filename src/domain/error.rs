use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Recoverable validation failure with field-level detail.
///
/// Guarantees that zero writes occurred for the operation that raised it.
#[derive(Debug, Clone, Error)]
#[error("validation failed: {}", self.summary())]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    fn summary(&self) -> String {
        let fields: Vec<&str> = self
            .violations
            .iter()
            .map(|v| v.field.as_str())
            .collect();
        format!("{} violation(s) on [{}]", self.violations.len(), fields.join(", "))
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}
