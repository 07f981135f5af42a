//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Field-keyed validation messages. Rendered as form errors by the HTTP adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Adds "can't be blank" when `value` is None or an empty/whitespace string.
    pub fn require_text(&mut self, field: &str, value: Option<&str>) {
        if value.map(str::trim).unwrap_or_default().is_empty() {
            self.add(field, "can't be blank");
        }
    }

    /// Presence plus `>= 0` for an optional count.
    pub fn require_non_negative(&mut self, field: &str, value: Option<i64>) {
        match value {
            None => self.add(field, "can't be blank"),
            Some(n) if n < 0 => self.add(field, "must be greater than or equal to 0"),
            Some(_) => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(())` when nothing was recorded, otherwise `DomainError::Validation`.
    pub fn into_result(self) -> Result<(), DomainError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .flat_map(|(field, messages)| messages.iter().map(move |m| format!("{field} {m}")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("not authorized to {action} {subject}")]
    Forbidden { action: String, subject: String },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("{0} is not enabled for this chapter")]
    FeatureDisabled(&'static str),

    #[error("Repository error: {0}")]
    Repo(String),

    #[error("SMS gateway error: {0}")]
    Sms(String),

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("URL shortener error: {0}")]
    Shortener(String),

    #[error("Static map error: {0}")]
    Map(String),

    #[error("Report generation failed: {0}")]
    Report(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_helpers() {
        let mut errors = ValidationErrors::new();
        errors.require_text("address", Some("  "));
        errors.require_text("city", Some("Oakland"));
        errors.require_non_negative("num_adults", Some(-1));
        errors.require_non_negative("num_children", None);
        errors.require_non_negative("num_families", Some(0));

        assert!(errors.contains("address"));
        assert!(!errors.contains("city"));
        assert_eq!(
            errors.get("num_adults"),
            &["must be greater than or equal to 0".to_string()]
        );
        assert_eq!(errors.get("num_children"), &["can't be blank".to_string()]);
        assert!(errors.get("num_families").is_empty());
    }

    #[test]
    fn test_into_result_and_display() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let mut errors = ValidationErrors::new();
        errors.add("zip", "can't be blank");
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.to_string(), "validation failed: zip can't be blank");
    }
}
