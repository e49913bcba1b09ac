//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check manifest integrity (unique names, known ancestors)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{CacheBackend, RouterConfig, ServiceManifest};
use crate::negotiation::canonical_mime;

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.cache.backend == CacheBackend::File && config.cache.directory.is_none() {
        errors.push(ValidationError::new("cache.directory", "required for the file backend"));
    }
    if canonical_mime(&config.negotiation.default_produces).is_none() {
        errors.push(ValidationError::new(
            "negotiation.default_produces",
            format!("`{}` is not a content type", config.negotiation.default_produces),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_manifest(manifest: &ServiceManifest) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for decl in &manifest.types {
        if decl.name.is_empty() {
            errors.push(ValidationError::new("types.name", "must not be empty"));
        } else if !names.insert(decl.name.as_str()) {
            errors.push(ValidationError::new(
                format!("types.{}", decl.name),
                "declared more than once",
            ));
        }
    }

    for decl in &manifest.types {
        let ancestors = decl
            .extends
            .iter()
            .chain(decl.mixins.iter())
            .chain(decl.interfaces.iter());
        for ancestor in ancestors {
            if !names.contains(ancestor.as_str()) && !ancestor.starts_with(crate::metadata::RESERVED_NAMESPACE) {
                errors.push(ValidationError::new(
                    format!("types.{}", decl.name),
                    format!("unknown ancestor `{}`", ancestor),
                ));
            }
        }
    }

    for name in &manifest.bind {
        if !names.contains(name.as_str()) {
            errors.push(ValidationError::new("bind", format!("unknown type `{}`", name)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::declaration::TypeDeclaration;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RouterConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.timeouts.request_secs = 0;
        config.cache.backend = CacheBackend::File;
        config.negotiation.default_produces = "json-ish".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "timeouts.request_secs",
                "cache.directory",
                "negotiation.default_produces"
            ]
        );
    }

    #[test]
    fn test_manifest_checks() {
        let manifest = ServiceManifest {
            types: vec![
                TypeDeclaration::new("A").extends("Missing"),
                TypeDeclaration::new("A"),
                TypeDeclaration::new("B").extends("router::Base"),
            ],
            bind: vec!["C".into()],
        };
        let errors = validate_manifest(&manifest).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].to_string(), "types.A: declared more than once");
    }
}
