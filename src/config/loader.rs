//! Configuration and manifest loading from disk.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::config::schema::{RouterConfig, ServiceManifest};
use crate::config::validation::{validate_config, validate_manifest, ValidationError};
use crate::metadata::declaration::TypeRegistry;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate a service manifest from a TOML file.
///
/// The manifest file itself becomes a source unit of every declaration in
/// it, so editing the manifest invalidates persisted descriptors.
pub fn load_manifest(path: &Path) -> Result<ServiceManifest, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut manifest = parse_manifest(&content)?;
    let unit = path.to_string_lossy().to_string();
    for decl in &mut manifest.types {
        if !decl.sources.contains(&unit) {
            decl.sources.push(unit.clone());
        }
    }
    Ok(manifest)
}

pub fn parse_manifest(content: &str) -> Result<ServiceManifest, ConfigError> {
    let manifest: ServiceManifest = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_manifest(&manifest).map_err(ConfigError::Validation)?;
    Ok(manifest)
}

impl ServiceManifest {
    /// Register every declared type in a fresh registry.
    pub fn registry(&self) -> TypeRegistry {
        let registry = TypeRegistry::new();
        for decl in &self.types {
            registry.register(decl.clone());
        }
        registry
    }

    /// Names of the types to bind, in declaration order.
    ///
    /// Without an explicit list these are the leaf types: a type another
    /// declaration extends, mixes in or implements already reaches the
    /// routing table through that descendant.
    pub fn bound_types(&self) -> Vec<String> {
        if !self.bind.is_empty() {
            return self.bind.clone();
        }
        let inherited: HashSet<&str> = self
            .types
            .iter()
            .flat_map(|t| t.extends.iter().chain(&t.mixins).chain(&t.interfaces))
            .map(String::as_str)
            .collect();
        self.types
            .iter()
            .filter(|t| !inherited.contains(t.name.as_str()))
            .map(|t| t.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::CacheBackend;

    const MANIFEST: &str = r#"
bind = ["Users"]

[[types]]
name = "Base"
doc = "/** @produces json */"

[[types]]
name = "Users"
extends = "Base"
sources = ["users.rs"]
doc = "/** @path /users */"

[[types.methods]]
name = "show"
doc = """
/**
 * @path /:id:int
 * @verbs GET
 */
"""
params = [{ name = "id", type = "int" }]

[[types.properties]]
name = "table"
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        assert_eq!(manifest.types.len(), 2);
        assert_eq!(manifest.bound_types(), vec!["Users"]);

        let users = &manifest.types[1];
        assert_eq!(users.extends.as_deref(), Some("Base"));
        assert_eq!(users.methods[0].params[0].ty, "int");
        assert_eq!(users.properties[0].name, "table");

        let registry = manifest.registry();
        assert!(registry.contains("Base"));
        assert!(registry.contains("Users"));
    }

    #[test]
    fn test_default_bind_skips_ancestors() {
        let mut manifest = parse_manifest(MANIFEST).unwrap();
        manifest.bind.clear();
        assert_eq!(manifest.bound_types(), vec!["Users"]);

        let router = crate::lifecycle::build_router(&RouterConfig::default(), &manifest, Vec::new()).unwrap();
        assert!(router.table().contains_type("Users"));
        assert!(!router.table().contains_type("Base"));
    }

    #[test]
    fn test_load_manifest_records_its_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, MANIFEST.as_bytes()).unwrap();
        let unit = file.path().to_string_lossy().to_string();

        let manifest = load_manifest(file.path()).unwrap();
        assert_eq!(manifest.types[0].sources, vec![unit.clone()]);
        assert_eq!(manifest.types[1].sources, vec!["users.rs".to_string(), unit]);
    }

    #[test]
    fn test_reserved_ancestor_binds() {
        let manifest = parse_manifest(
            r#"
[[types]]
name = "Orders"
extends = "router::Base"

[[types.methods]]
name = "list"
doc = "/** @path /orders */"
"#,
        )
        .unwrap();

        let router = crate::lifecycle::build_router(&RouterConfig::default(), &manifest, Vec::new()).unwrap();
        assert_eq!(router.routes().len(), 1);
    }

    #[test]
    fn test_parse_config_defaults() {
        let config = parse_config(
            r#"
[cache]
backend = "file"
directory = "/tmp/descriptors"

[negotiation]
strict = false
"#,
        )
        .unwrap();
        assert_eq!(config.cache.backend, CacheBackend::File);
        assert!(!config.negotiation.strict);
        assert_eq!(config.negotiation.default_produces, "application/json");
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_config_errors() {
        assert!(matches!(parse_config("listener = 3"), Err(ConfigError::Parse(_))));

        let err = parse_config("[timeouts]\nrequest_secs = 0").unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: timeouts.request_secs: must be greater than 0");

        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
