//! Configuration system for strata.

use serde::{Deserialize, Serialize};

use crate::error::{StrataError, StrataResult};
use crate::model::Layer;
use crate::sql;

/// Engine configuration.
///
/// The three schema names are explicit so that several engines (for example
/// one per test) can coexist in a single database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Schema holding the current-state tables of temporal tables.
    pub current_schema: String,
    /// Schema holding the append-only history tables.
    pub history_schema: String,
    /// Schema holding plain tables and the interfaces of temporal tables.
    pub public_schema: String,
    /// Prefix of the generated trigger functions and triggers.
    pub function_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            current_schema: "temporal".to_string(),
            history_schema: "history".to_string(),
            public_schema: "public".to_string(),
            function_prefix: "strata".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| StrataError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| StrataError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| StrataError::Configuration(e.to_string()))?,
            _ => {
                return Err(StrataError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables (and a `.env` file, if present).
    pub fn from_env() -> StrataResult<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(schema) = std::env::var("STRATA_CURRENT_SCHEMA") {
            config.current_schema = schema;
        }
        if let Ok(schema) = std::env::var("STRATA_HISTORY_SCHEMA") {
            config.history_schema = schema;
        }
        if let Ok(schema) = std::env::var("STRATA_PUBLIC_SCHEMA") {
            config.public_schema = schema;
        }
        if let Ok(prefix) = std::env::var("STRATA_FUNCTION_PREFIX") {
            config.function_prefix = prefix;
        }

        config.validate()?;
        Ok(config)
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Check that every name is a usable identifier and the three schemas are distinct.
    pub fn validate(&self) -> StrataResult<()> {
        for name in [
            &self.current_schema,
            &self.history_schema,
            &self.public_schema,
            &self.function_prefix,
        ] {
            sql::validate_identifier(name)
                .map_err(|e| StrataError::Configuration(e.to_string()))?;
        }

        // Trigger names are `<prefix>_<event>` and are never shortened.
        let longest_trigger = self.function_prefix.len() + "_insert".len();
        if longest_trigger > sql::MAX_IDENTIFIER_BYTES {
            return Err(StrataError::Configuration(format!(
                "function prefix '{}' leaves no room for trigger names (at most {} bytes)",
                self.function_prefix,
                sql::MAX_IDENTIFIER_BYTES - "_insert".len()
            )));
        }

        if self.current_schema == self.history_schema
            || self.current_schema == self.public_schema
            || self.history_schema == self.public_schema
        {
            return Err(StrataError::Configuration(format!(
                "current ({}), history ({}) and public ({}) schemas must be distinct",
                self.current_schema, self.history_schema, self.public_schema
            )));
        }

        Ok(())
    }

    /// Schema name backing the given layer.
    pub fn schema_for(&self, layer: Layer) -> &str {
        match layer {
            Layer::Public => &self.public_schema,
            Layer::Current => &self.current_schema,
            Layer::History => &self.history_schema,
        }
    }
}

/// Builder for EngineConfig.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the current-state schema.
    pub fn current_schema(mut self, schema: impl Into<String>) -> Self {
        self.config.current_schema = schema.into();
        self
    }

    /// Set the history schema.
    pub fn history_schema(mut self, schema: impl Into<String>) -> Self {
        self.config.history_schema = schema.into();
        self
    }

    /// Set the public schema.
    pub fn public_schema(mut self, schema: impl Into<String>) -> Self {
        self.config.public_schema = schema.into();
        self
    }

    /// Set the generated function prefix.
    pub fn function_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.function_prefix = prefix.into();
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> StrataResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.schema_for(Layer::Current), "temporal");
        assert_eq!(config.schema_for(Layer::History), "history");
        assert_eq!(config.schema_for(Layer::Public), "public");
    }

    #[test]
    fn test_builder_rejects_shared_schema() {
        let result = EngineConfig::builder()
            .current_schema("data")
            .history_schema("data")
            .build();
        assert!(matches!(result, Err(StrataError::Configuration(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_identifier() {
        let result = EngineConfig::builder().history_schema("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_prefix_too_long_for_trigger_names() {
        let result = EngineConfig::builder()
            .function_prefix("p".repeat(57))
            .build();
        assert!(matches!(result, Err(StrataError::Configuration(_))));

        assert!(EngineConfig::builder()
            .function_prefix("p".repeat(56))
            .build()
            .is_ok());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "current_schema = \"live\"\nhistory_schema = \"archive\"").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.current_schema, "live");
        assert_eq!(config.history_schema, "archive");
        assert_eq!(config.public_schema, "public");
        assert_eq!(config.function_prefix, "strata");
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "function_prefix: versioned").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.function_prefix, "versioned");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(StrataError::Configuration(_))
        ));
    }
}
