use serde::Deserialize;

/// Mapper configuration
///
/// Built fluently or read from JSON; keys missing from the JSON fall back to
/// the defaults of [`MapperConfig::new`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Separator placed between key field values in a composite id
    pub key_separator: String,

    /// Suffix that addresses the nested form of an association (`addresses_attributes`)
    pub nested_attributes_suffix: String,

    /// Emit a debug event for every ignored key in `process`
    pub log_unknown_keys: bool,
}

impl MapperConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self {
            key_separator: "-".to_string(),
            nested_attributes_suffix: "_attributes".to_string(),
            log_unknown_keys: true,
        }
    }

    /// Set the composite key separator
    pub fn key_separator(mut self, separator: &str) -> Self {
        self.key_separator = separator.to_string();
        self
    }

    /// Set the nested attributes suffix
    pub fn nested_attributes_suffix(mut self, suffix: &str) -> Self {
        self.nested_attributes_suffix = suffix.to_string();
        self
    }

    pub fn log_unknown_keys(mut self, enabled: bool) -> Self {
        self.log_unknown_keys = enabled;
        self
    }

    /// Parse from a JSON object
    ///
    /// # Examples
    ///
    /// ```
    /// use rustmemodm::MapperConfig;
    ///
    /// let config = MapperConfig::from_json_str(r#"{ "key_separator": "_" }"#).unwrap();
    /// assert_eq!(config.key_separator, "_");
    /// assert_eq!(config.nested_attributes_suffix, "_attributes");
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("Invalid mapper config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.key_separator.is_empty() {
            return Err("key_separator cannot be empty".to_string());
        }

        if self.nested_attributes_suffix.is_empty() {
            return Err("nested_attributes_suffix cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self::new()
    }
}
