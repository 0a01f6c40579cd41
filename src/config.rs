//! Settings and client defaults.
//!
//! # Overview
//!
//! Credentials are flat named settings (`minimax_api_key`, `mistral_api_base`, ...)
//! read from a TOML file. Any setting can be overridden by an environment
//! variable with the upper-cased name (`MISTRAL_API_KEY`).
//!
//! # Settings File Location
//!
//! Searched in order:
//! 1. `UNICHAT_SETTINGS` environment variable
//! 2. `./unichat.toml` (current working directory)
//! 3. `~/.unichat/settings.toml` (user config)
//!
//! A missing file is not an error: lookups then fall through to the environment.
//!
//! # Example
//!
//! ```toml
//! minimax_api_key = "..."
//! minimax_api_base = "https://api.minimax.chat/v1/text/chatcompletion_v2"
//! mistral_api_key = "..."
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{LlmError, Result};
use crate::providers::ProviderDescriptor;

/// Environment variable naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "UNICHAT_SETTINGS";

// ============================================================================
// Settings
// ============================================================================

/// Named string settings with environment overrides.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default location.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
            if Path::new(&path).exists() {
                return Self::from_file(&path);
            }
            debug!(path = %path, "settings file named by {} not found", SETTINGS_PATH_ENV);
        }

        let local_path = Path::new("unichat.toml");
        if local_path.exists() {
            return Self::from_file(local_path);
        }

        if let Some(home) = dirs::home_dir() {
            let user_path = home.join(".unichat").join("settings.toml");
            if user_path.exists() {
                return Self::from_file(&user_path);
            }
        }

        Ok(Self::default())
    }

    /// Load settings from a specific file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LlmError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "loaded settings file");
        Self::from_toml(&content)
    }

    /// Parse settings from a TOML string of top-level scalar keys.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(toml_str)
            .map_err(|e| LlmError::ConfigError(format!("invalid settings file: {}", e)))?;

        let mut values = HashMap::with_capacity(table.len());
        for (key, value) in table {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(LlmError::ConfigError(format!(
                        "setting '{}' must be a scalar, got {}",
                        key,
                        other.type_str()
                    )))
                }
            };
            values.insert(key, text);
        }
        Ok(Self { values })
    }

    /// Set a value (file layer).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Look up a setting. The environment wins over the file.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Ok(value) = std::env::var(name.to_uppercase()) {
            if !value.is_empty() {
                return Some(value);
            }
        }
        self.values.get(name).filter(|v| !v.is_empty()).cloned()
    }

    /// Resolve credentials for a provider.
    ///
    /// The API key is required. The base URL falls back to the provider's
    /// public endpoint when one is known.
    pub fn credentials(&self, descriptor: &ProviderDescriptor) -> Result<Credentials> {
        let api_key = self.get(descriptor.api_key_setting).ok_or_else(|| {
            LlmError::ConfigError(format!("missing setting '{}'", descriptor.api_key_setting))
        })?;

        let api_base = self
            .get(descriptor.api_base_setting)
            .or_else(|| descriptor.default_api_base.map(str::to_string))
            .ok_or_else(|| {
                LlmError::ConfigError(format!("missing setting '{}'", descriptor.api_base_setting))
            })?;

        Ok(Credentials { api_key, api_base })
    }
}

/// API key and base URL for one provider.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_base: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

// ============================================================================
// Client defaults
// ============================================================================

/// Bound on connecting and on each read, for sync and async paths alike.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Values used when a request leaves a field unset.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientDefaults {
    /// Overrides the provider's default model when set.
    pub model: Option<String>,
    pub stream: bool,
    pub temperature: f32,
    /// Overrides the provider's default output budget when set.
    pub max_tokens: Option<usize>,
    pub tool_choice: String,
    pub timeout: Duration,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            model: None,
            stream: true,
            temperature: 0.7,
            max_tokens: None,
            tool_choice: "auto".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientDefaults {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MINIMAX, MISTRAL};
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_from_toml_scalars() {
        let settings = Settings::from_toml(
            r#"
            minimax_api_key = "mm-key"
            request_retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(settings.get("minimax_api_key").as_deref(), Some("mm-key"));
        assert_eq!(settings.get("request_retries").as_deref(), Some("3"));
    }

    #[test]
    fn test_from_toml_rejects_tables() {
        let err = Settings::from_toml("[nested]\nkey = 1").unwrap_err();
        assert!(matches!(err, LlmError::ConfigError(_)));
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(Settings::from_toml("= not toml").is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        std::env::set_var("UNICHAT_TEST_OVERRIDE", "from-env");
        let settings = Settings::default().with("unichat_test_override", "from-file");
        assert_eq!(
            settings.get("unichat_test_override").as_deref(),
            Some("from-env")
        );
        std::env::remove_var("UNICHAT_TEST_OVERRIDE");
        assert_eq!(
            settings.get("unichat_test_override").as_deref(),
            Some("from-file")
        );
    }

    #[test]
    #[serial]
    fn test_credentials_missing_key() {
        std::env::remove_var("MINIMAX_API_KEY");
        std::env::remove_var("MINIMAX_API_BASE");
        let err = Settings::default().credentials(&MINIMAX).unwrap_err();
        assert!(err.to_string().contains("minimax_api_key"));
    }

    #[test]
    #[serial]
    fn test_credentials_default_base() {
        std::env::remove_var("MISTRAL_API_KEY");
        std::env::remove_var("MISTRAL_API_BASE");
        let creds = Settings::default()
            .with("mistral_api_key", "k")
            .credentials(&MISTRAL)
            .unwrap();
        assert_eq!(creds.api_key, "k");
        assert_eq!(creds.api_base, "https://api.mistral.ai/v1");
        assert!(!format!("{:?}", creds).contains("\"k\""));
    }

    #[test]
    #[serial]
    fn test_load_from_env_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "zhipuai_api_key = \"glm-key\"").unwrap();
        std::env::set_var(SETTINGS_PATH_ENV, file.path());
        std::env::remove_var("ZHIPUAI_API_KEY");

        let settings = Settings::load().unwrap();
        assert_eq!(settings.get("zhipuai_api_key").as_deref(), Some("glm-key"));

        std::env::remove_var(SETTINGS_PATH_ENV);
    }

    #[test]
    fn test_client_defaults() {
        let defaults = ClientDefaults::default();
        assert!(defaults.stream);
        assert_eq!(defaults.temperature, 0.7);
        assert_eq!(defaults.tool_choice, "auto");
        assert_eq!(defaults.timeout, Duration::from_secs(60));
        assert!(!defaults.with_stream(false).stream);
    }
}
