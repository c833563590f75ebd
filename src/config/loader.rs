//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, and merging of environment sections over the base.

use super::error::{ConfigResult, ConfigurationError};
use super::{ResilienceConfig, KNOWN_ENVIRONMENTS};
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable naming the active environment
pub const ENVIRONMENT_VAR: &str = "CONCIERGE_ENV";

/// Secondary environment variable, consulted when `CONCIERGE_ENV` is unset
pub const FALLBACK_ENVIRONMENT_VAR: &str = "APP_ENV";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_VAR: &str = "CONCIERGE_CONFIG_DIR";

const CONFIG_FILE_NAMES: [&str; 2] = ["resilience-config.yaml", "resilience-config.yml"];

/// Loaded configuration together with where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: ResilienceConfig,
    environment: String,
    config_directory: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = environment,
            config_directory = %config_directory.display(),
            "Loading resilience configuration"
        );

        if !KNOWN_ENVIRONMENTS.contains(&environment) {
            warn!(
                environment = environment,
                "Unknown environment, no override section will be applied"
            );
        }

        let config = Self::load_and_merge_config(&config_directory, environment)?;

        // Validate the loaded configuration
        config.validate()?;

        info!(
            environment = environment,
            breakers_enabled = config.circuit_breakers.enabled,
            component_configs = config.circuit_breakers.component_configs.len(),
            service_overrides = config.services.len(),
            "Resilience configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Some(config_directory),
        }))
    }

    /// Wrap an in-memory configuration, validating it first
    pub fn from_config(config: ResilienceConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        let environment = config.environment.clone();

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_directory: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Configuration as JSON, for logging and the validator CLI
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Directory the configuration was loaded from, if it came from a file
    pub fn config_directory(&self) -> Option<&Path> {
        self.config_directory.as_deref()
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        resolve_environment(
            env::var(ENVIRONMENT_VAR).ok(),
            env::var(FALLBACK_ENVIRONMENT_VAR).ok(),
        )
    }

    /// Get default configuration directory
    fn default_config_directory() -> PathBuf {
        env::var(CONFIG_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    /// Find the configuration file
    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!(path = %config_path.display(), "Found configuration file");
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Safely read a configuration file with a size limit
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024; // 1MB limit

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!(
                    "Configuration file too large ({} bytes > {} bytes limit)",
                    metadata.len(),
                    MAX_CONFIG_FILE_SIZE
                ),
            ));
        }

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<ResilienceConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;

        parse_config(&yaml_content, environment)
            .map_err(|e| match e {
                ConfigurationError::InvalidYaml { error, .. } => {
                    ConfigurationError::invalid_yaml(config_file.display().to_string(), error)
                }
                other => other,
            })
    }
}

/// Pick the environment name from the primary and secondary variables
fn resolve_environment(primary: Option<String>, secondary: Option<String>) -> String {
    primary
        .filter(|value| !value.trim().is_empty())
        .or_else(|| secondary.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| "development".to_string())
        .trim()
        .to_lowercase()
}

/// Parse a YAML document and apply the section for `environment`
pub fn parse_config(yaml_content: &str, environment: &str) -> ConfigResult<ResilienceConfig> {
    // Parse YAML as a generic value for manipulation
    let mut yaml_data: YamlValue = serde_yaml::from_str(yaml_content)
        .map_err(|e| ConfigurationError::invalid_yaml("<inline>", e))?;

    // Apply environment-specific overrides
    if let Some(env_overrides) = yaml_data
        .get(YamlValue::String(environment.to_string()))
        .cloned()
    {
        debug!(environment = environment, "Applying environment-specific overrides");
        merge_yaml_values(&mut yaml_data, env_overrides);
    }

    // Remove environment sections so they do not reach deserialization
    if let YamlValue::Mapping(ref mut map) = yaml_data {
        for name in KNOWN_ENVIRONMENTS {
            map.remove(YamlValue::String(name.to_string()));
        }
    }

    let mut config: ResilienceConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
        ConfigurationError::invalid_yaml(
            "<inline>",
            format!("Failed to deserialize configuration: {e}"),
        )
    })?;

    // Ensure environment is set correctly
    config.environment = environment.to_string();

    Ok(config)
}

/// Recursively merge YAML values (environment overrides into base config)
fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
    match (&mut *base, override_value) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
            for (key, value) in override_map {
                if let Some(existing_value) = base_map.get_mut(&key) {
                    // Recursively merge nested objects
                    merge_yaml_values(existing_value, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_ref, override_val) => {
            // For non-mapping values, override completely
            *base_ref = override_val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::BreakerAccounting;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_config_yaml() -> &'static str {
        r#"
circuit_breakers:
  enabled: true
  global_settings:
    max_circuit_breakers: 20
    response_time_window: 50
  default_config:
    failure_threshold: 5
    recovery_timeout_seconds: 60
    success_threshold: 2
    call_timeout_seconds: 30
  component_configs:
    weather:
      failure_threshold: 3
      recovery_timeout_seconds: 120
      success_threshold: 2
      call_timeout_seconds: 5

retry:
  max_attempts: 3
  base_delay_seconds: 1.0
  max_delay_seconds: 60.0
  backoff_factor: 2.0
  jitter: true

services:
  restaurant_booking:
    retry:
      max_attempts: 2
      base_delay_seconds: 0.5
      max_delay_seconds: 5.0
      backoff_factor: 2.0
      jitter: false
      accounting: per_attempt

development:
  retry:
    jitter: false

test:
  circuit_breakers:
    default_config:
      recovery_timeout_seconds: 0.1
      call_timeout_seconds: 1
  retry:
    max_attempts: 2
    base_delay_seconds: 0.01
    max_delay_seconds: 0.05
    jitter: false

production:
  circuit_breakers:
    global_settings:
      max_circuit_breakers: 100
"#
    }

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        let config_file = config_dir.join("resilience-config.yaml");

        fs::write(&config_file, create_test_config_yaml()).unwrap();

        (temp_dir, config_dir)
    }

    #[test]
    fn test_environment_resolution() {
        assert_eq!(resolve_environment(None, None), "development");
        assert_eq!(
            resolve_environment(Some("Production".to_string()), Some("test".to_string())),
            "production"
        );
        assert_eq!(resolve_environment(None, Some("test".to_string())), "test");
        assert_eq!(
            resolve_environment(Some("  ".to_string()), Some("test".to_string())),
            "test"
        );
    }

    #[test]
    fn test_config_file_discovery() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let config_file = ConfigManager::find_config_file(&config_dir).unwrap();
        assert!(config_file.exists());
        assert_eq!(config_file.file_name().unwrap(), "resilience-config.yaml");
    }

    #[test]
    fn test_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let result = ConfigManager::find_config_file(temp_dir.path());

        if let Err(ConfigurationError::ConfigFileNotFound { searched_paths }) = result {
            assert_eq!(searched_paths.len(), 2);
        } else {
            panic!("Expected ConfigFileNotFound error");
        }
    }

    #[test]
    fn test_environment_specific_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "test").unwrap();
        let config = manager.config();
        assert_eq!(manager.environment(), "test");
        assert_eq!(config.environment, "test");
        assert_eq!(config.retry.max_attempts, 2);
        assert!(!config.retry.jitter);
        // Untouched keys keep the base value
        assert_eq!(config.retry.backoff_factor, 2.0);
        let default_breaker = config.circuit_breakers.breaker_config_for("anything");
        assert_eq!(default_breaker.recovery_timeout, Duration::from_millis(100));
        assert_eq!(default_breaker.failure_threshold, 5);
        assert_eq!(default_breaker.response_time_window, 50);

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "production")
                .unwrap();
        let config = manager.config();
        assert_eq!(config.circuit_breakers.global_settings.max_circuit_breakers, 100);
        assert!(config.retry.jitter);

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "development").unwrap();
        assert!(!manager.config().retry.jitter);
        assert_eq!(
            manager.config().circuit_breakers.global_settings.max_circuit_breakers,
            20
        );
    }

    #[test]
    fn test_service_overrides_loaded() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "production").unwrap();
        let config = manager.config();

        assert_eq!(config.retry_policy_for("restaurant_booking").max_attempts, 2);
        assert_eq!(
            config.accounting_for("restaurant_booking"),
            BreakerAccounting::PerAttempt
        );
        assert_eq!(config.accounting_for("weather"), BreakerAccounting::PerCall);
        assert_eq!(
            config.circuit_breakers.breaker_config_for("weather").call_timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = create_test_config_yaml().replace("backoff_factor: 2.0\n  jitter: true", "backoff_factor: 0.5\n  jitter: true");
        fs::write(temp_dir.path().join("resilience-config.yaml"), yaml).unwrap();

        let result = ConfigManager::load_from_directory_with_env(
            Some(temp_dir.path().to_path_buf()),
            "production",
        );
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_yaml_names_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("resilience-config.yml"),
            "circuit_breakers: [unclosed",
        )
        .unwrap();

        let err = ConfigManager::load_from_directory_with_env(
            Some(temp_dir.path().to_path_buf()),
            "test",
        )
        .unwrap_err();

        match err {
            ConfigurationError::InvalidYaml { file_path, .. } => {
                assert!(file_path.ends_with("resilience-config.yml"))
            }
            other => panic!("Expected InvalidYaml, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_replaces_scalars_and_extends_maps() {
        let mut base: YamlValue = serde_yaml::from_str("a: 1\nb:\n  c: 2\n  d: 3").unwrap();
        let overrides: YamlValue = serde_yaml::from_str("a: 9\nb:\n  d: 4\n  e: 5").unwrap();

        merge_yaml_values(&mut base, overrides);

        let expected: YamlValue =
            serde_yaml::from_str("a: 9\nb:\n  c: 2\n  d: 4\n  e: 5").unwrap();
        assert_eq!(base, expected);
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = ResilienceConfig::default();
        config.retry.max_attempts = 0;
        assert!(ConfigManager::from_config(config).is_err());

        let manager = ConfigManager::from_config(ResilienceConfig::default()).unwrap();
        assert!(manager.config_directory().is_none());
        assert_eq!(manager.environment(), "development");
        assert!(manager.debug_config().get("circuit_breakers").is_some());
    }
}
