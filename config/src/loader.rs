//! Configuration loading utilities
//!
//! Resolves the configuration file location, applies environment
//! overrides and validates the result.

use crate::{ConfigError, Result, WardenConfig};
use std::path::{Path, PathBuf};

/// Configuration loader
pub struct ConfigLoader {
    /// Path to the TOML file
    path: PathBuf,
    /// Whether to use default values when the file is missing
    use_defaults: bool,
    /// Whether to validate configuration after loading
    validate: bool,
    /// Whether to apply `WARDEN_*` environment overrides
    apply_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader for an explicit file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            use_defaults: true,
            validate: true,
            apply_env: true,
        }
    }

    /// Create a loader for the system configuration file
    pub fn system() -> Self {
        Self::new(paths::system_config())
    }

    /// Create a loader for the user configuration file
    pub fn user() -> Result<Self> {
        let path = paths::user_config()
            .ok_or_else(|| ConfigError::Invalid("HOME not set".to_string()))?;
        Ok(Self::new(path))
    }

    /// Set whether to use defaults for a missing file
    pub fn use_defaults(mut self, use_defaults: bool) -> Self {
        self.use_defaults = use_defaults;
        self
    }

    /// Set whether to validate configuration
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Set whether environment overrides are applied
    pub fn apply_env(mut self, apply_env: bool) -> Self {
        self.apply_env = apply_env;
        self
    }

    /// Load the configuration
    pub fn load(&self) -> Result<WardenConfig> {
        let mut config = if self.path.exists() {
            WardenConfig::load_from(&self.path)?
        } else if self.use_defaults {
            tracing::debug!(path = %self.path.display(), "Config file missing, using defaults");
            WardenConfig::default()
        } else {
            return Err(ConfigError::NotFound(self.path.clone()));
        };

        if self.apply_env {
            config.apply_env();
        }

        if self.validate {
            validate_config(&config)?;
        }

        Ok(config)
    }

    /// Get the configuration file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Validate configuration for common issues
///
/// Malformed glob patterns are only warned about: the access filter treats
/// them as never matching.
pub fn validate_config(config: &WardenConfig) -> Result<()> {
    if config.server.call_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "server.call_timeout_secs must be greater than zero".to_string(),
        ));
    }

    if config.docker.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "docker.endpoint must not be empty".to_string(),
        ));
    }

    if config.docker.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "docker.timeout_secs must be greater than zero".to_string(),
        ));
    }

    for (list, patterns) in [("allow", &config.access.allow), ("deny", &config.access.deny)] {
        for pattern in patterns {
            if let Err(e) = glob::Pattern::new(pattern) {
                tracing::warn!(
                    list = list,
                    pattern = %pattern,
                    error = %e,
                    "Malformed access pattern will never match"
                );
            }
        }
    }

    if let Some(path) = &config.audit.path {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tracing::warn!("Audit log directory does not exist: {}", parent.display());
            }
        }
    }

    Ok(())
}

/// Default configuration paths
pub mod paths {
    use std::path::PathBuf;

    /// System configuration file
    pub fn system_config() -> PathBuf {
        PathBuf::from("/etc/warden/warden.toml")
    }

    /// User configuration file
    pub fn user_config() -> Option<PathBuf> {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config/warden/warden.toml"))
    }
}

/// Environment variable names used by the configuration system
pub mod env_vars {
    /// Overrides `docker.endpoint`
    pub const DOCKER_ENDPOINT: &str = "WARDEN_DOCKER_ENDPOINT";

    /// Overrides `audit.path`; empty disables auditing
    pub const AUDIT_LOG: &str = "WARDEN_AUDIT_LOG";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new(dir.path().join("absent.toml"))
            .apply_env(false)
            .load()
            .unwrap();
        assert_eq!(config, WardenConfig::default());
    }

    #[test]
    fn test_missing_file_without_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::new(dir.path().join("absent.toml"))
            .use_defaults(false)
            .load();
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[access]\ndeny = [\"dangerous\"]").unwrap();

        let config = ConfigLoader::new(file.path())
            .apply_env(false)
            .load()
            .unwrap();
        assert_eq!(config.access.deny, vec!["dangerous".to_string()]);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = WardenConfig::default();
        config.server.call_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_endpoint() {
        let mut config = WardenConfig::default();
        config.docker.endpoint = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_tolerates_malformed_pattern() {
        let mut config = WardenConfig::default();
        config.access.allow = vec!["[unclosed".to_string()];
        assert!(validate_config(&config).is_ok());
    }
}
