//! Client configuration loaded from environment variables.

use std::env;

/// Default relation expansion depth for reads and writes.
pub const DEFAULT_EXPANSION_DEPTH: u32 = 0;
/// Deepest relation expansion the object store honours.
pub const MAX_EXPANSION_DEPTH: u32 = 3;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Expansion depth used when a caller does not pass one
    pub default_expansion_depth: u32,
    /// Requested depths above this are clamped
    pub max_expansion_depth: u32,
    /// API version advertised in the `Accept` header
    pub api_version: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_expansion_depth: DEFAULT_EXPANSION_DEPTH,
            max_expansion_depth: MAX_EXPANSION_DEPTH,
            api_version: 0,
        }
    }
}

impl Config {
    /// Load a `.env` file if one exists, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let default_expansion_depth = read_u32(
            "STOW_EXPAND_DEPTH",
            defaults.default_expansion_depth,
            ConfigError::InvalidExpandDepth,
        )?;
        let max_expansion_depth = read_u32(
            "STOW_MAX_EXPAND_DEPTH",
            defaults.max_expansion_depth,
            ConfigError::InvalidMaxExpandDepth,
        )?;
        let api_version = read_u32(
            "STOW_API_VERSION",
            defaults.api_version,
            ConfigError::InvalidApiVersion,
        )?;

        Self {
            default_expansion_depth,
            max_expansion_depth,
            api_version,
        }
        .validated()
    }

    /// Check the depth invariant.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.default_expansion_depth > self.max_expansion_depth {
            return Err(ConfigError::DepthOutOfRange {
                default: self.default_expansion_depth,
                max: self.max_expansion_depth,
            });
        }
        Ok(self)
    }

    /// Clamp a requested expansion depth to the configured maximum.
    pub fn clamp_depth(&self, requested: u32) -> u32 {
        if requested > self.max_expansion_depth {
            tracing::debug!(
                requested,
                max = self.max_expansion_depth,
                "clamping expansion depth"
            );
            self.max_expansion_depth
        } else {
            requested
        }
    }
}

fn read_u32(key: &str, default: u32, err: ConfigError) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| err),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid STOW_EXPAND_DEPTH value")]
    InvalidExpandDepth,

    #[error("Invalid STOW_MAX_EXPAND_DEPTH value")]
    InvalidMaxExpandDepth,

    #[error("Invalid STOW_API_VERSION value")]
    InvalidApiVersion,

    #[error("default expansion depth {default} exceeds maximum {max}")]
    DepthOutOfRange { default: u32, max: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default().validated().unwrap();
        assert_eq!(config.default_expansion_depth, 0);
        assert_eq!(config.max_expansion_depth, 3);
        assert_eq!(config.api_version, 0);
    }

    #[test]
    fn default_above_max_rejected() {
        let config = Config {
            default_expansion_depth: 5,
            max_expansion_depth: 3,
            api_version: 0,
        };
        assert_eq!(
            config.validated(),
            Err(ConfigError::DepthOutOfRange { default: 5, max: 3 })
        );
    }

    #[test]
    fn clamp_depth() {
        let config = Config::default();
        assert_eq!(config.clamp_depth(1), 1);
        assert_eq!(config.clamp_depth(3), 3);
        assert_eq!(config.clamp_depth(10), 3);
    }
}
