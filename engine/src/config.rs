use std::env;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Enforcement strictness (§4.6). `Strict` rejects on the first
/// violation, `Standard` rejects on blocking violations only,
/// `Advisory` never rejects, only records violations for `metrics`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    Strict,
    Standard,
    Advisory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnforcementConfig {
    pub mode: EnforcementMode,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LockConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HooksConfig {
    pub timeout_secs: u64,
    pub dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    pub busy_timeout_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// The engine's full configuration, loaded in layers: a compiled-in
/// `config/default.toml`, an optional file named by `TM_CONFIG_FILE`,
/// environment overrides prefixed `TM_`, then a final pass of the
/// explicit `TM_*` variables this system documents as its external
/// interface.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    pub enforcement: EnforcementConfig,
    pub lock: LockConfig,
    pub hooks: HooksConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from the compiled-in defaults, an optional
    /// `TM_CONFIG_FILE`, `TM_`-prefixed environment variables, then
    /// the explicit named overrides.
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        builder = builder.add_source(File::from_str(
            include_str!("../config/default.toml"),
            FileFormat::Toml,
        ));

        if let Ok(config_file) = env::var("TM_CONFIG_FILE") {
            builder = builder.add_source(
                File::with_name(&config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("TM")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to build engine configuration")?;
        let mut result: EngineConfig = config
            .try_deserialize()
            .context("failed to deserialize engine configuration")?;

        Self::apply_standard_env_vars(&mut result);
        Ok(result)
    }

    /// Load configuration from an explicit file path, bypassing the
    /// compiled-in default layer.
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(Environment::with_prefix("TM").separator("_").try_parsing(true));

        let config = builder.build().context("failed to build engine configuration from file")?;
        config
            .try_deserialize()
            .context("failed to deserialize engine configuration from file")
    }

    fn apply_standard_env_vars(config: &mut EngineConfig) {
        if let Ok(mode) = env::var("TM_ENFORCEMENT") {
            config.enforcement.mode = match mode.to_lowercase().as_str() {
                "strict" => EnforcementMode::Strict,
                "advisory" => EnforcementMode::Advisory,
                _ => EnforcementMode::Standard,
            };
        }
        if let Ok(secs) = env::var("TM_LOCK_TIMEOUT") {
            if let Ok(secs) = secs.parse() {
                config.lock.timeout_secs = secs;
            }
        }
        if let Ok(secs) = env::var("TM_HOOK_TIMEOUT") {
            if let Ok(secs) = secs.parse() {
                config.hooks.timeout_secs = secs;
            }
        }
        if let Ok(dir) = env::var("TM_HOOKS_DIR") {
            config.hooks.dir = dir;
        }
        if let Ok(level) = env::var("TM_LOG_LEVEL") {
            config.logging.level = level;
        }
    }

    /// Validate the configuration, failing fast on internally
    /// inconsistent values before the engine starts.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(anyhow::anyhow!(
                    "invalid log level: {other}. must be one of: trace, debug, info, warn, error"
                ))
            }
        }

        if self.lock.timeout_secs == 0 {
            return Err(anyhow::anyhow!("lock.timeout_secs must be greater than 0"));
        }
        if self.hooks.timeout_secs == 0 {
            return Err(anyhow::anyhow!("hooks.timeout_secs must be greater than 0"));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enforcement: EnforcementConfig { mode: EnforcementMode::Standard },
            lock: LockConfig { timeout_secs: 10 },
            hooks: HooksConfig { timeout_secs: 5, dir: "hooks".to_string() },
            store: StoreConfig { busy_timeout_secs: 30, initial_backoff_ms: 10, max_backoff_ms: 1000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Pretty },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.enforcement.mode, EnforcementMode::Standard);
    }

    #[test]
    fn invalid_log_level_fails_validation() {
        let mut config = EngineConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeouts_fail_validation() {
        let mut config = EngineConfig::default();
        config.lock.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
