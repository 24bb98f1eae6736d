//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Config file: `--config <file>` or `$XDG_CONFIG_HOME/aciplot/aciplot.toml`
//! 3. Environment variables: `ACIPLOT_*` prefix
//! 4. Command line flags (applied by the CLI layer)

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::LayoutEngine;
use crate::infrastructure::apic::RetryPolicy;

const APP_NAME: &str = "aciplot";
const ENV_PREFIX: &str = "ACIPLOT";

/// Unified configuration for aciplot.
///
/// The APIC password is deliberately not part of the file format; it comes
/// from `-p` or `ACIPLOT_PASSWORD` only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// APIC base URL, e.g. `https://apic.example.net`
    pub apic: Option<String>,
    /// APIC user name
    pub user: Option<String>,
    /// Diagram destination; the extension selects the image format
    pub output: PathBuf,
    /// Graphviz layout engine
    pub engine: LayoutEngine,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Verify the APIC TLS certificate
    pub verify_tls: bool,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            apic: None,
            user: None,
            output: PathBuf::from("out.png"),
            engine: LayoutEngine::default(),
            timeout_secs: 30,
            verify_tls: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Raw settings for intermediate parsing; absent keys keep the lower layer.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawSettings {
    apic: Option<String>,
    user: Option<String>,
    output: Option<PathBuf>,
    engine: Option<LayoutEngine>,
    timeout_secs: Option<u64>,
    verify_tls: Option<bool>,
    retry: RawRetry,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawRetry {
    max_attempts: Option<u32>,
    base_backoff_ms: Option<u64>,
}

/// Get the XDG config directory for aciplot.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(format!("{APP_NAME}.toml")))
}

/// Expand `~`, `$VAR` and `${VAR}`; unresolvable input is returned unchanged.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    shellexpand::full(raw.as_ref())
        .map(|s| PathBuf::from(s.into_owned()))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Load settings with layered precedence.
    ///
    /// An explicit `config_path` must exist; the global file is optional.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        let file = match config_path {
            Some(path) if !path.exists() => {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", path.display()),
                })
            }
            Some(path) => Some(path.to_path_buf()),
            None => global_config_path().filter(|p| p.exists()),
        };
        if let Some(path) = file {
            let raw = load_raw_settings(&path)?;
            current = current.merge_with(&raw);
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();
        Ok(current)
    }

    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            apic: overlay.apic.clone().or_else(|| self.apic.clone()),
            user: overlay.user.clone().or_else(|| self.user.clone()),
            output: overlay.output.clone().unwrap_or_else(|| self.output.clone()),
            engine: overlay.engine.unwrap_or(self.engine),
            timeout_secs: overlay.timeout_secs.unwrap_or(self.timeout_secs),
            verify_tls: overlay.verify_tls.unwrap_or(self.verify_tls),
            retry: RetryPolicy {
                max_attempts: overlay.retry.max_attempts.unwrap_or(self.retry.max_attempts),
                base_backoff_ms: overlay
                    .retry
                    .base_backoff_ms
                    .unwrap_or(self.retry.base_backoff_ms),
            },
        }
    }

    /// Apply ACIPLOT_* environment variables as explicit overrides.
    ///
    /// Nested keys use `__`: `ACIPLOT_RETRY__MAX_ATTEMPTS`.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Some(val) = optional(config.get_string("apic"))? {
            settings.apic = Some(val);
        }
        if let Some(val) = optional(config.get_string("user"))? {
            settings.user = Some(val);
        }
        if let Some(val) = optional(config.get_string("output"))? {
            settings.output = PathBuf::from(val);
        }
        if let Some(val) = optional(config.get_string("engine"))? {
            settings.engine = val
                .parse()
                .map_err(|message: String| ApplicationError::Config { message })?;
        }
        if let Some(val) = optional(config.get_int("timeout_secs"))? {
            settings.timeout_secs = non_negative("timeout_secs", val)?;
        }
        if let Some(val) = optional(config.get_bool("verify_tls"))? {
            settings.verify_tls = val;
        }
        if let Some(val) = optional(config.get_int("retry.max_attempts"))? {
            settings.retry.max_attempts = u32::try_from(non_negative("retry.max_attempts", val)?)
                .map_err(|e| ApplicationError::Config {
                    message: format!("retry.max_attempts: {e}"),
                })?;
        }
        if let Some(val) = optional(config.get_int("retry.base_backoff_ms"))? {
            settings.retry.base_backoff_ms = non_negative("retry.base_backoff_ms", val)?;
        }

        Ok(settings)
    }

    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        self.output = expand_path(&self.output);
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# aciplot configuration
#
# Locations (by precedence, lowest to highest):
#   File: ~/.config/aciplot/aciplot.toml  (or --config <file>)
#   Env:  ACIPLOT_* environment variables (ACIPLOT_RETRY__MAX_ATTEMPTS for nested keys)
#   CLI:  command line flags
#
# The password is never read from this file: use -p or ACIPLOT_PASSWORD.

# APIC base URL
# apic = "https://apic.example.net"

# APIC user
# user = "admin"

# Diagram file, extension selects the format (png, svg, pdf, ...)
# output = "out.png"

# Graphviz layout engine: dot, neato, fdp, sfdp, circo, twopi
# engine = "dot"

# Per-request timeout in seconds
# timeout_secs = 30

# Verify the APIC certificate (controllers often use self-signed ones)
# verify_tls = false

[retry]
# Attempts per query for transient failures (timeouts, HTTP 5xx)
# max_attempts = 3

# Backoff grows linearly: attempt * base_backoff_ms
# base_backoff_ms = 250
"#
        .to_string()
    }
}

/// Missing keys are not an error; malformed values are.
fn optional<T>(result: Result<T, ConfigError>) -> Result<Option<T>, ApplicationError> {
    match result {
        Ok(val) => Ok(Some(val)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(config_err(e)),
    }
}

fn non_negative(key: &str, val: i64) -> Result<u64, ApplicationError> {
    u64::try_from(val).map_err(|_| ApplicationError::Config {
        message: format!("{key} must not be negative, got {val}"),
    })
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
