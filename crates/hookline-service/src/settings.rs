//! Configuration loading.
//!
//! Sources are applied in order, later sources overriding earlier ones:
//!  1. `/etc/hookline/service.yaml`
//!  2. `./config/service.yaml`
//!  3. an explicit file from `--config` or `HOOKLINE_CONFIG_FILE` (required)
//!  4. environment variables prefixed `HOOKLINE__` with `__` separators,
//!     e.g. `HOOKLINE__SERVER__PORT=9090` sets `server.port`
//!
//! Absent optional files fall back to the serde defaults. A malformed file or a
//! value that cannot be coerced to its field type is an error.

use hookline_api::{ConfigError, ServiceConfig};
use std::path::Path;

const SYSTEM_CONFIG: &str = "/etc/hookline/service";
const LOCAL_CONFIG: &str = "config/service";
const ENV_PREFIX: &str = "HOOKLINE";

/// Load the service configuration from files and the environment
pub fn load(explicit_path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name(SYSTEM_CONFIG)
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name(LOCAL_CONFIG)
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        let path = path.to_str().ok_or_else(|| ConfigError::Invalid {
            message: format!("configuration path is not valid UTF-8: {}", path.display()),
        })?;
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .and_then(|cfg| cfg.try_deserialize::<ServiceConfig>())
        .map_err(|e| ConfigError::Loading {
            message: e.to_string(),
        })
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
