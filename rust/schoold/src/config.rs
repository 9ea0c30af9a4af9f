use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive. `RUST_LOG` takes precedence.
    pub filter: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    pub log: LogConfig,
    /// Workspace opened at startup, as if `workspace.select` had been sent.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("log.filter", "info")?
            // Load from ./schoold.toml when present
            .add_source(File::with_name("schoold").required(false))
            // Override from environment (e.g., SCHOOLD__WORKSPACE)
            .add_source(Environment::with_prefix("SCHOOLD").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
