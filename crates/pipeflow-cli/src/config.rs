use config::{Config as ConfigLoader, ConfigError, Environment, File};
use pipeflow_client::ClientConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const TOKEN_VAR: &str = "PIPEFLOW_API_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub client: ClientConfig,
    #[serde(default)]
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    pub debounce_ms: u64,
    /// Characters of streamed content shown per progress line
    pub preview_chars: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            preview_chars: 80,
        }
    }
}

impl RenderConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. PIPEFLOW_<SECTION>__<KEY> environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("PIPEFLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg: Config = builder.build()?.try_deserialize()?;

        // Secret: from ENV only, never from TOML
        cfg.client.auth_token = std::env::var(TOKEN_VAR).ok().filter(|t| !t.is_empty());

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeflow_stream::ToolCallMerge;

    #[test]
    fn test_config_structure() {
        let toml = r#"
            [client]
            base_url = "https://engine.internal/api"
            pipeline_id = "pipe-7"
            idle_timeout_ms = 30000
            tool_call_merge = "by_index"

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.client.pipeline_id.as_deref(), Some("pipe-7"));
        assert_eq!(config.client.idle_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.client.batch_window(), Duration::from_millis(50));
        assert_eq!(config.client.tool_call_merge, ToolCallMerge::ByIndex);
        assert_eq!(config.render.debounce(), Duration::from_millis(150));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_optional_client_fields() {
        let toml = r#"
            [client]
            base_url = "http://localhost:8000"

            [logging]
            level = "info"
            format = "pretty"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.client.auth_token.is_none());
        assert!(config.client.pipeline_id.is_none());
    }

    #[test]
    fn test_bundled_defaults_parse() {
        let config = Config::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml")).unwrap();
        assert_eq!(config.client.base_url, "http://localhost:8000");
        assert_eq!(config.render.preview_chars, 80);
    }
}
