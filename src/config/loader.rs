use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix of environment variables that override file settings, e.g.
/// `INGRESS_GATEWAY_TLS_PORT=8443` or `INGRESS_GATEWAY_LOGGING__LEVEL=debug`.
pub const ENV_PREFIX: &str = "INGRESS_GATEWAY";

/// Load configuration from an optional file layered with environment variables.
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: Option<&str>) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: Option<&str>) -> Result<ServerConfig> {
    load_with_environment(config_path, environment())
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn file_format(config_path: &Path) -> FileFormat {
    match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml, // Default to YAML
    }
}

fn load_with_environment(config_path: Option<&str>, env: Environment) -> Result<ServerConfig> {
    let mut builder = Config::builder();

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);
        builder = builder.add_source(File::new(config_path, file_format(path)));
    }

    let settings = builder
        .add_source(env)
        .build()
        .with_context(|| match config_path {
            Some(path) => format!("Failed to build config from {path}"),
            None => "Failed to build config from environment".to_string(),
        })?;

    let server_config: ServerConfig = settings
        .try_deserialize()
        .wrap_err("Failed to deserialize server config")?;

    Ok(server_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use config::Map;
    use tempfile::NamedTempFile;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let vars: Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(vars))
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
host: "127.0.0.1"
port: 8080
tls_port: 8443
cluster_source: "/etc/ingress/cluster.yaml"
quiescence_window: "500ms"
logging:
  level: debug
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_with_environment(temp_file.path().to_str(), env(&[])).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.tls_port, 8443);
        assert_eq!(config.quiescence_window, "500ms");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.shutdown_timeout, "30s");
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
port = 8080
cluster_source = "https://config.internal/cluster"

[logging]
json = false
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_with_environment(temp_file.path().to_str(), env(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cluster_source, "https://config.internal/cluster");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, r#"{{"port": 8080, "tls_port": 8443}}"#).unwrap();

        let config = load_with_environment(
            temp_file.path().to_str(),
            env(&[
                ("INGRESS_GATEWAY_TLS_PORT", "9443"),
                ("INGRESS_GATEWAY_LOGGING__LEVEL", "warn"),
            ]),
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.tls_port, 9443);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_no_file_yields_defaults() {
        let config = load_with_environment(None, env(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_with_environment(Some("/nonexistent/gateway.yaml"), env(&[])).is_err());
    }
}
