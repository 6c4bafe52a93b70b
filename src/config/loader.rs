use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::{models::GatewayConfig, validation::GatewayConfigValidator};

/// Load, normalize and validate the gateway configuration.
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<GatewayConfig> {
    let mut config = load_config_sync(config_path)?;
    GatewayConfigValidator::normalize(&mut config);
    GatewayConfigValidator::validate(&config)
        .with_context(|| format!("Invalid configuration in {config_path}"))?;
    tracing::info!(
        services = config.services.len(),
        "Configuration loaded successfully"
    );
    Ok(config)
}

/// Load configuration synchronously, without normalization or validation
pub fn load_config_sync(config_path: &str) -> Result<GatewayConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let gateway_config: GatewayConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(gateway_config)
}

/// Load configuration without validation (used for validation command)
pub async fn load_config_unchecked(config_path: &str) -> Result<GatewayConfig> {
    load_config_sync(config_path)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:9100"
rate_limiting:
  burst: 2
services:
  - name: orders
    prefix: orders
    hosts: ["http://h1:9000", "http://h2:9000"]
    port: 9000
    rate_limit: 2
  - name: vendors
    prefix: /vendors
    hosts: ["http://vendors:3001"]
    port: 3001
    api_key: secret
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9100");
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].prefix, "/orders");
        assert_eq!(config.services[0].rate_limit, Some(2.0));
        assert_eq!(config.services[1].api_key.as_deref(), Some("secret"));
        assert_eq!(config.rate_limiting.burst, 2);
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let json_content = r#"
{
  "services": [
    {
      "name": "products",
      "prefix": "/products",
      "hosts": ["http://localhost:3000"],
      "port": 3000
    }
  ]
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8001");
        assert_eq!(config.services[0].name, "products");
        assert_eq!(config.rate_limiting.burst, 10);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_services() {
        let yaml_content = r#"
services:
  - name: ""
    prefix: /a
    hosts: ["not-a-url"]
    port: 0
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let path = temp_file.path().to_str().unwrap().to_string();
        assert!(load_config(&path).await.is_err());
        // The unchecked variant only parses.
        assert!(load_config_unchecked(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        assert!(load_config("/nonexistent/conduit.yaml").await.is_err());
    }
}
