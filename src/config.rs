use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base URL of the assistant backend, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub directory: Option<String>,
    pub retention_days: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_max_file_size_mb() -> u64 {
    10
}

fn default_allowed_extensions() -> Vec<String> {
    [
        ".txt", ".md", ".json", ".csv", ".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls",
        ".xlsx",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl Config {
    pub fn load_with_path() -> Result<(Self, Option<PathBuf>)> {
        let mut candidates = Vec::new();

        if let Ok(explicit) = std::env::var("DEEPCHAT_CONFIG") {
            candidates.push(PathBuf::from(explicit));
        }

        candidates.push(PathBuf::from("deepchat.toml"));

        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("deepchat").join("deepchat.toml"));
        }

        if let Some(dir) = dirs::data_dir() {
            candidates.push(dir.join("deepchat").join("deepchat.toml"));
        }

        for path in candidates {
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                let config: Config = toml::from_str(&content)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((Config::default(), None))
    }

    pub fn validate(&self) -> Result<()> {
        let url_lower = self.server.base_url.trim().to_lowercase();
        if !url_lower.starts_with("http://") && !url_lower.starts_with("https://") {
            anyhow::bail!(
                "Server base_url must start with http:// or https://, got: {}",
                self.server.base_url
            );
        }
        if url::Url::parse(self.server.base_url.trim()).is_err() {
            anyhow::bail!("Server base_url is not a valid URL: {}", self.server.base_url);
        }
        if self.upload.max_file_size_mb == 0 {
            anyhow::bail!("Upload max_file_size_mb must be greater than 0");
        }
        for ext in &self.upload.allowed_extensions {
            if !ext.starts_with('.') || ext.len() < 2 {
                anyhow::bail!("Upload extension must look like '.txt', got: {}", ext);
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://127.0.0.1:8000".to_string(),
            },
            logging: LoggingConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut cfg = Config::default();
        cfg.server.base_url = "ftp://example.com".into();
        assert!(cfg.validate().is_err());
        cfg.server.base_url = "not a url".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_upload_limit_rejected() {
        let mut cfg = Config::default();
        cfg.upload.max_file_size_mb = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_extension_rejected() {
        let mut cfg = Config::default();
        cfg.upload.allowed_extensions = vec!["txt".into()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            base_url = "https://chat.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.base_url, "https://chat.example.com");
        assert_eq!(cfg.upload.max_file_size_mb, 10);
        assert!(cfg.upload.allowed_extensions.contains(&".pdf".to_string()));
    }
}
