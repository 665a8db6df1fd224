use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::transcript::ContextWindowBuilder;

/// User-owned settings in `.relayrs/config.json`. The library never writes
/// this file, and environment variables always win over it (see
/// `platform::create_platform`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub platform: PlatformConfig,
    pub context: ContextConfig,
    pub runs: RunsConfig,
    pub paths: PathsConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_at(Path::new(".relayrs/config.json"))
    }

    pub fn load_at(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Context window builder configured from this file.
    pub fn window(&self) -> ContextWindowBuilder {
        ContextWindowBuilder::new()
            .with_max_messages(self.context.max_messages)
            .with_max_lines(self.context.max_lines)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// "http" or "mock". The API key never lives in this file; it comes from
    /// `RELAYRS_API_KEY` only.
    pub backend: Option<String>,
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            backend: None,
            base_url: None,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_messages: usize,
    pub max_lines: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_messages: crate::transcript::DEFAULT_MAX_MESSAGES,
            max_lines: crate::transcript::DEFAULT_MAX_LINES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunsConfig {
    pub log_enabled: bool,
    pub log_dir: String,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            log_enabled: true,
            log_dir: ".relayrs/runs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub pipelines: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pipelines: ".relayrs/pipelines".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::load_at(&tmp.path().join("config.json")).unwrap();
        assert_eq!(config.context.max_messages, 10);
        assert_eq!(config.context.max_lines, 20);
        assert_eq!(config.platform.timeout_seconds, 120);
        assert_eq!(config.runs.log_dir, ".relayrs/runs");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "context": { "max_lines": 8 }, "platform": { "base_url": "https://host.example" } }"#,
        )
        .unwrap();

        let config = AppConfig::load_at(&path).unwrap();
        assert_eq!(config.context.max_lines, 8);
        assert_eq!(config.context.max_messages, 10);
        assert_eq!(
            config.platform.base_url.as_deref(),
            Some("https://host.example")
        );
        assert!(config.platform.backend.is_none());
    }

    #[test]
    fn defaults_roundtrip_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.runs.log_enabled, true);
        assert_eq!(decoded.paths.pipelines, ".relayrs/pipelines");
    }
}
