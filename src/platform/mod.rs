use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::sync::Arc;
use std::time::Duration;

pub mod http;
pub mod mock;

pub use http::HttpPlatform;
pub use mock::MockPlatform;

use crate::errors::PlatformError;
use reqwest::Client;

#[derive(Debug)]
pub(crate) struct PlatformHttpClient {
    client: Client,
}

impl PlatformHttpClient {
    pub fn new(timeout_secs: u64) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Options for a text completion call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletionOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Completion result. The orchestration core only consumes `text`, `status`
/// and `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Activates a named agent or function on the host platform.
#[async_trait::async_trait]
pub trait Activator: Send + Sync {
    async fn activate(&self, name: &str, input: &Value) -> Result<Map<String, Value>, PlatformError>;
}

/// LLM completion service exposed by the host platform.
#[async_trait::async_trait]
pub trait Completions: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, PlatformError>;
}

/// Raw activation log for a conversation, newest first. The payload shape
/// varies by backend; normalization happens in `crate::transcript`.
#[async_trait::async_trait]
pub trait ActivationFeed: Send + Sync {
    async fn recent_activations(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Value, PlatformError>;
}

/// Record persistence on the host platform.
#[async_trait::async_trait]
pub trait Records: Send + Sync {
    async fn create_item(&self, model: &str, data: &Value) -> Result<Value, PlatformError>;

    async fn update_item(
        &self,
        model: &str,
        id: &str,
        patch: &Value,
    ) -> Result<Value, PlatformError>;
}

/// Everything a demo pipeline needs from the host platform.
pub trait Platform: Activator + Completions + ActivationFeed + Records + std::fmt::Debug {
    /// Short backend name for logs and diagnostics.
    fn backend(&self) -> &str;

    /// Validate that this backend is properly configured.
    fn validate_config(&self) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// Create a platform client based on configuration priority:
/// 1. `RELAYRS_PLATFORM` env var (highest priority)
/// 2. `.relayrs/config.json` backend setting
/// 3. Auto-detection from `RELAYRS_BASE_URL` + `RELAYRS_API_KEY`
/// 4. Mock fallback so demo pipelines always run
pub fn create_platform() -> Result<Arc<dyn Platform>, PlatformError> {
    // Load .env file if available
    let _ = dotenvy::dotenv();

    let config = crate::app_config::AppConfig::load().unwrap_or_default();

    // Step 1: Check explicit RELAYRS_PLATFORM env var (highest priority)
    if let Ok(backend) = env::var("RELAYRS_PLATFORM") {
        return create_platform_by_name(&backend, &config);
    }

    // Step 2: Check config file backend setting
    if let Some(backend) = &config.platform.backend {
        return create_platform_by_name(backend, &config);
    }

    // Step 3: Use HTTP when a base URL and key are available
    if resolve_base_url(&config).is_some() && env::var("RELAYRS_API_KEY").is_ok() {
        return create_platform_by_name("http", &config);
    }

    // Step 4: Mock fallback
    log::warn!("no platform configured; falling back to the in-memory mock");
    Ok(Arc::new(MockPlatform::new()))
}

fn create_platform_by_name(
    name: &str,
    config: &crate::app_config::AppConfig,
) -> Result<Arc<dyn Platform>, PlatformError> {
    match name.to_lowercase().as_str() {
        "http" => {
            let base_url = resolve_base_url(config).ok_or_else(|| {
                PlatformError::Config("http platform requires a base URL".to_string())
            })?;
            let key = env::var("RELAYRS_API_KEY")
                .map_err(|_| PlatformError::MissingApiKey("http".to_string()))?;
            let platform =
                HttpPlatform::new(base_url, key, config.platform.timeout_seconds)?;
            platform.validate_config()?;
            Ok(Arc::new(platform))
        }
        "mock" => Ok(Arc::new(MockPlatform::new())),
        other => Err(PlatformError::Config(format!(
            "Unknown platform backend: {other}"
        ))),
    }
}

fn resolve_base_url(config: &crate::app_config::AppConfig) -> Option<String> {
    env::var("RELAYRS_BASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| config.platform.base_url.clone())
}
