use serde_json::{Map, Value, json};

use crate::errors::PlatformError;

use super::{
    Activator, ActivationFeed, Completion, CompletionOptions, Completions, Platform,
    PlatformHttpClient, Records,
};

/// REST adapter for a hosted agent-activation platform.
#[derive(Debug)]
pub struct HttpPlatform {
    http: PlatformHttpClient,
    base_url: String,
    key: String,
}

impl HttpPlatform {
    pub fn new(
        base_url: impl Into<String>,
        key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, PlatformError> {
        let http = PlatformHttpClient::new(timeout_secs)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            key: key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status().as_u16();
        let message = res.text().await.unwrap_or_default();
        Err(PlatformError::Api { status, message })
    }
}

#[async_trait::async_trait]
impl Activator for HttpPlatform {
    async fn activate(&self, name: &str, input: &Value) -> Result<Map<String, Value>, PlatformError> {
        let res = self
            .http
            .client()
            .post(self.url(&format!("agents/{name}/activate")))
            .bearer_auth(&self.key)
            .json(&json!({"input": input}))
            .send()
            .await?;
        let res = Self::check_status(res).await?;

        let body: Value = res.json().await?;
        match body {
            // Some deployments wrap the agent result in an "output" envelope.
            Value::Object(map) => match map.get("output") {
                Some(Value::Object(output)) => Ok(output.clone()),
                _ => Ok(map),
            },
            other => Err(PlatformError::InvalidResponse(format!(
                "activation result for '{name}' is not an object: {other}"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl Completions for HttpPlatform {
    async fn generate(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, PlatformError> {
        let mut body = json!({"prompt": prompt});
        if let Some(model) = &options.model {
            body["model"] = json!(model);
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }

        let res = self
            .http
            .client()
            .post(self.url("completions"))
            .bearer_auth(&self.key)
            .json(&body)
            .send()
            .await?;
        let res = Self::check_status(res).await?;

        let body: Value = res.json().await?;
        let text = body
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PlatformError::InvalidResponse(
                    "Unexpected completion response: missing 'text' field".to_string(),
                )
            })?
            .to_string();

        Ok(Completion {
            text,
            status: body
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("success")
                .to_string(),
            model: body
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string),
            error: body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[async_trait::async_trait]
impl ActivationFeed for HttpPlatform {
    async fn recent_activations(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Value, PlatformError> {
        let res = self
            .http
            .client()
            .get(self.url(&format!("conversations/{conversation_id}/activations")))
            .query(&[
                ("limit", limit.to_string()),
                ("sort_by", "started_at".to_string()),
                ("sort_dir", "desc".to_string()),
            ])
            .bearer_auth(&self.key)
            .send()
            .await?;
        let res = Self::check_status(res).await?;

        // The feed's shape varies across deployments and some return plain
        // error text with a 200; hand the raw payload to the normalizer.
        let text = res.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

#[async_trait::async_trait]
impl Records for HttpPlatform {
    async fn create_item(&self, model: &str, data: &Value) -> Result<Value, PlatformError> {
        let res = self
            .http
            .client()
            .post(self.url(&format!("records/{model}")))
            .bearer_auth(&self.key)
            .json(data)
            .send()
            .await?;
        let res = Self::check_status(res).await?;
        Ok(res.json().await?)
    }

    async fn update_item(
        &self,
        model: &str,
        id: &str,
        patch: &Value,
    ) -> Result<Value, PlatformError> {
        let res = self
            .http
            .client()
            .patch(self.url(&format!("records/{model}/{id}")))
            .bearer_auth(&self.key)
            .json(patch)
            .send()
            .await?;
        let res = Self::check_status(res).await?;
        Ok(res.json().await?)
    }
}

impl Platform for HttpPlatform {
    fn backend(&self) -> &str {
        "http"
    }

    fn validate_config(&self) -> Result<(), PlatformError> {
        if self.key.is_empty() {
            return Err(PlatformError::Config(
                "Platform API key is empty".to_string(),
            ));
        }
        if self.base_url.is_empty() {
            return Err(PlatformError::Config(
                "Platform base URL is empty".to_string(),
            ));
        }
        Ok(())
    }
}
