use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::PlatformError;

use super::{
    Activator, ActivationFeed, Completion, CompletionOptions, Completions, Platform, Records,
};

/// In-memory stand-in for the host platform, used when nothing live is
/// configured and throughout the tests. Stubbed responses are consumed in
/// FIFO order; when a queue runs dry the mock answers with a canned default
/// instead of failing, so demo pipelines always complete.
#[derive(Debug)]
pub struct MockPlatform {
    agent_responses: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
    failing_agents: Mutex<HashMap<String, String>>,
    completions: Mutex<Vec<Completion>>,
    activation_feed: Mutex<Value>,
    records: Mutex<Vec<Value>>,
    calls: Mutex<Vec<String>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            agent_responses: Mutex::new(HashMap::new()),
            failing_agents: Mutex::new(HashMap::new()),
            completions: Mutex::new(Vec::new()),
            activation_feed: Mutex::new(Value::Array(Vec::new())),
            records: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a canned response for an agent.
    pub fn with_agent_response(self, agent: &str, data: Map<String, Value>) -> Self {
        self.agent_responses
            .lock()
            .unwrap()
            .entry(agent.to_string())
            .or_default()
            .push(data);
        self
    }

    /// Make an agent fail with the given error message.
    pub fn with_failing_agent(self, agent: &str, message: &str) -> Self {
        self.failing_agents
            .lock()
            .unwrap()
            .insert(agent.to_string(), message.to_string());
        self
    }

    /// Queue a canned completion.
    pub fn with_completion(self, text: &str) -> Self {
        self.with_completion_result(Completion {
            text: text.to_string(),
            status: "success".to_string(),
            model: Some("mock-model".to_string()),
            error: None,
        })
    }

    /// Queue a completion verbatim, e.g. one carrying an error field.
    pub fn with_completion_result(self, completion: Completion) -> Self {
        self.completions.lock().unwrap().push(completion);
        self
    }

    /// Set the raw payload the activation feed returns.
    pub fn with_activation_feed(self, raw: Value) -> Self {
        *self.activation_feed.lock().unwrap() = raw;
        self
    }

    /// Names of every call made, in order, for test assertions.
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Records created through `create_item`, in creation order.
    pub fn created_records(&self) -> Vec<Value> {
        self.records.lock().unwrap().clone()
    }

    fn record_call(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Activator for MockPlatform {
    async fn activate(&self, name: &str, input: &Value) -> Result<Map<String, Value>, PlatformError> {
        self.record_call(format!("activate:{name}"));

        if let Some(message) = self.failing_agents.lock().unwrap().get(name) {
            return Err(PlatformError::Activation(
                name.to_string(),
                message.clone(),
            ));
        }

        let queued = {
            let mut responses = self.agent_responses.lock().unwrap();
            responses.get_mut(name).and_then(|queue| {
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0))
                }
            })
        };

        Ok(queued.unwrap_or_else(|| {
            let mut data = Map::new();
            data.insert("agent".to_string(), json!(name));
            data.insert("echo".to_string(), input.clone());
            data.insert("mock".to_string(), json!(true));
            data
        }))
    }
}

#[async_trait::async_trait]
impl Completions for MockPlatform {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<Completion, PlatformError> {
        self.record_call("generate");

        let mut queue = self.completions.lock().unwrap();
        if queue.is_empty() {
            Ok(Completion {
                text: "(mock completion)".to_string(),
                status: "success".to_string(),
                model: Some("mock-model".to_string()),
                error: None,
            })
        } else {
            Ok(queue.remove(0))
        }
    }
}

#[async_trait::async_trait]
impl ActivationFeed for MockPlatform {
    async fn recent_activations(
        &self,
        conversation_id: &str,
        _limit: usize,
    ) -> Result<Value, PlatformError> {
        self.record_call(format!("activations:{conversation_id}"));
        Ok(self.activation_feed.lock().unwrap().clone())
    }
}

#[async_trait::async_trait]
impl Records for MockPlatform {
    async fn create_item(&self, model: &str, data: &Value) -> Result<Value, PlatformError> {
        self.record_call(format!("create:{model}"));

        let mut records = self.records.lock().unwrap();
        let record = json!({
            "id": format!("rec-{}", records.len() + 1),
            "model": model,
            "data": data,
        });
        records.push(record.clone());
        Ok(record)
    }

    async fn update_item(
        &self,
        model: &str,
        id: &str,
        patch: &Value,
    ) -> Result<Value, PlatformError> {
        self.record_call(format!("update:{model}:{id}"));
        Ok(json!({
            "id": id,
            "model": model,
            "data": patch,
        }))
    }
}

impl Platform for MockPlatform {
    fn backend(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_agent_responses_are_consumed_in_order() {
        let mut first = Map::new();
        first.insert("n".to_string(), json!(1));
        let mut second = Map::new();
        second.insert("n".to_string(), json!(2));

        let mock = MockPlatform::new()
            .with_agent_response("scorer", first)
            .with_agent_response("scorer", second);

        let a = mock.activate("scorer", &json!({})).await.unwrap();
        let b = mock.activate("scorer", &json!({})).await.unwrap();
        assert_eq!(a.get("n"), Some(&json!(1)));
        assert_eq!(b.get("n"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn drained_queue_falls_back_to_echo() {
        let mock = MockPlatform::new();
        let data = mock.activate("scorer", &json!({"lead": "Ada"})).await.unwrap();
        assert_eq!(data.get("mock"), Some(&json!(true)));
        assert_eq!(data.get("echo"), Some(&json!({"lead": "Ada"})));
    }

    #[tokio::test]
    async fn failing_agent_surfaces_an_error() {
        let mock = MockPlatform::new().with_failing_agent("scorer", "quota exceeded");
        let err = mock.activate("scorer", &json!({})).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn call_log_tracks_every_call() {
        let mock = MockPlatform::new();
        let _ = mock.activate("a", &json!({})).await;
        let _ = mock.generate("hi", &CompletionOptions::default()).await;
        let _ = mock.recent_activations("conv-1", 10).await;
        assert_eq!(
            mock.call_log(),
            vec!["activate:a", "generate", "activations:conv-1"]
        );
    }

    #[tokio::test]
    async fn created_records_get_sequential_ids() {
        let mock = MockPlatform::new();
        let first = mock.create_item("lead", &json!({"name": "Ada"})).await.unwrap();
        let second = mock.create_item("lead", &json!({"name": "Grace"})).await.unwrap();
        assert_eq!(first["id"], json!("rec-1"));
        assert_eq!(second["id"], json!("rec-2"));
        assert_eq!(mock.created_records().len(), 2);
    }
}
