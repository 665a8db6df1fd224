use log::debug;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::pipeline::runner::RunContext;
use crate::pipeline::step::{Step, StepData, StepFailure};
use crate::platform::{CompletionOptions, Platform};
use crate::state::PipelineState;
use crate::transcript::ContextWindowBuilder;

/// Activates a named platform agent with a payload drawn from the state bag
/// and merges whatever mapping the agent returns.
pub struct ActivationStep {
    name: String,
    agent: String,
    platform: Arc<dyn Platform>,
    input_keys: Vec<String>,
}

impl ActivationStep {
    pub fn new(
        name: impl Into<String>,
        agent: impl Into<String>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            name: name.into(),
            agent: agent.into(),
            platform,
            input_keys: Vec::new(),
        }
    }

    /// Send only these state keys to the agent instead of the whole bag.
    pub fn with_input_keys(mut self, keys: &[&str]) -> Self {
        self.input_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    fn build_input(&self, state: &PipelineState) -> Value {
        if self.input_keys.is_empty() {
            return Value::Object(state.as_map().clone());
        }
        let mut input = serde_json::Map::new();
        for key in &self.input_keys {
            if let Some(value) = state.get(key) {
                input.insert(key.clone(), value.clone());
            }
        }
        Value::Object(input)
    }
}

#[async_trait::async_trait]
impl Step for ActivationStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: PipelineState, _ctx: RunContext) -> Result<StepData, StepFailure> {
        let input = self.build_input(&state);
        let data = self.platform.activate(&self.agent, &input).await?;
        Ok(data)
    }
}

/// Prompts the completion service with a template filled from state,
/// optionally prefixed with a windowed conversation transcript.
pub struct CompletionStep {
    name: String,
    prompt_template: String,
    output_key: String,
    options: CompletionOptions,
    platform: Arc<dyn Platform>,
    window: Option<ContextWindowBuilder>,
    conversation_key: String,
    message_key: String,
}

impl CompletionStep {
    pub fn new(
        name: impl Into<String>,
        prompt_template: impl Into<String>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            name: name.into(),
            prompt_template: prompt_template.into(),
            output_key: "text".to_string(),
            options: CompletionOptions::default(),
            platform,
            window: None,
            conversation_key: "conversation_id".to_string(),
            message_key: "message".to_string(),
        }
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Prefix the prompt with conversation history windowed by `window`.
    /// The conversation id is read from the `conversation_id` state key and
    /// the in-flight message (deduplicated from history) from `message`.
    pub fn with_window(mut self, window: ContextWindowBuilder) -> Self {
        self.window = Some(window);
        self
    }

    async fn history_prefix(&self, state: &PipelineState) -> Option<String> {
        let window = self.window.as_ref()?;
        let conversation = state.get(&self.conversation_key).and_then(Value::as_str)?;

        let raw = match self
            .platform
            .recent_activations(conversation, window.max_messages())
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                // Fetch failure and empty history read the same: no transcript.
                debug!(
                    "step '{}': activation feed unavailable, continuing without history: {e}",
                    self.name
                );
                return None;
            }
        };

        let current = state.get(&self.message_key).and_then(Value::as_str);
        let transcript = window.build(&raw, current)?;
        Some(transcript.render())
    }
}

#[async_trait::async_trait]
impl Step for CompletionStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: PipelineState, _ctx: RunContext) -> Result<StepData, StepFailure> {
        let mut prompt = render_template(&self.prompt_template, &state);
        if let Some(history) = self.history_prefix(&state).await {
            prompt = format!("Conversation so far:\n{history}\n\n{prompt}");
        }

        let completion = self.platform.generate(&prompt, &self.options).await?;

        if let Some(error) = completion.error {
            let mut partial = StepData::new();
            partial.insert("status".to_string(), json!(completion.status));
            return Err(StepFailure::new(error).with_partial(partial));
        }

        let mut data = StepData::new();
        data.insert(self.output_key.clone(), json!(completion.text));
        Ok(data)
    }
}

/// Persists a state subtree as a platform record.
pub struct RecordStep {
    name: String,
    model: String,
    source_key: Option<String>,
    platform: Arc<dyn Platform>,
}

impl RecordStep {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            source_key: None,
            platform,
        }
    }

    /// Persist only this state key's subtree instead of the whole bag.
    pub fn with_source_key(mut self, key: impl Into<String>) -> Self {
        self.source_key = Some(key.into());
        self
    }
}

#[async_trait::async_trait]
impl Step for RecordStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: PipelineState, _ctx: RunContext) -> Result<StepData, StepFailure> {
        let payload = match &self.source_key {
            Some(key) => state
                .get(key)
                .cloned()
                .ok_or_else(|| StepFailure::new(format!("state key '{key}' missing")))?,
            None => Value::Object(state.as_map().clone()),
        };

        let record = self.platform.create_item(&self.model, &payload).await?;

        let mut data = StepData::new();
        data.insert("record".to_string(), record);
        Ok(data)
    }
}

/// Fill `{key}` placeholders from the state bag. String values are inserted
/// verbatim; everything else uses its JSON rendering.
fn render_template(template: &str, state: &PipelineState) -> String {
    let mut rendered = template.to_string();
    for (key, value) in state.as_map() {
        let placeholder = format!("{{{key}}}");
        if !rendered.contains(&placeholder) {
            continue;
        }
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&placeholder, &replacement);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatform;
    use chrono::Utc;
    use uuid::Uuid;

    fn ctx() -> RunContext {
        RunContext {
            pipeline: "test".to_string(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    fn state_with(entries: Value) -> PipelineState {
        match entries {
            Value::Object(map) => PipelineState::from(map),
            other => panic!("expected object, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn activation_step_sends_selected_keys_only() {
        let mock = Arc::new(MockPlatform::new());
        let step = ActivationStep::new("score", "lead-scorer", mock.clone())
            .with_input_keys(&["lead"]);
        let state = state_with(json!({"lead": {"name": "Ada"}, "internal": "hidden"}));

        let data = step.run(state, ctx()).await.unwrap();
        assert_eq!(data.get("agent"), Some(&json!("lead-scorer")));
        assert_eq!(data.get("echo"), Some(&json!({"lead": {"name": "Ada"}})));
        assert_eq!(mock.call_log(), vec!["activate:lead-scorer"]);
    }

    #[tokio::test]
    async fn activation_failure_becomes_step_failure() {
        let mock = Arc::new(MockPlatform::new().with_failing_agent("scorer", "quota exceeded"));
        let step = ActivationStep::new("score", "scorer", mock);

        let err = step.run(PipelineState::new(), ctx()).await.unwrap_err();
        assert!(err.message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn completion_step_fills_template_and_returns_text() {
        let mock = Arc::new(MockPlatform::new().with_completion("Looks promising."));
        let step = CompletionStep::new("summarize", "Summarize lead {name}.", mock)
            .with_output_key("summary");
        let state = state_with(json!({"name": "Ada"}));

        let data = step.run(state, ctx()).await.unwrap();
        assert_eq!(data.get("summary"), Some(&json!("Looks promising.")));
    }

    #[tokio::test]
    async fn completion_step_prefixes_windowed_history() {
        let feed = json!({"activations": [{
            "id": 1,
            "input_data": {"prompt": "hello"},
            "output_data": {"text": "hi there"},
        }]});
        let mock = Arc::new(
            MockPlatform::new()
                .with_activation_feed(feed)
                .with_completion("done"),
        );
        let step = CompletionStep::new("chat", "Reply to: {message}", mock.clone())
            .with_window(ContextWindowBuilder::new());
        let state = state_with(json!({
            "conversation_id": "conv-1",
            "message": "how are you?",
        }));

        let data = step.run(state, ctx()).await.unwrap();
        assert_eq!(data.get("text"), Some(&json!("done")));
        // Feed was consulted before the completion call.
        assert_eq!(mock.call_log(), vec!["activations:conv-1", "generate"]);
    }

    #[tokio::test]
    async fn completion_step_skips_history_without_conversation_id() {
        let mock = Arc::new(MockPlatform::new().with_completion("done"));
        let step = CompletionStep::new("chat", "Reply to: {message}", mock.clone())
            .with_window(ContextWindowBuilder::new());
        let state = state_with(json!({"message": "hi"}));

        let data = step.run(state, ctx()).await.unwrap();
        assert_eq!(data.get("text"), Some(&json!("done")));
        assert_eq!(mock.call_log(), vec!["generate"]);
    }

    #[tokio::test]
    async fn completion_error_field_fails_the_step_with_status() {
        let erroring = crate::platform::Completion {
            text: String::new(),
            status: "error".to_string(),
            model: None,
            error: Some("model overloaded".to_string()),
        };
        let mock = Arc::new(MockPlatform::new().with_completion_result(erroring));
        let step = CompletionStep::new("chat", "prompt", mock);

        let err = step.run(PipelineState::new(), ctx()).await.unwrap_err();
        assert_eq!(err.message, "model overloaded");
        assert_eq!(err.partial.get("status"), Some(&json!("error")));
    }

    #[tokio::test]
    async fn record_step_persists_selected_subtree() {
        let mock = Arc::new(MockPlatform::new());
        let step = RecordStep::new("save", "lead", mock.clone()).with_source_key("lead");
        let state = state_with(json!({"lead": {"name": "Ada"}, "noise": true}));

        let data = step.run(state, ctx()).await.unwrap();
        assert_eq!(data["record"]["id"], json!("rec-1"));
        assert_eq!(mock.created_records().len(), 1);
        assert_eq!(mock.created_records()[0]["data"], json!({"name": "Ada"}));
    }

    #[tokio::test]
    async fn record_step_missing_source_key_fails() {
        let mock = Arc::new(MockPlatform::new());
        let step = RecordStep::new("save", "lead", mock).with_source_key("lead");

        let err = step.run(PipelineState::new(), ctx()).await.unwrap_err();
        assert!(err.message.contains("lead"));
    }

    #[test]
    fn template_renders_strings_and_json_values() {
        let state = state_with(json!({"name": "Ada", "score": 85}));
        let rendered = render_template("Lead {name} scored {score}.", &state);
        assert_eq!(rendered, "Lead Ada scored 85.");
    }

    #[test]
    fn template_leaves_unknown_placeholders_alone() {
        let state = state_with(json!({"name": "Ada"}));
        let rendered = render_template("{name} / {missing}", &state);
        assert_eq!(rendered, "Ada / {missing}");
    }
}
