use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const DEFAULT_MAX_MESSAGES: usize = 10;
pub const DEFAULT_MAX_LINES: usize = 20;

/// One activation pulled out of the raw platform feed. The feed's element
/// shape is loose; anything missing stays empty rather than failing.
#[derive(Debug, Clone, Default)]
pub struct ActivationRecord {
    pub id: Option<String>,
    pub started_at: Option<String>,
    pub input_data: Map<String, Value>,
    pub output_data: Value,
}

impl ActivationRecord {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            id: scalar_string(obj.get("id")),
            started_at: scalar_string(obj.get("started_at")),
            input_data: obj
                .get("input_data")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            output_data: obj.get("output_data").cloned().unwrap_or(Value::Null),
        })
    }

    /// The user-side message, wherever this feed variant put it.
    fn user_text(&self) -> Option<&str> {
        ["prompt", "message"]
            .iter()
            .find_map(|key| self.input_data.get(*key).and_then(Value::as_str))
    }

    /// The assistant-side reply; `output_data` may be a mapping or a bare string.
    fn assistant_text(&self) -> Option<&str> {
        match &self.output_data {
            Value::String(text) => Some(text.as_str()),
            Value::Object(map) => ["text", "response"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str)),
            _ => None,
        }
    }
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn record_array(raw: &Value) -> Option<&Vec<Value>> {
    match raw {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("activations")
            .or_else(|| map.get("items"))?
            .as_array(),
        _ => None,
    }
}

/// Flatten the feed's various top-level shapes (bare list, `{"activations"}`,
/// `{"items"}`, error string) into one record list. Unrecognized shapes and
/// error strings become an empty list; this never fails.
pub fn normalize_activations(raw: &Value) -> Vec<ActivationRecord> {
    record_array(raw)
        .map(|items| items.iter().filter_map(ActivationRecord::from_value).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
}

/// Bounded, chronologically-ordered slice of prior conversation turns, safe
/// to embed in a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub lines: Vec<TranscriptLine>,
}

impl Transcript {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Newline-joined `"Speaker: text"` lines for prompt embedding.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|line| format!("{}: {}", line.speaker.label(), line.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Rebuilds a bounded transcript from the raw activation feed.
///
/// The upstream fetch is expected to return activations newest-first; the
/// builder keeps the most recent `max_messages`, reverses them to oldest-first
/// and drops the in-flight user message so history never repeats the prompt
/// being answered.
#[derive(Debug, Clone)]
pub struct ContextWindowBuilder {
    max_messages: usize,
    max_lines: usize,
}

impl Default for ContextWindowBuilder {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            max_lines: DEFAULT_MAX_LINES,
        }
    }
}

impl ContextWindowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn build(&self, raw: &Value, current_message: Option<&str>) -> Option<Transcript> {
        let mut records = normalize_activations(raw);
        // Feed arrives newest-first; keep the most recent window only.
        records.truncate(self.max_messages);
        records.reverse();

        let current = current_message.map(str::trim);
        let mut lines = Vec::new();

        for record in &records {
            if let Some(user) = record.user_text() {
                let trimmed = user.trim();
                let in_flight = current.is_some_and(|c| c == trimmed);
                if !trimmed.is_empty() && !in_flight {
                    lines.push(TranscriptLine {
                        speaker: Speaker::User,
                        text: trimmed.to_string(),
                    });
                }
            }
            if let Some(reply) = record.assistant_text() {
                let trimmed = reply.trim();
                if !trimmed.is_empty() {
                    lines.push(TranscriptLine {
                        speaker: Speaker::Assistant,
                        text: trimmed.to_string(),
                    });
                }
            }
        }

        if lines.len() > self.max_lines {
            lines.drain(..lines.len() - self.max_lines);
        }

        if lines.is_empty() {
            None
        } else {
            Some(Transcript { lines })
        }
    }
}
