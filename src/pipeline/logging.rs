use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pipeline::step::StepResult;
use crate::redact::redact_secrets;

/// Append-only JSONL log of one pipeline's run events. Error strings are
/// redacted before they hit disk.
pub struct RunLogger {
    run_id: Option<String>,
    file: Mutex<File>,
}

impl RunLogger {
    pub fn new(log_dir: PathBuf) -> io::Result<Self> {
        create_dir_all(&log_dir)?;
        let path = log_dir.join("events.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            run_id: None,
            file: Mutex::new(file),
        })
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn log_step(&self, step: &str, result: &StepResult) -> io::Result<()> {
        let mut data = serde_json::Map::new();
        data.insert("success".to_string(), result.success.into());
        data.insert(
            "execution_time".to_string(),
            serde_json::json!(result.execution_time),
        );
        if let Some(error) = &result.error {
            data.insert(
                "error".to_string(),
                serde_json::Value::String(redact_secrets(error)),
            );
        }
        self.log_event(step, serde_json::Value::Object(data))
    }

    /// Note: `flush` only pushes to OS buffers; it does not guarantee durability on disk.
    /// Use `sync_data`/`sync_all` (or a future config) if fsync-level durability is required.
    pub fn log_event(&self, step: &str, data: serde_json::Value) -> io::Result<()> {
        let mut event = serde_json::Map::new();
        event.insert(
            "step".to_string(),
            serde_json::Value::String(step.to_string()),
        );
        event.insert("data".to_string(), data);

        if let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) {
            let millis = duration.as_millis() as u64;
            event.insert("ts".to_string(), serde_json::Value::Number(millis.into()));
        }

        if let Some(run_id) = &self.run_id {
            event.insert(
                "run_id".to_string(),
                serde_json::Value::String(run_id.clone()),
            );
        }

        let line = serde_json::to_string(&event).map_err(io::Error::other)?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("logger mutex poisoned"))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}
