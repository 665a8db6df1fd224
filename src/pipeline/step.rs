use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::errors::PlatformError;
use crate::pipeline::runner::RunContext;
use crate::state::PipelineState;

/// Structured output a successful step merges into the shared state.
pub type StepData = Map<String, Value>;

/// Failure raised by a step body. `partial` may carry whatever output the
/// step produced before failing, kept for diagnostics only.
#[derive(Debug, Clone, Default)]
pub struct StepFailure {
    pub message: String,
    pub partial: StepData,
}

impl StepFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial: StepData::new(),
        }
    }

    pub fn with_partial(mut self, partial: StepData) -> Self {
        self.partial = partial;
        self
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StepFailure {}

impl From<String> for StepFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for StepFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<PlatformError> for StepFailure {
    fn from(err: PlatformError) -> Self {
        Self::new(err.to_string())
    }
}

/// A single unit of pipeline work. Implementations receive an isolated
/// snapshot of the current state plus read-only run metadata, and return the
/// mapping to merge on success.
#[async_trait::async_trait]
pub trait Step: Send + Sync {
    /// Unique name within one pipeline run; used for the ledger and for
    /// branch-namespaced merges.
    fn name(&self) -> &str;

    async fn run(&self, state: PipelineState, ctx: RunContext) -> Result<StepData, StepFailure>;
}

/// Closure adapter so demo pipelines and tests can declare steps inline.
pub struct FnStep<F> {
    name: String,
    body: F,
}

impl<F, Fut> FnStep<F>
where
    F: Fn(PipelineState, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepData, StepFailure>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

#[async_trait::async_trait]
impl<F, Fut> Step for FnStep<F>
where
    F: Fn(PipelineState, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepData, StepFailure>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: PipelineState, ctx: RunContext) -> Result<StepData, StepFailure> {
        (self.body)(state, ctx).await
    }
}

/// What the runner does when a step fails.
#[derive(Debug, Clone)]
pub enum FailurePolicy {
    /// Stop the run and surface the error with whatever state accumulated.
    Abort,
    /// Record the failure, merge this fallback mapping, and keep going.
    ContinueWithFallback(StepData),
}

/// A step plus its failure policy, as declared in a pipeline.
#[derive(Clone)]
pub struct StepDescriptor {
    pub(crate) step: Arc<dyn Step>,
    pub(crate) on_failure: FailurePolicy,
}

impl StepDescriptor {
    /// Wrap a step with the default `Abort` policy.
    pub fn new(step: impl Step + 'static) -> Self {
        Self::from_arc(Arc::new(step))
    }

    pub fn from_arc(step: Arc<dyn Step>) -> Self {
        Self {
            step,
            on_failure: FailurePolicy::Abort,
        }
    }

    /// Tolerate failure: merge `fallback` and continue the run.
    pub fn tolerate_with(mut self, fallback: StepData) -> Self {
        self.on_failure = FailurePolicy::ContinueWithFallback(fallback);
        self
    }

    pub fn name(&self) -> &str {
        self.step.name()
    }

    pub fn policy(&self) -> &FailurePolicy {
        &self.on_failure
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("name", &self.name())
            .field("on_failure", &self.on_failure)
            .finish()
    }
}

/// One declared position in a pipeline: a single step, or a fan-out group
/// whose members run concurrently against the same state snapshot.
#[derive(Debug, Clone)]
pub enum PipelineEntry {
    Step(StepDescriptor),
    Parallel(Vec<StepDescriptor>),
}

impl From<StepDescriptor> for PipelineEntry {
    fn from(descriptor: StepDescriptor) -> Self {
        PipelineEntry::Step(descriptor)
    }
}

/// Declare a fan-out group.
pub fn parallel(steps: Vec<StepDescriptor>) -> PipelineEntry {
    PipelineEntry::Parallel(steps)
}

/// Outcome of one step invocation, as recorded by the runner. Immutable after
/// creation. A failed result may still carry partial `data` for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub data: StepData,
    pub error: Option<String>,
    /// Wall-clock seconds spent inside the step body.
    pub execution_time: f64,
}

impl StepResult {
    pub(crate) fn ok(data: StepData, execution_time: f64) -> Self {
        Self {
            success: true,
            data,
            error: None,
            execution_time,
        }
    }

    pub(crate) fn failed(error: impl Into<String>, partial: StepData, execution_time: f64) -> Self {
        Self {
            success: false,
            data: partial,
            error: Some(error.into()),
            execution_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_failure_carries_partial_data() {
        let mut partial = StepData::new();
        partial.insert("attempted".to_string(), json!(true));
        let failure = StepFailure::new("upstream 503").with_partial(partial);

        assert_eq!(failure.message, "upstream 503");
        assert_eq!(failure.partial.get("attempted"), Some(&json!(true)));
    }

    #[test]
    fn descriptor_defaults_to_abort() {
        let step = FnStep::new("noop", |_state, _ctx| async { Ok::<_, StepFailure>(StepData::new()) });
        let descriptor = StepDescriptor::new(step);
        assert!(matches!(descriptor.policy(), FailurePolicy::Abort));
        assert_eq!(descriptor.name(), "noop");
    }

    #[test]
    fn tolerate_with_stores_fallback() {
        let step = FnStep::new("flaky", |_state, _ctx| async { Ok::<_, StepFailure>(StepData::new()) });
        let mut fallback = StepData::new();
        fallback.insert("score".to_string(), json!(0));
        let descriptor = StepDescriptor::new(step).tolerate_with(fallback);

        match descriptor.policy() {
            FailurePolicy::ContinueWithFallback(data) => {
                assert_eq!(data.get("score"), Some(&json!(0)));
            }
            other => panic!("expected fallback policy, got: {other:?}"),
        }
    }

    #[test]
    fn failed_result_keeps_partial_data() {
        let mut partial = StepData::new();
        partial.insert("half".to_string(), json!("done"));
        let result = StepResult::failed("boom", partial, 0.25);

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.data.get("half"), Some(&json!("done")));
    }
}
