use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::pipeline::logging::RunLogger;
use crate::pipeline::report::{LedgerEntry, PipelineReport};
use crate::pipeline::step::{
    FailurePolicy, PipelineEntry, Step, StepData, StepDescriptor, StepResult,
};
use crate::state::PipelineState;

/// Read-only run metadata handed to every step. Steps never mutate it.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub pipeline: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

/// Executes a declared sequence of steps and fan-out groups against shared
/// state and returns a single report. Step failures become ledger data; the
/// only errors crossing `run` are precondition violations.
pub struct PipelineRunner {
    name: String,
    logger: Option<RunLogger>,
}

impl PipelineRunner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: RunLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub async fn run(
        &self,
        entries: &[PipelineEntry],
        initial_state: PipelineState,
    ) -> Result<PipelineReport, PipelineError> {
        validate_entries(entries)?;

        let ctx = RunContext {
            pipeline: self.name.clone(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        };
        let run_start = Instant::now();
        debug!("pipeline '{}' run {} starting", ctx.pipeline, ctx.run_id);
        self.log_run_event(&ctx, "run_started", serde_json::json!({}));

        let mut state = initial_state;
        let mut ledger: Vec<LedgerEntry> = Vec::new();

        for entry in entries {
            match entry {
                PipelineEntry::Step(descriptor) => {
                    let result = execute_step(descriptor, &state, &ctx).await;
                    self.log_step(&ctx, descriptor.name(), &result);
                    ledger.push(LedgerEntry::from_result(descriptor.name(), &result));

                    if result.success {
                        state.merge(result.data);
                        continue;
                    }

                    match descriptor.policy() {
                        FailurePolicy::Abort => {
                            let error = result
                                .error
                                .unwrap_or_else(|| format!("step '{}' failed", descriptor.name()));
                            warn!(
                                "pipeline '{}' aborted at step '{}': {}",
                                ctx.pipeline,
                                descriptor.name(),
                                error
                            );
                            let report = PipelineReport::failed(
                                ctx.pipeline.clone(),
                                ctx.run_id,
                                run_start.elapsed().as_secs_f64(),
                                ledger,
                                state,
                                error,
                            );
                            self.log_run_finished(&ctx, &report);
                            return Ok(report);
                        }
                        FailurePolicy::ContinueWithFallback(fallback) => {
                            debug!(
                                "step '{}' failed, continuing with fallback",
                                descriptor.name()
                            );
                            state.merge(fallback.clone());
                        }
                    }
                }
                PipelineEntry::Parallel(branches) => {
                    let results = execute_group(branches, &state, &ctx).await;

                    let mut abort: Option<(String, String)> = None;
                    for (descriptor, result) in branches.iter().zip(results) {
                        self.log_step(&ctx, descriptor.name(), &result);
                        ledger.push(LedgerEntry::from_result(descriptor.name(), &result));

                        if result.success {
                            state.merge_namespaced(descriptor.name(), result.data);
                            continue;
                        }

                        match descriptor.policy() {
                            FailurePolicy::Abort => {
                                if abort.is_none() {
                                    let error = result.error.unwrap_or_else(|| {
                                        format!("branch '{}' failed", descriptor.name())
                                    });
                                    abort = Some((descriptor.name().to_string(), error));
                                }
                            }
                            FailurePolicy::ContinueWithFallback(fallback) => {
                                state.merge_namespaced(descriptor.name(), fallback.clone());
                            }
                        }
                    }

                    if let Some((branch, error)) = abort {
                        warn!(
                            "pipeline '{}' aborted after fan-out branch '{}': {}",
                            ctx.pipeline, branch, error
                        );
                        let report = PipelineReport::failed(
                            ctx.pipeline.clone(),
                            ctx.run_id,
                            run_start.elapsed().as_secs_f64(),
                            ledger,
                            state,
                            error,
                        );
                        self.log_run_finished(&ctx, &report);
                        return Ok(report);
                    }
                }
            }
        }

        let report = PipelineReport::succeeded(
            ctx.pipeline.clone(),
            ctx.run_id,
            run_start.elapsed().as_secs_f64(),
            ledger,
            state,
        );
        debug!(
            "pipeline '{}' run {} finished in {:.3}s",
            ctx.pipeline, ctx.run_id, report.execution_time
        );
        self.log_run_finished(&ctx, &report);
        Ok(report)
    }

    fn log_step(&self, ctx: &RunContext, step: &str, result: &StepResult) {
        let Some(logger) = &self.logger else {
            return;
        };
        if let Err(e) = logger.log_step(step, result) {
            warn!(
                "pipeline '{}': failed to write run log for step '{}': {}",
                ctx.pipeline, step, e
            );
        }
    }

    fn log_run_event(&self, ctx: &RunContext, event: &str, data: serde_json::Value) {
        let Some(logger) = &self.logger else {
            return;
        };
        if let Err(e) = logger.log_event(event, data) {
            warn!(
                "pipeline '{}': failed to write run log event '{}': {}",
                ctx.pipeline, event, e
            );
        }
    }

    fn log_run_finished(&self, ctx: &RunContext, report: &PipelineReport) {
        self.log_run_event(
            ctx,
            "run_finished",
            serde_json::json!({
                "success": report.success,
                "execution_time": report.execution_time,
                "steps": report.ledger.len(),
            }),
        );
    }
}

fn validate_entries(entries: &[PipelineEntry]) -> Result<(), PipelineError> {
    if entries.is_empty() {
        return Err(PipelineError::EmptyPipeline);
    }

    let mut seen = HashSet::new();
    let mut check = |descriptor: &StepDescriptor| -> Result<(), PipelineError> {
        if !seen.insert(descriptor.name().to_string()) {
            return Err(PipelineError::DuplicateStepName(
                descriptor.name().to_string(),
            ));
        }
        Ok(())
    };

    for entry in entries {
        match entry {
            PipelineEntry::Step(descriptor) => check(descriptor)?,
            PipelineEntry::Parallel(branches) => {
                for descriptor in branches {
                    check(descriptor)?;
                }
            }
        }
    }

    Ok(())
}

/// Run one step against a snapshot of state, converting panics and failures
/// into a `StepResult` so nothing escapes the runner.
async fn execute_step(
    descriptor: &StepDescriptor,
    state: &PipelineState,
    ctx: &RunContext,
) -> StepResult {
    let start = Instant::now();
    let outcome = AssertUnwindSafe(descriptor.step.run(state.clone(), ctx.clone()))
        .catch_unwind()
        .await;
    let elapsed = start.elapsed().as_secs_f64();

    match outcome {
        Ok(Ok(data)) => StepResult::ok(data, elapsed),
        Ok(Err(failure)) => StepResult::failed(failure.message, failure.partial, elapsed),
        Err(panic) => StepResult::failed(
            format!("step panicked: {}", panic_message(&*panic)),
            StepData::new(),
            elapsed,
        ),
    }
}

/// Fan-out: dispatch every branch against the same snapshot and wait for all
/// of them. A failing branch never cancels its siblings.
async fn execute_group(
    branches: &[StepDescriptor],
    state: &PipelineState,
    ctx: &RunContext,
) -> Vec<StepResult> {
    let handles: Vec<_> = branches
        .iter()
        .map(|descriptor| {
            let step: Arc<dyn Step> = Arc::clone(&descriptor.step);
            let snapshot = state.clone();
            let branch_ctx = ctx.clone();
            tokio::spawn(async move {
                let start = Instant::now();
                let outcome = step.run(snapshot, branch_ctx).await;
                let elapsed = start.elapsed().as_secs_f64();
                match outcome {
                    Ok(data) => StepResult::ok(data, elapsed),
                    Err(failure) => {
                        StepResult::failed(failure.message, failure.partial, elapsed)
                    }
                }
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    format!("step panicked: {}", panic_message(&*join_err.into_panic()))
                } else {
                    "step task was cancelled".to_string()
                };
                results.push(StepResult::failed(message, StepData::new(), 0.0));
            }
        }
    }
    results
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
