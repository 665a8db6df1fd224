pub mod app_config;
pub mod console;
pub mod errors;
pub mod manifest;
pub mod pipeline;
pub mod platform;
pub mod redact;
pub mod state;
pub mod steps;
pub mod transcript;

pub use crate::app_config::AppConfig;
pub use crate::errors::{PipelineError, PlatformError};
pub use crate::manifest::{PipelineManifest, StepRegistry};
pub use crate::pipeline::{
    FailurePolicy, FnStep, LedgerEntry, PipelineEntry, PipelineReport, PipelineRunner, RunContext,
    RunLogger, Step, StepData, StepDescriptor, StepFailure, StepResult, aggregate_quality_scores,
    parallel,
};
pub use crate::platform::{
    Activator, ActivationFeed, Completion, CompletionOptions, Completions, HttpPlatform,
    MockPlatform, Platform, Records, create_platform,
};
pub use crate::state::PipelineState;
pub use crate::steps::{ActivationStep, CompletionStep, RecordStep};
pub use crate::transcript::{ContextWindowBuilder, Speaker, Transcript, TranscriptLine};
