pub mod logging;
pub mod report;
pub mod runner;
pub mod step;

pub use logging::RunLogger;
pub use report::{LedgerEntry, PipelineReport, aggregate_quality_scores};
pub use runner::{PipelineRunner, RunContext};
pub use step::{
    FailurePolicy, FnStep, PipelineEntry, Step, StepData, StepDescriptor, StepFailure, StepResult,
    parallel,
};
