use thiserror::Error;

/// Contract violations surfaced by the runner before any step executes.
/// Everything that happens after validation is reported as data, never as an
/// error crossing `run`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("pipeline has no steps")]
    EmptyPipeline,

    #[error("duplicate step name: {0}")]
    DuplicateStepName(String),

    #[error("unknown step: {0}")]
    UnknownStep(String),
}

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Missing API key for platform '{0}'")]
    MissingApiKey(String),

    #[error("Platform API Error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected platform response: {0}")]
    InvalidResponse(String),

    #[error("Agent '{0}' failed to activate: {1}")]
    Activation(String, String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),
}
