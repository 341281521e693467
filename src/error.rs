//! Typed errors for the page transformation pipeline.
//!
//! Fatal configuration errors, per-task failures and cancellation all travel
//! through [`TransformationError`]. Collaborator failures (source provider,
//! target store, mapping providers, hooks) are boxed so that any implementation
//! can surface its own error type.

use thiserror::Error;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while transforming pages or tracking a transformation process.
#[derive(Debug, Error)]
pub enum TransformationError {
    /// A required argument or collaborator was not supplied
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    /// The target site is built from a template the generator cannot write to
    #[error("target site template '{template}' is not supported for modern pages")]
    UnsupportedSiteTemplate { template: String },

    /// A source row needs more columns than a modern section can hold
    #[error("row {row} requires {columns} columns, at most 3 are supported")]
    TooManyColumns { row: u32, columns: u32 },

    /// The target page exists and overwriting is disabled
    #[error("target page {url} already exists and overwrite is disabled")]
    PageAlreadyExists { url: String },

    /// Cooperative cancellation was observed
    #[error("operation cancelled")]
    Cancelled,

    /// The source provider failed to enumerate or fetch an item
    #[error("source provider error: {0}")]
    SourceProvider(#[source] BoxError),

    /// The target content store rejected a call
    #[error("target store error: {0}")]
    TargetStore(#[source] BoxError),

    /// A mapping provider failed
    #[error("mapping error in {provider}: {source}")]
    Mapping {
        provider: &'static str,
        #[source]
        source: BoxError,
    },

    /// A pre- or post-transformation hook failed
    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: &'static str,
        #[source]
        source: BoxError,
    },

    /// Reading or writing durable status failed
    #[error("state manager error: {0}")]
    StateManager(String),

    /// No process with the given id is known to the executor
    #[error("transformation process {0} not found")]
    ProcessNotFound(uuid::Uuid),

    /// `start_process` was called while a run is still active
    #[error("transformation process {0} is already running")]
    ProcessAlreadyRunning(uuid::Uuid),

    /// The background run of a process ended without reporting a final status
    #[error("transformation process {0} run ended without a final status")]
    RunLoop(uuid::Uuid),

    /// Markup could not be normalized
    #[error("markup error: {0}")]
    Markup(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl TransformationError {
    /// True when the error represents the cancellation control path rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransformationError::Cancelled)
    }

    pub fn mapping(provider: &'static str, source: impl Into<BoxError>) -> Self {
        TransformationError::Mapping {
            provider,
            source: source.into(),
        }
    }

    /// Wraps a hook failure; cancellation passes through untouched.
    pub fn hook(stage: &'static str, source: TransformationError) -> Self {
        if source.is_cancellation() {
            return source;
        }
        TransformationError::Hook {
            stage,
            source: Box::new(source),
        }
    }

    /// Formats the error and its full source chain, one cause per line.
    pub fn trace(&self) -> String {
        let mut trace = format!("{self:?}");
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            trace.push_str("\ncaused by: ");
            trace.push_str(&cause.to_string());
            current = cause.source();
        }
        trace
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TransformationError>;
