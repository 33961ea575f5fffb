//! Error types for the DM bridge library.

use std::fmt;

use thiserror::Error;

/// Operation stage used to prefix execution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Insert,
    Select,
    Count,
    Update,
    Delete,
    Native,
    Bulk,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Insert => "insert data",
            Stage::Select => "select data",
            Stage::Count => "select count data",
            Stage::Update => "update data",
            Stage::Delete => "delete data",
            Stage::Native => "native query",
            Stage::Bulk => "bulk create data",
        };
        f.write_str(label)
    }
}

/// Main error type for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Pool or connection establishment failed.
    #[error("init dmdb error: {0}")]
    Init(String),

    /// Statement could not be compiled from the given identifiers or data.
    #[error("compile error: {0}")]
    Compile(String),

    /// The engine rejected a statement.
    #[error("{stage} error: {message}")]
    Execution { stage: Stage, message: String },

    /// The driver reported a failure; carries the driver's own message.
    #[error("{0}")]
    Driver(String),

    /// Draining a large-object column failed.
    #[error("large object read error: {0}")]
    Stream(String),

    /// The source collaborator failed to read rows.
    #[error("source database error: {0}")]
    Source(String),

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Create an Execution error for the given stage.
    pub fn execution(stage: Stage, message: impl fmt::Display) -> Self {
        BridgeError::Execution {
            stage,
            message: message.to_string(),
        }
    }

    /// Attribute this error to an operation stage.
    ///
    /// Init and Compile errors keep their own kind; an error that already
    /// carries a stage is returned untouched.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            BridgeError::Init(_) | BridgeError::Compile(_) | BridgeError::Execution { .. } => self,
            BridgeError::Driver(message) | BridgeError::Stream(message) => {
                BridgeError::execution(stage, message)
            }
            other => BridgeError::execution(stage, other),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            BridgeError::Config(_) | BridgeError::Yaml(_) | BridgeError::Json(_) => 1,
            BridgeError::Init(_) => 2,
            BridgeError::Compile(_)
            | BridgeError::Execution { .. }
            | BridgeError::Driver(_)
            | BridgeError::Stream(_) => 3,
            BridgeError::Source(_) => 4,
            BridgeError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
