//! Error types for strata operations.
//!
//! Every failure raised while propagating a structural change, generating
//! versioning logic or rebuilding an interface surfaces as a [`StrataError`].
//! The engine never retries and never suppresses: the enclosing transaction
//! rolls back and the caller sees which layer or object triggered the error.

use thiserror::Error;

/// Result type alias for strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

/// Main error type for all strata operations.
#[derive(Error, Debug)]
pub enum StrataError {
    /// A table, column, index or function does not exist in the expected layer.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        object: Option<String>,
    },

    /// The resulting name or definition collides with an existing object.
    #[error("Structural conflict: {message}")]
    StructuralConflict {
        message: String,
        code: ErrorCode,
        object: Option<String>,
    },

    /// The physical layers of a logical table disagree with each other.
    #[error("Inconsistent layer state for '{table}': {message}")]
    InconsistentLayerState {
        message: String,
        code: ErrorCode,
        table: String,
    },

    /// The backend rejected a statement.
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        code: ErrorCode,
        sqlstate: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A table or column definition is not acceptable.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        suggestion: Option<String>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Not found (NF_xxx)
    TableNotFound,
    ColumnNotFound,
    IndexNotFound,
    SequenceNotFound,

    // Conflicts (CONF_xxx)
    DuplicateTable,
    DuplicateColumn,
    DuplicateIndex,
    ReservedName,
    PrimaryKeyChange,

    // Layers (LAYER_xxx)
    LayerMissing,
    LayerMismatch,
    StaleInterface,

    // Backend (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,
    DbLockTimeout,

    // Validation (VAL_xxx)
    ValInvalidIdentifier,
    ValInvalidDefinition,
    ValPrimaryKeyRequired,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TableNotFound => "NF_001",
            ErrorCode::ColumnNotFound => "NF_002",
            ErrorCode::IndexNotFound => "NF_003",
            ErrorCode::SequenceNotFound => "NF_004",
            ErrorCode::DuplicateTable => "CONF_001",
            ErrorCode::DuplicateColumn => "CONF_002",
            ErrorCode::DuplicateIndex => "CONF_003",
            ErrorCode::ReservedName => "CONF_004",
            ErrorCode::PrimaryKeyChange => "CONF_005",
            ErrorCode::LayerMissing => "LAYER_001",
            ErrorCode::LayerMismatch => "LAYER_002",
            ErrorCode::StaleInterface => "LAYER_003",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::DbLockTimeout => "DB_003",
            ErrorCode::ValInvalidIdentifier => "VAL_001",
            ErrorCode::ValInvalidDefinition => "VAL_002",
            ErrorCode::ValPrimaryKeyRequired => "VAL_003",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl StrataError {
    /// Create a "table not found" error.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::NotFound {
            message: format!("table '{}' does not exist", table),
            code: ErrorCode::TableNotFound,
            object: Some(table),
        }
    }

    /// Create a "column not found" error.
    pub fn column_not_found(table: &str, column: &str) -> Self {
        Self::NotFound {
            message: format!("column '{}' does not exist on '{}'", column, table),
            code: ErrorCode::ColumnNotFound,
            object: Some(format!("{}.{}", table, column)),
        }
    }

    /// Create an "index not found" error.
    pub fn index_not_found(location: &str, index: &str) -> Self {
        Self::NotFound {
            message: format!("index '{}' does not exist on '{}'", index, location),
            code: ErrorCode::IndexNotFound,
            object: Some(index.to_string()),
        }
    }

    /// Create a not found error with an explicit code.
    pub fn not_found(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            code,
            object: None,
        }
    }

    /// Create a structural conflict error.
    pub fn conflict(code: ErrorCode, object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StructuralConflict {
            message: message.into(),
            code,
            object: Some(object.into()),
        }
    }

    /// Create an inconsistent layer state error.
    pub fn inconsistent(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InconsistentLayerState {
            message: message.into(),
            code: ErrorCode::LayerMismatch,
            table: table.into(),
        }
    }

    /// Create an inconsistent layer state error for a missing layer.
    pub fn layer_missing(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InconsistentLayerState {
            message: message.into(),
            code: ErrorCode::LayerMissing,
            table: table.into(),
        }
    }

    /// Create an inconsistent layer state error for an interface built for
    /// another column set.
    pub fn stale_interface(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InconsistentLayerState {
            message: message.into(),
            code: ErrorCode::StaleInterface,
            table: table.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            sqlstate: None,
            source: None,
        }
    }

    /// Create a backend error wrapping the driver error.
    pub fn backend_source(
        message: impl Into<String>,
        sqlstate: Option<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let code = match sqlstate.as_deref() {
            Some("55P03") => ErrorCode::DbLockTimeout,
            _ => ErrorCode::DbOperationFailed,
        };
        Self::Backend {
            message: message.into(),
            code,
            sqlstate,
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidDefinition,
            suggestion: None,
        }
    }

    /// Create a validation error with an explicit code and suggestion.
    pub fn validation_with_suggestion(
        code: ErrorCode,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code,
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { code, .. } => *code,
            Self::StructuralConflict { code, .. } => *code,
            Self::InconsistentLayerState { code, .. } => *code,
            Self::Backend { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::NotFound { .. } => Some("Check the table, column or index name"),
            Self::StructuralConflict { .. } => Some("Choose a name that is not already in use"),
            Self::InconsistentLayerState { .. } => {
                Some("Inspect the current, history and public schemas; strata does not repair layers")
            }
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }

    /// Whether this error was raised by the backend itself.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}
