use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Reasoning oracle errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Oracle returned no choices")]
    EmptyResponse,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Tool resolution and execution errors
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Tool {tool} failed: {message}")]
    Execution { tool: String, message: String },

    #[error("Tool {tool} expects {expected} argument(s), got {got}")]
    InvalidArguments {
        tool: String,
        expected: usize,
        got: usize,
    },

    #[error("Tool {tool} timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
}

/// Oracle output that does not match the action grammar
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Parsing LLM output produced both a final answer and a parse-able action")]
    BothActionAndAnswer,

    #[error("Invalid Format: Missing 'Action:' after 'Thought:'")]
    MissingAction,

    #[error("Invalid Format: Missing 'Action Input:' after 'Action:'")]
    MissingActionInput,

    #[error("Could not parse LLM output: `{output}`")]
    Unparseable { output: String },
}

/// Artifact namespace errors
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact I/O failed for {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;

/// Result type alias for tool operations
pub type ToolResult<T> = Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::SessionNotFound {
            session_id: "sess-123".to_string(),
        };
        assert_eq!(err.to_string(), "Session not found: sess-123");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_oracle_error_display() {
        let err = OracleError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Oracle unavailable: server down (retries: 3)");

        let err = OracleError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = OracleError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");

        assert_eq!(
            OracleError::EmptyResponse.to_string(),
            "Oracle returned no choices"
        );
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::NotFound {
            name: "geocode".to_string(),
        };
        assert_eq!(err.to_string(), "Tool not found: geocode");

        let err = ToolError::InvalidArguments {
            tool: "plot".to_string(),
            expected: 2,
            got: 1,
        };
        assert_eq!(err.to_string(), "Tool plot expects 2 argument(s), got 1");

        let err = ToolError::Execution {
            tool: "search".to_string(),
            message: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "Tool search failed: quota exceeded");
    }

    #[test]
    fn test_parse_error_display() {
        assert!(ParseError::MissingAction
            .to_string()
            .contains("Missing 'Action:'"));
        let err = ParseError::Unparseable {
            output: "hello".to_string(),
        };
        assert_eq!(err.to_string(), "Could not parse LLM output: `hello`");
    }

    #[test]
    fn test_conversions_to_app_error() {
        let app_err: AppError = StorageError::SessionNotFound {
            session_id: "test-123".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Storage(_)));

        let app_err: AppError = OracleError::Timeout { timeout_ms: 1000 }.into();
        assert!(matches!(app_err, AppError::Oracle(_)));

        let app_err: AppError = ToolError::NotFound {
            name: "x".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Tool(_)));

        let app_err: AppError = ParseError::MissingActionInput.into();
        assert!(matches!(app_err, AppError::Parse(_)));
    }
}
