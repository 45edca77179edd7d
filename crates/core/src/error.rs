//! Error types for the hintloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Only [`ProviderError`]
//! ends an agent run; every [`ToolError`] is turned into a tool-result
//! message so the model can react to it.

use thiserror::Error;

/// The top-level error type for hintloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error(transparent)]
    DuplicateTool(#[from] DuplicateToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// A provider request failed. Always fatal to the current run, never retried
/// by the loop itself.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// A tool could not produce a result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{message}")]
    Timeout {
        tool_name: String,
        timeout_secs: u64,
        message: String,
    },
}

impl ToolError {
    /// Build a timeout error with the standard message.
    pub fn timeout(tool_name: impl Into<String>, timeout_secs: u64, what: &str) -> Self {
        Self::Timeout {
            tool_name: tool_name.into(),
            timeout_secs,
            message: format!("{what} timed out after {timeout_secs} seconds"),
        }
    }

    /// Map an I/O error onto the closest tool error category.
    pub fn from_io(tool_name: &str, context: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(format!("{context}: {err}")),
            std::io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(format!("{context}: {err}"))
            }
            std::io::ErrorKind::TimedOut => Self::Timeout {
                tool_name: tool_name.to_string(),
                timeout_secs: 0,
                message: format!("{context}: {err}"),
            },
            _ => Self::ExecutionFailed {
                tool_name: tool_name.to_string(),
                reason: format!("{context}: {err}"),
            },
        }
    }

    /// Short category label shown to the model.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "UnknownTool",
            Self::InvalidArguments(_) => "InvalidArguments",
            Self::ExecutionFailed { .. } => "ExecutionError",
            Self::NotFound(_) => "NotFound",
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::Timeout { .. } => "Timeout",
        }
    }

    /// Hints that help the model self-correct. Not meant for branching.
    pub fn suggestion(&self) -> Option<String> {
        let text = self.to_string().to_lowercase();
        let hints: &[&str] = match self {
            Self::PermissionDenied(_) => PERMISSION_HINTS,
            Self::NotFound(_) => NOT_FOUND_HINTS,
            Self::Timeout { .. } => TIMEOUT_HINTS,
            Self::UnknownTool(_) => &["Use one of the declared tools"],
            Self::InvalidArguments(_) => &["Check the tool's parameter schema and required fields"],
            Self::ExecutionFailed { .. } => {
                if text.contains("permission") {
                    PERMISSION_HINTS
                } else if text.contains("not found") || text.contains("no such file") {
                    NOT_FOUND_HINTS
                } else if text.contains("syntax") {
                    &[
                        "Check the code syntax",
                        "Ensure proper indentation and valid Python syntax",
                    ]
                } else if text.contains("timeout") || text.contains("timed out") {
                    TIMEOUT_HINTS
                } else if text.contains("import") || text.contains("modulenotfound") {
                    &[
                        "Required module not available in restricted environment",
                        "Use only built-in Python modules",
                    ]
                } else {
                    &[]
                }
            }
        };

        if hints.is_empty() {
            None
        } else {
            Some(hints.join(" | "))
        }
    }
}

const PERMISSION_HINTS: &[&str] = &[
    "Check file/directory permissions",
    "Try using a different directory or running with appropriate permissions",
];

const NOT_FOUND_HINTS: &[&str] = &[
    "Verify the file/directory path exists",
    "Check the current working directory",
    "Use absolute paths or create the file/directory first",
];

const TIMEOUT_HINTS: &[&str] = &[
    "The operation took too long",
    "Try with simpler input or break into smaller steps",
];

/// Raised when a tool name is registered twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tool already registered: {0}")]
pub struct DuplicateToolError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn timeout_message_matches_command_format() {
        let err = ToolError::timeout("execute_command", 30, "Command");
        assert_eq!(err.to_string(), "Command timed out after 30 seconds");
        assert_eq!(err.kind(), "Timeout");
    }

    #[test]
    fn not_found_suggestions() {
        let err = ToolError::NotFound("File not found: /tmp/missing.txt".into());
        let hint = err.suggestion().unwrap();
        assert!(hint.contains("Verify the file/directory path exists"));
        assert!(hint.contains(" | "));
    }

    #[test]
    fn execution_failure_suggestion_from_message() {
        let err = ToolError::ExecutionFailed {
            tool_name: "code_interpreter".into(),
            reason: "SyntaxError: invalid syntax".into(),
        };
        assert!(err.suggestion().unwrap().contains("Check the code syntax"));

        let plain = ToolError::ExecutionFailed {
            tool_name: "x".into(),
            reason: "boom".into(),
        };
        assert!(plain.suggestion().is_none());
    }

    #[test]
    fn io_errors_are_categorised() {
        let err = ToolError::from_io(
            "read_file",
            "open /nope",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, ToolError::NotFound(_)));

        let err = ToolError::from_io(
            "write_file",
            "write /root/x",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }

    #[test]
    fn duplicate_tool_display() {
        let err = DuplicateToolError("read_file".into());
        assert_eq!(err.to_string(), "Tool already registered: read_file");
    }
}
