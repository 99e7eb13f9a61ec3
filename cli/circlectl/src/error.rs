//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

use crate::commands::Action;

/// Exit code for an action name that is not recognised.
pub const UNKNOWN_ACTION_EXIT_CODE: i32 = 11;

/// Exit code when the configuration file cannot be read or parsed.
pub const CONFIG_EXIT_CODE: i32 = 1;

/// Errors from the CircleCI API or the status page.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message} (HTTP {status})")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Decode(String),

    #[error("Unexpected response shape: expected {expected}")]
    UnexpectedShape { expected: &'static str },

    #[error("Could not reach CircleCI")]
    StatusUnreachable,

    #[error("Invalid token format")]
    InvalidToken,
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }
}

/// Outcome of a failed invocation; each variant maps to one exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// Missing or malformed arguments, reported through clap.
    #[error("{0}")]
    Usage(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("{0:#}")]
    Config(anyhow::Error),

    #[error("{0:#}")]
    Validation(anyhow::Error),

    #[error("{source}")]
    Action {
        action: Action,
        #[source]
        source: ApiError,
    },
}

impl CliError {
    pub fn action(action: Action, source: ApiError) -> Self {
        Self::Action { action, source }
    }

    /// Process exit code for this error. Usage errors exit through clap (code 2).
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 2,
            CliError::UnknownAction(_) => UNKNOWN_ACTION_EXIT_CODE,
            CliError::Config(_) => CONFIG_EXIT_CODE,
            CliError::Validation(_) => Action::Check.exit_code(),
            CliError::Action { action, .. } => action.exit_code(),
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &CliError) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let CliError::Action { source, .. } = err {
        match source {
            ApiError::Http { status: 401, .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Check your API token (CIRCLE_TOKEN or the config file).".yellow()
                );
            }
            ApiError::Http { status: 403, .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Your token may not have access to this project.".yellow()
                );
            }
            ApiError::Network(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check your network connection and API base URL.".yellow()
                );
            }
            _ => {}
        }
    }
}
