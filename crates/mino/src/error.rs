//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use mino_config::ConfigError;
use mino_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the service: {reason}")]
    #[diagnostic(
        code(mino::connection_failed),
        help("Check your network connection or the proxy configured in your profile.")
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(mino::auth_failed),
        help(
            "Verify the email and password for this profile.\n\
             Run: mino config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(mino::no_credentials),
        help(
            "Configure a profile with: mino config init --email <EMAIL>\n\
             Or set MINO_SID / MINO_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(mino::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: mino config init --email <EMAIL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(mino::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(mino::config))]
    Config(Box<ConfigError>),

    // ── API ──────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(mino::api_error))]
    Api { message: String },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Config(_) | Self::Api { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }

    /// Attach the active profile to authentication failures.
    pub fn for_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { message, .. } => Self::AuthFailed {
                profile: profile.to_owned(),
                message,
            },
            Self::NoCredentials { .. } => Self::NoCredentials {
                profile: profile.to_owned(),
            },
            other => other,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name, available } => {
                Self::ProfileNotFound { name, available }
            }
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message, .. } => Self::AuthFailed {
                profile: "current".into(),
                message,
            },
            CoreError::MissingCredentials | CoreError::NotLoggedIn => Self::NoCredentials {
                profile: "current".into(),
            },
            CoreError::ConnectionFailed { reason } | CoreError::PingFailed { reason } => {
                Self::ConnectionFailed { reason }
            }
            CoreError::InvalidCommunityId { value } => Self::Validation {
                field: "community".into(),
                reason: format!("not a community id: {value}"),
            },
            CoreError::InvalidCommandPrefix { prefix } => Self::Validation {
                field: "prefix".into(),
                reason: format!("{prefix:?} must be non-empty and contain no whitespace"),
            },
            CoreError::InvalidCommandName { name } => Self::Validation {
                field: "command".into(),
                reason: format!("{name:?} must be non-empty and contain no whitespace"),
            },
            other => Self::Api {
                message: other.to_string(),
            },
        }
    }
}

impl From<mino_api::Error> for CliError {
    fn from(err: mino_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
