// ── Core error types ──
//
// Bot-facing errors from mino-core. Usage errors are raised before any
// network activity; everything that went over the wire is wrapped from
// `mino_api::Error` so callers can still inspect the status-code kind.

use thiserror::Error;

use mino_api::ApiErrorKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Usage errors ─────────────────────────────────────────────────
    #[error("No credentials supplied: provide a session id or email and password")]
    MissingCredentials,

    #[error("No community id set")]
    MissingCommunityId,

    #[error("Invalid community id: {value}")]
    InvalidCommunityId { value: String },

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Invalid command prefix {prefix:?}: must be non-empty and contain no whitespace")]
    InvalidCommandPrefix { prefix: String },

    #[error("This operation needs a chat message context")]
    MustRunInContext,

    #[error("Intents are not enabled; wait_for_message needs them")]
    IntentsNotEnabled,

    #[error("Invalid command name {name:?}: must be non-empty and contain no whitespace")]
    InvalidCommandName { name: String },

    #[error("Command name or alias {name:?} is already registered")]
    DuplicateCommand { name: String },

    #[error("A handler for {event} is already registered")]
    DuplicateHandler { event: String },

    #[error("Event {event} cannot be handled by {handler} handlers")]
    WrongEventKind { event: String, handler: &'static str },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        message: String,
        /// The service status code, when the service rejected the login.
        code: Option<i64>,
    },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Cannot connect to the event stream: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Ping failed: {reason}")]
    PingFailed { reason: String },

    // ── Handler errors ───────────────────────────────────────────────
    /// Raised by user handlers that have no more specific error.
    #[error("{0}")]
    Handler(String),

    // ── API errors (wrapped) ─────────────────────────────────────────
    #[error(transparent)]
    Api(mino_api::Error),
}

impl CoreError {
    /// Convenience for handler authors.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// The status-code kind of a wrapped API error.
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Self::Api(e) => e.api_kind(),
            _ => None,
        }
    }

    /// Map a failed login attempt. Service rejections become
    /// `AuthenticationFailed`; transport problems stay wrapped.
    pub(crate) fn from_login(err: mino_api::Error) -> Self {
        match err {
            mino_api::Error::Api { code, message, .. } => Self::AuthenticationFailed {
                message: if message.is_empty() {
                    format!("service returned status {code}")
                } else {
                    message
                },
                code: Some(code),
            },
            mino_api::Error::RecoveryFailed { message } => Self::AuthenticationFailed {
                message,
                code: None,
            },
            mino_api::Error::InvalidSessionId(reason) => Self::AuthenticationFailed {
                message: format!("unusable session id: {reason}"),
                code: None,
            },
            other => other.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<mino_api::Error> for CoreError {
    fn from(err: mino_api::Error) -> Self {
        match err {
            mino_api::Error::NotLoggedIn => CoreError::NotLoggedIn,
            mino_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed { reason },
            mino_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                reason: format!("closed (code {code}): {reason}"),
            },
            other => CoreError::Api(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_rejection_becomes_authentication_failed() {
        let err = CoreError::from_login(mino_api::Error::from_status(200, "bad password"));
        assert!(matches!(
            err,
            CoreError::AuthenticationFailed { code: Some(200), ref message } if message == "bad password"
        ));
    }

    #[test]
    fn transport_errors_stay_wrapped() {
        let err = CoreError::from_login(mino_api::Error::NullResponse);
        assert!(matches!(err, CoreError::Api(mino_api::Error::NullResponse)));
    }

    #[test]
    fn api_kind_passes_through() {
        let err: CoreError = mino_api::Error::from_status(1663, "view only").into();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::ChatViewOnly));
        assert!(matches!(
            CoreError::from(mino_api::Error::NotLoggedIn),
            CoreError::NotLoggedIn
        ));
    }
}
