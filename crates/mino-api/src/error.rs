use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the `mino-api` crate.
///
/// Covers identity material, HTTP transport, response classification,
/// the Amino status-code table, the WebSocket stream, and the on-disk
/// caches. `mino-core` maps these into bot-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Identity ────────────────────────────────────────────────────
    /// A required key was never configured and no cached value exists.
    #[error("Missing identity key: {key}")]
    MissingIdentityKey { key: &'static str },

    /// Key material is present but unusable.
    #[error("Invalid identity key {key}: {reason}")]
    InvalidIdentityKey { key: &'static str, reason: String },

    /// A device id that cannot be decoded or migrated.
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(String),

    /// A session id whose embedded payload cannot be decoded.
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── HTTP status ─────────────────────────────────────────────────
    /// HTTP 403 from the service edge.
    #[error("Forbidden (HTTP 403)")]
    Forbidden,

    /// HTTP 502 from the service edge.
    #[error("Bad gateway (HTTP 502)")]
    BadGateway,

    /// HTTP 503 from the service edge.
    #[error("Service unavailable (HTTP 503)")]
    ServiceUnavailable,

    /// Any other non-success HTTP status whose body carried no API status.
    #[error("Unexpected HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    // ── Envelope ────────────────────────────────────────────────────
    /// The body was the literal `null`.
    #[error("Service returned a null response")]
    NullResponse,

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Non-zero `api:statuscode`. `kind` is `None` for codes outside the
    /// known table.
    #[error("{}", api_error_display(*kind, *code, message))]
    Api {
        kind: Option<ApiErrorKind>,
        code: i64,
        message: String,
    },

    // ── Session ─────────────────────────────────────────────────────
    /// An operation needs a session and none is installed.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Session recovery ran and could not produce a new session.
    #[error("Session recovery failed: {message}")]
    RecoveryFailed { message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The stream manager has shut down and no longer accepts frames.
    #[error("Stream closed")]
    StreamClosed,

    // ── Cache ───────────────────────────────────────────────────────
    /// Reading or writing an on-disk cache failed.
    #[error("Cache error at {}: {reason}", path.display())]
    Cache { path: PathBuf, reason: String },
}

fn api_error_display(kind: Option<ApiErrorKind>, code: i64, message: &str) -> String {
    match kind {
        Some(kind) => format!("{} ({code}): {message}", kind.as_str()),
        None => format!("API error ({code}): {message}"),
    }
}

impl Error {
    /// Build the error for a non-zero `api:statuscode`.
    pub fn from_status(code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            kind: ApiErrorKind::from_code(code),
            code,
            message: message.into(),
        }
    }

    /// The typed status-code kind, if this is a mapped API error.
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Self::Api { kind, .. } => *kind,
            _ => None,
        }
    }

    /// Raw `api:statuscode`, if this is an API error.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if the service reported the session as invalid.
    pub fn is_invalid_session(&self) -> bool {
        self.api_kind() == Some(ApiErrorKind::InvalidSession)
    }

    /// Returns `true` if this is a transport failure worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }
}

// ── Status-code table ───────────────────────────────────────────────

macro_rules! api_error_kinds {
    ($($code:literal => $variant:ident, $name:literal;)+) => {
        /// Every status code the service is known to return, as a typed kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ApiErrorKind {
            $($variant,)+
        }

        impl ApiErrorKind {
            /// All known kinds, in code order.
            pub const ALL: &'static [ApiErrorKind] = &[$(Self::$variant,)+];

            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn code(self) -> i64 {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

api_error_kinds! {
    100 => UnsupportedService, "UnsupportedService";
    101 => InternalServerError, "InternalServerError";
    102 => FileTooLarge, "FileTooLarge";
    103 => InvalidRequest, "InvalidRequest";
    105 => InvalidSession, "InvalidSession";
    106 => AccessDenied, "AccessDenied";
    107 => UnexistentData, "UnexistentData";
    110 => ActionNotAllowed, "ActionNotAllowed";
    111 => ServiceUnderMaintenance, "ServiceUnderMaintenance";
    113 => MessageNeeded, "MessageNeeded";
    200 => InvalidAccountOrPassword, "InvalidAccountOrPassword";
    210 => AccountDisabled, "AccountDisabled";
    215 => EmailAlreadyTaken, "EmailAlreadyTaken";
    216 => AccountDoesNotExist, "AccountDoesNotExist";
    218 => InvalidDevice, "InvalidDevice";
    219 => AccountLimitReached, "AccountLimitReached";
    221 => CantFollowYourself, "CantFollowYourself";
    225 => UserUnavailable, "UserUnavailable";
    229 => YouAreBanned, "YouAreBanned";
    230 => UserNotMemberOfCommunity, "UserNotMemberOfCommunity";
    235 => RequestRejected, "RequestRejected";
    238 => ActivateAccount, "ActivateAccount";
    239 => CantLeaveCommunity, "CantLeaveCommunity";
    240 => ReachedTitleLength, "ReachedTitleLength";
    241 => EmailFlaggedAsSpam, "EmailFlaggedAsSpam";
    245 => UserHasBeenDeleted, "UserHasBeenDeleted";
    246 => AccountDeleted, "AccountDeleted";
    262 => ReachedMaxTitles, "ReachedMaxTitles";
    270 => VerificationRequired, "VerificationRequired";
    293 => UserBannedByTeamAmino, "UserBannedByTeamAmino";
    300 => BadImage, "BadImage";
    500 => RequestedNoLongerExists, "RequestedNoLongerExists";
    551 => InsufficientLevel, "InsufficientLevel";
    603 => YouAreBlockedByThisUser, "YouAreBlockedByThisUser";
    604 => YouHaveBlockedThisUser, "YouHaveBlockedThisUser";
    606 => BlockedByOrganizer, "BlockedByOrganizer";
    700 => NoLongerExists, "NoLongerExists";
    702 => WallCommentingDisabled, "WallCommentingDisabled";
    801 => CommunityNoLongerExists, "CommunityNoLongerExists";
    802 => InvalidCodeOrLink, "InvalidCodeOrLink";
    805 => CommunityNameAlreadyTaken, "CommunityNameAlreadyTaken";
    806 => CommunityCreateLimitReached, "CommunityCreateLimitReached";
    814 => CommunityDisabled, "CommunityDisabled";
    833 => CommunityDeleted, "CommunityDeleted";
    1600 => DataNoLongerExists, "DataNoLongerExists";
    1606 => TooManyInviteUsers, "TooManyInviteUsers";
    1611 => ChatInvitesDisabled, "ChatInvitesDisabled";
    1612 => RemovedFromChat, "RemovedFromChat";
    1613 => UserNotJoined, "UserNotJoined";
    1661 => LevelFiveRequiredToEnableProps, "LevelFiveRequiredToEnableProps";
    1663 => ChatViewOnly, "ChatViewOnly";
    1664 => ChatMessageTooBig, "ChatMessageTooBig";
    1900 => InviteCodeNotFound, "InviteCodeNotFound";
    2001 => AlreadyRequestedJoinCommunity, "AlreadyRequestedJoinCommunity";
    2601 => AlreadyCheckedIn, "AlreadyCheckedIn";
    2611 => AlreadyUsedMonthlyRepair, "AlreadyUsedMonthlyRepair";
    2800 => AccountAlreadyRestored, "AccountAlreadyRestored";
    3102 => IncorrectVerificationCode, "IncorrectVerificationCode";
    3905 => NotOwnerOfChatBubble, "NotOwnerOfChatBubble";
    4300 => NotEnoughCoins, "NotEnoughCoins";
    4400 => AlreadyPlayedLottery, "AlreadyPlayedLottery";
    4500 => CannotSendCoins, "CannotSendCoins";
    6001 => AminoIdAlreadyChanged, "AminoIDAlreadyChanged";
    6002 => InvalidAminoId, "InvalidAminoID";
    99_001 => InvalidName, "InvalidName";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_its_code() {
        for kind in ApiErrorKind::ALL {
            assert_eq!(ApiErrorKind::from_code(kind.code()), Some(*kind));
        }
    }

    #[test]
    fn unmapped_code_falls_back_to_generic() {
        let err = Error::from_status(99_999, "who knows");
        assert!(matches!(err, Error::Api { kind: None, code: 99_999, .. }));
        assert_eq!(err.to_string(), "API error (99999): who knows");
    }

    #[test]
    fn invalid_session_is_detected() {
        let err = Error::from_status(105, "session expired");
        assert!(err.is_invalid_session());
        assert_eq!(err.api_kind(), Some(ApiErrorKind::InvalidSession));
        assert!(!Error::from_status(106, "denied").is_invalid_session());
    }

    #[test]
    fn mapped_error_display_names_the_kind() {
        let err = Error::from_status(1664, "too big");
        assert_eq!(err.to_string(), "ChatMessageTooBig (1664): too big");
    }

    #[test]
    fn http_status_errors_are_not_transient() {
        assert!(!Error::Forbidden.is_transient());
        assert!(!Error::NullResponse.is_transient());
        assert!(Error::WebSocketConnect("reset".into()).is_transient());
    }
}
