// Session state shared by the request pipeline and the stream manager.
//
// A session is the `sid` token plus the user id it encodes. They are
// installed and cleared together; there is no way to hold one without
// the other.

use std::sync::RwLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::Error;

const SID_SIGNATURE_LEN: usize = 20;

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    sid: SecretString,
    user_id: String,
}

impl Session {
    pub fn new(sid: SecretString, user_id: impl Into<String>) -> Self {
        Self {
            sid,
            user_id: user_id.into(),
        }
    }

    /// Build a session from a bare sid, decoding the user id it carries.
    pub fn from_sid(sid: SecretString) -> Result<Self, Error> {
        let user_id = parse_auid(sid.expose_secret())?;
        Ok(Self { sid, user_id })
    }

    pub fn sid(&self) -> &SecretString {
        &self.sid
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Value of the `NDCAUTH` header.
    pub(crate) fn auth_header(&self) -> String {
        format!("sid={}", self.sid.expose_secret())
    }
}

/// Interior-mutable holder for the current session.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, session: Session) {
        debug!(user_id = %session.user_id, "session installed");
        *self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(session);
    }

    pub fn clear(&self) {
        debug!("session cleared");
        *self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.get().map(|s| s.user_id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }
}

/// Extract the user id embedded in a sid.
///
/// The sid is URL-safe base64 of `version_byte ++ json ++ signature`,
/// where the signature is 20 bytes and the user id is JSON field `"2"`.
pub fn parse_auid(sid: &str) -> Result<String, Error> {
    let mut normalized: String = sid
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }

    let raw = STANDARD
        .decode(normalized.as_bytes())
        .map_err(|e| Error::InvalidSessionId(e.to_string()))?;
    let end = raw
        .len()
        .checked_sub(SID_SIGNATURE_LEN)
        .filter(|end| *end > 1)
        .ok_or_else(|| Error::InvalidSessionId("sid too short".into()))?;
    let payload = raw
        .get(1..end)
        .ok_or_else(|| Error::InvalidSessionId("sid too short".into()))?;

    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| Error::InvalidSessionId(e.to_string()))?;
    value
        .get("2")
        .and_then(serde_json::Value::as_str)
        .map(String::from)
        .ok_or_else(|| Error::InvalidSessionId("missing user id field".into()))
}

#[cfg(test)]
pub(crate) mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;

    /// Build a sid shaped like the ones the service issues.
    pub(crate) fn fake_sid(user_id: &str) -> String {
        let json = serde_json::json!({ "0": 2, "2": user_id, "5": 1_700_000_000 });
        let mut raw = vec![0x02];
        raw.extend_from_slice(json.to_string().as_bytes());
        raw.extend_from_slice(&[0xAB; SID_SIGNATURE_LEN]);
        URL_SAFE_NO_PAD.encode(raw)
    }

    #[test]
    fn parses_user_id_from_sid() {
        let sid = fake_sid("2f1c7e9a-0000-4000-8000-000000000001");
        assert_eq!(
            parse_auid(&sid).unwrap(),
            "2f1c7e9a-0000-4000-8000-000000000001"
        );
    }

    #[test]
    fn rejects_malformed_sid() {
        assert!(matches!(parse_auid("!!!"), Err(Error::InvalidSessionId(_))));
        assert!(matches!(parse_auid("AAAA"), Err(Error::InvalidSessionId(_))));
    }

    #[test]
    fn store_sets_sid_and_user_together() {
        let store = SessionStore::new();
        assert!(!store.is_authenticated());
        assert!(store.user_id().is_none());

        let session = Session::from_sid(SecretString::from(fake_sid("user-1"))).unwrap();
        store.install(session);
        assert!(store.is_authenticated());
        assert_eq!(store.user_id().as_deref(), Some("user-1"));

        store.clear();
        assert!(store.get().is_none());
        assert!(store.user_id().is_none());
    }

    #[test]
    fn auth_header_format() {
        let session = Session::new(SecretString::from("abc"), "u");
        assert_eq!(session.auth_header(), "sid=abc");
    }
}
