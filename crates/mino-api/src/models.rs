// Wire types for the Amino HTTP envelope and WebSocket payloads.
//
// Field names follow the service's camelCase. Everything the bot does
// not act on is optional so schema drift never fails a parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── HTTP envelope ────────────────────────────────────────────────────

/// The common response envelope. Domain fields are kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(rename = "api:statuscode", default)]
    pub status_code: i64,

    #[serde(rename = "api:message", default)]
    pub message: Option<String>,

    #[serde(rename = "api:duration", default)]
    pub duration: Option<String>,

    #[serde(rename = "api:timestamp", default)]
    pub timestamp: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status_code == 0
    }

    /// `mediaValue` at the top level or under `result`.
    pub fn media_value(&self) -> Option<&str> {
        self.extra
            .get("mediaValue")
            .and_then(Value::as_str)
            .or_else(|| {
                self.extra
                    .get("result")
                    .and_then(|r| r.get("mediaValue"))
                    .and_then(Value::as_str)
            })
    }
}

// ── Accounts ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub reputation: Option<i64>,
    #[serde(default)]
    pub role: Option<i64>,
    #[serde(default)]
    pub status: Option<i64>,
}

/// Body of a successful `POST /g/s/auth/login`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub sid: String,
    #[serde(default)]
    pub auid: Option<String>,
    #[serde(default)]
    pub account: Option<Value>,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
}

impl LoginResponse {
    /// The user id from the profile, falling back to `auid`.
    pub fn user_id(&self) -> Option<&str> {
        self.user_profile
            .as_ref()
            .map(|p| p.uid.as_str())
            .filter(|uid| !uid.is_empty())
            .or(self.auid.as_deref())
    }
}

/// Account state after login: the profile plus `/g/s/account`.
#[derive(Debug, Clone)]
pub struct Account {
    pub profile: UserProfile,
    pub account: Value,
}

// ── Chat messages ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub reputation: Option<i64>,
    #[serde(default)]
    pub role: Option<i64>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub avatar_frame: Option<Value>,
    #[serde(default)]
    pub account_membership_status: Option<i64>,
}

/// A chat message as carried by `t=1000` frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "type", default)]
    pub kind: i64,
    #[serde(default)]
    pub media_type: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub media_value: Option<String>,
    #[serde(default)]
    pub client_ref_id: Option<i64>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub is_hidden: Option<bool>,
    #[serde(default)]
    pub extensions: Option<Value>,
}

/// A chat message with the community it arrived in.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Message {
    pub com_id: i64,
    pub message: ChatMessage,
    pub alert_option: Option<i64>,
    pub membership_status: Option<i64>,
}

impl Message {
    pub fn chat_id(&self) -> &str {
        &self.message.thread_id
    }

    pub fn message_id(&self) -> &str {
        &self.message.message_id
    }

    pub fn content(&self) -> &str {
        self.message.content.as_deref().unwrap_or_default()
    }

    /// Author id, taken from `uid` or the embedded author.
    pub fn author_id(&self) -> &str {
        if self.message.uid.is_empty() {
            &self.message.author.uid
        } else {
            &self.message.uid
        }
    }

    pub fn author_name(&self) -> &str {
        self.message.author.nickname.as_deref().unwrap_or_default()
    }

    /// `"type:mediaType"`.
    pub fn discriminator(&self) -> String {
        format!("{}:{}", self.message.kind, self.message.media_type)
    }
}

// ── Push notifications ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(default)]
    pub notif_type: Option<i64>,
    #[serde(default)]
    pub ndc_id: Option<i64>,
    #[serde(default)]
    pub tid: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub aps: Option<Value>,
}

/// A `t=10` push notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub payload: NotificationPayload,
}

impl Notification {
    pub fn notif_type(&self) -> Option<i64> {
        self.payload.notif_type
    }

    pub fn com_id(&self) -> Option<i64> {
        self.payload.ndc_id
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.payload.tid.as_deref()
    }

    pub fn alert(&self) -> Option<&str> {
        self.payload
            .aps
            .as_ref()
            .and_then(|aps| aps.get("alert"))
            .and_then(Value::as_str)
    }
}

// ── Presence ─────────────────────────────────────────────────────────

/// A `t=400` presence update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineMembers {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub ndc_id: Option<i64>,
    #[serde(default)]
    pub user_profile_count: Option<i64>,
    #[serde(default)]
    pub user_profile_list: Vec<UserProfile>,
}

impl OnlineMembers {
    /// The member this update is about.
    pub fn user(&self) -> Option<&UserProfile> {
        self.user_profile_list.first()
    }
}

// ── Live channels ────────────────────────────────────────────────────

/// A `t=201` live channel descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    #[serde(default)]
    pub ndc_id: Option<i64>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub channel_key: Option<String>,
    #[serde(default)]
    pub channel_uid: Option<i64>,
    #[serde(default)]
    pub expired_time: Option<i64>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_keeps_domain_fields() {
        let resp: ApiResponse = serde_json::from_value(json!({
            "api:statuscode": 0,
            "api:message": "OK",
            "sid": "abc",
            "result": { "mediaValue": "http://cdn/x.png" }
        }))
        .unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.extra["sid"], "abc");
        assert_eq!(resp.media_value(), Some("http://cdn/x.png"));
    }

    #[test]
    fn chat_message_discriminator() {
        let message = Message {
            com_id: 42,
            message: serde_json::from_value(json!({
                "type": 0,
                "mediaType": 100,
                "threadId": "chat-1",
                "messageId": "m-1",
                "author": { "uid": "u-1", "nickname": "alice" }
            }))
            .unwrap(),
            ..Message::default()
        };
        assert_eq!(message.discriminator(), "0:100");
        assert_eq!(message.author_id(), "u-1");
        assert_eq!(message.author_name(), "alice");
        assert_eq!(message.content(), "");
    }

    #[test]
    fn login_response_prefers_profile_uid() {
        let resp: LoginResponse = serde_json::from_value(json!({
            "sid": "s",
            "auid": "from-auid",
            "userProfile": { "uid": "from-profile" }
        }))
        .unwrap();
        assert_eq!(resp.user_id(), Some("from-profile"));

        let resp: LoginResponse =
            serde_json::from_value(json!({ "sid": "s", "auid": "from-auid" })).unwrap();
        assert_eq!(resp.user_id(), Some("from-auid"));
    }

    #[test]
    fn notification_accessors() {
        let notification: Notification = serde_json::from_value(json!({
            "payload": {
                "notifType": 53,
                "ndcId": 7,
                "tid": "chat-9",
                "aps": { "alert": "You are now host" }
            }
        }))
        .unwrap();
        assert_eq!(notification.notif_type(), Some(53));
        assert_eq!(notification.com_id(), Some(7));
        assert_eq!(notification.chat_id(), Some("chat-9"));
        assert_eq!(notification.alert(), Some("You are now host"));
    }
}
