// Chat endpoints used by message contexts and the activity loop.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::client::{AminoClient, Body, Method};
use crate::error::Error;
use crate::models::{ApiResponse, ChatMessage};

const ACTIVE_CHUNK_SECS: i64 = 300;

/// Path segment for a community: `g` for global, `x<id>` otherwise.
pub fn scope(com_id: i64) -> String {
    if com_id == 0 {
        "g".into()
    } else {
        format!("x{com_id}")
    }
}

pub fn message_endpoint(com_id: i64, chat_id: &str) -> String {
    format!("/{}/s/chat/thread/{chat_id}/message", scope(com_id))
}

// ── OutgoingMessage ──────────────────────────────────────────────────

/// A message to post into a chat thread.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub kind: i64,
    pub content: Option<String>,
    pub reply_to: Option<String>,
    pub mentions: Vec<String>,
    pub media_type: Option<i64>,
    pub media_value: Option<String>,
    pub media_upload_value: Option<String>,
    pub media_upload_content_type: Option<String>,
    pub sticker_id: Option<String>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn sticker(sticker_id: &str) -> Self {
        let id = sticker_id.trim_start_matches("ndcsticker://");
        Self {
            kind: 3,
            sticker_id: Some(id.to_owned()),
            media_value: Some(format!("ndcsticker://{id}")),
            ..Self::default()
        }
    }

    /// Inline image, sent base64-encoded.
    pub fn image(bytes: &[u8], content_type: Option<&str>) -> Self {
        Self {
            media_type: Some(100),
            media_upload_value: Some(STANDARD.encode(bytes)),
            media_upload_content_type: content_type.map(String::from),
            ..Self::default()
        }
    }

    /// Inline voice note (AAC), sent base64-encoded.
    pub fn audio(bytes: &[u8]) -> Self {
        Self {
            kind: 2,
            media_type: Some(110),
            media_upload_value: Some(STANDARD.encode(bytes)),
            ..Self::default()
        }
    }

    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    pub fn mention(mut self, user_ids: impl IntoIterator<Item = String>) -> Self {
        self.mentions.extend(user_ids);
        self
    }

    /// JSON body for `POST .../message`.
    pub fn to_payload(&self, now: DateTime<Utc>) -> Value {
        let mut payload = Map::new();
        payload.insert("clientRefId".into(), json!(client_ref_id(now)));
        payload.insert("timestamp".into(), json!(now.timestamp_millis()));
        payload.insert("type".into(), json!(self.kind));
        payload.insert("content".into(), json!(self.content));

        let optional = [
            ("replyMessageId", self.reply_to.as_ref().map(|v| json!(v))),
            ("mediaType", self.media_type.map(|v| json!(v))),
            ("mediaValue", self.media_value.as_ref().map(|v| json!(v))),
            ("mediaUploadValue", self.media_upload_value.as_ref().map(|v| json!(v))),
            (
                "mediaUploadValueContentType",
                self.media_upload_content_type.as_ref().map(|v| json!(v)),
            ),
            ("stickerId", self.sticker_id.as_ref().map(|v| json!(v))),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                payload.insert(key.into(), value);
            }
        }

        if !self.mentions.is_empty() {
            let mentioned: Vec<Value> = self.mentions.iter().map(|uid| json!({ "uid": uid })).collect();
            payload.insert("extensions".into(), json!({ "mentionedArray": mentioned }));
        }

        Value::Object(payload)
    }
}

/// Client-side dedup reference: tens of seconds since the epoch, mod 10^9.
pub fn client_ref_id(now: DateTime<Utc>) -> i64 {
    (now.timestamp() / 10) % 1_000_000_000
}

// ── Endpoints ────────────────────────────────────────────────────────

impl AminoClient {
    /// Post a message and return it as echoed by the service.
    pub async fn send_message(
        &self,
        com_id: i64,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<ChatMessage, Error> {
        let payload = message.to_payload(Utc::now());
        let value = self
            .handler(
                Method::Post,
                &message_endpoint(com_id, chat_id),
                Body::Json(payload),
            )
            .await?;

        let echoed = value.get("message").cloned().unwrap_or(Value::Null);
        if echoed.is_null() {
            return Ok(ChatMessage::default());
        }
        serde_json::from_value(echoed).map_err(|e| Error::Deserialization {
            message: format!("sent message: {e}"),
            body: value.to_string(),
        })
    }

    pub async fn delete_message(
        &self,
        com_id: i64,
        chat_id: &str,
        message_id: &str,
    ) -> Result<(), Error> {
        let path = format!("{}/{message_id}", message_endpoint(com_id, chat_id));
        self.handler(Method::Delete, &path, Body::Empty).await?;
        debug!(chat_id, message_id, "message deleted");
        Ok(())
    }

    /// Upload raw media and return its `mediaValue` URL.
    pub async fn upload_media(&self, bytes: Bytes, content_type: &str) -> Result<String, Error> {
        let value = self
            .handler(
                Method::Post,
                "/g/s/media/upload",
                Body::Raw {
                    bytes,
                    content_type: content_type.to_owned(),
                },
            )
            .await?;
        let envelope = AminoClient::check_envelope(&value)?;
        envelope
            .media_value()
            .map(String::from)
            .ok_or_else(|| Error::Deserialization {
                message: "upload response has no mediaValue".into(),
                body: value.to_string(),
            })
    }

    /// Report an active-time chunk starting now for `com_id`.
    pub async fn send_active_time(&self, com_id: i64, timezone: i32) -> Result<ApiResponse, Error> {
        let now = Utc::now();
        let body = json!({
            "optInAdsFlags": 27,
            "timezone": timezone,
            "timestamp": now.timestamp_millis(),
            "userActiveTimeChunkList": [{
                "start": now.timestamp(),
                "end": now.timestamp() + ACTIVE_CHUNK_SECS,
            }],
        });
        let path = format!("/{}/s/community/stats/user-active-time", scope(com_id));
        let value = self.handler(Method::Post, &path, Body::Json(body)).await?;
        AminoClient::check_envelope(&value)
    }
}
