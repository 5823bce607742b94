//! Event names and inbound frame classification.
//!
//! Every WebSocket frame is a JSON object `{"t": <int>, "o": {...}}`.
//! [`classify`] turns one into an [`InboundEvent`], resolving chat
//! messages through the `"type:mediaType"` discriminator table and push
//! notifications through their `notifType`.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::models::{Channel, ChatMessage, Message, Notification, OnlineMembers};

// ── Frame types ──────────────────────────────────────────────────────

pub const FRAME_NOTIFICATION: i64 = 10;
pub const FRAME_CHANNEL: i64 = 201;
pub const FRAME_USER_ONLINE: i64 = 400;
pub const FRAME_CHAT: i64 = 1000;

/// Outbound control types. Echoes of these are never chat events.
pub const CONTROL_FRAMES: &[i64] = &[108, 112, 116, 304, 306];

// ── EventName ────────────────────────────────────────────────────────

macro_rules! event_names {
    (
        chat { $($disc:literal => $variant:ident, $name:literal;)+ }
        notification { $($notif:literal => $nvariant:ident, $nname:literal;)+ }
        other { $($ovariant:ident, $oname:literal;)+ }
    ) => {
        /// Normalized name of a dispatchable event.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventName {
            $($variant,)+
            $($nvariant,)+
            $($ovariant,)+
        }

        impl EventName {
            /// Every event, chat events first.
            pub const ALL: &'static [EventName] = &[
                $(Self::$variant,)+
                $(Self::$nvariant,)+
                $(Self::$ovariant,)+
            ];

            /// Resolve a `"type:mediaType"` discriminator.
            pub fn from_discriminator(discriminator: &str) -> Option<Self> {
                match discriminator {
                    $($disc => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// The chat discriminator, for chat events.
            pub fn discriminator(self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => Some($disc),)+
                    _ => None,
                }
            }

            pub fn from_notif_type(notif_type: i64) -> Option<Self> {
                match notif_type {
                    $($notif => Some(Self::$nvariant),)+
                    _ => None,
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                    $(Self::$nvariant => $nname,)+
                    $(Self::$ovariant => $oname,)+
                }
            }

            /// Whether this event carries a chat [`Message`].
            pub fn is_chat(self) -> bool {
                self.discriminator().is_some()
            }

            pub fn is_notification(self) -> bool {
                matches!(self, $(Self::$nvariant)|+)
            }
        }

        impl FromStr for EventName {
            type Err = UnknownEvent;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    $($nname => Ok(Self::$nvariant),)+
                    $($oname => Ok(Self::$ovariant),)+
                    _ => Err(UnknownEvent(s.to_owned())),
                }
            }
        }
    };
}

event_names! {
    chat {
        "0:0" => TextMessage, "text_message";
        "0:100" => ImageMessage, "image_message";
        "0:103" => YoutubeMessage, "youtube_message";
        "1:0" => StrikeMessage, "strike_message";
        "2:110" => VoiceMessage, "voice_message";
        "3:113" => StickerMessage, "sticker_message";
        "50:0" => ShareExurlMessage, "share_exurl_message";
        "52:0" => VcNotAnswered, "vc_not_answered";
        "53:0" => VcNotCancelled, "vc_not_cancelled";
        "54:0" => VcNotDeclined, "vc_not_declined";
        "55:0" => VideoChatNotAnswered, "video_chat_not_answered";
        "56:0" => VideoChatNotCancelled, "video_chat_not_cancelled";
        "57:0" => VideoChatNotDeclined, "video_chat_not_declined";
        "58:0" => AvatarChatNotAnswered, "avatar_chat_not_answered";
        "59:0" => AvatarChatNotCancelled, "avatar_chat_not_cancelled";
        "60:0" => AvatarChatNotDeclined, "avatar_chat_not_declined";
        "100:0" => DeleteMessage, "delete_message";
        "101:0" => MemberJoin, "member_join";
        "102:0" => MemberLeave, "member_leave";
        "103:0" => ChatInvite, "chat_invite";
        "104:0" => ChatBackgroundChanged, "chat_background_changed";
        "105:0" => ChatTitleChanged, "chat_title_changed";
        "106:0" => ChatIconChanged, "chat_icon_changed";
        "107:0" => VcStart, "vc_start";
        "108:0" => VideoChatStart, "video_chat_start";
        "109:0" => AvatarChatStart, "avatar_chat_start";
        "110:0" => VcEnd, "vc_end";
        "111:0" => VideoChatEnd, "video_chat_end";
        "112:0" => AvatarChatEnd, "avatar_chat_end";
        "113:0" => ChatContentChanged, "chat_content_changed";
        "114:0" => ScreenRoomStart, "screen_room_start";
        "115:0" => ScreenRoomEnd, "screen_room_end";
        "116:0" => ChatHostTransfered, "chat_host_transfered";
        "117:0" => TextMessageForceRemoved, "text_message_force_removed";
        "118:0" => ChatRemovedMessage, "chat_removed_message";
        "119:0" => ModDeletedMessage, "mod_deleted_message";
        "120:0" => ChatTip, "chat_tip";
        "121:0" => ChatPinAnnouncement, "chat_pin_announcement";
        "122:0" => VcPermissionOpenToEveryone, "vc_permission_open_to_everyone";
        "123:0" => VcPermissionInvitedAndRequested, "vc_permission_invited_and_requested";
        "124:0" => VcPermissionInviteOnly, "vc_permission_invite_only";
        "125:0" => ChatViewOnlyEnabled, "chat_view_only_enabled";
        "126:0" => ChatViewOnlyDisabled, "chat_view_only_disabled";
        "127:0" => ChatUnpinAnnouncement, "chat_unpin_announcement";
        "128:0" => ChatTippingEnabled, "chat_tipping_enabled";
        "129:0" => ChatTippingDisabled, "chat_tipping_disabled";
        "65281:0" => TimestampMessage, "timestamp_message";
        "65282:0" => WelcomeMessage, "welcome_message";
        "65283:0" => InviteMessage, "invite_message";
    }
    notification {
        53 => MemberSetYouHost, "member_set_you_host";
        67 => MemberSetYouCohost, "member_set_you_cohost";
        68 => MemberRemoveYourCohost, "member_remove_your_cohost";
    }
    other {
        UserOnline, "user_online";
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`EventName::from_str`] for names outside the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event name: {0}")]
pub struct UnknownEvent(pub String);

// ── InboundEvent ─────────────────────────────────────────────────────

/// A classified inbound frame.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Chat { name: EventName, message: Message },
    Notification { name: EventName, notification: Notification },
    UserOnline(OnlineMembers),
    Channel(Channel),
}

impl InboundEvent {
    /// The dispatchable event name. Channel updates have none.
    pub fn name(&self) -> Option<EventName> {
        match self {
            Self::Chat { name, .. } | Self::Notification { name, .. } => Some(*name),
            Self::UserOnline(_) => Some(EventName::UserOnline),
            Self::Channel(_) => None,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Chat { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Classify one decoded frame. Unknown frame types and unmapped
/// discriminators yield `None`.
pub fn classify(frame: &Value) -> Option<InboundEvent> {
    let t = frame.get("t").and_then(Value::as_i64)?;
    let body = frame.get("o").cloned().unwrap_or(Value::Null);

    match t {
        FRAME_CHAT => {
            let message = chat_message(&body)?;
            let name = EventName::from_discriminator(&message.discriminator())?;
            Some(InboundEvent::Chat { name, message })
        }
        FRAME_NOTIFICATION => {
            let notification: Notification = serde_json::from_value(body).ok()?;
            let name = EventName::from_notif_type(notification.notif_type()?)?;
            Some(InboundEvent::Notification { name, notification })
        }
        FRAME_USER_ONLINE => serde_json::from_value(body).ok().map(InboundEvent::UserOnline),
        FRAME_CHANNEL => serde_json::from_value(body).ok().map(InboundEvent::Channel),
        other if CONTROL_FRAMES.contains(&other) => None,
        other => bare_event(other, &body),
    }
}

fn chat_message(body: &Value) -> Option<Message> {
    let chat = body.get("chatMessage")?;
    let message: ChatMessage = match serde_json::from_value(chat.clone()) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable chat message");
            return None;
        }
    };
    Some(Message {
        com_id: body.get("ndcId").and_then(Value::as_i64).unwrap_or_default(),
        message,
        alert_option: body.get("alertOption").and_then(Value::as_i64),
        membership_status: body.get("membershipStatus").and_then(Value::as_i64),
    })
}

/// A frame whose own `t` is a chat type with media type 0.
fn bare_event(t: i64, body: &Value) -> Option<InboundEvent> {
    let name = EventName::from_discriminator(&format!("{t}:0"))?;
    let message = chat_message(body).unwrap_or_else(|| Message {
        com_id: body.get("ndcId").and_then(Value::as_i64).unwrap_or_default(),
        message: ChatMessage {
            kind: t,
            thread_id: body
                .get("threadId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            ..ChatMessage::default()
        },
        ..Message::default()
    });
    Some(InboundEvent::Chat { name, message })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn table_is_consistent() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>(), Ok(*name));
            if let Some(disc) = name.discriminator() {
                assert_eq!(EventName::from_discriminator(disc), Some(*name));
            }
        }
        assert_eq!(EventName::ALL.iter().filter(|n| n.is_chat()).count(), 49);
    }

    #[test]
    fn text_message_frame() {
        let frame = json!({
            "t": 1000,
            "o": {
                "ndcId": 42,
                "alertOption": 1,
                "chatMessage": {
                    "type": 0,
                    "mediaType": 0,
                    "content": "!ping",
                    "threadId": "chat-1",
                    "messageId": "m-1",
                    "uid": "u-1",
                    "author": { "uid": "u-1", "nickname": "alice" }
                }
            }
        });

        let event = classify(&frame).unwrap();
        assert_eq!(event.name(), Some(EventName::TextMessage));
        let message = event.message().unwrap();
        assert_eq!(message.com_id, 42);
        assert_eq!(message.content(), "!ping");
        assert_eq!(message.alert_option, Some(1));
    }

    #[test]
    fn image_discriminator_uses_media_type() {
        let frame = json!({
            "t": 1000,
            "o": { "chatMessage": { "type": 0, "mediaType": 100 } }
        });
        assert_eq!(classify(&frame).unwrap().name(), Some(EventName::ImageMessage));
    }

    #[test]
    fn bare_member_join_frame() {
        let event = classify(&json!({ "t": 101, "o": {} })).unwrap();
        assert_eq!(event.name(), Some(EventName::MemberJoin));
        assert_eq!(event.message().unwrap().discriminator(), "101:0");
    }

    #[test]
    fn member_join_inside_chat_frame() {
        let frame = json!({
            "t": 1000,
            "o": { "ndcId": 3, "chatMessage": { "type": 101, "threadId": "c" } }
        });
        assert_eq!(classify(&frame).unwrap().name(), Some(EventName::MemberJoin));
    }

    #[test]
    fn notification_frame() {
        let frame = json!({
            "t": 10,
            "o": { "payload": { "notifType": 67, "ndcId": 9, "tid": "chat-2" } }
        });
        let event = classify(&frame).unwrap();
        assert_eq!(event.name(), Some(EventName::MemberSetYouCohost));
        assert!(EventName::MemberSetYouCohost.is_notification());
    }

    #[test]
    fn presence_and_channel_frames() {
        let online = classify(&json!({
            "t": 400,
            "o": { "ndcId": 1, "userProfileList": [{ "uid": "u-9" }] }
        }))
        .unwrap();
        assert_eq!(online.name(), Some(EventName::UserOnline));

        let channel = classify(&json!({
            "t": 201,
            "o": { "ndcId": 1, "channelName": "room", "channelKey": "k" }
        }))
        .unwrap();
        assert!(matches!(channel, InboundEvent::Channel(ref c) if c.channel_name.as_deref() == Some("room")));
        assert_eq!(channel.name(), None);
    }

    #[test]
    fn unknown_frames_are_ignored() {
        assert!(classify(&json!({ "t": 116, "o": {} })).is_none());
        assert!(classify(&json!({ "t": 777, "o": {} })).is_none());
        assert!(classify(&json!({ "t": 10, "o": { "payload": { "notifType": 1 } } })).is_none());
        assert!(classify(&json!({ "t": 1000, "o": { "chatMessage": { "type": 9, "mediaType": 9 } } })).is_none());
        assert!(classify(&json!({ "o": {} })).is_none());
    }
}
