// mino-core: Command and event dispatch, message context, and bot lifecycle.

pub mod bot;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod mailbox;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bot::{Bot, LoginRequest};
pub use command::Command;
pub use config::{BotConfig, DEFAULT_PREFIX, parse_community_id};
pub use context::{Context, Runtime, TypingGuard, WaitOutcome, prepare_mentions};
pub use dispatcher::{Dispatcher, HandlerFuture, Outcome, Routed, Task};
pub use error::CoreError;
pub use mailbox::{MAILBOX_TTL, Mailbox};

// API types handlers work with directly.
pub use mino_api::{
    Account, AminoClient, ChatMessage, EventName, InboundEvent, Message, Notification,
    OnlineMembers, OutgoingMessage,
};
