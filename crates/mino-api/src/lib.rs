// mino-api: Async Rust client for the Amino HTTP and WebSocket APIs

pub mod auth;
pub mod cache;
pub mod chat;
pub mod client;
pub mod error;
pub mod events;
pub mod identity;
pub mod models;
pub mod session;
pub mod transport;
pub mod websocket;

pub use auth::PasswordLogin;
pub use cache::{CachedLogin, CredentialCache, TtlCache};
pub use chat::OutgoingMessage;
pub use client::{AminoClient, Body, ClientConfig, CredentialProvider, Method};
pub use error::{ApiErrorKind, Error};
pub use events::{EventName, InboundEvent};
pub use identity::{Generator, KeyMaterial};
pub use models::{Account, ChatMessage, Message, Notification, OnlineMembers};
pub use session::Session;
pub use transport::{RetryPolicy, TransportConfig};
pub use websocket::{ConnectionState, ControlFrame, ReconnectConfig, StreamConfig, StreamManager};
