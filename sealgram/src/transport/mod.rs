//! Messaging transport abstraction for `Sealgram`.
//!
//! The client layers over an existing messaging network and never speaks
//! its protocol directly. It uses the small [`Messenger`] surface (look up
//! a user, send text, fetch recent history, subscribe to new messages) that
//! a client library provides.
//! Implementations:
//! - [`telegram::TelegramMessenger`]: Telegram over MTProto via `grammers`
//! - [`loopback::LoopbackMessenger`]: in-process exchange for testing

pub mod loopback;
pub mod telegram;

use std::fmt;

use chrono::{DateTime, Utc};

/// Identifier of a chat (user, group or channel) on the messaging network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(i64);

impl ChatId {
    /// Wrap a raw network identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Return the raw network identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user on the messaging network, as returned by a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Network identifier of the user's chat.
    pub id: ChatId,
    /// Public handle, when the user has one.
    pub handle: Option<String>,
    /// Display name.
    pub first_name: String,
}

impl Entity {
    /// Create an entity.
    pub fn new(id: i64, handle: Option<&str>, first_name: impl Into<String>) -> Self {
        Self {
            id: ChatId::new(id),
            handle: handle.map(str::to_string),
            first_name: first_name.into(),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first_name)
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attachment {
    /// Original file name, when the network reports one.
    pub name: Option<String>,
}

/// A message event: either a new message or one entry of a history page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Message text (may be empty for media or service messages).
    pub text: String,
    /// When the message was sent.
    pub date: DateTime<Utc>,
    /// `true` when the local account sent it.
    pub out: bool,
    /// Attached file, if any.
    pub attachment: Option<Attachment>,
    /// Service action kind (e.g. `MessageActionPhoneCall`), if any.
    pub action: Option<String>,
}

impl ChatMessage {
    /// A plain text message stamped with the current time.
    pub fn text(chat_id: ChatId, text: impl Into<String>, out: bool) -> Self {
        Self {
            chat_id,
            text: text.into(),
            date: Utc::now(),
            out,
            attachment: None,
            action: None,
        }
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the network has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The looked-up user does not exist.
    #[error("could not find user: {0}")]
    NotFound(String),

    /// The network refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Signing in to the network failed.
    #[error("login failed: {0}")]
    Login(String),

    /// The network could not be reached or the connection broke.
    #[error("network error: {0}")]
    Network(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Async messaging surface consumed by the session and the interpreter.
///
/// Payloads are opaque text. Encryption happens above this layer; the
/// transport carries armored envelopes and plaintext the same way.
pub trait Messenger: Send + Sync {
    /// Look up a user by handle (a leading `@` is accepted).
    fn resolve(
        &self,
        handle: &str,
    ) -> impl std::future::Future<Output = Result<Entity, TransportError>> + Send;

    /// Send a text message to `to`.
    ///
    /// Returns once the network accepted the message. The network may also
    /// report it through [`Messenger::recv`] with `out = true`.
    fn send_text(
        &self,
        to: &Entity,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Fetch up to `limit` most recent messages exchanged with `with`,
    /// newest first.
    fn history(
        &self,
        with: &Entity,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, TransportError>> + Send;

    /// Wait for the next new-message event from any chat.
    fn recv(&self) -> impl std::future::Future<Output = Result<ChatMessage, TransportError>> + Send;
}
