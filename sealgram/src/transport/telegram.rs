//! Telegram transport built on `grammers-client`.
//!
//! [`TelegramMessenger::connect`] opens an MTProto connection with the
//! operator's API credentials. The first run signs in interactively (phone
//! number, login code, optional two-step password) through a
//! [`LoginPrompt`]; the authorization is stored in a session file so later
//! runs skip it.
//!
//! Requests (`resolve`, `send`, `history`) are bounded by the configured
//! request timeout. New messages are pulled from the client's own update
//! queue by [`Messenger::recv`]. That queue is capped by
//! `update_queue_limit` and sheds updates when full, so a request never
//! waits for the event loop to drain it.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;

use grammers_client::types::{Chat, Media, Message, PackedChat};
use grammers_client::{Client, Config, InitParams, SignInError, Update};
use grammers_session::Session;
use grammers_tl_types as tl;
use zeroize::Zeroizing;

use super::{Attachment, ChatId, ChatMessage, Entity, Messenger, TransportError};
use crate::config::NetworkSettings;
use crate::credentials::Credentials;

/// Answers the questions of a first sign-in.
pub trait LoginPrompt {
    /// Phone number of the account, in international format.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the answer cannot be read.
    fn phone(&mut self) -> io::Result<String>;

    /// Login code Telegram sent to the account.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the answer cannot be read.
    fn code(&mut self) -> io::Result<String>;

    /// Two-step verification password; `hint` is the one the account set.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the answer cannot be read.
    fn password(&mut self, hint: Option<&str>) -> io::Result<Zeroizing<String>>;
}

/// Telegram client implementing the [`Messenger`] trait.
pub struct TelegramMessenger {
    client: Client,
    /// The signed-in account.
    account: Entity,
    request_timeout: Duration,
    /// Access handles of every chat seen so far, keyed by id. Sends and
    /// history need them; [`Entity`] only carries the id.
    peers: parking_lot::Mutex<HashMap<ChatId, PackedChat>>,
}

impl TelegramMessenger {
    /// Connect, sign in if the session is not authorized yet, and fetch the
    /// account.
    ///
    /// The session file is created when missing and saved after a
    /// successful sign-in.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Login`] if the API id is not a number or the
    ///   sign-in is refused.
    /// - [`TransportError::Timeout`] if connecting takes longer than
    ///   `settings.connect_timeout`.
    /// - [`TransportError::Io`] if the session file cannot be read or
    ///   written, or a prompt fails.
    pub async fn connect(
        settings: &NetworkSettings,
        session_path: &Path,
        credentials: &Credentials,
        prompt: &mut impl LoginPrompt,
    ) -> Result<Self, TransportError> {
        let api_id = parse_api_id(&credentials.api_id)?;
        let session = Session::load_file_or_create(session_path)?;

        tracing::info!(session = %session_path.display(), "connecting to telegram");
        let config = Config {
            session,
            api_id,
            api_hash: credentials.api_hash.clone(),
            params: InitParams {
                catch_up: false,
                update_queue_limit: Some(settings.update_queue_limit),
                ..InitParams::default()
            },
        };
        let client = match tokio::time::timeout(settings.connect_timeout, Client::connect(config))
            .await
        {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(TransportError::Network(e.to_string())),
            Err(_) => return Err(TransportError::Timeout),
        };

        if !within(settings.request_timeout, client.is_authorized()).await? {
            tracing::info!("session not authorized; signing in");
            sign_in(&client, prompt).await?;
            client.session().save_to_file(session_path)?;
            tracing::info!(session = %session_path.display(), "session saved");
        }

        let me = within(settings.request_timeout, client.get_me()).await?;
        let account = Entity::new(me.id(), me.username(), me.first_name());
        tracing::info!(account = %account, id = %account.id, "signed in");

        Ok(Self {
            client,
            account,
            request_timeout: settings.request_timeout,
            peers: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// The signed-in account.
    #[must_use]
    pub const fn account(&self) -> &Entity {
        &self.account
    }

    /// Record a chat's access handle and return its entity.
    fn remember(&self, chat: &Chat) -> Entity {
        let entity = entity_of(chat);
        self.peers.lock().insert(entity.id, chat.pack());
        entity
    }

    fn packed(&self, entity: &Entity) -> Result<PackedChat, TransportError> {
        self.peers
            .lock()
            .get(&entity.id)
            .copied()
            .ok_or_else(|| TransportError::NotFound(entity.to_string()))
    }
}

impl Messenger for TelegramMessenger {
    async fn resolve(&self, handle: &str) -> Result<Entity, TransportError> {
        let username = handle.trim().trim_start_matches('@');
        tracing::debug!(username, "resolving");
        let chat = within(self.request_timeout, self.client.resolve_username(username))
            .await?
            .ok_or_else(|| TransportError::NotFound(handle.to_string()))?;
        Ok(self.remember(&chat))
    }

    async fn send_text(&self, to: &Entity, text: &str) -> Result<(), TransportError> {
        let peer = self.packed(to)?;
        within(self.request_timeout, self.client.send_message(peer, text)).await?;
        tracing::debug!(chat_id = %to.id, len = text.len(), "message sent");
        Ok(())
    }

    async fn history(
        &self,
        with: &Entity,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, TransportError> {
        let peer = self.packed(with)?;
        let fetch = async {
            let mut messages = self.client.iter_messages(peer).limit(limit);
            let mut page = Vec::with_capacity(limit);
            while let Some(message) = messages.next().await.map_err(|e| e.to_string())? {
                page.push(convert(&message));
            }
            Ok::<_, String>(page)
        };
        within(self.request_timeout, fetch).await
    }

    async fn recv(&self) -> Result<ChatMessage, TransportError> {
        loop {
            let update = self
                .client
                .next_update()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            if let Update::NewMessage(message) = update {
                self.remember(&message.chat());
                return Ok(convert(&message));
            }
        }
    }
}

/// Run the interactive sign-in: request a code, submit it, and answer the
/// two-step password challenge when the account has one.
async fn sign_in(client: &Client, prompt: &mut impl LoginPrompt) -> Result<(), TransportError> {
    let phone = prompt.phone()?;
    let token = client
        .request_login_code(phone.trim())
        .await
        .map_err(|e| TransportError::Login(e.to_string()))?;

    let code = prompt.code()?;
    match client.sign_in(&token, code.trim()).await {
        Ok(_) => Ok(()),
        Err(SignInError::PasswordRequired(password_token)) => {
            let password = prompt.password(password_token.hint())?;
            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| TransportError::Login(e.to_string()))?;
            Ok(())
        }
        Err(e) => Err(TransportError::Login(e.to_string())),
    }
}

/// Await `request`, mapping its error to [`TransportError::Rejected`] and
/// an expired `limit` to [`TransportError::Timeout`].
async fn within<T, E: Display>(
    limit: Duration,
    request: impl Future<Output = Result<T, E>>,
) -> Result<T, TransportError> {
    match tokio::time::timeout(limit, request).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(err = %e, "request failed");
            Err(TransportError::Rejected(e.to_string()))
        }
        Err(_) => Err(TransportError::Timeout),
    }
}

fn parse_api_id(raw: &str) -> Result<i32, TransportError> {
    raw.trim()
        .parse()
        .map_err(|_| TransportError::Login(format!("API_ID must be a number, got {raw:?}")))
}

/// Users show their first name, groups and channels their title.
fn entity_of(chat: &Chat) -> Entity {
    let name = match chat {
        Chat::User(user) => user.first_name().to_string(),
        other => other.name().to_string(),
    };
    Entity::new(chat.id(), chat.username(), name)
}

fn convert(message: &Message) -> ChatMessage {
    ChatMessage {
        chat_id: ChatId::new(message.chat().id()),
        text: message.text().to_string(),
        date: message.date(),
        out: message.outgoing(),
        attachment: message.media().as_ref().and_then(attachment),
        action: message.action().map(action_kind),
    }
}

/// Photos, documents and stickers count as files; link previews and other
/// media do not.
fn attachment(media: &Media) -> Option<Attachment> {
    match media {
        Media::Document(document) => Some(Attachment {
            name: Some(document.name().to_string()).filter(|n| !n.is_empty()),
        }),
        Media::Photo(_) | Media::Sticker(_) => Some(Attachment::default()),
        _ => None,
    }
}

/// Name of a service action in the schema's `MessageAction…` form.
fn action_kind(action: &tl::enums::MessageAction) -> String {
    match action {
        tl::enums::MessageAction::PhoneCall(_) => "MessageActionPhoneCall".to_string(),
        other => {
            let debug = format!("{other:?}");
            let variant = debug
                .split(|c: char| !c.is_ascii_alphanumeric())
                .next()
                .unwrap_or_default();
            format!("MessageAction{variant}")
        }
    }
}
