//! Command interpreter and chat context.
//!
//! [`Chat`] owns everything the event loop mutates: the session, the crypto
//! facade, the messenger handle and the settings. The loop feeds it
//! submitted lines ([`Chat::handle_line`]) and inbound events
//! ([`Chat::handle_inbound`]); output accumulates in the context until the
//! console drains it with [`Chat::take_output`].

pub mod classify;
pub mod wipe;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::config::{ChatSettings, Paths};
use crate::crypto::keys::KeyRing;
use crate::crypto::{CryptoEngine, CryptoFacade, EncryptOutcome};
use crate::session::Session;
use crate::transport::{ChatMessage, Messenger, TransportError};
use crate::ui::{OutputLine, Tone, sanitize};

/// Static command list shown by `/help`.
pub const HELP_TEXT: &str = "\
Available Commands:
/help, /h           : Show this list of commands.
/recipient, /r      : Change the recipient (e.g. /r @username).
/encrypt off, /eof  : Turn OFF encryption (send plain text).
/encrypt on, /eon   : Turn ON encryption.
/history [n]        : Show last n messages (max 50, default 20).
/panic              : Wipe keys, clear screen, and exit immediately.
/exit               : Quit the application.";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/exit`, `--exit`.
    Exit,
    /// `/help`, `/h`.
    Help,
    /// `/panic`.
    Panic,
    /// `/recipient [name]`, `/r [name]`.
    Recipient(Option<String>),
    /// `/history [n]` with the count already clamped.
    History(usize),
    /// `/encrypt off`, `/eof`.
    EncryptOff,
    /// `/encrypt on`, `/eon`.
    EncryptOn,
    /// Anything else that is not blank.
    Message(String),
    /// Blank line.
    Empty,
}

impl Command {
    /// Parse a submitted line. Matching is case-sensitive on the trimmed
    /// line.
    #[must_use]
    pub fn parse(line: &str, settings: &ChatSettings) -> Self {
        let line = line.trim();
        let mut tokens = line.split_whitespace();
        let head = tokens.next().unwrap_or_default();

        match line {
            "" => return Self::Empty,
            "/exit" | "--exit" => return Self::Exit,
            "/help" | "/h" => return Self::Help,
            "/panic" => return Self::Panic,
            "/encrypt off" | "/eof" => return Self::EncryptOff,
            "/encrypt on" | "/eon" => return Self::EncryptOn,
            _ => {}
        }

        match head {
            "/recipient" | "/r" => Self::Recipient(tokens.next().map(str::to_string)),
            "/history" => {
                // Any run of digits counts, even one too long for usize.
                let count = tokens
                    .next()
                    .filter(|n| n.bytes().all(|b| b.is_ascii_digit()))
                    .map_or(settings.history_default, |n| {
                        n.parse::<usize>().unwrap_or(usize::MAX)
                    });
                Self::History(count.clamp(1, settings.history_max.max(1)))
            }
            _ => Self::Message(line.to_string()),
        }
    }
}

/// What the event loop should do after a line was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep going.
    Continue,
    /// Leave the loop normally.
    Exit,
    /// The panic wipe ran: clear the screen and exit.
    Wiped,
}

/// A question the next submitted line answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingPrompt {
    /// `/panic` confirmation.
    PanicConfirm,
    /// `/recipient` without a name.
    Recipient,
}

/// Files the chat touches besides the network.
#[derive(Debug, Clone)]
pub struct ChatFiles {
    /// Key configuration document (`target_username` is written here).
    pub keys_document: PathBuf,
    /// Everything `/panic` truncates.
    pub wipe_targets: Vec<PathBuf>,
}

impl ChatFiles {
    /// The files of a loaded key ring: `/panic` truncates the key
    /// configuration, the credentials and both key files.
    #[must_use]
    pub fn new(paths: &Paths, ring: &KeyRing) -> Self {
        let keys_document = paths.keys_document();
        Self {
            wipe_targets: vec![
                keys_document.clone(),
                paths.credentials(),
                ring.private_key_path.clone(),
                ring.public_key_path.clone(),
            ],
            keys_document,
        }
    }
}

/// The event loop's state.
pub struct Chat<E, M> {
    session: Session,
    facade: CryptoFacade<E>,
    messenger: Arc<M>,
    files: ChatFiles,
    settings: ChatSettings,
    pending: Option<PendingPrompt>,
    output: Vec<OutputLine>,
}

impl<E: CryptoEngine, M: Messenger> Chat<E, M> {
    /// Assemble the context. Encryption starts as configured.
    pub fn new(
        facade: CryptoFacade<E>,
        messenger: Arc<M>,
        files: ChatFiles,
        settings: ChatSettings,
    ) -> Self {
        Self {
            session: Session::new(settings.encrypt_by_default),
            facade,
            messenger,
            files,
            settings,
            pending: None,
            output: Vec::new(),
        }
    }

    /// The session state.
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The crypto facade.
    pub const fn facade(&self) -> &CryptoFacade<E> {
        &self.facade
    }

    /// The question awaiting an answer, if any.
    pub const fn pending(&self) -> Option<PendingPrompt> {
        self.pending
    }

    /// Drain buffered output.
    pub fn take_output(&mut self) -> Vec<OutputLine> {
        std::mem::take(&mut self.output)
    }

    /// Prompt for the next line.
    #[must_use]
    pub fn prompt(&self) -> OutputLine {
        match self.pending {
            Some(PendingPrompt::PanicConfirm) => {
                OutputLine::new(Tone::Error, "⚠️  CONFIRM PANIC WIPE? (y/n): ")
            }
            Some(PendingPrompt::Recipient) => {
                OutputLine::new(Tone::System, "Enter new username (e.g. @friendlyuser): ")
            }
            None if self.session.encryption() => OutputLine::new(Tone::Plain, "You 🔒: "),
            None => OutputLine::new(Tone::Plain, "You 🔓: "),
        }
    }

    fn say(&mut self, tone: Tone, text: impl Into<String>) {
        self.output.push(OutputLine::new(tone, text));
    }

    /// Open the conversation with the default correspondent at startup.
    pub async fn open(&mut self, handle: &str) {
        match self.session.open(self.messenger.as_ref(), handle).await {
            Ok(c) => {
                let line = format!("--- Chatting with {} ---", sanitize(c.name()));
                self.say(Tone::System, line);
            }
            Err(e) => {
                self.say(
                    Tone::Error,
                    format!("❌ Connection error: Could not find user '{handle}'. Error: {e}"),
                );
                self.say(
                    Tone::Error,
                    "Please check the username and restart, or use /recipient to switch.",
                );
            }
        }
    }

    /// Greeting shown once the loop starts.
    pub fn greet(&mut self) {
        self.say(
            Tone::Plain,
            "Use /help to see the list of commands and /exit to quit.",
        );
    }

    /// Report that the network connection is gone. The loop keeps running.
    pub fn transport_lost(&mut self, err: &TransportError) {
        tracing::warn!(err = %err, "transport lost");
        self.say(
            Tone::Error,
            format!("❌ Connection lost: {err}. Network commands will fail; /exit to quit."),
        );
    }

    /// Handle one submitted line.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        if let Some(pending) = self.pending.take() {
            return match pending {
                PendingPrompt::PanicConfirm => self.confirm_panic(line),
                PendingPrompt::Recipient => {
                    let handle = line.trim();
                    if !handle.is_empty() {
                        self.switch(handle).await;
                    }
                    Flow::Continue
                }
            };
        }

        match Command::parse(line, &self.settings) {
            Command::Exit => return Flow::Exit,
            Command::Help => {
                for text in HELP_TEXT.lines() {
                    self.say(Tone::System, text);
                }
            }
            Command::Panic => self.pending = Some(PendingPrompt::PanicConfirm),
            Command::Recipient(Some(handle)) => self.switch(&handle).await,
            Command::Recipient(None) => self.pending = Some(PendingPrompt::Recipient),
            Command::History(limit) => self.history(limit).await,
            Command::EncryptOff => {
                self.session.set_encryption(false);
                self.say(Tone::System, "🔓 Encryption DISABLED. Sending plain text.");
            }
            Command::EncryptOn => {
                self.session.set_encryption(true);
                self.say(Tone::System, "🔒 Encryption ENABLED.");
            }
            Command::Message(text) => self.send(&text).await,
            Command::Empty => {}
        }
        Flow::Continue
    }

    fn confirm_panic(&mut self, answer: &str) -> Flow {
        if !answer.trim().eq_ignore_ascii_case("y") {
            tracing::info!("panic wipe declined");
            return Flow::Continue;
        }
        match wipe::wipe(&self.files.wipe_targets) {
            Ok(()) => Flow::Wiped,
            Err(e) => {
                tracing::error!(err = %e, "panic wipe failed");
                self.say(Tone::Error, format!("❌ Panic failed: {e}"));
                Flow::Continue
            }
        }
    }

    async fn switch(&mut self, handle: &str) {
        self.say(Tone::System, format!("🔍 Searching for {handle}..."));
        let document = self.files.keys_document.clone();
        match self
            .session
            .switch(self.messenger.as_ref(), handle, &document)
            .await
        {
            Ok(report) => {
                let name = sanitize(&report.name);
                self.say(Tone::System, format!("✅ Switched chat to: {name}"));
                match report.persisted {
                    Ok(()) => self.say(
                        Tone::System,
                        format!("💾 Updated 'target_username' in {}", document.display()),
                    ),
                    Err(e) => self.say(
                        Tone::Error,
                        format!("⚠️ Chat switched, but failed to update JSON: {e}"),
                    ),
                }
            }
            Err(TransportError::NotFound(h)) => {
                self.say(Tone::Error, format!("❌ Could not find user: {h}"));
            }
            Err(e) => self.say(Tone::Error, format!("❌ Could not find user: {e}")),
        }
    }

    async fn history(&mut self, limit: usize) {
        let Some(correspondent) = self.session.correspondent().cloned() else {
            self.say(Tone::Error, "❌ No active chat.");
            return;
        };
        self.say(Tone::System, format!("⏳ Fetching last {limit} messages..."));

        let page = match self.messenger.history(&correspondent.entity, limit).await {
            Ok(page) => page,
            Err(e) => {
                self.say(Tone::Error, format!("❌ Error fetching history: {e}"));
                return;
            }
        };

        let name = sanitize(correspondent.name());
        self.say(Tone::System, format!("--- History ({limit}) ---"));
        for message in page.iter().rev() {
            let content = classify::classify(message, &self.facade).await;
            let stamp = classify::timestamp(message.date, &self.settings.timestamp_format);
            let line =
                classify::render_history(content, message.out, &name, &stamp);
            self.output.push(line);
        }
        self.say(Tone::System, "--- End of History ---");
    }

    async fn send(&mut self, text: &str) {
        let Some(correspondent) = self.session.correspondent().cloned() else {
            self.say(Tone::Error, "❌ No recipient selected! Use /r to set one.");
            return;
        };

        let encrypted = self.session.encryption();
        let payload = if encrypted {
            match self.facade.encrypt(text).await {
                EncryptOutcome::Ciphertext(armored) => armored,
                failure => {
                    self.say(Tone::Error, format!("❌ {failure} Message not sent."));
                    return;
                }
            }
        } else {
            text.to_string()
        };

        if let Err(e) = self
            .messenger
            .send_text(&correspondent.entity, &payload)
            .await
        {
            tracing::warn!(err = %e, "send failed");
            self.say(Tone::Error, format!("❌ Failed to send message: {e}"));
            return;
        }

        let stamp = classify::timestamp(Utc::now(), &self.settings.timestamp_format);
        let shown = sanitize(text);
        if encrypted {
            self.say(Tone::Sent, format!("[{stamp}] [You] encrypted: {shown}"));
        } else {
            self.say(Tone::Plain, format!("[{stamp}] [You]: {shown}"));
        }
    }

    /// Handle one inbound event. Events for other chats, or arriving while
    /// no correspondent is selected, produce no output.
    pub async fn handle_inbound(&mut self, message: ChatMessage) {
        let Some(correspondent) = self.session.correspondent() else {
            return;
        };
        if message.chat_id != correspondent.entity.id {
            tracing::trace!(chat_id = %message.chat_id, "ignoring event for another chat");
            return;
        }
        let name = sanitize(correspondent.name());

        let content = classify::classify(&message, &self.facade).await;
        let stamp = classify::timestamp(message.date, &self.settings.timestamp_format);
        if let Some(line) = classify::render_live(content, message.out, &name, &stamp) {
            self.output.push(line);
        }
    }
}
