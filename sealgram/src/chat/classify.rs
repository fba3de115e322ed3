//! Classification and rendering of message events.
//!
//! Every message, live or from history, is classified the same way, in
//! this order: encrypted envelope, file, call, plain text. Live events and
//! history entries then render differently.

use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};

use crate::crypto::{CryptoEngine, CryptoFacade, DecryptOutcome};
use crate::transport::ChatMessage;
use crate::ui::{OutputLine, Tone, sanitize};

/// Marker that identifies an ASCII-armored OpenPGP message.
const ENVELOPE_MARKER: &str = "BEGIN PGP MESSAGE";

/// Whether `text` carries an encrypted envelope.
///
/// A substring check: a plaintext message that quotes the marker is
/// treated as an envelope and will fail to decrypt.
#[must_use]
pub fn is_encrypted_envelope(text: &str) -> bool {
    text.contains(ENVELOPE_MARKER)
}

/// What a message turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// An envelope and the result of decrypting it.
    Envelope(DecryptOutcome),
    /// A file; carries its display name.
    File(String),
    /// A call service message.
    Call,
    /// Plain text, sanitized.
    Text(String),
}

/// Classify `msg`, decrypting envelopes through `facade`.
pub async fn classify<E: CryptoEngine>(msg: &ChatMessage, facade: &CryptoFacade<E>) -> Content {
    if is_encrypted_envelope(&msg.text) {
        return Content::Envelope(facade.decrypt(&msg.text).await);
    }
    if let Some(file) = &msg.attachment {
        let name = file
            .name
            .as_deref()
            .map(sanitize)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "file".to_string());
        return Content::File(name);
    }
    if msg
        .action
        .as_deref()
        .is_some_and(|kind| kind.contains("PhoneCall"))
    {
        return Content::Call;
    }
    Content::Text(sanitize(&msg.text))
}

/// Format `date` in local time with `format`, falling back to `%H:%M` when
/// the format string is invalid.
#[must_use]
pub fn timestamp(date: DateTime<Utc>, format: &str) -> String {
    let local = date.with_timezone(&Local);
    let mut out = String::new();
    if write!(out, "{}", local.format(format)).is_err() {
        tracing::debug!(format, "invalid timestamp format, using default");
        out.clear();
        let _ = write!(out, "{}", local.format("%H:%M"));
    }
    out
}

/// Render a live event. `None` means the event produces no output
/// (a failed decrypt of our own outgoing envelope).
#[must_use]
pub fn render_live(content: Content, out: bool, name: &str, stamp: &str) -> Option<OutputLine> {
    let who = if out { "You" } else { name };
    let line = match content {
        Content::Envelope(DecryptOutcome::Success(plain)) => {
            let plain = sanitize(&plain);
            if out {
                OutputLine::new(Tone::Sent, format!("[{stamp}] [You] verified: {plain}"))
            } else {
                OutputLine::new(Tone::User, format!("[{stamp}] [{name}] decrypted: {plain}"))
            }
        }
        Content::Envelope(_) if out => return None,
        Content::Envelope(failure) => OutputLine::new(
            Tone::Error,
            format!("[{stamp}] [{name}] 🔒 Error: {}", sanitize(&failure.to_string())),
        ),
        Content::File(file) => OutputLine::new(Tone::Plain, format!("[{stamp}] [{who}]: [{file}]")),
        Content::Call => OutputLine::new(Tone::Plain, format!("[{stamp}] [{who}]: [Call]")),
        Content::Text(text) => OutputLine::new(Tone::Plain, format!("[{stamp}] [{who}]: {text}")),
    };
    Some(line)
}

/// Render one history entry.
#[must_use]
pub fn render_history(content: Content, out: bool, name: &str, stamp: &str) -> OutputLine {
    let who = if out { "You" } else { name };
    let tone = if out { Tone::Sent } else { Tone::User };
    match content {
        Content::Envelope(DecryptOutcome::Success(plain)) => {
            OutputLine::new(tone, format!("[{stamp}] [{who}]: {}", sanitize(&plain)))
        }
        Content::Envelope(_) => OutputLine::new(Tone::Error, format!("[{stamp}] [{who}]: 🔒 [PGP Error]")),
        Content::File(file) => OutputLine::new(tone, format!("[{stamp}] [{who}]: [{file}]")),
        Content::Call => OutputLine::new(tone, format!("[{stamp}] [{who}]: [Call]")),
        Content::Text(text) => OutputLine::new(tone, format!("[{stamp}] [{who}]: {text}")),
    }
}
