//! Active conversation state.
//!
//! A [`Session`] holds at most one correspondent and the encryption toggle.
//! Switching correspondents resolves the handle first and only replaces the
//! held correspondent once the lookup succeeds; the new handle is then
//! written to the key configuration document.

use std::path::Path;

use crate::crypto::keys::{KeysDocument, KeysDocumentError};
use crate::transport::{Entity, Messenger, TransportError};

/// The user the session talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correspondent {
    /// Resolved network entity.
    pub entity: Entity,
    /// Handle as the operator typed it.
    pub handle: String,
}

impl Correspondent {
    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.entity.first_name
    }
}

/// Outcome of a successful [`Session::switch`].
#[derive(Debug)]
pub struct SwitchReport {
    /// Display name of the new correspondent.
    pub name: String,
    /// Whether the handle was persisted. The switch itself has already
    /// happened either way.
    pub persisted: Result<(), KeysDocumentError>,
}

/// Single-conversation session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    correspondent: Option<Correspondent>,
    encryption: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Session {
    /// A session with no correspondent.
    #[must_use]
    pub const fn new(encryption: bool) -> Self {
        Self {
            correspondent: None,
            encryption,
        }
    }

    /// The current correspondent, if any.
    #[must_use]
    pub const fn correspondent(&self) -> Option<&Correspondent> {
        self.correspondent.as_ref()
    }

    /// Whether outgoing text is encrypted.
    #[must_use]
    pub const fn encryption(&self) -> bool {
        self.encryption
    }

    /// Turn encryption on or off. The correspondent is unaffected.
    pub fn set_encryption(&mut self, enabled: bool) {
        tracing::info!(enabled, "encryption toggled");
        self.encryption = enabled;
    }

    /// Resolve `handle` at startup and make it the correspondent.
    ///
    /// # Errors
    ///
    /// Returns the lookup error; the session stays without a correspondent.
    pub async fn open<M: Messenger>(
        &mut self,
        messenger: &M,
        handle: &str,
    ) -> Result<&Correspondent, TransportError> {
        let entity = messenger.resolve(handle).await?;
        tracing::info!(handle, chat_id = %entity.id, "opened conversation");
        Ok(self.correspondent.insert(Correspondent {
            entity,
            handle: handle.to_string(),
        }))
    }

    /// Switch to `handle` and persist it as the default correspondent in
    /// the document at `document`.
    ///
    /// # Errors
    ///
    /// Returns the lookup error; the previous correspondent is kept and
    /// nothing is written.
    pub async fn switch<M: Messenger>(
        &mut self,
        messenger: &M,
        handle: &str,
        document: &Path,
    ) -> Result<SwitchReport, TransportError> {
        let entity = messenger.resolve(handle).await.inspect_err(|e| {
            tracing::warn!(handle, err = %e, "correspondent lookup failed");
        })?;
        let name = entity.first_name.clone();
        tracing::info!(handle, chat_id = %entity.id, "switched correspondent");
        self.correspondent = Some(Correspondent {
            entity,
            handle: handle.to_string(),
        });

        let persisted = KeysDocument::set_target(document, handle);
        if let Err(e) = &persisted {
            tracing::warn!(err = %e, "failed to persist correspondent");
        }
        Ok(SwitchReport { name, persisted })
    }
}
