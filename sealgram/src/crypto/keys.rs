//! Key configuration and key loading.
//!
//! The key configuration document (`keys.json`) names the local private
//! key file, its passphrase, the correspondent's public key file and the
//! default correspondent handle. [`KeyManager::initialize`] bootstraps the
//! document on first run, otherwise imports both keys into the engine and
//! grants the correspondent's key ultimate trust.

use std::fmt;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{CryptoEngine, CryptoError, Fingerprint, TrustLevel};
use crate::config::{DEFAULT_PRIVATE_KEY_FILE, DEFAULT_PUBLIC_KEY_FILE, Paths, write_json_document};

// ---------------------------------------------------------------------------
// Configuration document
// ---------------------------------------------------------------------------

/// Errors reading or writing the key configuration document.
#[derive(Debug, thiserror::Error)]
pub enum KeysDocumentError {
    /// The document could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Document path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid JSON.
    #[error("{path} is corrupted or empty: {source}")]
    Corrupt {
        /// Document path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The document could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Document path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

fn default_private_key() -> String {
    DEFAULT_PRIVATE_KEY_FILE.to_string()
}

fn default_public_key() -> String {
    DEFAULT_PUBLIC_KEY_FILE.to_string()
}

/// Contents of `keys.json`.
///
/// Keys the operator added by hand are kept in `extra` and written back
/// unchanged.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct KeysDocument {
    /// Path of the local private key file.
    #[serde(default = "default_private_key")]
    pub my_private_key: String,
    /// Passphrase protecting the private key.
    #[serde(default)]
    pub my_private_key_passphrase: Option<String>,
    /// Path of the correspondent's public key file.
    #[serde(default = "default_public_key")]
    pub friends_public_key: String,
    /// Default correspondent handle; empty means unset.
    #[serde(default)]
    pub target_username: Option<String>,
    /// Unrecognized keys.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for KeysDocument {
    fn default() -> Self {
        Self {
            my_private_key: default_private_key(),
            my_private_key_passphrase: Some(String::new()),
            friends_public_key: default_public_key(),
            target_username: Some(String::new()),
            extra: serde_json::Map::new(),
        }
    }
}

impl fmt::Debug for KeysDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeysDocument")
            .field("my_private_key", &self.my_private_key)
            .field("my_private_key_passphrase", &"<redacted>")
            .field("friends_public_key", &self.friends_public_key)
            .field("target_username", &self.target_username)
            .field("extra", &self.extra)
            .finish()
    }
}

impl KeysDocument {
    /// Read and parse the document at `path`.
    ///
    /// # Errors
    ///
    /// [`KeysDocumentError::Read`] or [`KeysDocumentError::Corrupt`].
    pub fn load(path: &Path) -> Result<Self, KeysDocumentError> {
        let contents = std::fs::read_to_string(path).map_err(|source| KeysDocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| KeysDocumentError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the document to `path`, four-space indented.
    ///
    /// # Errors
    ///
    /// [`KeysDocumentError::Write`].
    pub fn save(&self, path: &Path) -> Result<(), KeysDocumentError> {
        write_json_document(path, self).map_err(|source| KeysDocumentError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist `handle` as the default correspondent (read-modify-write).
    ///
    /// # Errors
    ///
    /// Any [`KeysDocumentError`]; the file is untouched if reading fails.
    pub fn set_target(path: &Path, handle: &str) -> Result<(), KeysDocumentError> {
        let mut doc = Self::load(path)?;
        doc.target_username = Some(handle.to_string());
        doc.save(path)?;
        tracing::info!(path = %path.display(), handle, "saved default correspondent");
        Ok(())
    }

    /// The default correspondent handle, `None` when unset or blank.
    #[must_use]
    pub fn default_handle(&self) -> Option<&str> {
        self.target_username
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Key manager
// ---------------------------------------------------------------------------

/// Which of the two configured keys an error or event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// The local identity's private key.
    Private,
    /// The correspondent's public key.
    Public,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => write!(f, "Private Key"),
            Self::Public => write!(f, "Public Key"),
        }
    }
}

/// Errors from [`KeyManager::initialize`]. All are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The configuration document could not be read or parsed.
    #[error(transparent)]
    Document(#[from] KeysDocumentError),

    /// A configured key file does not exist.
    #[error("File '{}' not found.", path.display())]
    MissingKeyFile {
        /// Which key.
        role: KeyRole,
        /// Resolved path.
        path: PathBuf,
    },

    /// A configured key file holds only whitespace.
    #[error("{} is empty!", path.display())]
    EmptyKeyFile {
        /// Which key.
        role: KeyRole,
        /// Resolved path.
        path: PathBuf,
    },

    /// A configured key file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadKeyFile {
        /// Which key.
        role: KeyRole,
        /// Resolved path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The engine found no key in the file.
    #[error("Failed to import {role}! (Invalid format or corrupted)")]
    ImportRejected {
        /// Which key.
        role: KeyRole,
    },

    /// The engine failed.
    #[error(transparent)]
    Engine(#[from] CryptoError),

    /// First-run files could not be created.
    #[error("failed to create {}: {source}", path.display())]
    Bootstrap {
        /// File being created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Progress notifications emitted while initializing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    /// The configuration document was missing and is being created.
    CreatingDefaults(PathBuf),
    /// An empty placeholder key file was created.
    CreatedPlaceholder(PathBuf),
    /// The configuration document is being read.
    ReadingConfiguration,
    /// A key file is being imported.
    Loading(KeyRole, PathBuf),
    /// A key was imported; carries its primary user id.
    Loaded(KeyRole, String),
    /// Both keys are loaded and trusted.
    Ready,
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatingDefaults(path) => write!(
                f,
                "⚠️ {} not found. Creating default configuration...",
                path.display()
            ),
            Self::CreatedPlaceholder(path) => write!(
                f,
                "   Created empty file: {}",
                path.file_name()
                    .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
            ),
            Self::ReadingConfiguration => write!(f, "📂 Reading configuration..."),
            Self::Loading(KeyRole::Private, path) => {
                write!(f, "   > Loading Private Key: {}", path.display())
            }
            Self::Loading(KeyRole::Public, path) => {
                write!(f, "   > Loading Friend's Key: {}", path.display())
            }
            Self::Loaded(KeyRole::Private, uid) => write!(f, "   ✅ Loaded Identity: {uid}"),
            Self::Loaded(KeyRole::Public, uid) => write!(f, "   ✅ Loaded Friend: {uid}"),
            Self::Ready => write!(f, "🚀 System Ready."),
        }
    }
}

/// A key the engine holds, with its display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedKey {
    /// Engine fingerprint.
    pub fingerprint: Fingerprint,
    /// Primary user id.
    pub label: String,
}

/// Everything the chat needs from the key configuration.
#[derive(Debug)]
pub struct KeyRing {
    /// The local identity.
    pub identity: LoadedKey,
    /// The correspondent's key (trusted ultimately).
    pub correspondent: LoadedKey,
    /// Passphrase of the identity key.
    pub passphrase: Zeroizing<String>,
    /// Default correspondent handle from the document.
    pub default_handle: Option<String>,
    /// Resolved private key path.
    pub private_key_path: PathBuf,
    /// Resolved public key path.
    pub public_key_path: PathBuf,
}

/// Result of [`KeyManager::initialize`].
#[derive(Debug)]
pub enum KeyInit {
    /// First run: defaults were written and the operator must fill them in.
    Bootstrapped {
        /// Files created (document first).
        created: Vec<PathBuf>,
    },
    /// Keys are loaded.
    Ready(KeyRing),
}

/// Loads the two configured keys into a [`CryptoEngine`].
pub struct KeyManager<'a, E> {
    engine: &'a E,
    paths: &'a Paths,
}

impl<'a, E: CryptoEngine> KeyManager<'a, E> {
    /// Manager importing into `engine`, reading files under `paths`.
    pub const fn new(engine: &'a E, paths: &'a Paths) -> Self {
        Self { engine, paths }
    }

    /// Bootstrap or load the key configuration.
    ///
    /// `on_event` receives progress for display.
    ///
    /// # Errors
    ///
    /// See [`KeyError`]. Nothing is retried.
    pub async fn initialize(
        &self,
        mut on_event: impl FnMut(KeyEvent) + Send,
    ) -> Result<KeyInit, KeyError> {
        let doc_path = self.paths.keys_document();
        if !doc_path.exists() {
            on_event(KeyEvent::CreatingDefaults(doc_path.clone()));
            let created = self.bootstrap(&doc_path, &mut on_event)?;
            return Ok(KeyInit::Bootstrapped { created });
        }

        on_event(KeyEvent::ReadingConfiguration);
        let doc = KeysDocument::load(&doc_path)?;
        let private_key_path = self.paths.resolve(&doc.my_private_key);
        let public_key_path = self.paths.resolve(&doc.friends_public_key);

        let identity = self
            .load(KeyRole::Private, &private_key_path, &mut on_event)
            .await?;
        let passphrase = Zeroizing::new(doc.my_private_key_passphrase.clone().unwrap_or_default());

        let correspondent = self
            .load(KeyRole::Public, &public_key_path, &mut on_event)
            .await?;
        self.engine
            .trust(&correspondent.fingerprint, TrustLevel::Ultimate)
            .await?;

        let default_handle = doc.default_handle().map(str::to_string);
        tracing::info!(
            identity = %identity.fingerprint,
            correspondent = %correspondent.fingerprint,
            default_handle = ?default_handle,
            "keys loaded"
        );
        on_event(KeyEvent::Ready);

        Ok(KeyInit::Ready(KeyRing {
            identity,
            correspondent,
            passphrase,
            default_handle,
            private_key_path,
            public_key_path,
        }))
    }

    /// Write the default document and empty placeholder key files.
    fn bootstrap(
        &self,
        doc_path: &Path,
        on_event: &mut impl FnMut(KeyEvent),
    ) -> Result<Vec<PathBuf>, KeyError> {
        KeysDocument::default()
            .save(doc_path)
            .map_err(|e| match e {
                KeysDocumentError::Write { path, source } => KeyError::Bootstrap { path, source },
                other => KeyError::Document(other),
            })?;
        let mut created = vec![doc_path.to_path_buf()];

        for name in [DEFAULT_PRIVATE_KEY_FILE, DEFAULT_PUBLIC_KEY_FILE] {
            let path = self.paths.resolve(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    on_event(KeyEvent::CreatedPlaceholder(path.clone()));
                    created.push(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(source) => return Err(KeyError::Bootstrap { path, source }),
            }
        }
        tracing::info!(files = created.len(), "bootstrapped key configuration");
        Ok(created)
    }

    /// Read, validate and import one key file.
    async fn load(
        &self,
        role: KeyRole,
        path: &Path,
        on_event: &mut (impl FnMut(KeyEvent) + Send),
    ) -> Result<LoadedKey, KeyError> {
        on_event(KeyEvent::Loading(role, path.to_path_buf()));
        let material = match std::fs::read_to_string(path) {
            Ok(material) => Zeroizing::new(material),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KeyError::MissingKeyFile {
                    role,
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(KeyError::ReadKeyFile {
                    role,
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if material.trim().is_empty() {
            return Err(KeyError::EmptyKeyFile {
                role,
                path: path.to_path_buf(),
            });
        }

        let fingerprint = self
            .engine
            .import_key(&material)
            .await?
            .into_iter()
            .next()
            .ok_or(KeyError::ImportRejected { role })?;
        let label = self.engine.primary_uid(&fingerprint).await?;
        on_event(KeyEvent::Loaded(role, label.clone()));
        tracing::debug!(%role, fingerprint = %fingerprint, "imported key");
        Ok(LoadedKey { fingerprint, label })
    }
}
