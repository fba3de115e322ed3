//! Messaging network API credentials.
//!
//! The credentials document (`api_config.json`) holds the application id
//! and hash Telegram needs to open a client session. It is created
//! once through an interactive prompt and read-only afterwards.

use std::fmt;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::write_json_document;

/// Errors from loading or creating the credentials document.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The operator left a value blank at the prompt.
    #[error("API credentials cannot be empty")]
    Empty,

    /// The document exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Document path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid JSON or lacks a field.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The new document could not be written.
    #[error("failed to write config file {path}: {source}")]
    Write {
        /// Document path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Reading the operator's answer or printing the prompt failed.
    #[error("credential prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
}

/// API credentials for the messaging network.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Application id. Accepted as a JSON string or number.
    #[serde(deserialize_with = "string_or_number")]
    pub api_id: String,
    /// Application hash. Never printed.
    pub api_hash: String,
}

impl Credentials {
    /// Build credentials from their two values.
    pub fn new(api_id: impl Into<String>, api_hash: impl Into<String>) -> Self {
        Self {
            api_id: api_id.into(),
            api_hash: api_hash.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .finish()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Loads the credentials document, creating it interactively when absent.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store backed by the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the stored credentials, prompting for them on first run.
    ///
    /// When the document is missing, guidance is written to `out`, two
    /// lines are read from `input` (`API_ID`, then `API_HASH`), and the
    /// document is written before returning.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::Empty`] if either answer is blank.
    /// - [`CredentialError::Read`] / [`CredentialError::Parse`] for an
    ///   existing document that cannot be used.
    /// - [`CredentialError::Write`] if the new document cannot be saved.
    pub fn load_or_create(
        &self,
        input: &mut impl BufRead,
        out: &mut impl Write,
    ) -> Result<Credentials, CredentialError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let credentials: Credentials =
                    serde_json::from_str(&contents).map_err(|source| CredentialError::Parse {
                        path: self.path.clone(),
                        source,
                    })?;
                tracing::debug!(path = %self.path.display(), "loaded API credentials");
                Ok(credentials)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.create(input, out),
            Err(source) => Err(CredentialError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn create(
        &self,
        input: &mut impl BufRead,
        out: &mut impl Write,
    ) -> Result<Credentials, CredentialError> {
        let name = self
            .path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned());
        writeln!(out, "⚠️ {name} not found.")?;
        writeln!(out, "ℹ️  To get your API keys:")?;
        writeln!(out, "   1. Log in to https://my.telegram.org")?;
        writeln!(out, "   2. Go to 'API development tools'")?;
        writeln!(out, "   3. Create a new application (any name works)")?;
        writeln!(out)?;

        let api_id = crate::ui::ask(input, out, "Please enter your API_ID: ")?;
        let api_hash = crate::ui::ask(input, out, "Please enter your API_HASH: ")?;
        if api_id.is_empty() || api_hash.is_empty() {
            return Err(CredentialError::Empty);
        }

        let credentials = Credentials::new(api_id, api_hash);
        write_json_document(&self.path, &credentials).map_err(|source| CredentialError::Write {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(path = %self.path.display(), "created credentials document");
        writeln!(out, "✅ Saved API credentials to {}", self.path.display())?;
        Ok(credentials)
    }
}
