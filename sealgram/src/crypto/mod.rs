//! OpenPGP layer for `Sealgram`.
//!
//! Defines the [`CryptoEngine`] trait (the collaborator that actually
//! performs OpenPGP operations), its error type, and [`CryptoFacade`], the
//! only place the rest of the client encrypts or decrypts. The facade
//! never returns `Err` and never panics: every result is an
//! [`EncryptOutcome`] or [`DecryptOutcome`] the caller matches on.
//!
//! Implementations of the engine:
//! - [`gpg::GpgEngine`]: drives the `gpg` executable in an isolated home
//! - [`stub::StubEngine`]: deterministic in-memory engine for tests

pub mod gpg;
pub mod keys;
pub mod stub;

use std::fmt;

use zeroize::Zeroizing;

/// Fingerprint of an imported key (uppercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a fingerprint, normalizing it to uppercase.
    pub fn new(fpr: impl AsRef<str>) -> Self {
        Self(fpr.as_ref().trim().to_ascii_uppercase())
    }

    /// The fingerprint as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner trust granted to an imported key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    /// The key is trusted as if it were our own.
    Ultimate,
}

impl TrustLevel {
    /// GnuPG owner-trust value (`--import-ownertrust` format).
    #[must_use]
    pub const fn ownertrust_value(self) -> u8 {
        match self {
            Self::Ultimate => 6,
        }
    }
}

/// Errors reported by a [`CryptoEngine`].
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The engine itself could not run (missing binary, spawn or pipe failure).
    #[error("crypto engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Key material was rejected on import.
    #[error("key import failed: {0}")]
    ImportFailed(String),

    /// No key with this fingerprint is known to the engine.
    #[error("unknown key {0}")]
    UnknownKey(Fingerprint),

    /// Owner trust could not be set.
    #[error("failed to set trust: {0}")]
    TrustFailed(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (corrupted envelope, wrong key, or bad passphrase).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

/// OpenPGP engine collaborator.
///
/// All key state lives inside the engine; callers refer to keys by the
/// fingerprints `import_key` returns.
pub trait CryptoEngine: Send + Sync {
    /// Import armored key material; returns the fingerprints it contained.
    ///
    /// An empty vector means the material held no usable key.
    fn import_key(
        &self,
        armored: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Fingerprint>, CryptoError>> + Send;

    /// Primary user id of an imported key.
    fn primary_uid(
        &self,
        fpr: &Fingerprint,
    ) -> impl std::future::Future<Output = Result<String, CryptoError>> + Send;

    /// Set owner trust on an imported key.
    fn trust(
        &self,
        fpr: &Fingerprint,
        level: TrustLevel,
    ) -> impl std::future::Future<Output = Result<(), CryptoError>> + Send;

    /// Encrypt `plaintext` to `recipient`, returning an ASCII-armored envelope.
    fn encrypt(
        &self,
        plaintext: &str,
        recipient: &Fingerprint,
    ) -> impl std::future::Future<Output = Result<String, CryptoError>> + Send;

    /// Decrypt an armored envelope with the secret keys held by the engine.
    fn decrypt(
        &self,
        envelope: &str,
        passphrase: &str,
    ) -> impl std::future::Future<Output = Result<String, CryptoError>> + Send;
}

/// Result of [`CryptoFacade::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptOutcome {
    /// ASCII-armored envelope ready to send.
    Ciphertext(String),
    /// The engine ran but refused; carries its status text.
    CryptoFailure(String),
    /// The engine could not run.
    EngineUnavailable,
}

/// Result of [`CryptoFacade::decrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// Recovered plaintext.
    Success(String),
    /// The engine ran but could not decrypt; carries its diagnostic.
    CryptoFailure(String),
    /// The engine could not run.
    EngineUnavailable,
}

/// Prefix of a rendered decryption failure.
pub const DECRYPTION_FAILED_TAG: &str = "DECRYPTION_FAILED";

/// Prefix of a rendered encryption failure.
pub const ENCRYPTION_ERROR_TAG: &str = "Encryption Error";

impl fmt::Display for EncryptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ciphertext(armored) => f.write_str(armored),
            Self::CryptoFailure(status) => write!(f, "[{ENCRYPTION_ERROR_TAG}: {status}]"),
            Self::EngineUnavailable => {
                write!(f, "[{ENCRYPTION_ERROR_TAG}: crypto engine unavailable]")
            }
        }
    }
}

impl fmt::Display for DecryptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(plaintext) => f.write_str(plaintext),
            Self::CryptoFailure(diag) => write!(f, "{DECRYPTION_FAILED_TAG}: {diag}"),
            Self::EngineUnavailable => {
                write!(f, "{DECRYPTION_FAILED_TAG}: crypto engine unavailable")
            }
        }
    }
}

/// The client's single entry point for encryption and decryption.
///
/// Bound to one recipient (the correspondent's key) and the local
/// identity's passphrase, which is zeroized on drop.
pub struct CryptoFacade<E> {
    engine: E,
    recipient: Fingerprint,
    passphrase: Zeroizing<String>,
}

impl<E: CryptoEngine> CryptoFacade<E> {
    /// Bind `engine` to a recipient and the identity passphrase.
    pub const fn new(engine: E, recipient: Fingerprint, passphrase: Zeroizing<String>) -> Self {
        Self {
            engine,
            recipient,
            passphrase,
        }
    }

    /// The engine behind the facade.
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Fingerprint messages are encrypted to.
    pub const fn recipient(&self) -> &Fingerprint {
        &self.recipient
    }

    /// Encrypt `plaintext` to the correspondent.
    pub async fn encrypt(&self, plaintext: &str) -> EncryptOutcome {
        match self.engine.encrypt(plaintext, &self.recipient).await {
            Ok(armored) => EncryptOutcome::Ciphertext(armored),
            Err(CryptoError::EngineUnavailable(reason)) => {
                tracing::error!(reason = %reason, "crypto engine unavailable for encrypt");
                EncryptOutcome::EngineUnavailable
            }
            Err(e) => {
                tracing::warn!(err = %e, recipient = %self.recipient, "encryption failed");
                EncryptOutcome::CryptoFailure(status_text(e))
            }
        }
    }

    /// Decrypt an armored envelope addressed to the local identity.
    pub async fn decrypt(&self, envelope: &str) -> DecryptOutcome {
        match self.engine.decrypt(envelope, &self.passphrase).await {
            Ok(plaintext) => DecryptOutcome::Success(plaintext),
            Err(CryptoError::EngineUnavailable(reason)) => {
                tracing::error!(reason = %reason, "crypto engine unavailable for decrypt");
                DecryptOutcome::EngineUnavailable
            }
            Err(e) => {
                tracing::debug!(err = %e, "decryption failed");
                DecryptOutcome::CryptoFailure(status_text(e))
            }
        }
    }
}

/// The engine's own status text, without our error prefix.
fn status_text(err: CryptoError) -> String {
    match err {
        CryptoError::EncryptionFailed(s)
        | CryptoError::DecryptionFailed(s)
        | CryptoError::ImportFailed(s)
        | CryptoError::TrustFailed(s)
        | CryptoError::EngineUnavailable(s) => s,
        CryptoError::UnknownKey(fpr) => format!("unknown key {fpr}"),
    }
}
