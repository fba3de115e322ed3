//! Deterministic in-memory OpenPGP stand-in.
//!
//! [`StubEngine`] satisfies the [`CryptoEngine`] contract closely enough to
//! exercise key loading, the facade, and message classification without a
//! `gpg` installation. Envelopes look like armored OpenPGP messages (they
//! carry the `BEGIN PGP MESSAGE` marker) but the body is repeating-key XOR.
//! It provides **zero** cryptographic security.
//!
//! Semantics mirror GnuPG where the client cares:
//! - a key block imports under one fingerprint derived from its `Comment:`
//!   user id, so a public and a private block of the same identity match;
//! - only envelopes addressed to a key imported from a *private* block can
//!   be decrypted, so an echo of our own outgoing envelope fails to decrypt.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{CryptoEngine, CryptoError, Fingerprint, TrustLevel};

/// A fixed 32-byte key used by the stub for repeating-key XOR.
const STUB_KEY: [u8; 32] = [
    0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, 0xBA, 0xBE, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF,
    0xFE, 0xDC, 0xBA, 0x98, 0x76, 0x54, 0x32, 0x10, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42,
];

const MESSAGE_BEGIN: &str = "-----BEGIN PGP MESSAGE-----";
const MESSAGE_END: &str = "-----END PGP MESSAGE-----";
const RECIPIENT_HEADER: &str = "Recipient: ";

#[derive(Debug, Clone)]
struct StubKey {
    uid: String,
    secret: bool,
    trust: Option<TrustLevel>,
}

/// In-memory engine for tests. See the module docs for its semantics.
#[derive(Debug)]
pub struct StubEngine {
    keys: parking_lot::Mutex<HashMap<Fingerprint, StubKey>>,
    available: AtomicBool,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEngine {
    /// An available engine with no keys.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: parking_lot::Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a missing or broken engine: while `false`, every operation
    /// fails with [`CryptoError::EngineUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Armored key block the stub will import for `uid`.
    #[must_use]
    pub fn key_block(uid: &str, secret: bool) -> String {
        let kind = if secret { "PRIVATE" } else { "PUBLIC" };
        format!(
            "-----BEGIN PGP {kind} KEY BLOCK-----\nComment: {uid}\n\n{}\n-----END PGP {kind} KEY BLOCK-----\n",
            hex(uid.as_bytes())
        )
    }

    /// Fingerprint [`StubEngine::key_block`] material for `uid` imports under.
    #[must_use]
    pub fn fingerprint_for(uid: &str) -> Fingerprint {
        let mut out = String::with_capacity(40);
        for salt in 0u8..3 {
            let mut hasher = DefaultHasher::new();
            salt.hash(&mut hasher);
            uid.hash(&mut hasher);
            let _ = write!(out, "{:016X}", hasher.finish());
        }
        out.truncate(40);
        Fingerprint::new(out)
    }

    /// Build an envelope addressed to `recipient` without any engine state,
    /// as a remote correspondent would.
    #[must_use]
    pub fn seal(recipient: &Fingerprint, plaintext: &str) -> String {
        format!(
            "{MESSAGE_BEGIN}\n{RECIPIENT_HEADER}{recipient}\n\n{}\n{MESSAGE_END}",
            hex(&xor_with_key(plaintext.as_bytes()))
        )
    }

    /// Owner trust currently set on `fpr`.
    #[must_use]
    pub fn trust_of(&self, fpr: &Fingerprint) -> Option<TrustLevel> {
        self.keys.lock().get(fpr).and_then(|k| k.trust)
    }

    fn check_available(&self) -> Result<(), CryptoError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(CryptoError::EngineUnavailable(
                "stub engine switched off".to_string(),
            ))
        }
    }
}

/// XOR each byte of `data` with the corresponding byte of [`STUB_KEY`],
/// cycling the key if `data` is longer than 32 bytes.
fn xor_with_key(data: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, byte)| byte ^ STUB_KEY[i % STUB_KEY.len()])
        .collect()
}

fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn unhex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

impl CryptoEngine for StubEngine {
    async fn import_key(&self, armored: &str) -> Result<Vec<Fingerprint>, CryptoError> {
        self.check_available()?;
        let Some(kind_line) = armored
            .lines()
            .map(str::trim)
            .find(|l| l.starts_with("-----BEGIN PGP") && l.ends_with("KEY BLOCK-----"))
        else {
            return Ok(Vec::new());
        };
        let secret = kind_line.contains("PRIVATE") || kind_line.contains("SECRET");
        let uid = armored
            .lines()
            .find_map(|l| l.trim().strip_prefix("Comment: "))
            .map_or_else(|| "Stub Key <stub@localhost>".to_string(), str::to_string);

        let fpr = Self::fingerprint_for(&uid);
        let mut keys = self.keys.lock();
        let entry = keys.entry(fpr.clone()).or_insert(StubKey {
            uid,
            secret: false,
            trust: None,
        });
        entry.secret |= secret;
        Ok(vec![fpr])
    }

    async fn primary_uid(&self, fpr: &Fingerprint) -> Result<String, CryptoError> {
        self.check_available()?;
        self.keys
            .lock()
            .get(fpr)
            .map(|k| k.uid.clone())
            .ok_or_else(|| CryptoError::UnknownKey(fpr.clone()))
    }

    async fn trust(&self, fpr: &Fingerprint, level: TrustLevel) -> Result<(), CryptoError> {
        self.check_available()?;
        let mut keys = self.keys.lock();
        let key = keys
            .get_mut(fpr)
            .ok_or_else(|| CryptoError::TrustFailed(format!("no key {fpr}")))?;
        key.trust = Some(level);
        Ok(())
    }

    async fn encrypt(&self, plaintext: &str, recipient: &Fingerprint) -> Result<String, CryptoError> {
        self.check_available()?;
        if !self.keys.lock().contains_key(recipient) {
            return Err(CryptoError::EncryptionFailed(format!(
                "invalid recipient {recipient}"
            )));
        }
        Ok(Self::seal(recipient, plaintext))
    }

    async fn decrypt(&self, envelope: &str, _passphrase: &str) -> Result<String, CryptoError> {
        self.check_available()?;
        let failed = |what: &str| CryptoError::DecryptionFailed(what.to_string());

        let start = envelope
            .find(MESSAGE_BEGIN)
            .ok_or_else(|| failed("no valid OpenPGP data found"))?;
        let block = &envelope[start + MESSAGE_BEGIN.len()..];
        let end = block.find(MESSAGE_END).ok_or_else(|| failed("unexpected end of armor"))?;
        let block = &block[..end];

        let recipient = block
            .lines()
            .find_map(|l| l.trim().strip_prefix(RECIPIENT_HEADER))
            .map(Fingerprint::new)
            .ok_or_else(|| failed("invalid packet"))?;
        let holds_secret = self
            .keys
            .lock()
            .get(&recipient)
            .is_some_and(|k| k.secret);
        if !holds_secret {
            return Err(failed("No secret key"));
        }

        let body: String = block
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.contains(':'))
            .collect();
        let bytes = unhex(&body).ok_or_else(|| failed("invalid packet"))?;
        String::from_utf8(xor_with_key(&bytes)).map_err(|_| failed("invalid packet"))
    }
}
