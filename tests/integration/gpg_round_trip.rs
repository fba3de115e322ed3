//! Round trips through a real `gpg` executable.
//!
//! Skipped (with a note on stderr) when no `gpg` is installed. Keys are
//! generated in a scratch home without a passphrase, exported armored, and
//! imported into [`GpgEngine`] instances the way the client loads its key
//! files.

use std::path::Path;
use std::process::Command;

use sealgram::config::{DEFAULT_PRIVATE_KEY_FILE, DEFAULT_PUBLIC_KEY_FILE, Paths};
use sealgram::crypto::gpg::{GpgEngine, find_gpg};
use sealgram::crypto::keys::{KeyInit, KeyManager, KeysDocument};
use sealgram::crypto::{CryptoEngine, CryptoFacade, DecryptOutcome, EncryptOutcome};
use zeroize::Zeroizing;

const ALICE: &str = "Alice Test <alice@example.org>";
const BOB: &str = "Bob Test <bob@example.org>";

struct Identity {
    public: String,
    secret: String,
}

fn gpg(binary: &Path, home: &Path, args: &[&str]) -> String {
    let output = Command::new(binary)
        .arg("--homedir")
        .arg(home)
        .args(["--batch", "--pinentry-mode", "loopback", "--passphrase", ""])
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "gpg {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn generate(binary: &Path, uid: &str) -> Identity {
    let home = tempfile::tempdir().unwrap();
    gpg(binary, home.path(), &["--quick-gen-key", uid, "default", "default", "never"]);
    let identity = Identity {
        public: gpg(binary, home.path(), &["--armor", "--export", uid]),
        secret: gpg(binary, home.path(), &["--armor", "--export-secret-keys", uid]),
    };
    let _ = Command::new("gpgconf")
        .arg("--homedir")
        .arg(home.path())
        .args(["--kill", "gpg-agent"])
        .status();
    identity
}

macro_rules! require_gpg {
    () => {
        match find_gpg() {
            Some(binary) => binary,
            None => {
                eprintln!("gpg not installed; skipping");
                return;
            }
        }
    };
}

#[tokio::test]
async fn alice_encrypts_bob_decrypts() {
    let binary = require_gpg!();
    let alice = generate(&binary, ALICE);
    let bob = generate(&binary, BOB);

    // Alice's client: her secret key, Bob's public key.
    let alice_engine = GpgEngine::with_binary(binary.clone()).unwrap();
    alice_engine.import_key(&alice.secret).await.unwrap();
    let bob_fpr = alice_engine.import_key(&bob.public).await.unwrap().remove(0);
    assert_eq!(alice_engine.primary_uid(&bob_fpr).await.unwrap(), BOB);
    let alice_client = CryptoFacade::new(alice_engine, bob_fpr, Zeroizing::new(String::new()));

    // Bob's client: his secret key, Alice's public key.
    let bob_engine = GpgEngine::with_binary(binary).unwrap();
    bob_engine.import_key(&bob.secret).await.unwrap();
    let alice_fpr = bob_engine.import_key(&alice.public).await.unwrap().remove(0);
    let bob_client = CryptoFacade::new(bob_engine, alice_fpr, Zeroizing::new(String::new()));

    let EncryptOutcome::Ciphertext(envelope) = alice_client.encrypt("hello, bob ✓").await else {
        panic!("encryption failed");
    };
    assert!(envelope.contains("-----BEGIN PGP MESSAGE-----"));
    assert_eq!(
        bob_client.decrypt(&envelope).await,
        DecryptOutcome::Success("hello, bob ✓".to_string())
    );

    // Alice holds no secret key for her own outgoing envelope.
    assert!(matches!(
        alice_client.decrypt(&envelope).await,
        DecryptOutcome::CryptoFailure(_)
    ));
}

#[tokio::test]
async fn garbage_envelope_is_a_crypto_failure() {
    let binary = require_gpg!();
    let engine = GpgEngine::with_binary(binary).unwrap();
    let facade = CryptoFacade::new(
        engine,
        sealgram::crypto::Fingerprint::new("0000000000000000000000000000000000000000"),
        Zeroizing::new(String::new()),
    );
    let outcome = facade
        .decrypt("-----BEGIN PGP MESSAGE-----\n\nnot base64 at all\n-----END PGP MESSAGE-----\n")
        .await;
    assert!(matches!(outcome, DecryptOutcome::CryptoFailure(_)));

    // Encrypting to a key the engine never saw is refused, not sent.
    assert!(matches!(
        facade.encrypt("x").await,
        EncryptOutcome::CryptoFailure(_)
    ));
}

#[tokio::test]
async fn key_manager_loads_real_key_files() {
    let binary = require_gpg!();
    let alice = generate(&binary, ALICE);
    let bob = generate(&binary, BOB);

    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::new(dir.path());
    std::fs::write(dir.path().join(DEFAULT_PRIVATE_KEY_FILE), &alice.secret).unwrap();
    std::fs::write(dir.path().join(DEFAULT_PUBLIC_KEY_FILE), &bob.public).unwrap();
    KeysDocument::default().save(&paths.keys_document()).unwrap();

    let engine = GpgEngine::with_binary(binary).unwrap();
    let init = KeyManager::new(&engine, &paths)
        .initialize(|_| {})
        .await
        .unwrap();
    let KeyInit::Ready(ring) = init else {
        panic!("expected loaded keys");
    };
    assert_eq!(ring.identity.label, ALICE);
    assert_eq!(ring.correspondent.label, BOB);
}
