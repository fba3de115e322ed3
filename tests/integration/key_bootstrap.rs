//! First-run bootstrap and key loading, end to end through the filesystem.

use sealgram::config::{DEFAULT_PRIVATE_KEY_FILE, DEFAULT_PUBLIC_KEY_FILE, KEYS_FILE, Paths};
use sealgram::crypto::keys::{KeyError, KeyEvent, KeyInit, KeyManager, KeyRole, KeysDocument};
use sealgram::crypto::stub::StubEngine;
use sealgram::crypto::{CryptoFacade, DecryptOutcome, EncryptOutcome, TrustLevel};

const ME: &str = "Me <me@example.org>";
const FRIEND: &str = "Friend <friend@example.org>";

async fn initialize(engine: &StubEngine, paths: &Paths) -> (Result<KeyInit, KeyError>, Vec<KeyEvent>) {
    let mut events = Vec::new();
    let result = KeyManager::new(engine, paths)
        .initialize(|event| events.push(event))
        .await;
    (result, events)
}

#[tokio::test]
async fn first_run_then_filled_in_run() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::new(dir.path());
    let engine = StubEngine::new();

    // First run writes defaults and stops.
    let (result, events) = initialize(&engine, &paths).await;
    let KeyInit::Bootstrapped { created } = result.unwrap() else {
        panic!("expected bootstrap");
    };
    assert_eq!(
        created,
        vec![
            dir.path().join(KEYS_FILE),
            dir.path().join(DEFAULT_PRIVATE_KEY_FILE),
            dir.path().join(DEFAULT_PUBLIC_KEY_FILE),
        ]
    );
    assert!(matches!(events[0], KeyEvent::CreatingDefaults(_)));
    assert_eq!(
        std::fs::metadata(dir.path().join(DEFAULT_PRIVATE_KEY_FILE))
            .unwrap()
            .len(),
        0
    );

    // A second run without filling the placeholders fails on the empty key.
    let (result, _) = initialize(&engine, &paths).await;
    assert!(matches!(
        result,
        Err(KeyError::EmptyKeyFile {
            role: KeyRole::Private,
            ..
        })
    ));

    // The operator fills both files and names the correspondent.
    std::fs::write(
        dir.path().join(DEFAULT_PRIVATE_KEY_FILE),
        StubEngine::key_block(ME, true),
    )
    .unwrap();
    std::fs::write(
        dir.path().join(DEFAULT_PUBLIC_KEY_FILE),
        StubEngine::key_block(FRIEND, false),
    )
    .unwrap();
    KeysDocument::set_target(&paths.keys_document(), "@friend").unwrap();

    let (result, events) = initialize(&engine, &paths).await;
    let KeyInit::Ready(ring) = result.unwrap() else {
        panic!("expected loaded keys");
    };
    assert_eq!(ring.identity.label, ME);
    assert_eq!(ring.correspondent.label, FRIEND);
    assert_eq!(ring.default_handle.as_deref(), Some("@friend"));
    assert_eq!(
        engine.trust_of(&ring.correspondent.fingerprint),
        Some(TrustLevel::Ultimate)
    );
    assert_eq!(events.first(), Some(&KeyEvent::ReadingConfiguration));
    assert_eq!(events.last(), Some(&KeyEvent::Ready));
    assert!(events.contains(&KeyEvent::Loaded(KeyRole::Public, FRIEND.to_string())));

    // The loaded ring drives a working facade: what the friend seals to us
    // decrypts, and we can encrypt to the friend.
    let facade = CryptoFacade::new(engine, ring.correspondent.fingerprint.clone(), ring.passphrase);
    let incoming = StubEngine::seal(&ring.identity.fingerprint, "hello from friend");
    assert_eq!(
        facade.decrypt(&incoming).await,
        DecryptOutcome::Success("hello from friend".to_string())
    );
    assert!(matches!(
        facade.encrypt("reply").await,
        EncryptOutcome::Ciphertext(armored) if armored.contains("BEGIN PGP MESSAGE")
    ));
}

#[tokio::test]
async fn relative_and_absolute_key_paths_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let keys_dir = tempfile::tempdir().unwrap();
    let paths = Paths::new(dir.path());

    let private = keys_dir.path().join("identity.asc");
    std::fs::write(&private, StubEngine::key_block(ME, true)).unwrap();
    std::fs::create_dir(dir.path().join("keys")).unwrap();
    std::fs::write(
        dir.path().join("keys").join("friend.asc"),
        StubEngine::key_block(FRIEND, false),
    )
    .unwrap();

    let document = KeysDocument {
        my_private_key: private.display().to_string(),
        friends_public_key: "keys/friend.asc".to_string(),
        my_private_key_passphrase: Some("secret".to_string()),
        ..KeysDocument::default()
    };
    document.save(&paths.keys_document()).unwrap();

    let engine = StubEngine::new();
    let (result, _) = initialize(&engine, &paths).await;
    let KeyInit::Ready(ring) = result.unwrap() else {
        panic!("expected loaded keys");
    };
    assert_eq!(ring.private_key_path, private);
    assert_eq!(ring.public_key_path, dir.path().join("keys").join("friend.asc"));
    assert_eq!(ring.passphrase.as_str(), "secret");
    assert_eq!(ring.default_handle, None);
}

#[tokio::test]
async fn unavailable_engine_surfaces_as_engine_error() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::new(dir.path());
    std::fs::write(
        dir.path().join(DEFAULT_PRIVATE_KEY_FILE),
        StubEngine::key_block(ME, true),
    )
    .unwrap();
    KeysDocument::default().save(&paths.keys_document()).unwrap();

    let engine = StubEngine::new();
    engine.set_available(false);
    let (result, _) = initialize(&engine, &paths).await;
    assert!(matches!(result, Err(KeyError::Engine(_))));
}
