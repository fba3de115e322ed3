//! Integration tests for the interactive chat over the loopback network.
//!
//! Each test wires a [`Chat`] to a [`LoopbackMessenger`] and a
//! [`StubEngine`], then drives it with submitted lines and inbound events
//! the way the event loop does.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sealgram::chat::{Chat, ChatFiles, Flow, PendingPrompt};
use sealgram::config::{
    CREDENTIALS_FILE, ChatSettings, DEFAULT_PRIVATE_KEY_FILE, DEFAULT_PUBLIC_KEY_FILE, KEYS_FILE,
    Paths,
};
use sealgram::crypto::keys::{KeyInit, KeyManager, KeysDocument};
use sealgram::crypto::stub::StubEngine;
use sealgram::crypto::{CryptoFacade, Fingerprint};
use sealgram::transport::loopback::{LoopbackExchange, LoopbackMessenger};
use sealgram::transport::{Attachment, ChatId, ChatMessage, Entity, Messenger};
use sealgram::ui::{OutputLine, Tone};
use tempfile::TempDir;

const ME: &str = "Me <me@example.org>";
const ALICE: &str = "Alice <alice@example.org>";

struct Fixture {
    exchange: LoopbackExchange,
    me: Arc<LoopbackMessenger>,
    alice: LoopbackMessenger,
    chat: Chat<StubEngine, LoopbackMessenger>,
    dir: TempDir,
}

impl Fixture {
    /// Lay out a base directory the way a filled-in first run leaves it and
    /// load the key ring from it.
    async fn new() -> Self {
        let exchange = LoopbackExchange::new();
        let me = Arc::new(exchange.join(Entity::new(1, Some("me"), "Me"), 64));
        let alice = exchange.join(Entity::new(2, Some("alice"), "Alice"), 64);
        exchange.add_contact(Entity::new(3, Some("bob"), "Bob"));

        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        std::fs::write(
            dir.path().join(DEFAULT_PRIVATE_KEY_FILE),
            StubEngine::key_block(ME, true),
        )
        .unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_PUBLIC_KEY_FILE),
            StubEngine::key_block(ALICE, false),
        )
        .unwrap();
        std::fs::write(paths.credentials(), "{\"api_id\": 1, \"api_hash\": \"h\"}").unwrap();
        KeysDocument {
            my_private_key_passphrase: Some("pw".to_string()),
            ..KeysDocument::default()
        }
        .save(&paths.keys_document())
        .unwrap();

        let engine = StubEngine::new();
        let init = KeyManager::new(&engine, &paths)
            .initialize(|_| {})
            .await
            .unwrap();
        let KeyInit::Ready(ring) = init else {
            panic!("expected loaded keys");
        };
        let files = ChatFiles::new(&paths, &ring);
        let facade = CryptoFacade::new(engine, ring.correspondent.fingerprint.clone(), ring.passphrase);

        let chat = Chat::new(facade, Arc::clone(&me), files, ChatSettings::default());
        Self {
            exchange,
            me,
            alice,
            chat,
            dir,
        }
    }

    async fn opened() -> Self {
        let mut fx = Self::new().await;
        fx.chat.open("@alice").await;
        fx.chat.take_output();
        fx
    }

    async fn line(&mut self, text: &str) -> (Flow, Vec<OutputLine>) {
        let flow = self.chat.handle_line(text).await;
        (flow, self.chat.take_output())
    }

    /// Feed our own pending inbound events (send echoes) to the chat.
    async fn pump_own_inbox(&mut self) -> Vec<OutputLine> {
        while let Ok(Ok(message)) =
            tokio::time::timeout(std::time::Duration::from_millis(20), self.me.recv()).await
        {
            self.chat.handle_inbound(message).await;
        }
        self.chat.take_output()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn alice_key() -> Fingerprint {
    StubEngine::fingerprint_for(ALICE)
}

fn me_key() -> Fingerprint {
    StubEngine::fingerprint_for(ME)
}

fn texts(lines: &[OutputLine]) -> Vec<&str> {
    lines.iter().map(|l| l.text.as_str()).collect()
}

// --- Opening ---

#[tokio::test]
async fn open_announces_the_correspondent() {
    let mut fx = Fixture::new().await;
    fx.chat.open("@alice").await;
    fx.chat.greet();
    let out = fx.chat.take_output();
    assert_eq!(
        out[0],
        OutputLine::new(Tone::System, "--- Chatting with Alice ---")
    );
    assert_eq!(
        out[1].text,
        "Use /help to see the list of commands and /exit to quit."
    );
}

#[tokio::test]
async fn open_failure_keeps_running_without_correspondent() {
    let mut fx = Fixture::new().await;
    fx.chat.open("@ghost").await;
    let out = fx.chat.take_output();
    assert_eq!(out[0].tone, Tone::Error);
    assert!(out[0].text.starts_with("❌ Connection error: Could not find user '@ghost'"));
    assert!(fx.chat.session().correspondent().is_none());

    let (flow, out) = fx.line("hello?").await;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(
        texts(&out),
        ["❌ No recipient selected! Use /r to set one."]
    );
}

// --- Sending ---

#[tokio::test]
async fn encrypted_send_reaches_peer_as_envelope() {
    let mut fx = Fixture::opened().await;
    let (_, out) = fx.line("hi alice").await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].tone, Tone::Sent);
    assert!(out[0].text.ends_with("] [You] encrypted: hi alice"));

    let delivered = fx.alice.recv().await.unwrap();
    assert!(delivered.text.contains("BEGIN PGP MESSAGE"));
    assert!(!delivered.text.contains("hi alice"));
    assert_eq!(delivered.chat_id, ChatId::new(1));

    // Our own echo cannot be decrypted without Alice's secret key and is
    // suppressed.
    assert!(fx.pump_own_inbox().await.is_empty());
}

#[tokio::test]
async fn plaintext_mode_sends_verbatim_and_prompt_follows_toggle() {
    let mut fx = Fixture::opened().await;
    assert_eq!(fx.chat.prompt().text, "You 🔒: ");

    let (_, out) = fx.line("/eof").await;
    assert_eq!(texts(&out), ["🔓 Encryption DISABLED. Sending plain text."]);
    assert_eq!(fx.chat.prompt().text, "You 🔓: ");

    let (_, out) = fx.line("  plain words  ").await;
    assert_eq!(out[0].tone, Tone::Plain);
    assert!(out[0].text.ends_with("] [You]: plain words"));
    assert_eq!(fx.alice.recv().await.unwrap().text, "plain words");

    let echo = fx.pump_own_inbox().await;
    assert_eq!(echo.len(), 1);
    assert!(echo[0].text.ends_with("] [You]: plain words"));

    let (_, out) = fx.line("/encrypt on").await;
    assert_eq!(texts(&out), ["🔒 Encryption ENABLED."]);
    assert_eq!(fx.chat.prompt().text, "You 🔒: ");
    assert_eq!(
        fx.chat.session().correspondent().unwrap().name(),
        "Alice"
    );
}

#[tokio::test]
async fn encryption_failure_sends_nothing() {
    let mut fx = Fixture::opened().await;
    fx.chat.facade().engine().set_available(false);

    let (flow, out) = fx.line("secret").await;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].tone, Tone::Error);
    assert!(out[0].text.contains("[Encryption Error: crypto engine unavailable]"));
    assert!(fx.exchange.log(ChatId::new(2)).is_empty());
}

#[tokio::test]
async fn send_failure_is_reported() {
    let mut fx = Fixture::opened().await;
    fx.exchange.set_offline(true);
    let (_, out) = fx.line("/eof").await;
    assert_eq!(out.len(), 1);
    let (flow, out) = fx.line("anyone?").await;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(texts(&out), ["❌ Failed to send message: connection closed"]);
}

#[tokio::test]
async fn sent_echo_strips_terminal_escapes() {
    let mut fx = Fixture::opened().await;
    let (_, out) = fx.line("hi \u{1b}[2J\u{1b}]0;title\u{7}there").await;
    assert!(out[0].text.ends_with("] [You] encrypted: hi there"));

    fx.line("/eof").await;
    let (_, out) = fx.line("\u{1b}[31mred").await;
    assert!(out[0].text.ends_with("] [You]: red"));
    // The network still carries exactly what was typed.
    let _envelope = fx.alice.recv().await.unwrap();
    assert_eq!(fx.alice.recv().await.unwrap().text, "\u{1b}[31mred");
}

#[tokio::test]
async fn sends_complete_while_nobody_drains_the_inboxes() {
    let mut fx = Fixture::opened().await;
    fx.line("/eof").await;
    let sends = async {
        for i in 0..100 {
            let (_, out) = fx.line(&format!("m{i}")).await;
            assert_eq!(out[0].tone, Tone::Plain);
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(5), sends)
        .await
        .unwrap();
    assert_eq!(fx.exchange.log(ChatId::new(2)).len(), 100);
}

// --- Inbound ---

#[tokio::test]
async fn inbound_envelope_is_decrypted() {
    let mut fx = Fixture::opened().await;
    let envelope = StubEngine::seal(&me_key(), "meet at noon");
    fx.chat
        .handle_inbound(ChatMessage::text(ChatId::new(2), envelope, false))
        .await;
    let out = fx.chat.take_output();
    assert_eq!(out[0].tone, Tone::User);
    assert!(out[0].text.ends_with("] [Alice] decrypted: meet at noon"));
}

#[tokio::test]
async fn inbound_envelope_for_someone_else_shows_error() {
    let mut fx = Fixture::opened().await;
    let envelope = StubEngine::seal(&alice_key(), "not for me");
    fx.chat
        .handle_inbound(ChatMessage::text(ChatId::new(2), envelope, false))
        .await;
    let out = fx.chat.take_output();
    assert_eq!(out[0].tone, Tone::Error);
    assert!(out[0].text.contains("[Alice] 🔒 Error: DECRYPTION_FAILED: "));
}

#[tokio::test]
async fn events_for_other_chats_are_silent() {
    let mut fx = Fixture::opened().await;
    fx.chat
        .handle_inbound(ChatMessage::text(ChatId::new(3), "from bob", false))
        .await;
    assert!(fx.chat.take_output().is_empty());
}

#[tokio::test]
async fn inbound_file_and_call() {
    let mut fx = Fixture::opened().await;
    let mut file = ChatMessage::text(ChatId::new(2), "caption", false);
    file.attachment = Some(Attachment {
        name: Some("notes.pdf".to_string()),
    });
    fx.chat.handle_inbound(file).await;

    let mut call = ChatMessage::text(ChatId::new(2), "", false);
    call.action = Some("MessageActionPhoneCall".to_string());
    fx.chat.handle_inbound(call).await;

    let out = fx.chat.take_output();
    assert!(out[0].text.ends_with("] [Alice]: [notes.pdf]"));
    assert!(out[1].text.ends_with("] [Alice]: [Call]"));
}

#[tokio::test]
async fn peer_messages_arrive_through_the_network() {
    let mut fx = Fixture::opened().await;
    let to_me = fx.alice.resolve("me").await.unwrap();
    fx.alice
        .send_text(&to_me, &StubEngine::seal(&me_key(), "ping"))
        .await
        .unwrap();
    let out = fx.pump_own_inbox().await;
    assert_eq!(out.len(), 1);
    assert!(out[0].text.ends_with("[Alice] decrypted: ping"));
}

// --- History ---

fn seed(fx: &Fixture, count: usize) {
    for i in 0..count {
        let mut message = ChatMessage::text(ChatId::new(2), format!("m{i}"), i % 2 == 0);
        message.date = Utc.timestamp_opt(1_700_000_000 + i64::try_from(i).unwrap(), 0).unwrap();
        fx.exchange.seed_history(ChatId::new(1), message);
    }
}

#[tokio::test]
async fn history_default_is_twenty_oldest_first() {
    let mut fx = Fixture::opened().await;
    seed(&fx, 30);
    let (_, out) = fx.line("/history").await;

    assert_eq!(out[0].text, "⏳ Fetching last 20 messages...");
    assert_eq!(out[1].text, "--- History (20) ---");
    assert_eq!(out.last().unwrap().text, "--- End of History ---");
    let entries = &out[2..out.len() - 1];
    assert_eq!(entries.len(), 20);
    assert!(entries[0].text.ends_with(": m10"));
    assert!(entries[19].text.ends_with(": m29"));
    // m10 was outgoing, m11 incoming.
    assert_eq!(entries[0].tone, Tone::Sent);
    assert!(entries[0].text.contains("[You]"));
    assert_eq!(entries[1].tone, Tone::User);
    assert!(entries[1].text.contains("[Alice]"));
}

#[tokio::test]
async fn history_is_capped_at_fifty() {
    let mut fx = Fixture::opened().await;
    seed(&fx, 80);
    let (_, out) = fx.line("/history 500").await;
    assert_eq!(out[1].text, "--- History (50) ---");
    assert_eq!(out.len(), 50 + 3);
}

#[tokio::test]
async fn history_renders_envelopes_and_failures() {
    let mut fx = Fixture::opened().await;
    fx.exchange.seed_history(
        ChatId::new(1),
        ChatMessage::text(ChatId::new(2), StubEngine::seal(&me_key(), "hidden"), false),
    );
    fx.exchange.seed_history(
        ChatId::new(1),
        ChatMessage::text(ChatId::new(2), StubEngine::seal(&alice_key(), "mine"), true),
    );
    let (_, out) = fx.line("/history 2").await;
    let entries = &out[2..4];
    assert!(entries[0].text.ends_with("[Alice]: hidden"));
    assert_eq!(entries[1].tone, Tone::Error);
    assert!(entries[1].text.ends_with("[You]: 🔒 [PGP Error]"));
}

#[tokio::test]
async fn history_without_chat_or_network() {
    let mut fx = Fixture::new().await;
    let (_, out) = fx.line("/history 5").await;
    assert_eq!(texts(&out), ["❌ No active chat."]);

    let mut fx = Fixture::opened().await;
    fx.exchange.set_offline(true);
    let (flow, out) = fx.line("/history 5").await;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(
        texts(&out),
        [
            "⏳ Fetching last 5 messages...",
            "❌ Error fetching history: connection closed"
        ]
    );
}

// --- Recipient switching ---

#[tokio::test]
async fn switch_updates_session_and_document() {
    let mut fx = Fixture::opened().await;
    let (_, out) = fx.line("/r @bob").await;
    assert_eq!(
        texts(&out),
        [
            "🔍 Searching for @bob...",
            "✅ Switched chat to: Bob",
            format!("💾 Updated 'target_username' in {}", fx.path("keys.json").display()).as_str(),
        ]
    );
    assert_eq!(fx.chat.session().correspondent().unwrap().name(), "Bob");
    assert_eq!(
        KeysDocument::load(&fx.path("keys.json")).unwrap().default_handle(),
        Some("@bob")
    );
}

#[tokio::test]
async fn failed_switch_keeps_previous_correspondent() {
    let mut fx = Fixture::opened().await;
    let (_, out) = fx.line("/recipient nobody").await;
    assert_eq!(out[1], OutputLine::new(Tone::Error, "❌ Could not find user: nobody"));
    assert_eq!(fx.chat.session().correspondent().unwrap().name(), "Alice");
    assert_eq!(
        KeysDocument::load(&fx.path("keys.json")).unwrap().default_handle(),
        None
    );
}

#[tokio::test]
async fn bare_recipient_command_prompts_for_a_name() {
    let mut fx = Fixture::opened().await;
    let (_, out) = fx.line("/r").await;
    assert!(out.is_empty());
    assert_eq!(fx.chat.pending(), Some(PendingPrompt::Recipient));
    assert_eq!(
        fx.chat.prompt(),
        OutputLine::new(Tone::System, "Enter new username (e.g. @friendlyuser): ")
    );

    let (_, out) = fx.line("bob").await;
    assert_eq!(out[1].text, "✅ Switched chat to: Bob");
    assert_eq!(fx.chat.pending(), None);

    // An empty answer abandons the switch.
    fx.line("/r").await;
    let (_, out) = fx.line("").await;
    assert!(out.is_empty());
    assert_eq!(fx.chat.session().correspondent().unwrap().name(), "Bob");
}

// --- Help, exit, panic ---

#[tokio::test]
async fn help_and_exit() {
    let mut fx = Fixture::opened().await;
    let (flow, out) = fx.line("/h").await;
    assert_eq!(flow, Flow::Continue);
    assert!(out.iter().all(|l| l.tone == Tone::System));
    assert!(texts(&out).iter().any(|t| t.starts_with("/panic")));

    assert_eq!(fx.line("/exit").await.0, Flow::Exit);
    assert_eq!(fx.line("--exit").await.0, Flow::Exit);
}

#[tokio::test]
async fn declined_panic_changes_nothing() {
    let mut fx = Fixture::opened().await;
    let before = std::fs::read_to_string(fx.path(CREDENTIALS_FILE)).unwrap();

    let (flow, _) = fx.line("/panic").await;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(fx.chat.prompt().tone, Tone::Error);
    assert_eq!(fx.chat.prompt().text, "⚠️  CONFIRM PANIC WIPE? (y/n): ");

    let (flow, _) = fx.line("n").await;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(std::fs::read_to_string(fx.path(CREDENTIALS_FILE)).unwrap(), before);
    assert_eq!(fx.chat.pending(), None);
}

const WIPED_FILES: [&str; 4] = [
    KEYS_FILE,
    CREDENTIALS_FILE,
    DEFAULT_PRIVATE_KEY_FILE,
    DEFAULT_PUBLIC_KEY_FILE,
];

#[tokio::test]
async fn confirmed_panic_truncates_files() {
    let mut fx = Fixture::opened().await;
    for name in WIPED_FILES {
        assert!(std::fs::metadata(fx.path(name)).unwrap().len() > 0, "{name}");
    }

    fx.line("/panic").await;
    let (flow, _) = fx.line("Y").await;
    assert_eq!(flow, Flow::Wiped);
    for name in WIPED_FILES {
        assert_eq!(std::fs::metadata(fx.path(name)).unwrap().len(), 0, "{name}");
    }
}

#[tokio::test]
async fn failed_panic_reports_and_continues() {
    let mut fx = Fixture::opened().await;
    std::fs::remove_dir_all(fx.dir.path()).unwrap();

    fx.line("/panic").await;
    let (flow, out) = fx.line("y").await;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(out[0].tone, Tone::Error);
    assert!(out[0].text.starts_with("❌ Panic failed: "));
}
