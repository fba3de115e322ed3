//! `sealgram`: terminal chat client with OpenPGP end-to-end encryption.
//!
//! Startup loads the Telegram API credentials and the key configuration
//! from the base directory (prompting on first run), signs in to Telegram,
//! then runs an interactive console until `/exit`, Ctrl-C or `/panic`.
//!
//! ```bash
//! # Default base directory (~/.config/sealgram)
//! cargo run --bin sealgram
//!
//! # Explicit locations
//! cargo run --bin sealgram -- --base-dir ./chat \
//!     --session work.session --gpg /usr/bin/gpg
//! ```

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use tracing_appender::non_blocking::WorkerGuard;

use sealgram::chat::{Chat, ChatFiles, Flow};
use sealgram::config::{CliArgs, ClientConfig};
use sealgram::credentials::CredentialStore;
use sealgram::crypto::gpg::GpgEngine;
use sealgram::crypto::keys::{KeyInit, KeyManager, KeysDocument};
use sealgram::crypto::CryptoFacade;
use sealgram::transport::Messenger;
use sealgram::transport::telegram::TelegramMessenger;
use sealgram::ui::console::{Console, EditorEvent, RawModeGuard};
use sealgram::ui::login::TerminalLogin;
use sealgram::ui::{OutputLine, Tone, ask_required, theme};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(base = %config.paths.base().display(), "sealgram starting");

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(err = %e, "terminal failure");
            eprintln!("❌ Terminal error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// The console owns stdout, so logs go to a file. The returned
/// [`WorkerGuard`] flushes buffered entries when dropped.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("sealgram.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Startup sequence followed by the interactive loop.
///
/// Startup failures are reported on stdout and turned into an exit code;
/// only terminal I/O errors escape as `Err`.
#[allow(clippy::too_many_lines)]
async fn run(config: ClientConfig) -> io::Result<ExitCode> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut stdout = io::stdout();

    if let Err(e) = std::fs::create_dir_all(config.paths.base()) {
        report(
            Tone::Error,
            format_args!("❌ Cannot create {}: {e}", config.paths.base().display()),
        );
        return Ok(ExitCode::FAILURE);
    }

    let store = CredentialStore::new(config.paths.credentials());
    let credentials = match store.load_or_create(&mut input, &mut stdout) {
        Ok(c) => c,
        Err(e) => {
            report(
                Tone::Error,
                format_args!("❌ Error reading {}: {e}", store.path().display()),
            );
            report(Tone::Error, "Please check the file or delete it to reset.");
            return Ok(ExitCode::FAILURE);
        }
    };

    let engine = match GpgEngine::locate(config.gpg_binary.as_deref()) {
        Ok(engine) => engine,
        Err(e) => {
            report(Tone::Error, format_args!("❌ {e}"));
            return Ok(ExitCode::FAILURE);
        }
    };

    let manager = KeyManager::new(&engine, &config.paths);
    let ring = match manager
        .initialize(|event| print_line(&OutputLine::from(&event)))
        .await
    {
        Ok(KeyInit::Ready(ring)) => ring,
        Ok(KeyInit::Bootstrapped { .. }) => {
            report(
                Tone::Error,
                "❌ Configuration created. Please fill 'my_private.asc', \
                 'friend_public.asc', and check 'keys.json'. Then run the script again.",
            );
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => {
            report(Tone::Error, format_args!("❌ {e}"));
            return Ok(ExitCode::FAILURE);
        }
    };

    let session_path = config.session_path();
    report(Tone::System, "🔌 Connecting to Telegram...");
    let mut login = TerminalLogin::new(&mut input, &mut stdout, io::stdin().is_terminal());
    let messenger = match TelegramMessenger::connect(
        &config.network,
        &session_path,
        &credentials,
        &mut login,
    )
    .await
    {
        Ok(m) => Arc::new(m),
        Err(e) => {
            report(Tone::Error, format_args!("❌ Could not connect to Telegram: {e}"));
            return Ok(ExitCode::FAILURE);
        }
    };
    report(Tone::System, format_args!("✅ Logged in as {}", messenger.account()));

    let keys_document = config.paths.keys_document();
    let handle = match ring.default_handle.clone() {
        Some(h) => h,
        None => {
            report(Tone::System, "⚠️ No 'target_username' found in keys.json.");
            let handle = ask_required(
                &mut input,
                &mut stdout,
                "Please enter the recipient username (e.g. @friend): ",
                "Username cannot be empty.",
            )?;
            match KeysDocument::set_target(&keys_document, &handle) {
                Ok(()) => report(Tone::System, format_args!("💾 Saved '{handle}' to keys.json.")),
                Err(e) => report(
                    Tone::Error,
                    format_args!("⚠️ Failed to save recipient to JSON: {e}"),
                ),
            }
            handle
        }
    };
    drop(input);

    let files = ChatFiles::new(&config.paths, &ring);
    let facade = CryptoFacade::new(
        engine,
        ring.correspondent.fingerprint.clone(),
        ring.passphrase,
    );
    let mut chat = Chat::new(facade, Arc::clone(&messenger), files, config.chat.clone());
    chat.open(&handle).await;
    chat.greet();

    let _raw = RawModeGuard::enable()?;
    let mut console = Console::new(stdout);
    console.print(&chat.take_output(), &chat.prompt())?;

    let mut keys = EventStream::new();
    let mut online = true;
    loop {
        tokio::select! {
            maybe_event = keys.next() => {
                let Some(event) = maybe_event else { break };
                let Event::Key(key) = event? else { continue };
                match console.handle_key(key, &chat.prompt())? {
                    EditorEvent::Submit(line) => match chat.handle_line(&line).await {
                        Flow::Continue => {}
                        Flow::Exit => break,
                        Flow::Wiped => {
                            console.clear_screen()?;
                            tracing::warn!("exiting after panic wipe");
                            return Ok(ExitCode::SUCCESS);
                        }
                    },
                    EditorEvent::Interrupt => break,
                    EditorEvent::Changed | EditorEvent::Ignored => continue,
                }
            }
            inbound = messenger.recv(), if online => match inbound {
                Ok(message) => chat.handle_inbound(message).await,
                Err(e) => {
                    online = false;
                    chat.transport_lost(&e);
                }
            },
        }
        console.print(&chat.take_output(), &chat.prompt())?;
    }

    console.print(&[OutputLine::new(Tone::System, "👋 Bye.")], &OutputLine::new(Tone::Plain, ""))?;
    tracing::info!("sealgram exiting");
    Ok(ExitCode::SUCCESS)
}

/// Print one styled line in cooked mode, before the console takes over.
fn report(tone: Tone, text: impl Display) {
    println!("{}", theme::line(tone).apply(text));
}

fn print_line(line: &OutputLine) {
    report(line.tone, &line.text);
}
