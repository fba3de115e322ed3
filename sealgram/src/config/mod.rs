//! Configuration system for the `Sealgram` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`<base dir>/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.
//!
//! The base directory also holds the operator's documents: the credentials
//! file, the key configuration file, the Telegram session and (by default)
//! the two key files. [`Paths`] is the single place that knows their names.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the credentials document.
pub const CREDENTIALS_FILE: &str = "api_config.json";

/// File name of the key configuration document.
pub const KEYS_FILE: &str = "keys.json";

/// Default file name of the local private key.
pub const DEFAULT_PRIVATE_KEY_FILE: &str = "my_private.asc";

/// Default file name of the correspondent's public key.
pub const DEFAULT_PUBLIC_KEY_FILE: &str = "friend_public.asc";

/// File name of the optional TOML settings file.
pub const SETTINGS_FILE: &str = "config.toml";

/// Default file name of the Telegram session.
pub const DEFAULT_SESSION_FILE: &str = "sealgram.session";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// Could not determine the user's config directory.
    #[error("could not determine config directory (no HOME or XDG_CONFIG_HOME); use --base-dir")]
    NoConfigDir,

    /// A setting has a value the client cannot run with.
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting {
        /// Dotted name of the setting, e.g. `network.update_queue_limit`.
        key: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Base directory layout
// ---------------------------------------------------------------------------

/// Locations of the files the client reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    /// Use `base` as the base directory.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The base directory.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of the credentials document.
    #[must_use]
    pub fn credentials(&self) -> PathBuf {
        self.base.join(CREDENTIALS_FILE)
    }

    /// Path of the key configuration document.
    #[must_use]
    pub fn keys_document(&self) -> PathBuf {
        self.base.join(KEYS_FILE)
    }

    /// Path of the TOML settings file.
    #[must_use]
    pub fn settings(&self) -> PathBuf {
        self.base.join(SETTINGS_FILE)
    }

    /// Resolve a path from a document: absolute paths are kept, relative
    /// ones are joined onto the base directory.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base.join(candidate)
        }
    }
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    crypto: CryptoFileConfig,
    chat: ChatFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    session_file: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    update_queue_limit: Option<usize>,
}

/// `[crypto]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CryptoFileConfig {
    gpg_binary: Option<PathBuf>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    history_default: Option<usize>,
    history_max: Option<usize>,
    timestamp_format: Option<String>,
    encrypt_by_default: Option<bool>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Telegram client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Session file, relative to the base directory unless absolute.
    pub session_file: String,
    /// Timeout for opening the connection.
    pub connect_timeout: Duration,
    /// Timeout for each request (resolve, send, history).
    pub request_timeout: Duration,
    /// Updates buffered while the chat is busy; older ones are dropped
    /// beyond this.
    pub update_queue_limit: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            session_file: DEFAULT_SESSION_FILE.to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            update_queue_limit: 100,
        }
    }
}

/// Settings used by the command interpreter and the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    /// Messages fetched by `/history` without a count.
    pub history_default: usize,
    /// Upper bound for `/history n`.
    pub history_max: usize,
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
    /// Whether encryption is on when the session starts.
    pub encrypt_by_default: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_default: 20,
            history_max: 50,
            timestamp_format: "%H:%M".to_string(),
            encrypt_by_default: true,
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base directory holding the documents and key files.
    pub paths: Paths,
    /// Telegram client settings.
    pub network: NetworkSettings,
    /// Explicit `gpg` executable; `None` means search for one.
    pub gpg_binary: Option<PathBuf>,
    /// Interpreter settings.
    pub chat: ChatSettings,
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, `<base dir>/config.toml` is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the base directory cannot be determined,
    /// the explicit config file cannot be read or parsed, or a resolved
    /// setting is out of range.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let paths = match &cli.base_dir {
            Some(dir) => Paths::new(dir),
            None => Paths::new(default_base_dir()?),
        };
        let file = load_config_file(cli.config.as_deref(), &paths.settings())?;
        let config = Self::resolve(cli, &file, paths);
        config.validate()?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` so it can be
    /// unit tested without CLI parsing or the filesystem.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile, paths: Paths) -> Self {
        let network_defaults = NetworkSettings::default();
        let chat_defaults = ChatSettings::default();

        Self {
            paths,
            network: NetworkSettings {
                session_file: cli
                    .session
                    .clone()
                    .or_else(|| file.network.session_file.clone())
                    .unwrap_or(network_defaults.session_file),
                connect_timeout: file
                    .network
                    .connect_timeout_secs
                    .map_or(network_defaults.connect_timeout, Duration::from_secs),
                request_timeout: file
                    .network
                    .request_timeout_secs
                    .map_or(network_defaults.request_timeout, Duration::from_secs),
                update_queue_limit: file
                    .network
                    .update_queue_limit
                    .unwrap_or(network_defaults.update_queue_limit),
            },
            gpg_binary: cli
                .gpg
                .clone()
                .or_else(|| file.crypto.gpg_binary.clone()),
            chat: ChatSettings {
                history_default: file
                    .chat
                    .history_default
                    .unwrap_or(chat_defaults.history_default),
                history_max: file.chat.history_max.unwrap_or(chat_defaults.history_max),
                timestamp_format: file
                    .chat
                    .timestamp_format
                    .clone()
                    .unwrap_or(chat_defaults.timestamp_format),
                encrypt_by_default: file
                    .chat
                    .encrypt_by_default
                    .unwrap_or(chat_defaults.encrypt_by_default),
            },
        }
    }

    /// Reject values that would stall or break the client at runtime.
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, reason: &'static str| {
            Err(ConfigError::InvalidSetting { key, reason })
        };
        if self.network.session_file.trim().is_empty() {
            return invalid("network.session_file", "must not be empty");
        }
        if self.network.connect_timeout.is_zero() {
            return invalid("network.connect_timeout_secs", "must be greater than 0");
        }
        if self.network.request_timeout.is_zero() {
            return invalid("network.request_timeout_secs", "must be greater than 0");
        }
        if self.network.update_queue_limit == 0 {
            return invalid("network.update_queue_limit", "must be greater than 0");
        }
        if self.chat.history_max == 0 {
            return invalid("chat.history_max", "must be greater than 0");
        }
        Ok(())
    }

    /// Path of the Telegram session file.
    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.paths.resolve(&self.network.session_file)
    }
}

/// CLI arguments parsed by clap.
///
/// The chat itself is driven by interactive commands; these flags only
/// locate files and tune the ambient plumbing.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal chat client with OpenPGP end-to-end encryption")]
pub struct CliArgs {
    /// Directory holding `keys.json`, `api_config.json` and the key files
    /// (default: `~/.config/sealgram`).
    #[arg(long, env = "SEALGRAM_HOME")]
    pub base_dir: Option<PathBuf>,

    /// Path to config file (default: `<base dir>/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Telegram session file (default: `<base dir>/sealgram.session`).
    #[arg(long, env = "SEALGRAM_SESSION")]
    pub session: Option<String>,

    /// Path to the `gpg` executable (default: search `PATH`).
    #[arg(long)]
    pub gpg: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "SEALGRAM_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/sealgram.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Write `value` to `path` as JSON indented with four spaces.
///
/// Shared by the documents the operator edits by hand.
///
/// # Errors
///
/// Returns an I/O error if serialization or the write fails.
pub fn write_json_document<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser).map_err(std::io::Error::other)?;
    std::fs::write(path, buf)
}

/// Default base directory: `<config dir>/sealgram`.
fn default_base_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("sealgram"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// Otherwise `default_path` is tried and a missing file is treated as an
/// empty config.
fn load_config_file(
    explicit_path: Option<&Path>,
    default_path: &Path,
) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    match std::fs::read_to_string(default_path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile {
            path: default_path.to_path_buf(),
            source: e,
        }),
    }
}
