//! GnuPG-backed [`CryptoEngine`].
//!
//! Each operation runs the `gpg` executable as a short-lived child process
//! against a private home directory created for this run and removed when
//! the engine drops, so nothing touches the operator's own keyring. Data
//! travels through stdin/stdout; the passphrase is fed on fd 0 with
//! loopback pinentry so no agent dialog ever opens.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use zeroize::Zeroizing;

use super::{CryptoEngine, CryptoError, Fingerprint, TrustLevel};

/// Executable names tried on `PATH`, in order.
const GPG_NAMES: [&str; 2] = ["gpg", "gpg2"];

/// Directories tried when `PATH` has no `gpg`.
const FALLBACK_DIRS: [&str; 3] = ["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin"];

/// Find a `gpg` executable on `PATH` or in the usual install locations.
#[must_use]
pub fn find_gpg() -> Option<PathBuf> {
    let path_dirs = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect::<Vec<_>>())
        .unwrap_or_default();
    let fallback = FALLBACK_DIRS.iter().map(PathBuf::from);

    path_dirs
        .into_iter()
        .chain(fallback)
        .flat_map(|dir| GPG_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// [`CryptoEngine`] driving the `gpg` executable.
#[derive(Debug)]
pub struct GpgEngine {
    binary: PathBuf,
    home: tempfile::TempDir,
}

impl GpgEngine {
    /// Use `configured` if given, otherwise search for `gpg`, and create a
    /// fresh home directory.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EngineUnavailable`] if no executable is found
    /// or the home directory cannot be created.
    pub fn locate(configured: Option<&Path>) -> Result<Self, CryptoError> {
        let binary = match configured {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(path) => {
                return Err(CryptoError::EngineUnavailable(format!(
                    "gpg executable {} not found",
                    path.display()
                )));
            }
            None => find_gpg().ok_or_else(|| {
                CryptoError::EngineUnavailable(
                    "could not find 'gpg'; please install GnuPG".to_string(),
                )
            })?,
        };
        Self::with_binary(binary)
    }

    /// Use `binary` with a fresh home directory.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EngineUnavailable`] if the home directory
    /// cannot be created.
    pub fn with_binary(binary: PathBuf) -> Result<Self, CryptoError> {
        let home = tempfile::Builder::new()
            .prefix("sealgram-gnupg-")
            .tempdir()
            .map_err(|e| CryptoError::EngineUnavailable(format!("cannot create GnuPG home: {e}")))?;
        tracing::info!(
            binary = %binary.display(),
            home = %home.path().display(),
            "using isolated GnuPG home"
        );
        Ok(Self { binary, home })
    }

    /// The executable in use.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// The private home directory.
    #[must_use]
    pub fn home(&self) -> &Path {
        self.home.path()
    }

    /// Run `gpg` with `args`, feeding `input` on stdin.
    ///
    /// Only spawn and pipe failures are errors here; a non-zero exit is
    /// returned in the [`Output`] for the caller to interpret.
    async fn run(&self, args: &[&str], input: &[u8]) -> Result<Output, CryptoError> {
        let unavailable = |e: std::io::Error| CryptoError::EngineUnavailable(e.to_string());

        let mut child = Command::new(&self.binary)
            .arg("--homedir")
            .arg(self.home.path())
            .args(["--batch", "--no-tty", "--yes"])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(unavailable)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CryptoError::EngineUnavailable("gpg stdin not piped".to_string()))?;

        // Feed stdin while draining stdout so large payloads cannot stall
        // on a full pipe.
        let feed = async move {
            let written = stdin.write_all(input).await;
            drop(stdin);
            written
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(unavailable)?;
        if let Err(e) = written {
            // gpg may exit before reading everything (e.g. bad armor); the
            // exit status below carries the real answer.
            tracing::debug!(err = %e, "gpg closed stdin early");
        }
        tracing::debug!(?args, status = %output.status, "gpg finished");
        Ok(output)
    }
}

impl Drop for GpgEngine {
    fn drop(&mut self) {
        // The agent spawned for our home would otherwise outlive it.
        let _ = std::process::Command::new("gpgconf")
            .arg("--homedir")
            .arg(self.home.path())
            .args(["--kill", "gpg-agent"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

impl CryptoEngine for GpgEngine {
    async fn import_key(&self, armored: &str) -> Result<Vec<Fingerprint>, CryptoError> {
        let output = self
            .run(&["--status-fd", "1", "--import"], armored.as_bytes())
            .await?;
        let fprs = parse_import_ok(&String::from_utf8_lossy(&output.stdout));
        if fprs.is_empty() {
            tracing::warn!(stderr = %stderr_summary(&output), "gpg imported no keys");
        }
        Ok(fprs)
    }

    async fn primary_uid(&self, fpr: &Fingerprint) -> Result<String, CryptoError> {
        let output = self
            .run(&["--with-colons", "--list-keys", fpr.as_str()], b"")
            .await?;
        if !output.status.success() {
            return Err(CryptoError::UnknownKey(fpr.clone()));
        }
        parse_primary_uid(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| CryptoError::UnknownKey(fpr.clone()))
    }

    async fn trust(&self, fpr: &Fingerprint, level: TrustLevel) -> Result<(), CryptoError> {
        let line = format!("{fpr}:{}:\n", level.ownertrust_value());
        let output = self.run(&["--import-ownertrust"], line.as_bytes()).await?;
        if output.status.success() {
            tracing::info!(fingerprint = %fpr, ?level, "set owner trust");
            Ok(())
        } else {
            Err(CryptoError::TrustFailed(stderr_summary(&output)))
        }
    }

    async fn encrypt(&self, plaintext: &str, recipient: &Fingerprint) -> Result<String, CryptoError> {
        let output = self
            .run(
                &[
                    "--armor",
                    "--trust-model",
                    "always",
                    "--recipient",
                    recipient.as_str(),
                    "--encrypt",
                ],
                plaintext.as_bytes(),
            )
            .await?;
        if !output.status.success() {
            return Err(CryptoError::EncryptionFailed(stderr_summary(&output)));
        }
        String::from_utf8(output.stdout)
            .map_err(|_| CryptoError::EncryptionFailed("armored output is not UTF-8".to_string()))
    }

    async fn decrypt(&self, envelope: &str, passphrase: &str) -> Result<String, CryptoError> {
        let mut input = Zeroizing::new(Vec::with_capacity(passphrase.len() + 1 + envelope.len()));
        input.extend_from_slice(passphrase.as_bytes());
        input.push(b'\n');
        input.extend_from_slice(envelope.as_bytes());

        let output = self
            .run(
                &["--pinentry-mode", "loopback", "--passphrase-fd", "0", "--decrypt"],
                &input,
            )
            .await?;
        let plaintext = Zeroizing::new(output.stdout);
        if !output.status.success() {
            return Err(CryptoError::DecryptionFailed(stderr_summary_of(&output.stderr)));
        }
        String::from_utf8(plaintext.to_vec())
            .map_err(|_| CryptoError::DecryptionFailed("plaintext is not UTF-8".to_string()))
    }
}

/// Fingerprints from `[GNUPG:] IMPORT_OK <reason> <fpr>` status lines,
/// deduplicated in order of appearance.
fn parse_import_ok(status: &str) -> Vec<Fingerprint> {
    let mut fprs: Vec<Fingerprint> = Vec::new();
    for line in status.lines() {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("[GNUPG:]") || fields.next() != Some("IMPORT_OK") {
            continue;
        }
        if let Some(fpr) = fields.nth(1).map(Fingerprint::new)
            && !fprs.contains(&fpr)
        {
            fprs.push(fpr);
        }
    }
    fprs
}

/// First `uid` record of `--with-colons` output (field 10, 1-based).
fn parse_primary_uid(listing: &str) -> Option<String> {
    listing
        .lines()
        .filter(|l| l.starts_with("uid:"))
        .find_map(|l| l.split(':').nth(9))
        .map(unescape_colons)
}

/// Decode the `\xHH` escapes GnuPG uses in colon listings.
fn unescape_colons(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && bytes.get(i + 1) == Some(&b'x')
            && let Some(hex) = field.get(i + 2..i + 4)
            && let Ok(byte) = u8::from_str_radix(hex, 16)
        {
            out.push(byte);
            i += 4;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn stderr_summary(output: &Output) -> String {
    stderr_summary_of(&output.stderr)
}

/// Last meaningful stderr line, without the `gpg: ` prefix.
fn stderr_summary_of(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .map(|l| l.strip_prefix("gpg: ").unwrap_or(l).to_string())
        .unwrap_or_else(|| "gpg failed without a diagnostic".to_string())
}
