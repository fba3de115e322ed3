//! Terminal presentation for `Sealgram`.
//!
//! - [`theme`] maps each [`Tone`] to a terminal colour
//! - [`console`] is the raw-mode line editor and printer used by the chat loop
//! - [`login`] answers the Telegram sign-in questions on the terminal
//!
//! Output is produced as [`OutputLine`]s by the chat context and handed to
//! the console, which never interprets their content.

pub mod console;
pub mod login;
pub mod theme;

use std::io::{BufRead, Write};

use crate::crypto::keys::KeyEvent;

/// Semantic style of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Messages from the correspondent.
    User,
    /// Messages we sent (encrypted or verified).
    Sent,
    /// Failures.
    Error,
    /// Status and progress notices.
    System,
    /// Unencrypted traffic.
    Plain,
    /// Supplementary details.
    Info,
}

/// One rendered line of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// How to style it.
    pub tone: Tone,
    /// Text, already sanitized where it came from the network.
    pub text: String,
}

impl OutputLine {
    /// Build a line.
    pub fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }
}

impl From<&KeyEvent> for OutputLine {
    /// Start-up progress: milestones as system lines, file steps as user
    /// lines, results as info lines.
    fn from(event: &KeyEvent) -> Self {
        let tone = match event {
            KeyEvent::CreatingDefaults(_) | KeyEvent::ReadingConfiguration | KeyEvent::Ready => {
                Tone::System
            }
            KeyEvent::Loading(..) => Tone::User,
            KeyEvent::CreatedPlaceholder(_) | KeyEvent::Loaded(..) => Tone::Info,
        };
        Self::new(tone, event.to_string())
    }
}

/// Ask `question` on `out` and read one trimmed line from `input`.
///
/// End of input yields an empty answer.
///
/// # Errors
///
/// Returns any I/O error from writing the question or reading the answer.
pub fn ask(
    input: &mut impl BufRead,
    out: &mut impl Write,
    question: &str,
) -> std::io::Result<String> {
    write!(out, "{question}")?;
    out.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

/// Ask `question` until a non-blank answer arrives, printing `retry` after
/// each blank one. The answer is trimmed.
///
/// # Errors
///
/// End of input is reported as [`std::io::ErrorKind::UnexpectedEof`];
/// other I/O errors are returned as they are.
pub fn ask_required(
    input: &mut impl BufRead,
    out: &mut impl Write,
    question: &str,
    retry: &str,
) -> std::io::Result<String> {
    loop {
        write!(out, "{question}")?;
        out.flush()?;
        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "input closed before an answer was given",
            ));
        }
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
        writeln!(out, "{retry}")?;
    }
}

/// Make network text safe to print.
///
/// Drops ANSI CSI and OSC sequences, other escapes, DEL and control
/// characters. Newlines and tabs are kept.
#[must_use]
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();
    while let Some(ch) = it.next() {
        if ch == '\u{1b}' {
            match it.peek().copied() {
                // CSI: parameters until a final byte in 0x40-0x7E.
                Some('[') => {
                    it.next();
                    for c in it.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&c) {
                            break;
                        }
                    }
                }
                // OSC: until BEL or ST (ESC \).
                Some(']') => {
                    it.next();
                    while let Some(c) = it.next() {
                        if c == '\u{7}' {
                            break;
                        }
                        if c == '\u{1b}' && it.peek() == Some(&'\\') {
                            it.next();
                            break;
                        }
                    }
                }
                Some(_) => {
                    it.next();
                }
                None => {}
            }
            continue;
        }
        if ch == '\n' || ch == '\t' {
            out.push(ch);
            continue;
        }
        if ch.is_control() {
            continue;
        }
        out.push(ch);
    }
    out
}
