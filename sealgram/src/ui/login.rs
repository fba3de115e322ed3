//! Terminal answers for the first Telegram sign-in.

use std::io::{self, BufRead, Write};

use zeroize::Zeroizing;

use super::{ask_required, console};
use crate::transport::telegram::LoginPrompt;

/// [`LoginPrompt`] that asks on a terminal.
///
/// With `hide_password` set the two-step password is read in raw mode
/// without echo; otherwise it is read as a plain line from `input`.
pub struct TerminalLogin<R, W> {
    input: R,
    out: W,
    hide_password: bool,
}

impl<R: BufRead, W: Write> TerminalLogin<R, W> {
    /// Ask on `out`, read answers from `input`.
    pub const fn new(input: R, out: W, hide_password: bool) -> Self {
        Self {
            input,
            out,
            hide_password,
        }
    }
}

impl<R: BufRead, W: Write> LoginPrompt for TerminalLogin<R, W> {
    fn phone(&mut self) -> io::Result<String> {
        ask_required(
            &mut self.input,
            &mut self.out,
            "Please enter your phone (e.g. +15550100): ",
            "Phone number cannot be empty.",
        )
    }

    fn code(&mut self) -> io::Result<String> {
        ask_required(
            &mut self.input,
            &mut self.out,
            "Please enter the code you received: ",
            "Code cannot be empty.",
        )
    }

    fn password(&mut self, hint: Option<&str>) -> io::Result<Zeroizing<String>> {
        let question = match hint {
            Some(hint) if !hint.is_empty() => format!("Please enter your password (hint: {hint}): "),
            _ => "Please enter your password: ".to_string(),
        };
        if self.hide_password {
            return console::read_secret(&mut self.out, &question);
        }
        write!(self.out, "{question}")?;
        self.out.flush()?;
        let mut answer = Zeroizing::new(String::new());
        self.input.read_line(&mut answer)?;
        let trimmed = answer.trim_end_matches(['\r', '\n']).len();
        answer.truncate(trimmed);
        Ok(answer)
    }
}
