//! Raw-mode console: a one-line editor plus a printer that keeps the prompt
//! at the bottom.
//!
//! Lines printed while the operator is typing follow the prompt-pause
//! rule: clear the prompt line, print, then redraw the prompt and the
//! partial input with the cursor where it was.

use std::io::Write;

use crossterm::cursor::{MoveTo, MoveToColumn, RestorePosition, SavePosition};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Print, PrintStyledContent, StyledContent};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::queue;

use zeroize::Zeroizing;

use super::{OutputLine, theme};

/// What a key press did to the line being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// Enter: the finished line (the buffer is now empty).
    Submit(String),
    /// Ctrl-C, or Ctrl-D on an empty line.
    Interrupt,
    /// The buffer or cursor changed; redraw.
    Changed,
    /// Nothing to do.
    Ignored,
}

/// Single-line input buffer with a cursor.
///
/// The cursor counts characters, not bytes, so multi-byte input edits
/// correctly.
#[derive(Debug, Default, Clone)]
pub struct LineEditor {
    input: String,
    cursor: usize,
}

impl LineEditor {
    /// An empty editor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current buffer.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Cursor position in characters.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Apply a key event.
    pub fn handle_key(&mut self, key: KeyEvent) -> EditorEvent {
        if !matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
            return EditorEvent::Ignored;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => EditorEvent::Interrupt,
                KeyCode::Char('d') if self.input.is_empty() => EditorEvent::Interrupt,
                KeyCode::Char('a') => self.move_to(0),
                KeyCode::Char('e') => self.move_to(self.len()),
                KeyCode::Char('u') => {
                    self.input.clear();
                    self.cursor = 0;
                    EditorEvent::Changed
                }
                _ => EditorEvent::Ignored,
            };
        }

        match key.code {
            KeyCode::Enter => {
                self.cursor = 0;
                EditorEvent::Submit(std::mem::take(&mut self.input))
            }
            KeyCode::Char(c) => {
                self.enter_char(c);
                EditorEvent::Changed
            }
            KeyCode::Backspace => self.delete_before(),
            KeyCode::Delete => self.delete_at(),
            KeyCode::Left => self.move_to(self.cursor.saturating_sub(1)),
            KeyCode::Right => self.move_to((self.cursor + 1).min(self.len())),
            KeyCode::Home => self.move_to(0),
            KeyCode::End => self.move_to(self.len()),
            _ => EditorEvent::Ignored,
        }
    }

    fn len(&self) -> usize {
        self.input.chars().count()
    }

    /// Byte offset of character index `idx`.
    fn byte_offset(&self, idx: usize) -> usize {
        self.input
            .char_indices()
            .nth(idx)
            .map_or(self.input.len(), |(i, _)| i)
    }

    /// Insert a character at the cursor position.
    fn enter_char(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.input.insert(at, c);
        self.cursor += 1;
    }

    /// Delete the character before the cursor.
    fn delete_before(&mut self) -> EditorEvent {
        if self.cursor == 0 {
            return EditorEvent::Ignored;
        }
        let at = self.byte_offset(self.cursor - 1);
        self.input.remove(at);
        self.cursor -= 1;
        EditorEvent::Changed
    }

    /// Delete the character under the cursor.
    fn delete_at(&mut self) -> EditorEvent {
        if self.cursor >= self.len() {
            return EditorEvent::Ignored;
        }
        let at = self.byte_offset(self.cursor);
        self.input.remove(at);
        EditorEvent::Changed
    }

    fn move_to(&mut self, cursor: usize) -> EditorEvent {
        if cursor == self.cursor {
            return EditorEvent::Ignored;
        }
        self.cursor = cursor;
        EditorEvent::Changed
    }
}

/// Puts the terminal in raw mode until dropped.
pub struct RawModeGuard(());

impl RawModeGuard {
    /// Enable raw mode.
    ///
    /// # Errors
    ///
    /// Returns the terminal error if raw mode cannot be enabled.
    pub fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Read one line without echoing it, for passwords.
///
/// Keys go through a [`LineEditor`] so the usual editing keys work, but
/// nothing is drawn.
///
/// # Errors
///
/// Ctrl-C and Ctrl-D report [`std::io::ErrorKind::Interrupted`]; terminal
/// errors are returned as they are.
pub fn read_secret(out: &mut impl Write, question: &str) -> std::io::Result<Zeroizing<String>> {
    write!(out, "{question}")?;
    out.flush()?;

    let mut editor = LineEditor::new();
    let answer = {
        let _raw = RawModeGuard::enable()?;
        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            match editor.handle_key(key) {
                EditorEvent::Submit(line) => break Ok(Zeroizing::new(line)),
                EditorEvent::Interrupt => {
                    break Err(std::io::Error::new(
                        std::io::ErrorKind::Interrupted,
                        "password entry cancelled",
                    ));
                }
                EditorEvent::Changed | EditorEvent::Ignored => {}
            }
        }
    };
    writeln!(out)?;
    answer
}

/// Printer and line editor bound to an output stream.
pub struct Console<W: Write> {
    out: W,
    editor: LineEditor,
}

impl<W: Write> Console<W> {
    /// Console writing to `out`. Raw mode is managed by [`RawModeGuard`].
    pub fn new(out: W) -> Self {
        Self {
            out,
            editor: LineEditor::new(),
        }
    }

    /// The line editor.
    pub const fn editor(&self) -> &LineEditor {
        &self.editor
    }

    /// Feed a key event to the editor, redrawing on change.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from redrawing.
    pub fn handle_key(&mut self, key: KeyEvent, prompt: &OutputLine) -> std::io::Result<EditorEvent> {
        let event = self.editor.handle_key(key);
        match &event {
            EditorEvent::Changed => self.redraw(prompt)?,
            EditorEvent::Submit(line) => {
                // Leave the submitted line visible, like a cooked terminal.
                queue!(
                    self.out,
                    MoveToColumn(0),
                    Clear(ClearType::CurrentLine),
                    PrintStyledContent(StyledContent::new(theme::prompt(prompt.tone), prompt.text.as_str())),
                    Print(raw_newlines(line)),
                    Print("\r\n")
                )?;
                self.out.flush()?;
            }
            EditorEvent::Interrupt => {
                queue!(self.out, Print("\r\n"))?;
                self.out.flush()?;
            }
            EditorEvent::Ignored => {}
        }
        Ok(event)
    }

    /// Print `lines` above the prompt, then redraw the prompt.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the terminal.
    pub fn print(&mut self, lines: &[OutputLine], prompt: &OutputLine) -> std::io::Result<()> {
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        for line in lines {
            let text = raw_newlines(&line.text);
            queue!(
                self.out,
                PrintStyledContent(StyledContent::new(theme::line(line.tone), text.as_str())),
                Print("\r\n")
            )?;
        }
        self.redraw(prompt)
    }

    /// Redraw the prompt and the partial input, restoring the cursor.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the terminal.
    pub fn redraw(&mut self, prompt: &OutputLine) -> std::io::Result<()> {
        let input = self.editor.input();
        let split = input
            .char_indices()
            .nth(self.editor.cursor())
            .map_or(input.len(), |(i, _)| i);
        let (before, after) = input.split_at(split);
        queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            PrintStyledContent(StyledContent::new(theme::prompt(prompt.tone), prompt.text.as_str())),
            Print(before),
            SavePosition,
            Print(after),
            RestorePosition
        )?;
        self.out.flush()
    }

    /// Clear the whole screen and home the cursor.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the terminal.
    pub fn clear_screen(&mut self) -> std::io::Result<()> {
        queue!(self.out, Clear(ClearType::All), Clear(ClearType::Purge), MoveTo(0, 0))?;
        self.out.flush()
    }

    /// Give back the output stream.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Raw mode does not translate `\n`; every line break needs a carriage return.
fn raw_newlines(text: &str) -> String {
    text.replace('\n', "\r\n")
}
