//! Theme and styling constants for the console.

use crossterm::style::{Attribute, Color, ContentStyle, Stylize};

use super::Tone;

/// Correspondent messages (gray).
pub const USER: Color = Color::Rgb {
    r: 0x88,
    g: 0x88,
    b: 0x88,
};

/// Our own messages (dark green).
pub const SENT: Color = Color::Rgb {
    r: 0x11,
    g: 0xba,
    b: 0x11,
};

/// Errors (red).
pub const ERROR: Color = Color::Rgb {
    r: 0xff,
    g: 0x00,
    b: 0x00,
};

/// Status notices (dark yellow).
pub const SYSTEM: Color = Color::Rgb {
    r: 0xd5,
    g: 0xd5,
    b: 0x18,
};

/// Unencrypted traffic (light gray).
pub const PLAIN: Color = Color::Rgb {
    r: 0xde,
    g: 0xde,
    b: 0xde,
};

/// Supplementary details (cyan).
pub const INFO: Color = Color::Rgb {
    r: 0x0b,
    g: 0xce,
    b: 0xce,
};

/// Foreground colour of a tone.
#[must_use]
pub const fn color(tone: Tone) -> Color {
    match tone {
        Tone::User => USER,
        Tone::Sent => SENT,
        Tone::Error => ERROR,
        Tone::System => SYSTEM,
        Tone::Plain => PLAIN,
        Tone::Info => INFO,
    }
}

/// Style for a line of the given tone.
#[must_use]
pub fn line(tone: Tone) -> ContentStyle {
    ContentStyle::new().with(color(tone))
}

/// Style for the input prompt.
#[must_use]
pub fn prompt(tone: Tone) -> ContentStyle {
    let style = ContentStyle::new().attribute(Attribute::Bold);
    match tone {
        // The idle prompt keeps the terminal's own foreground.
        Tone::Plain => style,
        other => style.with(color(other)),
    }
}
