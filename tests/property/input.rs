//! Property-based tests for input handling.
//!
//! Uses proptest to verify:
//! 1. `sanitize` never lets an escape or control character through.
//! 2. `/history` with any argument yields a count within the configured bounds.
//! 3. Lines that do not start with `/` or `--` are always sent as messages.

use proptest::prelude::*;
use sealgram::chat::Command;
use sealgram::config::ChatSettings;
use sealgram::ui::sanitize;

proptest! {
    #[test]
    fn sanitized_text_has_no_controls(input in any::<String>()) {
        let clean = sanitize(&input);
        prop_assert!(clean.chars().all(|c| c == '\n' || c == '\t' || !c.is_control()));
    }

    #[test]
    fn sanitize_keeps_printable_text(input in "[a-zA-Z0-9 .,!?🔒]{0,200}") {
        prop_assert_eq!(sanitize(&input), input);
    }

    #[test]
    fn history_count_is_bounded(arg in "\\PC{0,30}", max in 1usize..200) {
        let settings = ChatSettings {
            history_max: max,
            ..ChatSettings::default()
        };
        match Command::parse(&format!("/history {arg}"), &settings) {
            Command::History(n) => prop_assert!((1..=max).contains(&n)),
            other => prop_assert!(false, "unexpected {other:?}"),
        }
    }

    #[test]
    fn digit_counts_clamp_to_max(digits in "[0-9]{1,40}") {
        let settings = ChatSettings::default();
        let expected = digits
            .parse::<usize>()
            .unwrap_or(usize::MAX)
            .clamp(1, settings.history_max);
        prop_assert_eq!(
            Command::parse(&format!("/history {digits}"), &settings),
            Command::History(expected)
        );
    }

    #[test]
    fn ordinary_lines_are_messages(text in "[a-zA-Z0-9][a-zA-Z0-9 ]{0,80}") {
        prop_assert_eq!(
            Command::parse(&text, &ChatSettings::default()),
            Command::Message(text.trim().to_string())
        );
    }
}
