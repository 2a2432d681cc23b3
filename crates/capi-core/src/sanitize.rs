//! Terminal output sanitizer.
//!
//! Strips ANSI/control sequences for display and windows the result to the
//! last N lines. Operates on snapshots only; stored output is never touched.
//! Cleaning always happens before windowing so an escape sequence is never
//! cut in half at the window boundary.

use regex::Regex;
use std::sync::LazyLock;

/// CSI sequences: `ESC [ params letter` (SGR colours, cursor moves, erase).
static CSI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?=><]*[A-Za-z]").unwrap());

/// Private-mode set/reset, e.g. bracketed paste `ESC [ ? 2004 h`.
static PRIVATE_MODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[\?[0-9;]*[hl]").unwrap());

/// OSC sequences terminated by BEL: `ESC ] ... BEL` (window titles, cwd hints).
static OSC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\][^\x07]*\x07").unwrap());

/// Strip escape sequences and control characters, normalizing line endings.
///
/// Tab and newline survive; `CRLF` and lone `CR` become `LF`. Applying this
/// twice yields the same text as applying it once.
pub fn strip_control(text: &str) -> String {
    let out = CSI_PATTERN.replace_all(text, "");
    let out = PRIVATE_MODE_PATTERN.replace_all(&out, "");
    let out = OSC_PATTERN.replace_all(&out, "");
    let out = out
        .replace('\x1b', "")
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    out.chars()
        .filter(|&c| c == '\n' || c == '\t' || c >= ' ')
        .collect()
}

/// Keep only the trailing `lines` newline-terminated segments of `text`.
///
/// `None` keeps everything, zero or negative yields an empty string, and a
/// count at or above the number of segments keeps everything.
pub fn window_lines(text: &str, lines: Option<i64>) -> String {
    let Some(lines) = lines else {
        return text.to_string();
    };
    if lines <= 0 {
        return String::new();
    }

    let segments: Vec<&str> = text.split_inclusive('\n').collect();
    let keep = usize::try_from(lines).unwrap_or(usize::MAX);
    if keep >= segments.len() {
        return text.to_string();
    }
    segments[segments.len() - keep..].concat()
}

/// Sanitize a snapshot: optionally strip control sequences, then window.
pub fn sanitize(text: &str, strip_ansi: bool, lines: Option<i64>) -> String {
    if strip_ansi {
        window_lines(&strip_control(text), lines)
    } else {
        window_lines(text, lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_csi_and_private_modes() {
        let raw = "\x1b[?2004h\x1b[1;32muser@host\x1b[0m:~$ ls\x1b[?2004l\r\n";
        assert_eq!(strip_control(raw), "user@host:~$ ls\n");
    }

    #[test]
    fn strips_osc_title() {
        let raw = "\x1b]0;user@host: ~\x07prompt$ ";
        assert_eq!(strip_control(raw), "prompt$ ");
    }

    #[test]
    fn normalizes_carriage_returns() {
        assert_eq!(strip_control("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn drops_control_chars_but_keeps_tab() {
        assert_eq!(strip_control("a\tb\x07c\x08d\x00"), "a\tbcd");
    }

    #[test]
    fn lone_escape_is_removed() {
        assert_eq!(strip_control("x\x1by\x1b"), "xy");
    }

    #[test]
    fn idempotent() {
        let samples = [
            "\x1b[31mred\x1b[0m\r\n",
            "\x1b]2;t\x07\x1b[?25l\x1b[Kdone\r",
            "\x1b\x1b[[1mweird\x1b]no-bel",
            "plain\ttext\n",
        ];
        for raw in samples {
            let once = strip_control(raw);
            assert_eq!(strip_control(&once), once, "sample {raw:?}");
        }
    }

    #[test]
    fn window_keeps_trailing_lines() {
        let text = "l1\nl2\nl3\nl4\n";
        assert_eq!(window_lines(text, Some(2)), "l3\nl4\n");
        assert_eq!(window_lines(text, Some(1)), "l4\n");
    }

    #[test]
    fn window_counts_unterminated_tail_as_a_line() {
        assert_eq!(window_lines("a\nb\nprompt$ ", Some(2)), "b\nprompt$ ");
    }

    #[test]
    fn window_bounds() {
        let text = "a\nb\n";
        assert_eq!(window_lines(text, Some(0)), "");
        assert_eq!(window_lines(text, Some(-3)), "");
        assert_eq!(window_lines(text, Some(2)), text);
        assert_eq!(window_lines(text, Some(50)), text);
        assert_eq!(window_lines(text, None), text);
    }

    #[test]
    fn window_applies_after_cleaning() {
        // The lone CR becomes a line break only after cleaning.
        let raw = "one\rtwo\n\x1b[1mthree\x1b[0m\n";
        assert_eq!(sanitize(raw, true, Some(2)), "two\nthree\n");
        assert_eq!(sanitize(raw, false, Some(1)), "\x1b[1mthree\x1b[0m\n");
    }
}
