use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Display width of a string in terminal columns.
///
/// ```
/// use bugdesk::util::display_width;
///
/// assert_eq!(display_width("STR"), 3);
/// assert_eq!(display_width("日本"), 4);
/// ```
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Shorten text for a one-line listing.
///
/// Runs of whitespace (including line breaks) collapse to one space, then
/// the result is cut to `max_width` columns with a trailing `...`. Widths
/// too narrow for the ellipsis get as many characters as fit.
///
/// ```
/// use bugdesk::util::abbreviate;
///
/// assert_eq!(abbreviate("Crash\n\non  start", 80), "Crash on start");
/// assert_eq!(abbreviate("Printer queue stalls", 12), "Printer q...");
/// ```
pub fn abbreviate(text: &str, max_width: usize) -> Cow<'_, str> {
    let collapsed = collapse_whitespace(text);
    if display_width(&collapsed) <= max_width {
        return collapsed;
    }

    let budget = if max_width <= ELLIPSIS_WIDTH {
        max_width
    } else {
        max_width - ELLIPSIS_WIDTH
    };

    let mut out = String::with_capacity(max_width);
    let mut width = 0;
    for c in collapsed.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        out.push(c);
    }

    if max_width > ELLIPSIS_WIDTH {
        out.truncate(out.trim_end().len());
        out.push_str(ELLIPSIS);
    }
    Cow::Owned(out)
}

fn collapse_whitespace(text: &str) -> Cow<'_, str> {
    let trimmed = text.trim();
    let clean = !trimmed
        .as_bytes()
        .windows(2)
        .any(|w| w[0].is_ascii_whitespace() && w[1].is_ascii_whitespace())
        && !trimmed.chars().any(|c| c.is_whitespace() && c != ' ');
    if clean {
        return Cow::Borrowed(trimmed);
    }
    Cow::Owned(trimmed.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Remove terminal control characters and ANSI escape sequences.
///
/// Report text is user-submitted and printed straight to a terminal by the
/// CLI. Tab, newline and carriage return are kept; CSI (`ESC [`) and OSC
/// (`ESC ]`, ended by BEL or `ESC \`) sequences are dropped whole, as is any
/// other control character.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_unsafe) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameters run until the final byte in 0x40..=0x7e.
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_unsafe(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn is_unsafe(c: char) -> bool {
    c == '\x1b' || c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'))
}
