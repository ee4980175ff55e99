//! CONTENT-field escaping for the pipe-delimited wire protocol (§6).
//!
//! Encode order: `\` → `\\`, `|` → `\|`, `\n` → `\n`, `\r` → `\r` (literal
//! two-character escapes). Decode reverses the encode order:
//! `\n`, `\r`, `\|`, then `\\` — decoding `\\` last keeps a doubled
//! backslash from being mistaken for one of the other escapes.

pub fn escape_content(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

pub fn unescape_content(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('r') => {
                out.push('\r');
                chars.next();
            }
            Some('|') => {
                out.push('|');
                chars.next();
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            _ => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_all_four_characters() {
        assert_eq!(escape_content("a\\b|c\nd\re"), "a\\\\b\\|c\\nd\\re");
    }

    #[test]
    fn round_trips_arbitrary_content() {
        for raw in ["", "plain", "a|b", "a\\b", "a\nb", "a\rb", "\\|\\n\\r\\\\"] {
            assert_eq!(unescape_content(&escape_content(raw)), raw);
        }
    }

    #[test]
    fn doubled_backslash_is_not_mistaken_for_an_escape() {
        // "\\\\n" is an escaped backslash followed by a literal 'n', not \n.
        assert_eq!(unescape_content("\\\\n"), "\\n");
    }
}
