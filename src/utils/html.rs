//! HTML text helpers.
//!
//! - `unescape()` - decode character references in attribute values
//! - `escape_script_text()` - keep inlined code from closing its own `<script>`
//! - `push_attribute()` - render one attribute with safe quoting

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Unescape HTML entities back to characters.
///
/// Handles common named entities and numeric character references.
pub fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '&' {
            result.push(c);
            continue;
        }

        let mut entity = String::new();
        let mut terminated = false;
        for c in chars.by_ref() {
            if c == ';' {
                terminated = true;
                break;
            }
            entity.push(c);
            if entity.len() > 10 {
                break;
            }
        }

        if !terminated {
            result.push('&');
            result.push_str(&entity);
            continue;
        }

        match decode_entity(&entity) {
            Some(c) => result.push(c),
            None => {
                result.push('&');
                result.push_str(&entity);
                result.push(';');
            }
        }
    }

    Cow::Owned(result)
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{00A0}'),
        s if s.starts_with("#x") || s.starts_with("#X") => {
            u32::from_str_radix(&s[2..], 16).ok().and_then(char::from_u32)
        }
        s if s.starts_with('#') => s[1..].parse().ok().and_then(char::from_u32),
        _ => None,
    }
}

/// Escape `</script` sequences inside script raw text.
///
/// Script content is raw text, so the only sequence that can break out of it
/// is a closing tag. `<\/script` is equivalent inside JS strings and regexes.
pub fn escape_script_text(text: &str) -> Cow<'_, str> {
    static CLOSING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)</(script)").expect("static regex"));
    CLOSING.replace_all(text, r"<\/$1")
}

/// Append ` name="value"` (or bare ` name`) to `out`.
///
/// Values are raw source text, so they are written back unchanged. The quote
/// character is picked so the value cannot terminate the attribute early.
pub fn push_attribute(out: &mut String, name: &str, value: Option<&str>) {
    out.push(' ');
    out.push_str(name);
    let Some(value) = value else {
        return;
    };
    let quote = if value.contains('"') { '\'' } else { '"' };
    out.push('=');
    out.push(quote);
    out.push_str(value);
    out.push(quote);
}
