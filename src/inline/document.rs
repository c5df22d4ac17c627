//! Script-aware HTML document.
//!
//! The document is scanned once. Every `<script>` element is recorded with its
//! byte span, attributes (parsed by `tl`) and raw text; everything else stays
//! in the original source string. Serialization copies the source verbatim and
//! re-renders only the script elements that were mutated, so markup the loader
//! did not touch round-trips byte for byte.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::InlineError;
use crate::utils::html::{escape_script_text, push_attribute, unescape};

/// One `<script>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptElement {
    /// Byte range of the whole element (open tag to close tag) in the source.
    span: Range<usize>,
    /// Attributes in source order, values as written (not entity-decoded).
    attributes: Vec<(String, Option<String>)>,
    /// Text content.
    text: String,
    modified: bool,
}

impl ScriptElement {
    /// Raw attribute value, matched case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
    }

    /// Decoded, non-empty `src` attribute.
    pub fn src(&self) -> Option<String> {
        self.attribute("src")
            .map(|raw| unescape(raw.trim()).into_owned())
            .filter(|src| !src.is_empty())
    }

    pub fn remove_attribute(&mut self, name: &str) {
        let before = self.attributes.len();
        self.attributes
            .retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.modified |= before != self.attributes.len();
    }

    pub fn set_text_content(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.modified = true;
    }

    #[cfg(test)]
    pub fn text_content(&self) -> &str {
        &self.text
    }

    fn render(&self, out: &mut String) {
        out.push_str("<script");
        for (name, value) in &self.attributes {
            push_attribute(out, name, value.as_deref());
        }
        out.push('>');
        out.push_str(&escape_script_text(&self.text));
        out.push_str("</script>");
    }
}

/// Parsed HTML plus its script elements in document order.
#[derive(Debug, Clone)]
pub struct Document {
    source: String,
    scripts: Vec<ScriptElement>,
}

impl Document {
    pub fn parse(html: impl Into<String>) -> Result<Self, InlineError> {
        let source = html.into();
        let scripts = scan_scripts(&source)?;
        Ok(Self { source, scripts })
    }

    /// Script elements in document order.
    pub fn scripts(&self) -> &[ScriptElement] {
        &self.scripts
    }

    pub fn script_mut(&mut self, index: usize) -> Option<&mut ScriptElement> {
        self.scripts.get_mut(index)
    }

    /// Render the document, including all mutations.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for script in self.scripts.iter().filter(|s| s.modified) {
            out.push_str(&self.source[cursor..script.span.start]);
            script.render(&mut out);
            cursor = script.span.end;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}

/// A `<script` open tag or the start of a comment, whichever comes first.
static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<!--|<script[\s/>]").expect("static regex"));

static SCRIPT_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</script").expect("static regex"));

/// Collect script elements.
///
/// Script content is raw text: it runs from the end of the open tag to the
/// next `</script`, whatever it contains. So the scan walks the source itself
/// and only hands each open tag to `tl` for its attributes.
fn scan_scripts(source: &str) -> Result<Vec<ScriptElement>, InlineError> {
    let mut scripts = Vec::new();
    let mut cursor = 0;

    while let Some(found) = MARKUP.find_at(source, cursor) {
        let start = found.start();
        if found.as_str() == "<!--" {
            cursor = source[found.end()..]
                .find("-->")
                .map_or(source.len(), |i| found.end() + i + 3);
            continue;
        }

        // unterminated open tag: the rest is not markup we can rewrite
        let Some(open_end) = open_tag_end(source, start) else {
            break;
        };
        let (text_end, end) = match SCRIPT_CLOSE.find_at(source, open_end) {
            Some(close) => {
                let end = source[close.end()..]
                    .find('>')
                    .map_or(source.len(), |i| close.end() + i + 1);
                (close.start(), end)
            }
            None => (source.len(), source.len()),
        };

        scripts.push(ScriptElement {
            span: start..end,
            attributes: parse_attributes(&source[start..open_end])?,
            text: source[open_end..text_end].to_string(),
            modified: false,
        });
        cursor = end;
    }

    Ok(scripts)
}

/// Byte offset just past the `>` closing the tag opened at `start`.
///
/// A `>` inside a quoted attribute value does not close the tag.
fn open_tag_end(source: &str, start: usize) -> Option<usize> {
    let mut quote = None;
    let mut after_eq = false;
    for (i, &byte) in source.as_bytes().iter().enumerate().skip(start + 1) {
        match quote {
            Some(q) if byte == q => quote = None,
            Some(_) => {}
            None => match byte {
                b'>' => return Some(i + 1),
                b'"' | b'\'' if after_eq => quote = Some(byte),
                b'=' => {
                    after_eq = true;
                    continue;
                }
                b if b.is_ascii_whitespace() => continue,
                _ => {}
            },
        }
        after_eq = false;
    }
    None
}

/// Attributes of a single open tag, in source order.
fn parse_attributes(open_tag: &str) -> Result<Vec<(String, Option<String>)>, InlineError> {
    let dom = tl::parse(open_tag, tl::ParserOptions::default())
        .map_err(|err| InlineError::Parse(format!("{err:?}")))?;

    let attributes = dom
        .nodes()
        .iter()
        .find_map(|node| node.as_tag())
        .map(|tag| {
            tag.attributes()
                .iter()
                .map(|(key, value)| (key.to_string(), value.map(|v| v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Ok(attributes)
}
