#![forbid(unsafe_code)]

//! CSS-like selector parsing and markup synthesis.
//!
//! The grammar is regex-level, not full CSS: a leading tag run, at most one
//! `#id`, any number of `.class` tokens, and `[attr]` / `[attr='value']`
//! tokens. A parsed [`SelectorAst`] is immutable; it can synthesize a fresh
//! unattached [`MarkupElement`] or test whether an existing element matches.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::markup::MarkupElement;

/// Parsed form of a selector string.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectorAst {
    tag: String,
    explicit_tag: bool,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, String)>,
}

/// Errors from selector parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// More than one `#id` token in a single selector.
    MultipleIds,
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleIds => write!(f, "only one id token is allowed in a selector"),
        }
    }
}

impl std::error::Error for SelectorError {}

/// Parse a selector string into its AST.
///
/// The grammar is token-matching, not validating: unrecognized characters
/// are skipped. The tag defaults to `div`.
pub fn parse(selector: &str) -> Result<SelectorAst, SelectorError> {
    let mut chars = selector.chars().peekable();

    let mut tag = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '-' {
            tag.push(c);
            chars.next();
        } else {
            break;
        }
    }
    let explicit_tag = !tag.is_empty();
    if !explicit_tag {
        tag.push_str("div");
    }

    let mut id: Option<String> = None;
    let mut classes: Vec<String> = Vec::new();
    let mut attributes: Vec<(String, String)> = Vec::new();

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                let name = read_name(&mut chars);
                if name.is_empty() {
                    continue;
                }
                if id.is_some() {
                    return Err(SelectorError::MultipleIds);
                }
                id = Some(name);
            }
            '.' => {
                let name = read_name(&mut chars);
                if !name.is_empty() {
                    classes.push(name);
                }
            }
            '[' => {
                let mut raw = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    raw.push(c);
                }
                if let Some((name, value)) = split_attribute(&raw) {
                    attributes.push((name, value));
                }
            }
            _ => {}
        }
    }

    Ok(SelectorAst {
        tag,
        explicit_tag,
        id,
        classes,
        attributes,
    })
}

/// A name token: a leading letter, then letters, digits, and hyphens.
fn read_name(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut name = String::new();
    match chars.peek() {
        Some(&c) if c.is_ascii_alphabetic() => {}
        _ => return name,
    }
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '-' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}

fn split_attribute(raw: &str) -> Option<(String, String)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.split_once('=') {
        None => Some((raw.to_string(), String::new())),
        Some((name, value)) => {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), strip_quotes(value.trim()).to_string()))
        }
    }
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

impl SelectorAst {
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    #[must_use]
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Synthesize a fresh, unattached markup element matching this selector.
    ///
    /// Each call produces a new node; nothing is shared between calls.
    #[must_use]
    pub fn synthesize(&self) -> MarkupElement {
        let mut element = MarkupElement::new(self.tag.clone());
        if let Some(id) = &self.id {
            element.set_attribute("id", id.clone());
        }
        if !self.classes.is_empty() {
            element.set_attribute("class", self.classes.join(" "));
        }
        for (name, value) in &self.attributes {
            element.set_attribute(name.clone(), value.clone());
        }
        element
    }

    /// Whether a markup element satisfies every constraint of this selector.
    ///
    /// The tag constraint only applies when the selector named one explicitly
    /// (so `#id` matches any tag carrying that id). A valueless attribute
    /// constraint matches on presence alone.
    #[must_use]
    pub fn matches(&self, element: &MarkupElement) -> bool {
        if self.explicit_tag && element.tag() != self.tag {
            return false;
        }
        if let Some(id) = &self.id
            && element.id() != Some(id.as_str())
        {
            return false;
        }
        let element_classes = element.classes();
        if !self
            .classes
            .iter()
            .all(|c| element_classes.contains(&c.as_str()))
        {
            return false;
        }
        self.attributes.iter().all(|(name, value)| {
            if value.is_empty() {
                element.has_attribute(name)
            } else {
                element.attribute(name) == Some(value.as_str())
            }
        })
    }
}

/// One-shot utility: parse a selector and synthesize its element.
pub fn create_element(selector: &str) -> Result<MarkupElement, SelectorError> {
    Ok(parse(selector)?.synthesize())
}
