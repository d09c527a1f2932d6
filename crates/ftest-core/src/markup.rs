#![forbid(unsafe_code)]

//! Unattached markup nodes and a small template scanner.
//!
//! Templates in this crate are plain markup text. [`MarkupElement`] is the
//! structured form: a tag, an ordered attribute list, and child elements.
//! [`scan_template`] turns template text back into elements, tolerating the
//! binding-shaped attribute names the host builder emits (`[input]`,
//! `(output)`). Text content between tags carries no meaning for the harness
//! and is skipped.

use std::fmt;

/// A markup node that is not attached to any rendered tree.
///
/// Attribute order is preserved: it is the order attributes were set, which
/// for synthesized host templates is contractual (id, class, parsed
/// attributes, then generated bindings).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkupElement {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<MarkupElement>,
}

impl MarkupElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Set an attribute, replacing any existing value under the same name.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.attributes.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.attributes.push((name, value));
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|(n, _)| n == name)
    }

    /// Attributes in insertion order.
    #[must_use]
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// The `id` attribute, when present.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// The whitespace-split entries of the `class` attribute.
    #[must_use]
    pub fn classes(&self) -> Vec<&str> {
        self.attribute("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn push_child(&mut self, child: MarkupElement) {
        self.children.push(child);
    }

    #[must_use]
    pub fn children(&self) -> &[MarkupElement] {
        &self.children
    }

    /// Serialize this element (and its children) to markup text.
    #[must_use]
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&value.replace('"', "&quot;"));
            out.push('"');
        }
        out.push('>');
        for child in &self.children {
            child.write_html(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

impl fmt::Display for MarkupElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.outer_html())
    }
}

/// Errors from scanning template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// An opened tag was never closed before the end of the template.
    UnclosedTag(String),
    /// A closing tag appeared with no matching open tag.
    StrayCloseTag(String),
    /// A tag could not be tokenized (unterminated quote, missing name).
    MalformedTag(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnclosedTag(tag) => write!(f, "unclosed tag <{tag}> in template"),
            Self::StrayCloseTag(tag) => write!(f, "closing tag </{tag}> matches no open tag"),
            Self::MalformedTag(detail) => write!(f, "malformed tag: {detail}"),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Scan template text into a list of root elements.
///
/// The scanner understands exactly the dialect the harness produces and
/// consumes: nested elements, self-closing tags, valueless attributes, and
/// single- or double-quoted attribute values. Attribute names may carry the
/// binding sigils `[…]` and `(…)`.
pub fn scan_template(template: &str) -> Result<Vec<MarkupElement>, TemplateError> {
    let mut roots: Vec<MarkupElement> = Vec::new();
    let mut stack: Vec<MarkupElement> = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('<') {
        rest = &rest[open + 1..];
        if let Some(tail) = rest.strip_prefix('/') {
            // Closing tag.
            let end = tail
                .find('>')
                .ok_or_else(|| TemplateError::MalformedTag(truncate(tail)))?;
            let name = tail[..end].trim().to_string();
            rest = &tail[end + 1..];
            let Some(done) = stack.pop() else {
                return Err(TemplateError::StrayCloseTag(name));
            };
            if done.tag() != name {
                return Err(TemplateError::StrayCloseTag(name));
            }
            attach(done, &mut stack, &mut roots);
        } else {
            let (element, self_closing, remaining) = scan_tag(rest)?;
            rest = remaining;
            if self_closing {
                attach(element, &mut stack, &mut roots);
            } else {
                stack.push(element);
            }
        }
    }

    if let Some(open) = stack.pop() {
        return Err(TemplateError::UnclosedTag(open.tag().to_string()));
    }
    Ok(roots)
}

fn attach(element: MarkupElement, stack: &mut Vec<MarkupElement>, roots: &mut Vec<MarkupElement>) {
    match stack.last_mut() {
        Some(parent) => parent.push_child(element),
        None => roots.push(element),
    }
}

/// Scan one opening tag starting just past `<`. Returns the element, whether
/// it was self-closing, and the unconsumed remainder.
fn scan_tag(input: &str) -> Result<(MarkupElement, bool, &str), TemplateError> {
    let mut chars = input.char_indices().peekable();

    let mut tag = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '-' {
            tag.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if tag.is_empty() {
        return Err(TemplateError::MalformedTag(truncate(input)));
    }

    let mut element = MarkupElement::new(tag);
    loop {
        // Skip whitespace between attributes.
        while matches!(chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
            chars.next();
        }
        match chars.peek().copied() {
            None => return Err(TemplateError::UnclosedTag(element.tag().to_string())),
            Some((i, '>')) => {
                chars.next();
                return Ok((element, false, &input[i + 1..]));
            }
            Some((_, '/')) => {
                chars.next();
                match chars.next() {
                    Some((i, '>')) => return Ok((element, true, &input[i + 1..])),
                    _ => return Err(TemplateError::MalformedTag(truncate(input))),
                }
            }
            Some(_) => {
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || c == '=' || c == '>' || c == '/' {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                if name.is_empty() {
                    return Err(TemplateError::MalformedTag(truncate(input)));
                }
                let mut value = String::new();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    match chars.peek().copied() {
                        Some((_, quote)) if quote == '"' || quote == '\'' => {
                            chars.next();
                            let mut closed = false;
                            for (_, c) in chars.by_ref() {
                                if c == quote {
                                    closed = true;
                                    break;
                                }
                                value.push(c);
                            }
                            if !closed {
                                return Err(TemplateError::MalformedTag(truncate(input)));
                            }
                        }
                        _ => {
                            while let Some(&(_, c)) = chars.peek() {
                                if c.is_whitespace() || c == '>' || c == '/' {
                                    break;
                                }
                                value.push(c);
                                chars.next();
                            }
                        }
                    }
                }
                element.set_attribute(name, value);
            }
        }
    }
}

fn truncate(input: &str) -> String {
    input.chars().take(32).collect()
}
