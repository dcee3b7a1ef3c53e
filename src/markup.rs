//! Presentation markup inside rendered lines.
//!
//! A line may start with a `Name: ` character label and carry bracket
//! tags: `[b]open[/b]`, self-closing `[pause/]`, close-all `[/]`, and the
//! replacement tags `select`, `plural` and `ordinal`, which substitute
//! text instead of producing annotations. Positions and lengths count
//! characters of the cleaned text.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::plural::{self, PluralKind};

static CHARACTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+):\s+").expect("character pattern is valid"));
static TAG_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/?([^\s=/]+)(?:/|\s|$)").expect("tag name pattern is valid"));
static PROPERTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\S+?".*?"|[^\s/]+"#).expect("property pattern is valid"));
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d*\.?\d+$").expect("number pattern is valid"));

const NO_MARKUP: &str = "nomarkup";
const TRIM_WHITESPACE: &str = "trimwhitespace";

/// Value of a tag property.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl MarkupValue {
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ if NUMBER.is_match(raw) => raw
                .parse::<f64>()
                .map_or_else(|_| Self::String(raw.to_string()), Self::Number),
            _ if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') => {
                Self::String(raw[1..raw.len() - 1].to_string())
            }
            _ => Self::String(raw.to_string()),
        }
    }
}

impl fmt::Display for MarkupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

pub type Properties = BTreeMap<String, MarkupValue>;

/// A tag resolved against the cleaned text.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkupAnnotation {
    pub name: String,
    pub position: usize,
    /// Zero for self-closing tags.
    pub length: usize,
    pub properties: Properties,
}

/// A line with its markup stripped out.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkedLine {
    pub text: String,
    pub markup: Vec<MarkupAnnotation>,
}

/// Classifies a markup error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupErrorKind {
    /// `[/name]` with no open `name` tag.
    UnmatchedClose { name: String },
    /// Neither a bare name nor a property to borrow one from.
    MissingTagName { contents: String },
    /// A property without a `key=value` shape.
    InvalidProperty { property: String },
    /// A replacement tag without a usable `value` property.
    MissingValue { tag: String },
    /// A replacement tag with no text for the selected case.
    MissingReplacement { tag: String, case: String },
}

impl fmt::Display for MarkupErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmatchedClose { name } => {
                write!(f, "encountered closing {name} tag before opening tag")
            }
            Self::MissingTagName { contents } => write!(f, "tag has no name: [{contents}]"),
            Self::InvalidProperty { property } => {
                write!(f, "invalid markup property assignment: {property}")
            }
            Self::MissingValue { tag } => write!(f, "{tag} tag needs a value property"),
            Self::MissingReplacement { tag, case } => {
                write!(f, "{tag} tag has no replacement for '{case}'")
            }
        }
    }
}

/// Error produced while processing line markup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at position {position}")]
pub struct MarkupError {
    pub kind: MarkupErrorKind,
    /// Character offset of the offending tag in the input line.
    pub position: usize,
}

enum Tag {
    Open { name: String, properties: Properties },
    SelfClosing { name: String, properties: Properties },
    Close { name: String },
    CloseAll,
}

struct Event {
    tag: Tag,
    /// Offset into the output text.
    position: usize,
    /// Offset of the tag in the input, for errors.
    at: usize,
}

/// Strip the character label and bracket markup from `text`.
///
/// `locale` selects the plural rules used by `plural` and `ordinal`.
///
/// # Errors
///
/// Returns `MarkupError` for an unmatched closing tag, a malformed
/// property, or a replacement tag that cannot be resolved.
pub fn parse_line(text: &str, locale: &str) -> Result<MarkedLine, MarkupError> {
    let mut markup = Vec::new();
    let mut body = text;
    if let Some(captures) = CHARACTER.captures(text) {
        let mut properties = Properties::new();
        properties.insert(
            "name".to_string(),
            MarkupValue::String(captures[1].to_string()),
        );
        markup.push(MarkupAnnotation {
            name: "character".to_string(),
            position: 0,
            length: 0,
            properties,
        });
        body = &text[captures[0].len()..];
    }

    let (scanned, mut events) = scan(body, locale)?;
    let text = unescape(&scanned, &mut events);
    markup.extend(resolve(events)?);
    Ok(MarkedLine { text, markup })
}

fn scan(text: &str, locale: &str) -> Result<(String, Vec<Event>), MarkupError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut len = 0;
    let mut events = Vec::new();
    let mut no_markup = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        // Escapes survive until the unescape pass.
        if c == '\\' && i + 1 < chars.len() {
            out.push(c);
            out.push(chars[i + 1]);
            len += 2;
            i += 2;
            continue;
        }
        let Some(end) = (c == '[').then(|| closing_bracket(&chars, i)).flatten() else {
            out.push(c);
            len += 1;
            i += 1;
            continue;
        };

        let contents: String = chars[i + 1..end].iter().collect();
        if no_markup && tag_name(&contents) != Some(NO_MARKUP) {
            out.extend(&chars[i..=end]);
            len += end + 1 - i;
            i = end + 1;
            continue;
        }

        let tag = parse_tag(&contents).map_err(|kind| MarkupError { kind, position: i })?;
        match tag {
            Tag::Open { name, .. } if name == NO_MARKUP => no_markup = true,
            Tag::Close { name } if name == NO_MARKUP => no_markup = false,
            Tag::SelfClosing { name, .. } if name == NO_MARKUP => {}
            Tag::Close { name } if is_replacement(&name) => {}
            Tag::Open { name, properties } | Tag::SelfClosing { name, properties }
                if is_replacement(&name) =>
            {
                let substituted = replacement(&name, &properties, locale)
                    .map_err(|kind| MarkupError { kind, position: i })?;
                len += substituted.chars().count();
                out.push_str(&substituted);
            }
            Tag::SelfClosing {
                name,
                mut properties,
            } => {
                let trim = !matches!(
                    properties.remove(TRIM_WHITESPACE),
                    Some(MarkupValue::Bool(false))
                );
                events.push(Event {
                    tag: Tag::SelfClosing { name, properties },
                    position: len,
                    at: i,
                });
                let leading = i == 0 || chars[i - 1].is_whitespace();
                let trailing = chars.get(end + 1).is_some_and(|c| c.is_whitespace());
                if trim && leading && trailing {
                    i = end + 2;
                    continue;
                }
            }
            Tag::Open {
                name,
                mut properties,
            } => {
                properties.remove(TRIM_WHITESPACE);
                events.push(Event {
                    tag: Tag::Open { name, properties },
                    position: len,
                    at: i,
                });
            }
            tag => events.push(Event {
                tag,
                position: len,
                at: i,
            }),
        }
        i = end + 1;
    }
    Ok((out, events))
}

/// Index of the `]` closing the tag opened at `start`.
fn closing_bracket(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            ']' if j > start + 1 => return Some(j),
            _ => j += 1,
        }
    }
    None
}

fn tag_name(contents: &str) -> Option<&str> {
    TAG_NAME
        .captures(contents)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str())
}

fn is_replacement(name: &str) -> bool {
    matches!(name, "select" | "plural" | "ordinal")
}

fn parse_tag(contents: &str) -> Result<Tag, MarkupErrorKind> {
    if contents == "/" {
        return Ok(Tag::CloseAll);
    }
    let missing_name = || MarkupErrorKind::MissingTagName {
        contents: contents.to_string(),
    };
    if contents.starts_with('/') {
        let name = tag_name(contents).ok_or_else(missing_name)?;
        return Ok(Tag::Close {
            name: name.to_string(),
        });
    }

    let rest = TAG_NAME
        .find(contents)
        .map_or(contents, |found| &contents[found.end()..]);
    let mut properties = Properties::new();
    let mut first_key = None;
    for assignment in PROPERTY.find_iter(rest) {
        let (key, value) = parse_property(assignment.as_str())?;
        first_key.get_or_insert_with(|| key.clone());
        properties.insert(key, value);
    }

    let name = tag_name(contents)
        .map(str::to_string)
        .or(first_key)
        .ok_or_else(missing_name)?;
    if contents.ends_with('/') {
        Ok(Tag::SelfClosing { name, properties })
    } else {
        Ok(Tag::Open { name, properties })
    }
}

fn parse_property(assignment: &str) -> Result<(String, MarkupValue), MarkupErrorKind> {
    let invalid = || MarkupErrorKind::InvalidProperty {
        property: assignment.to_string(),
    };
    let (key, raw) = assignment.split_once('=').ok_or_else(invalid)?;
    if key.is_empty() || raw.is_empty() {
        return Err(invalid());
    }
    Ok((key.to_string(), MarkupValue::parse(raw)))
}

fn replacement(
    name: &str,
    properties: &Properties,
    locale: &str,
) -> Result<String, MarkupErrorKind> {
    let missing_value = || MarkupErrorKind::MissingValue {
        tag: name.to_string(),
    };
    let value = properties.get("value").ok_or_else(missing_value)?;

    let (case, number) = if name == "select" {
        (value.to_string(), None)
    } else {
        let number = value.as_number().ok_or_else(missing_value)?;
        let kind = if name == "plural" {
            PluralKind::Cardinal
        } else {
            PluralKind::Ordinal
        };
        (plural::category(locale, number, kind).to_string(), Some(number))
    };

    let mut text = properties
        .get(&case)
        .ok_or_else(|| MarkupErrorKind::MissingReplacement {
            tag: name.to_string(),
            case: case.clone(),
        })?
        .to_string();
    if let Some(number) = number {
        text = text.replace('%', &number.to_string());
    }
    Ok(text)
}

/// Resolve `\c` escapes, shifting events that follow each one.
fn unescape(text: &str, events: &mut [Event]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut len = 0;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        let c = match (c, chars.clone().next()) {
            ('\\', Some(escaped)) => {
                chars.next();
                for event in events.iter_mut().filter(|event| event.position > len) {
                    event.position -= 1;
                }
                escaped
            }
            _ => c,
        };
        out.push(c);
        len += 1;
    }
    out
}

fn resolve(events: Vec<Event>) -> Result<Vec<MarkupAnnotation>, MarkupError> {
    let mut open: Vec<MarkupAnnotation> = Vec::new();
    let mut markup = Vec::new();
    for event in events {
        match event.tag {
            Tag::Open { name, properties } => open.push(MarkupAnnotation {
                name,
                position: event.position,
                length: 0,
                properties,
            }),
            Tag::SelfClosing { name, properties } => markup.push(MarkupAnnotation {
                name,
                position: event.position,
                length: 0,
                properties,
            }),
            Tag::Close { name } => {
                let Some(index) = open.iter().rposition(|tag| tag.name == name) else {
                    return Err(MarkupError {
                        kind: MarkupErrorKind::UnmatchedClose { name },
                        position: event.at,
                    });
                };
                let mut annotation = open.remove(index);
                annotation.length = event.position.saturating_sub(annotation.position);
                markup.push(annotation);
            }
            Tag::CloseAll => {
                while let Some(mut annotation) = open.pop() {
                    annotation.length = event.position.saturating_sub(annotation.position);
                    markup.push(annotation);
                }
            }
        }
    }
    Ok(markup)
}
