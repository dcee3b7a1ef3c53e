use std::fmt;

/// A titled block of script text, the unit of `<<jump>>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DialogueNode {
    pub title: String,
    pub tags: Vec<String>,
    pub body: String,
}

impl DialogueNode {
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            tags: Vec::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Classifies a script splitting error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// The same header key appears twice in one node.
    DuplicateHeader { key: String },
    /// A header line without a `key: value` shape.
    MalformedHeader(String),
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateHeader { key } => write!(f, "duplicate header '{key}'"),
            Self::MalformedHeader(line) => write!(f, "malformed header: {line}"),
        }
    }
}

/// Error produced while splitting a script into nodes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {line}")]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub line: usize,
}

#[derive(Default)]
struct Pending {
    title: Option<String>,
    tags: Vec<String>,
    body: Vec<String>,
    seen: Vec<String>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.tags.is_empty() && self.body.is_empty() && self.seen.is_empty()
    }

    fn finish(self) -> DialogueNode {
        DialogueNode {
            title: self.title.unwrap_or_default(),
            tags: self.tags,
            body: self.body.join("\n"),
        }
    }
}

/// Split a multi-node script into nodes.
///
/// Each node is a block of `key: value` headers, a `---` line, the
/// body, and a closing `===`. Lines starting with `#` before the first
/// header are file tags and are skipped. Titles are not validated here.
///
/// # Errors
///
/// Returns `SourceError` when a header is repeated or malformed.
pub fn parse_source(source: &str) -> Result<Vec<DialogueNode>, SourceError> {
    let normalized = source.replace("\r\n", "\n").replace('\r', "\n");
    let baseline = normalized
        .lines()
        .find(|line| line.trim() == "---")
        .map_or(0, |line| line.len() - line.trim_start().len());

    let mut nodes = Vec::new();
    let mut pending = Pending::default();
    let mut in_body = false;

    for (index, raw) in normalized.lines().enumerate() {
        let line = strip_baseline(raw, baseline);
        let trimmed = line.trim();

        if in_body {
            if trimmed == "===" {
                nodes.push(std::mem::take(&mut pending).finish());
                in_body = false;
            } else {
                pending.body.push(line.to_string());
            }
            continue;
        }

        match trimmed {
            "" => {}
            "---" => in_body = true,
            "===" => nodes.push(std::mem::take(&mut pending).finish()),
            _ if trimmed.starts_with('#') && pending.is_empty() => {}
            _ => {
                let Some((key, value)) = trimmed.split_once(':') else {
                    return Err(SourceError {
                        kind: SourceErrorKind::MalformedHeader(trimmed.to_string()),
                        line: index + 1,
                    });
                };
                let key = key.trim();
                if pending.seen.iter().any(|seen| seen == key) {
                    return Err(SourceError {
                        kind: SourceErrorKind::DuplicateHeader {
                            key: key.to_string(),
                        },
                        line: index + 1,
                    });
                }
                pending.seen.push(key.to_string());
                match key {
                    "title" => pending.title = Some(value.trim().to_string()),
                    "tags" => {
                        pending.tags = value.split_whitespace().map(str::to_string).collect();
                    }
                    _ => {}
                }
            }
        }
    }

    if in_body || !pending.is_empty() {
        nodes.push(pending.finish());
    }
    Ok(nodes)
}

fn strip_baseline(line: &str, baseline: usize) -> &str {
    let indent = line.len() - line.trim_start().len();
    &line[indent.min(baseline)..]
}
