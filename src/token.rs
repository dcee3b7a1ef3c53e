use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Source location for error reporting.
///
/// Lines and columns are 1-based; columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub end_column: usize,
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Run of plain text up to the next delimiter.
    Text,
    /// End of a source line.
    EndOfLine,
    /// End of the whole input.
    EndOfInput,
    /// Entry into an indentation-significant block.
    Indent,
    /// Exit from an indentation-significant block.
    Dedent,
    Number,
    /// Double-quoted string; the token text holds the unescaped contents.
    String,
    /// `<<`
    BeginCommand,
    /// `>>`
    EndCommand,
    /// `$name`
    Variable,
    /// `->`
    ShortcutOption,
    /// `#tag`
    Hashtag,
    /// `// ...`
    Comment,
    If,
    ElseIf,
    Else,
    EndIf,
    Jump,
    Stop,
    Set,
    Declare,
    As,
    /// `String`, `Number` or `Bool` directly before `>>`.
    ExplicitType,
    True,
    False,
    Null,
    LeftParen,
    RightParen,
    Comma,
    /// `-` glued to its operand.
    UnaryMinus,
    EqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    NotEqualTo,
    Or,
    And,
    Xor,
    Not,
    /// `=` or `to`; assignment or equality depending on position.
    EqualToOrAssign,
    Add,
    Minus,
    Exponent,
    Multiply,
    Divide,
    Modulo,
    Identifier,
    /// Backslash followed by any character.
    EscapedCharacter,
    /// `{`
    BeginInlineExp,
    /// `}`
    EndInlineExp,
}

impl TokenKind {
    /// Length in bytes of this kind's lexeme at the start of `input`.
    ///
    /// Synthetic kinds (text, line ends, indentation) never match.
    pub(crate) fn match_len(self, input: &str) -> Option<usize> {
        PATTERNS.get(&self)?.match_len(input)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::EndOfLine => "end of line",
            Self::EndOfInput => "end of input",
            Self::Indent => "indent",
            Self::Dedent => "dedent",
            Self::Number => "number",
            Self::String => "string",
            Self::BeginCommand => "'<<'",
            Self::EndCommand => "'>>'",
            Self::Variable => "variable",
            Self::ShortcutOption => "'->'",
            Self::Hashtag => "hashtag",
            Self::Comment => "comment",
            Self::If => "'if'",
            Self::ElseIf => "'elseif'",
            Self::Else => "'else'",
            Self::EndIf => "'endif'",
            Self::Jump => "'jump'",
            Self::Stop => "'stop'",
            Self::Set => "'set'",
            Self::Declare => "'declare'",
            Self::As => "'as'",
            Self::ExplicitType => "type name",
            Self::True => "'true'",
            Self::False => "'false'",
            Self::Null => "'null'",
            Self::LeftParen => "'('",
            Self::RightParen => "')'",
            Self::Comma => "','",
            Self::UnaryMinus | Self::Minus => "'-'",
            Self::EqualTo => "'=='",
            Self::GreaterThan => "'>'",
            Self::GreaterThanOrEqualTo => "'>='",
            Self::LessThan => "'<'",
            Self::LessThanOrEqualTo => "'<='",
            Self::NotEqualTo => "'!='",
            Self::Or => "'or'",
            Self::And => "'and'",
            Self::Xor => "'xor'",
            Self::Not => "'not'",
            Self::EqualToOrAssign => "'='",
            Self::Add => "'+'",
            Self::Exponent => "'**'",
            Self::Multiply => "'*'",
            Self::Divide => "'/'",
            Self::Modulo => "'%'",
            Self::Identifier => "identifier",
            Self::EscapedCharacter => "escaped character",
            Self::BeginInlineExp => "'{'",
            Self::EndInlineExp => "'}'",
        };
        f.write_str(name)
    }
}

/// A single token with its kind, text, and source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

/// Lookahead condition checked after the regex matched.
#[derive(Debug, Clone, Copy)]
enum Guard {
    None,
    /// A lexeme ending in a word character must not be followed by one.
    WordBoundary,
    /// The lexeme must be directly followed by this literal.
    FollowedBy(&'static str),
    /// The lexeme must not be followed by whitespace.
    NotFollowedByWhitespace,
}

#[derive(Debug)]
struct Pattern {
    regex: Regex,
    guard: Guard,
}

impl Pattern {
    fn new(source: &str, guard: Guard) -> Self {
        let anchored = format!("^(?:{source})");
        Self {
            regex: Regex::new(&anchored).expect("token patterns are valid regexes"),
            guard,
        }
    }

    fn match_len(&self, input: &str) -> Option<usize> {
        let len = self.regex.find(input)?.end();
        if len == 0 {
            return None;
        }
        let (lexeme, rest) = input.split_at(len);
        let accepted = match self.guard {
            Guard::None => true,
            Guard::WordBoundary => {
                !lexeme.ends_with(is_word_char) || !rest.starts_with(is_word_char)
            }
            Guard::FollowedBy(literal) => rest.starts_with(literal),
            Guard::NotFollowedByWhitespace => !rest.starts_with(char::is_whitespace),
        };
        accepted.then_some(len)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

static PATTERNS: Lazy<HashMap<TokenKind, Pattern>> = Lazy::new(|| {
    use Guard::{FollowedBy, None as Plain, NotFollowedByWhitespace, WordBoundary};
    use TokenKind as K;

    let table: &[(TokenKind, &str, Guard)] = &[
        (K::Number, r"[0-9]+(?:\.[0-9]+)?", Plain),
        (K::String, r#""[^"\\]*(?:\\.[^"\\]*)*""#, Plain),
        (K::BeginCommand, "<<", Plain),
        (K::EndCommand, ">>", Plain),
        (K::Variable, r"\$[A-Za-z0-9_.]+", Plain),
        (K::ShortcutOption, "->", Plain),
        (K::Hashtag, r"#[^\s#/()|]+", Plain),
        (K::Comment, "//.*", Plain),
        (K::If, "if", WordBoundary),
        (K::ElseIf, "elseif", WordBoundary),
        (K::Else, "else", WordBoundary),
        (K::EndIf, "endif", WordBoundary),
        (K::Jump, "jump", WordBoundary),
        (K::Stop, "stop", WordBoundary),
        (K::Set, "set", WordBoundary),
        (K::Declare, "declare", WordBoundary),
        (K::As, "as", WordBoundary),
        (K::ExplicitType, "String|Number|Bool", FollowedBy(">>")),
        (K::True, "true", WordBoundary),
        (K::False, "false", WordBoundary),
        (K::Null, "null", WordBoundary),
        (K::LeftParen, r"\(", Plain),
        (K::RightParen, r"\)", Plain),
        (K::Comma, ",", Plain),
        (K::UnaryMinus, "-", NotFollowedByWhitespace),
        (K::EqualTo, "==|is|eq", WordBoundary),
        (K::GreaterThan, ">|gt", WordBoundary),
        (K::GreaterThanOrEqualTo, ">=|gte", WordBoundary),
        (K::LessThan, "<|lt", WordBoundary),
        (K::LessThanOrEqualTo, "<=|lte", WordBoundary),
        (K::NotEqualTo, "!=|neq", WordBoundary),
        (K::Or, r"\|\||or", WordBoundary),
        (K::And, "&&|and", WordBoundary),
        (K::Xor, r"\^|xor", WordBoundary),
        (K::Not, "!|not", WordBoundary),
        (K::EqualToOrAssign, "=|to", WordBoundary),
        (K::Add, r"\+", Plain),
        (K::Minus, "-", Plain),
        (K::Exponent, r"\*\*", Plain),
        (K::Multiply, r"\*", Plain),
        (K::Divide, "/", Plain),
        (K::Modulo, "%", Plain),
        (K::Identifier, "[a-zA-Z0-9_:.]+", Plain),
        (K::EscapedCharacter, r"\\.", Plain),
        (K::BeginInlineExp, r"\{", Plain),
        (K::EndInlineExp, r"\}", Plain),
    ];

    table
        .iter()
        .map(|&(kind, source, guard)| (kind, Pattern::new(source, guard)))
        .collect()
});

/// Strips the quotes from a string lexeme and resolves its escapes.
pub(crate) fn unescape_string(lexeme: &str) -> String {
    let inner = lexeme
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(lexeme);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_respect_word_boundaries() {
        assert_eq!(TokenKind::If.match_len("if $x"), Some(2));
        assert_eq!(TokenKind::If.match_len("iffy"), None);
        assert_eq!(TokenKind::Set.match_len("set_speed 2"), None);
        assert_eq!(TokenKind::EqualTo.match_len("is 5"), Some(2));
        assert_eq!(TokenKind::EqualTo.match_len("island"), None);
    }

    #[test]
    fn symbolic_operators_need_no_boundary() {
        assert_eq!(TokenKind::EqualTo.match_len("==5"), Some(2));
        assert_eq!(TokenKind::GreaterThanOrEqualTo.match_len(">=1"), Some(2));
        assert_eq!(TokenKind::Not.match_len("!$done"), Some(1));
    }

    #[test]
    fn explicit_type_must_close_command() {
        assert_eq!(TokenKind::ExplicitType.match_len("Number>>"), Some(6));
        assert_eq!(TokenKind::ExplicitType.match_len("Number >>"), None);
    }

    #[test]
    fn unary_minus_is_glued() {
        assert_eq!(TokenKind::UnaryMinus.match_len("-3"), Some(1));
        assert_eq!(TokenKind::UnaryMinus.match_len("- 3"), None);
        assert_eq!(TokenKind::Minus.match_len("- 3"), Some(1));
    }

    #[test]
    fn string_pattern_spans_escaped_quotes() {
        let input = r#""say \"hi\"" rest"#;
        assert_eq!(TokenKind::String.match_len(input), Some(12));
        assert_eq!(unescape_string(&input[..12]), r#"say "hi""#);
    }

    #[test]
    fn unescape_collapses_backslashes_once() {
        assert_eq!(unescape_string(r#""a\\b""#), r"a\b");
        assert_eq!(unescape_string(r#""\\\"""#), r#"\""#);
    }

    #[test]
    fn synthetic_kinds_never_match() {
        assert_eq!(TokenKind::Text.match_len("anything"), None);
        assert_eq!(TokenKind::Indent.match_len("    "), None);
    }

    #[test]
    fn hashtag_stops_at_separators() {
        assert_eq!(TokenKind::Hashtag.match_len("#line:a1 #b"), Some(8));
        assert_eq!(TokenKind::Hashtag.match_len("# spaced"), None);
    }
}
