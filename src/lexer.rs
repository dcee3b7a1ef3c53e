use std::fmt;

use once_cell::sync::Lazy;

use crate::token::{Span, Token, TokenKind, unescape_string};

/// Classifies a lexer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    /// No transition of the active state matches the input.
    InvalidSyntax { mode: LexerMode, line: String },
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSyntax { mode, line } => {
                write!(f, "invalid syntax in {mode} state: {line}")
            }
        }
    }
}

/// Error produced during lexing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, column {}", span.line, span.column)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

/// Named lexer states.
///
/// The three inline-expression variants differ only in the state they
/// return to on `}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexerMode {
    Base,
    ShortcutOption,
    Command,
    Expression,
    InlineExpression,
    InlineExpressionInCommand,
    InlineExpressionInShortcut,
    Assignment,
    Declare,
    Jump,
    Stop,
}

impl fmt::Display for LexerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Base => "base",
            Self::ShortcutOption => "shortcut option",
            Self::Command => "command",
            Self::Expression => "expression",
            Self::InlineExpression => "inline expression",
            Self::InlineExpressionInCommand => "inline expression in command",
            Self::InlineExpressionInShortcut => "inline expression in shortcut",
            Self::Assignment => "assignment",
            Self::Declare => "declare",
            Self::Jump => "jump",
            Self::Stop => "stop",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Transition {
    kind: TokenKind,
    next: Option<LexerMode>,
    delimits_text: bool,
}

/// Catch-all text rule: everything up to the first delimiter.
#[derive(Debug)]
struct TextRule {
    next: Option<LexerMode>,
    delimiters: Vec<TokenKind>,
}

impl TextRule {
    fn match_len(&self, input: &str) -> usize {
        input
            .char_indices()
            .find(|&(index, _)| {
                self.delimiters
                    .iter()
                    .any(|kind| kind.match_len(&input[index..]).is_some())
            })
            .map_or(input.len(), |(index, _)| index)
    }
}

#[derive(Debug, Default)]
struct LexerState {
    transitions: Vec<Transition>,
    text_rule: Option<TextRule>,
    tracks_indentation: bool,
}

impl LexerState {
    fn on(mut self, kind: TokenKind, next: Option<LexerMode>) -> Self {
        self.transitions.push(Transition {
            kind,
            next,
            delimits_text: false,
        });
        self
    }

    fn delimiter(mut self, kind: TokenKind, next: Option<LexerMode>) -> Self {
        self.transitions.push(Transition {
            kind,
            next,
            delimits_text: true,
        });
        self
    }

    /// Synthesizes the text rule from the delimiters declared so far.
    fn text(mut self, next: Option<LexerMode>) -> Self {
        debug_assert!(self.text_rule.is_none(), "one text rule per state");
        let delimiters = self
            .transitions
            .iter()
            .filter(|t| t.delimits_text)
            .map(|t| t.kind)
            .collect();
        self.text_rule = Some(TextRule { next, delimiters });
        self
    }

    const fn tracking_indentation(mut self) -> Self {
        self.tracks_indentation = true;
        self
    }

    fn operators(self) -> Self {
        use TokenKind as K;
        [
            K::Number,
            K::String,
            K::LeftParen,
            K::RightParen,
            K::EqualTo,
            K::EqualToOrAssign,
            K::NotEqualTo,
            K::GreaterThanOrEqualTo,
            K::GreaterThan,
            K::LessThanOrEqualTo,
            K::LessThan,
            K::Add,
            K::UnaryMinus,
            K::Minus,
            K::Exponent,
            K::Multiply,
            K::Divide,
            K::Modulo,
            K::And,
            K::Or,
            K::Xor,
            K::Not,
            K::Variable,
            K::Comma,
            K::True,
            K::False,
            K::Null,
            K::Identifier,
        ]
        .into_iter()
        .fold(self, |state, kind| state.on(kind, None))
    }

    const fn has_text_rule(&self) -> bool {
        self.text_rule.is_some()
    }
}

struct StateTable {
    base: LexerState,
    shortcut_option: LexerState,
    command: LexerState,
    expression: LexerState,
    inline_expression: LexerState,
    inline_in_command: LexerState,
    inline_in_shortcut: LexerState,
    assignment: LexerState,
    declare: LexerState,
    jump: LexerState,
    stop: LexerState,
}

impl StateTable {
    fn build() -> Self {
        use LexerMode as M;
        use TokenKind as K;

        let inline = |exit: LexerMode| {
            LexerState::default()
                .on(K::EndInlineExp, Some(exit))
                .operators()
        };

        Self {
            base: LexerState::default()
                .delimiter(K::EscapedCharacter, None)
                .delimiter(K::Comment, None)
                .delimiter(K::Hashtag, None)
                .delimiter(K::BeginCommand, Some(M::Command))
                .delimiter(K::BeginInlineExp, Some(M::InlineExpression))
                .on(K::ShortcutOption, Some(M::ShortcutOption))
                .text(None),
            shortcut_option: LexerState::default()
                .tracking_indentation()
                .delimiter(K::EscapedCharacter, None)
                .delimiter(K::Comment, None)
                .delimiter(K::Hashtag, None)
                .delimiter(K::BeginCommand, Some(M::Expression))
                .delimiter(K::BeginInlineExp, Some(M::InlineExpressionInShortcut))
                .text(Some(M::Base)),
            command: LexerState::default()
                .on(K::If, Some(M::Expression))
                .on(K::ElseIf, Some(M::Expression))
                .on(K::Else, None)
                .on(K::EndIf, None)
                .on(K::Set, Some(M::Assignment))
                .on(K::Declare, Some(M::Declare))
                .on(K::Jump, Some(M::Jump))
                .on(K::Stop, Some(M::Stop))
                .delimiter(K::BeginInlineExp, Some(M::InlineExpressionInCommand))
                .delimiter(K::EndCommand, Some(M::Base))
                .text(None),
            expression: LexerState::default()
                .on(K::As, None)
                .on(K::ExplicitType, None)
                .on(K::EndCommand, Some(M::Base))
                .operators(),
            inline_expression: inline(M::Base),
            inline_in_command: inline(M::Command),
            inline_in_shortcut: inline(M::ShortcutOption),
            assignment: LexerState::default()
                .on(K::Variable, None)
                .on(K::EqualToOrAssign, Some(M::Expression)),
            declare: LexerState::default()
                .on(K::Variable, None)
                .on(K::EndCommand, Some(M::Base))
                .on(K::EqualToOrAssign, Some(M::Expression)),
            jump: LexerState::default()
                .on(K::Identifier, None)
                .delimiter(K::BeginInlineExp, Some(M::InlineExpressionInCommand))
                .delimiter(K::EndCommand, Some(M::Base)),
            stop: LexerState::default().delimiter(K::EndCommand, Some(M::Base)),
        }
    }

    const fn get(&self, mode: LexerMode) -> &LexerState {
        match mode {
            LexerMode::Base => &self.base,
            LexerMode::ShortcutOption => &self.shortcut_option,
            LexerMode::Command => &self.command,
            LexerMode::Expression => &self.expression,
            LexerMode::InlineExpression => &self.inline_expression,
            LexerMode::InlineExpressionInCommand => &self.inline_in_command,
            LexerMode::InlineExpressionInShortcut => &self.inline_in_shortcut,
            LexerMode::Assignment => &self.assignment,
            LexerMode::Declare => &self.declare,
            LexerMode::Jump => &self.jump,
            LexerMode::Stop => &self.stop,
        }
    }
}

static STATES: Lazy<StateTable> = Lazy::new(StateTable::build);

/// Tokenize a whole node body.
///
/// The returned list always ends with a single `EndOfInput` token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.lex()?;
        let done = token.kind == TokenKind::EndOfInput;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

/// Context-sensitive scanner that produces one token per call.
///
/// Indentation is tracked only after entering a shortcut option: a line
/// indented deeper than the previous one then yields `Indent`, and every
/// significant level is closed by a `Dedent` before `EndOfInput`.
#[derive(Debug, Clone)]
pub struct Lexer {
    lines: Vec<String>,
    line: usize,
    cursor: usize,
    mode: LexerMode,
    indentation: Vec<(usize, bool)>,
    track_indentation: bool,
    previous_indentation: usize,
}

impl Lexer {
    #[must_use]
    pub fn new(input: &str) -> Self {
        let mut lexer = Self {
            lines: Vec::new(),
            line: 0,
            cursor: 0,
            mode: LexerMode::Base,
            indentation: Vec::new(),
            track_indentation: false,
            previous_indentation: 0,
        };
        lexer.set_input(input);
        lexer
    }

    /// Resets all scanning state to the beginning of `input`.
    pub fn set_input(&mut self, input: &str) {
        let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
        self.lines = normalized
            .trim_end_matches('\n')
            .split('\n')
            .map(normalize_line)
            .collect();
        self.line = 0;
        self.cursor = 0;
        self.mode = LexerMode::Base;
        self.indentation = vec![(0, false)];
        self.track_indentation = false;
        self.previous_indentation = 0;
    }

    #[must_use]
    pub const fn mode(&self) -> LexerMode {
        self.mode
    }

    /// Produce the next token.
    pub fn lex(&mut self) -> Result<Token, LexError> {
        if self.at_end_of_text() {
            while let Some((_, significant)) = self.indentation.pop() {
                if significant {
                    return Ok(self.synthetic(TokenKind::Dedent));
                }
            }
            return Ok(self.synthetic(TokenKind::EndOfInput));
        }

        if self.at_end_of_line() {
            let token = self.synthetic(TokenKind::EndOfLine);
            self.advance_line();
            return Ok(token);
        }

        if self.cursor == 0 {
            if let Some(token) = self.indentation_token() {
                return Ok(token);
            }
            self.cursor = self.current_indentation();
        }

        self.match_token()
    }

    fn current_line(&self) -> &str {
        self.lines.get(self.line).map_or("", String::as_str)
    }

    fn at_end_of_line(&self) -> bool {
        self.cursor >= self.current_line().len()
    }

    fn at_end_of_text(&self) -> bool {
        self.at_end_of_line() && self.line + 1 >= self.lines.len()
    }

    fn advance_line(&mut self) {
        self.line += 1;
        self.cursor = 0;
        self.previous_indentation = self.last_indentation();
        // An option line closed by an inline expression never reached its text rule.
        if self.mode == LexerMode::ShortcutOption {
            self.mode = LexerMode::Base;
        }
    }

    fn current_indentation(&self) -> usize {
        let line = self.current_line();
        line.len() - line.trim_start().len()
    }

    fn last_indentation(&self) -> usize {
        self.indentation.last().map_or(0, |&(width, _)| width)
    }

    /// Indent or dedent owed at the start of the current line, if any.
    fn indentation_token(&mut self) -> Option<Token> {
        let width = self.current_indentation();

        if self.track_indentation {
            self.track_indentation = false;
            if width > self.previous_indentation {
                self.indentation.push((width, true));
                return Some(self.synthetic(TokenKind::Indent));
            }
        }

        while width < self.last_indentation() {
            if let Some((_, true)) = self.indentation.pop() {
                self.previous_indentation = self.last_indentation();
                return Some(self.synthetic(TokenKind::Dedent));
            }
        }

        None
    }

    fn match_token(&mut self) -> Result<Token, LexError> {
        let state = STATES.get(self.mode);
        let rest = &self.current_line()[self.cursor..];

        let matched = state
            .transitions
            .iter()
            .find_map(|t| t.kind.match_len(rest).map(|len| (t.kind, len, t.next)))
            .or_else(|| {
                let rule = state.text_rule.as_ref()?;
                let len = rule.match_len(rest);
                (len > 0).then_some((TokenKind::Text, len, rule.next))
            });

        match matched {
            Some((kind, len, next)) => Ok(self.accept(kind, len, next)),
            None => Err(LexError {
                kind: LexErrorKind::InvalidSyntax {
                    mode: self.mode,
                    line: self.current_line().to_string(),
                },
                span: self.span(self.cursor, self.current_line().len()),
            }),
        }
    }

    fn accept(&mut self, kind: TokenKind, len: usize, next: Option<LexerMode>) -> Token {
        let start = self.cursor;
        let end = start + len;
        let lexeme = &self.current_line()[start..end];
        let text = if kind == TokenKind::String {
            unescape_string(lexeme)
        } else {
            lexeme.to_string()
        };
        let span = self.span(start, end);
        self.cursor = end;

        if let Some(mode) = next {
            self.enter(mode);
        }

        let keeps_whitespace = matches!(
            kind,
            TokenKind::EndInlineExp | TokenKind::EscapedCharacter
        ) && next.is_none_or(|mode| STATES.get(mode).has_text_rule());
        if !keeps_whitespace {
            let rest = &self.current_line()[self.cursor..];
            self.cursor += rest.len() - rest.trim_start().len();
        }

        Token { kind, text, span }
    }

    fn enter(&mut self, mode: LexerMode) {
        self.mode = mode;
        if STATES.get(mode).tracks_indentation {
            self.track_indentation = true;
            let width = self.current_indentation();
            if self.last_indentation() < width {
                self.indentation.push((width, false));
            }
        }
    }

    fn synthetic(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            text: String::new(),
            span: self.span(self.cursor, self.cursor),
        }
    }

    fn span(&self, start: usize, end: usize) -> Span {
        let line = self.current_line();
        let column = |byte: usize| line.get(..byte).map_or(0, |s| s.chars().count()) + 1;
        Span {
            line: self.line + 1,
            column: column(start),
            end_column: column(end),
        }
    }
}

/// Expands leading tabs and blanks out whitespace-only lines.
fn normalize_line(line: &str) -> String {
    let body = line.trim_start();
    if body.is_empty() {
        return String::new();
    }
    let indent: String = line[..line.len() - body.len()]
        .chars()
        .map(|c| if c == '\t' { "    " } else { " " })
        .collect();
    format!("{indent}{body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind as K;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("should tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn plain_text_line() {
        let tokens = tokenize("Hello there").expect("should tokenize");
        assert_eq!(tokens[0].kind, K::Text);
        assert_eq!(tokens[0].text, "Hello there");
        assert_eq!(tokens[1].kind, K::EndOfInput);
    }

    #[test]
    fn empty_input_is_just_end() {
        assert_eq!(kinds(""), vec![K::EndOfInput]);
    }

    #[test]
    fn trailing_blank_lines_are_trimmed() {
        assert_eq!(kinds("Hi\r\n\r\n\n"), vec![K::Text, K::EndOfInput]);
    }

    #[test]
    fn inline_expression_preserves_following_space() {
        let tokens = tokenize("Hi {$name} there").expect("should tokenize");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["Hi ", "{", "$name", "}", " there", ""]);
    }

    #[test]
    fn command_keywords_switch_state() {
        assert_eq!(
            kinds("<<set $x to 1 + 2>>"),
            vec![
                K::BeginCommand,
                K::Set,
                K::Variable,
                K::EqualToOrAssign,
                K::Number,
                K::Add,
                K::Number,
                K::EndCommand,
                K::EndOfInput,
            ]
        );
    }

    #[test]
    fn generic_command_is_text() {
        let tokens = tokenize("<<wait 2>>").expect("should tokenize");
        assert_eq!(tokens[1].kind, K::Text);
        assert_eq!(tokens[1].text, "wait 2");
        assert_eq!(tokens[2].kind, K::EndCommand);
    }

    #[test]
    fn hashtags_and_comments_delimit_text() {
        assert_eq!(
            kinds("Hello #greeting // note"),
            vec![K::Text, K::Hashtag, K::Comment, K::EndOfInput]
        );
    }

    #[test]
    fn escaped_character_keeps_neighbouring_space() {
        let tokens = tokenize(r"a \{ b").expect("should tokenize");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a ", r"\{", " b", ""]);
    }

    #[test]
    fn shortcut_block_indents_and_dedents() {
        assert_eq!(
            kinds("-> A\n    inside\nafter"),
            vec![
                K::ShortcutOption,
                K::Text,
                K::EndOfLine,
                K::Indent,
                K::Text,
                K::EndOfLine,
                K::Dedent,
                K::Text,
                K::EndOfInput,
            ]
        );
    }

    #[test]
    fn indentation_without_shortcut_is_ignored() {
        assert_eq!(
            kinds("one\n    two\nthree"),
            vec![
                K::Text,
                K::EndOfLine,
                K::Text,
                K::EndOfLine,
                K::Text,
                K::EndOfInput
            ]
        );
    }

    #[test]
    fn pending_dedents_flush_at_end() {
        let tokens = kinds("-> A\n    -> B\n        deep");
        let indents = tokens.iter().filter(|k| **k == K::Indent).count();
        let dedents = tokens.iter().filter(|k| **k == K::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        assert_eq!(tokens.last(), Some(&K::EndOfInput));
    }

    #[test]
    fn declare_with_explicit_type() {
        assert_eq!(
            kinds("<<declare $gold = 0 as Number>>"),
            vec![
                K::BeginCommand,
                K::Declare,
                K::Variable,
                K::EqualToOrAssign,
                K::Number,
                K::As,
                K::ExplicitType,
                K::EndCommand,
                K::EndOfInput,
            ]
        );
    }

    #[test]
    fn jump_target_is_identifier() {
        let tokens = tokenize("<<jump Shop.Front>>").expect("should tokenize");
        assert_eq!(tokens[1].kind, K::Jump);
        assert_eq!(tokens[2].kind, K::Identifier);
        assert_eq!(tokens[2].text, "Shop.Front");
    }

    #[test]
    fn invalid_expression_reports_line() {
        let err = tokenize("<<if $x @ 2>>").expect_err("should fail");
        assert!(matches!(
            err.kind,
            LexErrorKind::InvalidSyntax { mode: LexerMode::Expression, ref line } if line == "<<if $x @ 2>>"
        ));
        assert_eq!(err.span.line, 1);
        assert_eq!(err.span.column, 9);
    }

    #[test]
    fn spans_count_characters() {
        let tokens = tokenize("héllo {1}").expect("should tokenize");
        assert_eq!(tokens[1].span.column, 7);
        assert_eq!(tokens[1].span.line, 1);
    }

    #[test]
    fn tabs_count_as_four_columns() {
        let tokens = kinds("-> A\n\tinside");
        assert!(tokens.contains(&K::Indent));
    }

    #[test]
    fn set_input_resets_state() {
        let mut lexer = Lexer::new("<<if true>>");
        lexer.lex().expect("should lex");
        assert_eq!(lexer.mode(), LexerMode::Command);
        lexer.set_input("plain");
        assert_eq!(lexer.mode(), LexerMode::Base);
        assert_eq!(lexer.lex().expect("should lex").kind, K::Text);
    }
}
