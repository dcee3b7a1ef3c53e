use std::fmt;

use crate::ast::{
    Assignment, BinaryOp, Command, Conditional, Declaration, ElseBranch, ExplicitType,
    Expression, FunctionCall, GenericCommand, JumpTarget, Literal, Shortcut, Statement, TextLine,
    TextPart, UnaryOp,
};
use crate::lexer::{LexError, LexErrorKind, Lexer};
use crate::token::{Span, Token, TokenKind};

/// Classifies a parser error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A token the grammar does not allow at this point.
    UnexpectedToken {
        found: TokenKind,
        lexeme: String,
        expected: Vec<TokenKind>,
    },
    /// A second `<<declare>>` for the same variable.
    DuplicateDeclaration { variable: String },
    /// Numeric literal that does not fit an `f64`.
    InvalidNumber(String),
    /// The lexer gave up before the parser did.
    Lex(LexErrorKind),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedToken {
                found,
                lexeme,
                expected,
            } => {
                if lexeme.is_empty() {
                    write!(f, "unexpected {found}")?;
                } else {
                    write!(f, "unexpected {found} '{lexeme}'")?;
                }
                if !expected.is_empty() {
                    let names: Vec<String> = expected.iter().map(ToString::to_string).collect();
                    write!(f, ", expected one of: {}", names.join(", "))?;
                }
                Ok(())
            }
            Self::DuplicateDeclaration { variable } => {
                write!(f, "duplicate declaration found for variable ${variable}")
            }
            Self::InvalidNumber(text) => write!(f, "invalid number: {text}"),
            Self::Lex(kind) => write!(f, "{kind}"),
        }
    }
}

/// Error produced during parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, column {}", span.line, span.column)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        Self {
            kind: ParseErrorKind::Lex(error.kind),
            span: error.span,
        }
    }
}

/// Declarations table shared across parse calls.
///
/// While unlocked, every `<<declare>>` is recorded and duplicates are
/// rejected. Once locked, declarations parse but are ignored.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    declarations: Vec<Declaration>,
    locked: bool,
}

impl ParseContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that ignores every declaration.
    #[must_use]
    pub const fn locked() -> Self {
        Self {
            declarations: Vec::new(),
            locked: true,
        }
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Clear the table and accept declarations again.
    pub fn reset(&mut self) {
        self.declarations.clear();
        self.locked = false;
    }

    /// Clear the table and ignore declarations from now on.
    pub fn lock(&mut self) {
        self.declarations.clear();
        self.locked = true;
    }

    fn register(&mut self, declaration: Declaration, span: Span) -> Result<(), ParseError> {
        if self.locked {
            return Ok(());
        }
        if self
            .declarations
            .iter()
            .any(|d| d.variable == declaration.variable)
        {
            return Err(ParseError {
                kind: ParseErrorKind::DuplicateDeclaration {
                    variable: declaration.variable,
                },
                span,
            });
        }
        self.declarations.push(declaration);
        Ok(())
    }
}

/// Parse a node body into its statements.
///
/// `<<declare>>` statements are recorded in `context` rather than
/// returned.
///
/// # Errors
///
/// Returns `ParseError` on the first lexical or syntax error.
#[tracing::instrument(skip_all, fields(len = body.len()))]
pub fn parse(body: &str, context: &mut ParseContext) -> Result<Vec<Statement>, ParseError> {
    Parser::new(body, context).parse_node()
}

/// Parse a standalone body with a throwaway declarations table.
///
/// # Errors
///
/// Returns `ParseError` on the first lexical or syntax error.
pub fn parse_body(body: &str) -> Result<Vec<Statement>, ParseError> {
    parse(body, &mut ParseContext::new())
}

const STATEMENT_START: &[TokenKind] = &[
    TokenKind::Text,
    TokenKind::EscapedCharacter,
    TokenKind::BeginInlineExp,
    TokenKind::BeginCommand,
    TokenKind::ShortcutOption,
];

const EXPRESSION_START: &[TokenKind] = &[
    TokenKind::Number,
    TokenKind::String,
    TokenKind::True,
    TokenKind::False,
    TokenKind::Null,
    TokenKind::Variable,
    TokenKind::Identifier,
    TokenKind::LeftParen,
    TokenKind::Minus,
    TokenKind::Not,
];

const COMMAND_START: &[TokenKind] = &[
    TokenKind::If,
    TokenKind::Set,
    TokenKind::Declare,
    TokenKind::Jump,
    TokenKind::Stop,
    TokenKind::Text,
    TokenKind::BeginInlineExp,
];

// Binding powers, lowest first. Right-associative operators bind
// tighter on the left.
const BP_NOT: u8 = 5;
const BP_NEGATE: u8 = 17;

const fn infix_binding(kind: TokenKind) -> Option<(BinaryOp, u8, u8)> {
    let binding = match kind {
        TokenKind::Or => (BinaryOp::Or, 1, 2),
        TokenKind::Xor => (BinaryOp::Xor, 1, 2),
        TokenKind::And => (BinaryOp::And, 3, 4),
        TokenKind::EqualTo | TokenKind::EqualToOrAssign => (BinaryOp::Equal, 7, 8),
        TokenKind::NotEqualTo => (BinaryOp::NotEqual, 7, 8),
        TokenKind::GreaterThan => (BinaryOp::Greater, 9, 10),
        TokenKind::GreaterThanOrEqualTo => (BinaryOp::GreaterOrEqual, 9, 10),
        TokenKind::LessThan => (BinaryOp::Less, 9, 10),
        TokenKind::LessThanOrEqualTo => (BinaryOp::LessOrEqual, 9, 10),
        TokenKind::Add => (BinaryOp::Add, 11, 12),
        TokenKind::Minus | TokenKind::UnaryMinus => (BinaryOp::Subtract, 11, 12),
        TokenKind::Multiply => (BinaryOp::Multiply, 13, 14),
        TokenKind::Divide => (BinaryOp::Divide, 13, 14),
        TokenKind::Modulo => (BinaryOp::Modulo, 13, 14),
        TokenKind::Exponent => (BinaryOp::Exponent, 16, 15),
        _ => return None,
    };
    Some(binding)
}

/// How a statement block ended.
enum BlockEnd {
    EndOfInput,
    Dedent,
    Else,
    ElseIf(Expression, Vec<String>),
    EndIf,
}

impl BlockEnd {
    const fn kind(&self) -> TokenKind {
        match self {
            Self::EndOfInput => TokenKind::EndOfInput,
            Self::Dedent => TokenKind::Dedent,
            Self::Else => TokenKind::Else,
            Self::ElseIf(..) => TokenKind::ElseIf,
            Self::EndIf => TokenKind::EndIf,
        }
    }
}

struct Block {
    statements: Vec<Statement>,
    end: BlockEnd,
    span: Span,
}

fn unexpected(token: &Token, expected: &[TokenKind]) -> ParseError {
    ParseError {
        kind: ParseErrorKind::UnexpectedToken {
            found: token.kind,
            lexeme: token.text.clone(),
            expected: expected.to_vec(),
        },
        span: token.span,
    }
}

fn misplaced(end: &BlockEnd, span: Span, expected: &[TokenKind]) -> ParseError {
    ParseError {
        kind: ParseErrorKind::UnexpectedToken {
            found: end.kind(),
            lexeme: String::new(),
            expected: expected.to_vec(),
        },
        span,
    }
}

fn variable_name(token: &Token) -> String {
    token.text.trim_start_matches('$').to_string()
}

struct Parser<'c> {
    lexer: Lexer,
    lookahead: Option<Token>,
    context: &'c mut ParseContext,
}

impl<'c> Parser<'c> {
    fn new(body: &str, context: &'c mut ParseContext) -> Self {
        Self {
            lexer: Lexer::new(body),
            lookahead: None,
            context,
        }
    }

    fn peek(&mut self) -> Result<&Token, ParseError> {
        let token = match self.lookahead.take() {
            Some(token) => token,
            None => self.lexer.lex()?,
        };
        Ok(self.lookahead.insert(token))
    }

    fn peek_kind(&mut self) -> Result<TokenKind, ParseError> {
        Ok(self.peek()?.kind)
    }

    fn bump(&mut self) -> Result<Token, ParseError> {
        match self.lookahead.take() {
            Some(token) => Ok(token),
            None => Ok(self.lexer.lex()?),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let token = self.bump()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(unexpected(&token, &[kind]))
        }
    }

    fn parse_node(mut self) -> Result<Vec<Statement>, ParseError> {
        let block = self.parse_block()?;
        match block.end {
            BlockEnd::EndOfInput => Ok(block.statements),
            other => Err(misplaced(&other, block.span, STATEMENT_START)),
        }
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let mut statements = Vec::new();
        loop {
            let token = self.peek()?;
            let (kind, span) = (token.kind, token.span);
            let end = match kind {
                TokenKind::EndOfLine | TokenKind::Comment => {
                    self.bump()?;
                    continue;
                }
                TokenKind::EndOfInput => BlockEnd::EndOfInput,
                TokenKind::Dedent => {
                    self.bump()?;
                    BlockEnd::Dedent
                }
                TokenKind::ShortcutOption => {
                    statements.push(Statement::Shortcut(self.parse_shortcut()?));
                    continue;
                }
                TokenKind::Text | TokenKind::EscapedCharacter | TokenKind::BeginInlineExp => {
                    statements.push(self.parse_text()?);
                    continue;
                }
                TokenKind::BeginCommand => {
                    let open = self.bump()?;
                    match self.parse_command(&open)? {
                        Some(CommandOutcome::Statement(statement)) => statements.push(statement),
                        Some(CommandOutcome::End(end)) => {
                            return Ok(Block {
                                statements,
                                end,
                                span,
                            });
                        }
                        None => {}
                    }
                    continue;
                }
                _ => {
                    let token = self.bump()?;
                    return Err(unexpected(&token, STATEMENT_START));
                }
            };
            return Ok(Block {
                statements,
                end,
                span,
            });
        }
    }

    /// Hashtags and comments closing a statement, plus its line break.
    fn parse_trailer(&mut self) -> Result<Vec<String>, ParseError> {
        let mut hashtags = Vec::new();
        loop {
            match self.peek_kind()? {
                TokenKind::Hashtag => {
                    let token = self.bump()?;
                    hashtags.push(token.text.trim_start_matches('#').to_string());
                }
                TokenKind::Comment => {
                    self.bump()?;
                }
                TokenKind::EndOfLine => {
                    self.bump()?;
                    return Ok(hashtags);
                }
                _ => return Ok(hashtags),
            }
        }
    }

    fn parse_text(&mut self) -> Result<Statement, ParseError> {
        let line = self.peek()?.span.line;
        let parts = self.parse_text_parts()?;
        let hashtags = self.parse_trailer()?;
        Ok(Statement::Text(TextLine {
            parts,
            line,
            hashtags,
        }))
    }

    fn parse_text_parts(&mut self) -> Result<Vec<TextPart>, ParseError> {
        let mut parts = Vec::new();
        loop {
            match self.peek_kind()? {
                TokenKind::Text => parts.push(TextPart::Text(self.bump()?.text)),
                TokenKind::EscapedCharacter => {
                    let token = self.bump()?;
                    let escaped = token.text.strip_prefix('\\').unwrap_or(&token.text);
                    parts.push(TextPart::Escaped(escaped.to_string()));
                }
                TokenKind::BeginInlineExp => parts.push(self.parse_inline_expression()?),
                _ => return Ok(parts),
            }
        }
    }

    fn parse_inline_expression(&mut self) -> Result<TextPart, ParseError> {
        self.expect(TokenKind::BeginInlineExp)?;
        let expression = self.parse_expression()?;
        self.expect(TokenKind::EndInlineExp)?;
        Ok(TextPart::Expression(expression))
    }

    fn parse_shortcut(&mut self) -> Result<Shortcut, ParseError> {
        let arrow = self.expect(TokenKind::ShortcutOption)?;
        let text = self.parse_text_parts()?;
        if text.is_empty() {
            let token = self.bump()?;
            return Err(unexpected(
                &token,
                &[TokenKind::Text, TokenKind::BeginInlineExp],
            ));
        }

        let condition = if self.peek_kind()? == TokenKind::BeginCommand {
            self.bump()?;
            self.expect(TokenKind::If)?;
            let condition = self.parse_expression()?;
            self.expect(TokenKind::EndCommand)?;
            Some(condition)
        } else {
            None
        };

        let hashtags = self.parse_trailer()?;

        let body = if self.peek_kind()? == TokenKind::Indent {
            self.bump()?;
            let block = self.parse_block()?;
            if !matches!(block.end, BlockEnd::Dedent) {
                return Err(misplaced(&block.end, block.span, &[TokenKind::Dedent]));
            }
            Some(block.statements)
        } else {
            None
        };

        Ok(Shortcut {
            text,
            condition,
            body,
            line: arrow.span.line,
            hashtags,
        })
    }

    /// Everything after `<<`.
    fn parse_command(&mut self, open: &Token) -> Result<Option<CommandOutcome>, ParseError> {
        let outcome = match self.peek_kind()? {
            TokenKind::If => {
                self.bump()?;
                let (condition, hashtags) = self.parse_condition()?;
                CommandOutcome::Statement(Statement::Conditional(
                    self.parse_arms(condition, hashtags)?,
                ))
            }
            TokenKind::ElseIf => {
                self.bump()?;
                let (condition, hashtags) = self.parse_condition()?;
                CommandOutcome::End(BlockEnd::ElseIf(condition, hashtags))
            }
            // `else` and `endif` close a block and leave no statement to tag.
            TokenKind::Else => {
                self.bump()?;
                self.close_command()?;
                CommandOutcome::End(BlockEnd::Else)
            }
            TokenKind::EndIf => {
                self.bump()?;
                self.close_command()?;
                CommandOutcome::End(BlockEnd::EndIf)
            }
            TokenKind::Set => {
                self.bump()?;
                CommandOutcome::Statement(self.parse_assignment(open)?)
            }
            TokenKind::Declare => {
                self.bump()?;
                self.parse_declaration(open)?;
                return Ok(None);
            }
            TokenKind::Jump => {
                self.bump()?;
                let target = match self.peek_kind()? {
                    TokenKind::Identifier => JumpTarget::Title(self.bump()?.text),
                    TokenKind::BeginInlineExp => {
                        self.bump()?;
                        let expression = self.parse_expression()?;
                        self.expect(TokenKind::EndInlineExp)?;
                        JumpTarget::Expression(expression)
                    }
                    _ => {
                        let token = self.bump()?;
                        return Err(unexpected(
                            &token,
                            &[TokenKind::Identifier, TokenKind::BeginInlineExp],
                        ));
                    }
                };
                let hashtags = self.close_command()?;
                CommandOutcome::Statement(Statement::Command(Command::Jump { target, hashtags }))
            }
            TokenKind::Stop => {
                self.bump()?;
                let hashtags = self.close_command()?;
                CommandOutcome::Statement(Statement::Command(Command::Stop { hashtags }))
            }
            TokenKind::Text | TokenKind::BeginInlineExp => {
                CommandOutcome::Statement(self.parse_generic_command(open)?)
            }
            _ => {
                let token = self.bump()?;
                return Err(unexpected(&token, COMMAND_START));
            }
        };
        Ok(Some(outcome))
    }

    /// `>>` plus whatever trails the command on its line.
    fn close_command(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(TokenKind::EndCommand)?;
        self.parse_trailer()
    }

    fn parse_condition(&mut self) -> Result<(Expression, Vec<String>), ParseError> {
        let condition = self.parse_expression()?;
        let hashtags = self.close_command()?;
        Ok((condition, hashtags))
    }

    fn parse_arms(
        &mut self,
        condition: Expression,
        hashtags: Vec<String>,
    ) -> Result<Conditional, ParseError> {
        let block = self.parse_block()?;
        let otherwise = match block.end {
            BlockEnd::EndIf => None,
            BlockEnd::ElseIf(next, tags) => {
                Some(Box::new(ElseBranch::ElseIf(self.parse_arms(next, tags)?)))
            }
            BlockEnd::Else => {
                let rest = self.parse_block()?;
                if !matches!(rest.end, BlockEnd::EndIf) {
                    return Err(misplaced(&rest.end, rest.span, &[TokenKind::EndIf]));
                }
                Some(Box::new(ElseBranch::Else(rest.statements)))
            }
            other => {
                return Err(misplaced(
                    &other,
                    block.span,
                    &[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndIf],
                ));
            }
        };
        Ok(Conditional {
            condition,
            body: block.statements,
            otherwise,
            hashtags,
        })
    }

    fn parse_assignment(&mut self, open: &Token) -> Result<Statement, ParseError> {
        let variable = variable_name(&self.expect(TokenKind::Variable)?);
        self.expect(TokenKind::EqualToOrAssign)?;
        let value = self.parse_expression()?;
        let hashtags = self.close_command()?;
        Ok(Statement::Assignment(Assignment {
            variable,
            value,
            line: open.span.line,
            hashtags,
        }))
    }

    fn parse_declaration(&mut self, open: &Token) -> Result<(), ParseError> {
        let variable_token = self.expect(TokenKind::Variable)?;
        self.expect(TokenKind::EqualToOrAssign)?;
        let initializer = self.parse_expression()?;

        let explicit_type = if self.peek_kind()? == TokenKind::As {
            self.bump()?;
            let token = self.expect(TokenKind::ExplicitType)?;
            let Some(explicit_type) = ExplicitType::from_name(&token.text) else {
                return Err(unexpected(&token, &[TokenKind::ExplicitType]));
            };
            Some(explicit_type)
        } else {
            None
        };
        self.close_command()?;

        let declaration = Declaration {
            variable: variable_name(&variable_token),
            initializer,
            explicit_type,
            line: open.span.line,
        };
        self.context.register(declaration, variable_token.span)
    }

    fn parse_generic_command(&mut self, open: &Token) -> Result<Statement, ParseError> {
        let mut parts = Vec::new();
        loop {
            match self.peek_kind()? {
                TokenKind::Text => parts.push(TextPart::Text(self.bump()?.text)),
                TokenKind::BeginInlineExp => parts.push(self.parse_inline_expression()?),
                TokenKind::EndCommand if !parts.is_empty() => break,
                _ => {
                    let token = self.bump()?;
                    return Err(unexpected(
                        &token,
                        &[
                            TokenKind::Text,
                            TokenKind::BeginInlineExp,
                            TokenKind::EndCommand,
                        ],
                    ));
                }
            }
        }
        let hashtags = self.close_command()?;
        Ok(Statement::Command(Command::Generic(GenericCommand {
            parts,
            line: open.span.line,
            hashtags,
        })))
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_binding(0)
    }

    fn parse_binding(&mut self, min_bp: u8) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_prefix()?;
        while let Some((op, left_bp, right_bp)) = infix_binding(self.peek_kind()?) {
            if left_bp < min_bp {
                break;
            }
            self.bump()?;
            let rhs = self.parse_binding(right_bp)?;
            lhs = Expression::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expression, ParseError> {
        let token = self.bump()?;
        let expression = match token.kind {
            TokenKind::Number => {
                let value = token.text.parse::<f64>().map_err(|_| ParseError {
                    kind: ParseErrorKind::InvalidNumber(token.text.clone()),
                    span: token.span,
                })?;
                Expression::Literal(Literal::Number(value))
            }
            TokenKind::String => Expression::Literal(Literal::String(token.text)),
            TokenKind::True => Expression::Literal(Literal::Bool(true)),
            TokenKind::False => Expression::Literal(Literal::Bool(false)),
            TokenKind::Null => Expression::Literal(Literal::Null),
            TokenKind::Variable => Expression::Variable(variable_name(&token)),
            TokenKind::LeftParen => {
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RightParen)?;
                inner
            }
            TokenKind::Identifier => Expression::Call(self.parse_call(token.text)?),
            TokenKind::Not => Expression::unary(UnaryOp::Not, self.parse_binding(BP_NOT)?),
            TokenKind::Minus | TokenKind::UnaryMinus => {
                Expression::unary(UnaryOp::Negate, self.parse_binding(BP_NEGATE)?)
            }
            _ => return Err(unexpected(&token, EXPRESSION_START)),
        };
        Ok(expression)
    }

    fn parse_call(&mut self, name: String) -> Result<FunctionCall, ParseError> {
        self.expect(TokenKind::LeftParen)?;
        let mut args = Vec::new();
        if self.peek_kind()? == TokenKind::RightParen {
            self.bump()?;
            return Ok(FunctionCall { name, args });
        }
        loop {
            args.push(self.parse_expression()?);
            let token = self.bump()?;
            match token.kind {
                TokenKind::Comma => {}
                TokenKind::RightParen => return Ok(FunctionCall { name, args }),
                _ => {
                    return Err(unexpected(
                        &token,
                        &[TokenKind::Comma, TokenKind::RightParen],
                    ));
                }
            }
        }
    }
}

enum CommandOutcome {
    Statement(Statement),
    End(BlockEnd),
}
