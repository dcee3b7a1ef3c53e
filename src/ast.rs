use std::fmt;

/// One statement of a node body.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Text(TextLine),
    Shortcut(Shortcut),
    Conditional(Conditional),
    Assignment(Assignment),
    Command(Command),
}

impl Statement {
    /// 1-based source line the statement starts on, when it has one.
    #[must_use]
    pub const fn line(&self) -> Option<usize> {
        match self {
            Self::Text(text) => Some(text.line),
            Self::Shortcut(shortcut) => Some(shortcut.line),
            Self::Assignment(assignment) => Some(assignment.line),
            Self::Command(Command::Generic(command)) => Some(command.line),
            Self::Conditional(_) | Self::Command(_) => None,
        }
    }

    /// Hashtags attached to the statement.
    #[must_use]
    pub fn hashtags(&self) -> &[String] {
        match self {
            Self::Text(text) => &text.hashtags,
            Self::Shortcut(shortcut) => &shortcut.hashtags,
            Self::Conditional(conditional) => &conditional.hashtags,
            Self::Assignment(assignment) => &assignment.hashtags,
            Self::Command(Command::Generic(command)) => &command.hashtags,
            Self::Command(Command::Jump { hashtags, .. } | Command::Stop { hashtags }) => hashtags,
        }
    }
}

/// A line of dialogue text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub parts: Vec<TextPart>,
    pub line: usize,
    pub hashtags: Vec<String>,
}

/// Piece of a text line, option label, or generic command.
#[derive(Debug, Clone, PartialEq)]
pub enum TextPart {
    Text(String),
    /// Character that followed a backslash.
    Escaped(String),
    /// `{expr}` interpolated at evaluation time.
    Expression(Expression),
}

/// A player choice introduced by `->`.
#[derive(Debug, Clone, PartialEq)]
pub struct Shortcut {
    pub text: Vec<TextPart>,
    /// `<<if ...>>` guard; a false guard marks the option unavailable.
    pub condition: Option<Expression>,
    /// Indented block run when the option is selected.
    pub body: Option<Vec<Statement>>,
    pub line: usize,
    pub hashtags: Vec<String>,
}

/// `<<if>>` block with its chain of `elseif`/`else` arms.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Expression,
    pub body: Vec<Statement>,
    pub otherwise: Option<Box<ElseBranch>>,
    /// Hashtags after the `<<if>>` or `<<elseif>>` that opens this arm.
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    ElseIf(Conditional),
    Else(Vec<Statement>),
}

/// `<<set $variable = value>>`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Variable name without the `$` sigil.
    pub variable: String,
    pub value: Expression,
    pub line: usize,
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Free-form `<<...>>` handed to the host.
    Generic(GenericCommand),
    Jump {
        target: JumpTarget,
        hashtags: Vec<String>,
    },
    Stop {
        hashtags: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericCommand {
    pub parts: Vec<TextPart>,
    pub line: usize,
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JumpTarget {
    Title(String),
    /// `<<jump {expr}>>`; the value's string form names the node.
    Expression(Expression),
}

/// `<<declare $variable = value [as Type]>>`, collected while parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub variable: String,
    pub initializer: Expression,
    pub explicit_type: Option<ExplicitType>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplicitType {
    String,
    Number,
    Bool,
}

impl ExplicitType {
    /// Parse the type name used after `as`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "String" => Some(Self::String),
            "Number" => Some(Self::Number),
            "Bool" => Some(Self::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for ExplicitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::Number => write!(f, "Number"),
            Self::Bool => write!(f, "Bool"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    /// Variable name without the `$` sigil.
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Call(FunctionCall),
}

impl Expression {
    #[must_use]
    pub fn unary(op: UnaryOp, operand: Self) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negate => write!(f, "-"),
            Self::Not => write!(f, "not"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Exponent,
    And,
    Or,
    Xor,
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Exponent => "**",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
        };
        f.write_str(symbol)
    }
}
