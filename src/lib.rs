//! Interpreter for Yarn-style branching dialogue scripts.
//!
//! Scripts are split into titled nodes, lexed with an
//! indentation-aware lexer, parsed into a typed AST and run by a
//! resumable evaluator that suspends at every line, option set and
//! command. Rendered lines go through a markup pass that extracts
//! character labels, bracket tags and plural substitutions.
//!
//! # Quick start
//!
//! ## Drive a dialogue
//!
//! ```
//! use yarnbound_rs::{Dialogue, DialogueOptions, DialogueResult};
//!
//! let script = "\
//! title: Start
//! ---
//! Guide: Pick a door.
//! -> Left
//!     It creaks open.
//! -> Right
//! ===
//! ";
//! let mut dialogue = Dialogue::from_source(script, DialogueOptions::default()).unwrap();
//! assert_eq!(dialogue.current().and_then(DialogueResult::as_text).unwrap().text, "Pick a door.");
//!
//! dialogue.advance(None).unwrap();
//! let options = dialogue.current().and_then(DialogueResult::as_options).unwrap();
//! assert_eq!(options.options.len(), 2);
//!
//! dialogue.advance(Some(0)).unwrap();
//! let text = dialogue.current().and_then(DialogueResult::as_text).unwrap();
//! assert_eq!(text.text, "It creaks open.");
//! assert!(dialogue.is_finished());
//! ```
//!
//! ## Step a runner directly
//!
//! ```
//! use yarnbound_rs::{DialogueNode, Runner};
//!
//! let mut runner = Runner::new();
//! runner
//!     .load(vec![DialogueNode::new("Start", "<<declare $x = 5>>\n<<set $x = $x + 1>>\n{$x}")])
//!     .unwrap();
//! runner.run("Start").unwrap();
//! let line = runner.advance(None).unwrap().unwrap();
//! assert_eq!(line.as_text().unwrap().text, "6");
//! ```

// Allow noisy pedantic lints that don't add value for
// a library crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod ast;
pub mod config;
mod declarations;
pub mod dialogue;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod markup;
pub mod parser;
pub mod plural;
pub mod result;
pub mod runner;
pub mod source;
pub mod storage;
pub mod token;
pub mod value;

pub use ast::{Expression, Statement};
pub use config::{CommandHandler, DialogueOptions};
pub use dialogue::Dialogue;
pub use eval::{EvalError, Evaluator};
pub use functions::{FunctionRegistry, NativeFunction};
pub use lexer::{LexError, LexErrorKind, Lexer, LexerMode, tokenize};
pub use markup::{
    MarkedLine, MarkupAnnotation, MarkupError, MarkupErrorKind, MarkupValue, parse_line,
};
pub use parser::{ParseContext, ParseError, ParseErrorKind, parse, parse_body};
pub use plural::PluralKind;
pub use result::{
    CommandResult, DialogueOption, DialogueResult, Metadata, OptionsResult, TextResult,
};
pub use runner::{LoadError, Runner, RuntimeError};
pub use source::{DialogueNode, SourceError, SourceErrorKind, parse_source};
pub use storage::{MemoryStorage, VariableStorage};
pub use token::{Span, Token, TokenKind};
pub use value::{Value, ValueKind};

/// Unified error type covering every stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A lexer error.
    #[error("{0}")]
    Lex(#[from] LexError),
    /// A parser error.
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// A script splitting error.
    #[error("{0}")]
    Source(#[from] SourceError),
    /// A node loading error.
    #[error("{0}")]
    Load(#[from] LoadError),
    /// An error while running dialogue.
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
    /// A line markup error.
    #[error("{0}")]
    Markup(#[from] MarkupError),
}

/// Split, load and parse every node of a script in one step.
///
/// Returns each node's title with its statements, in script order.
pub fn parse_str(source: &str) -> Result<Vec<(String, Vec<Statement>)>, Error> {
    let nodes = parse_source(source)?;
    Runner::new().load(nodes.clone())?;

    let mut context = ParseContext::locked();
    nodes
        .into_iter()
        .map(|node| {
            let statements = parse(&node.body, &mut context)?;
            Ok::<_, Error>((node.title, statements))
        })
        .collect()
}
