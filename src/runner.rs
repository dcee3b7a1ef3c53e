use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, trace};

use crate::ast::{
    Assignment, Command, Conditional, ElseBranch, JumpTarget, Shortcut, Statement, TextLine,
};
use crate::declarations;
use crate::eval::{EvalError, Evaluator};
use crate::functions::{FunctionRegistry, NativeFunction};
use crate::parser::{ParseContext, ParseError, parse};
use crate::result::{
    CommandResult, DialogueOption, DialogueResult, Metadata, OptionsResult, TextResult,
};
use crate::source::{DialogueNode, SourceError, parse_source};
use crate::storage::{MemoryStorage, VariableStorage};
use crate::value::{Value, ValueKind};

/// Failure while loading nodes. Nothing from a failed batch is kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("node needs a title")]
    MissingTitle,
    #[error("node title cannot contain a dot: {0}")]
    InvalidTitle(String),
    #[error("node \"{0}\" needs a body")]
    MissingBody(String),
    #[error("duplicate node title: {0}")]
    DuplicateTitle(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Declaration(#[from] ParseError),
    #[error("cannot declare ${variable} as {declared}, its value is a {found}")]
    DeclarationType {
        variable: String,
        declared: ValueKind,
        found: ValueKind,
    },
    #[error("cannot initialise ${variable}: {source}")]
    Initializer {
        variable: String,
        #[source]
        source: EvalError,
    },
}

/// Failure while running dialogue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("node \"{0}\" does not exist")]
    UnknownNode(String),
    #[error(transparent)]
    Syntax(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("cannot assign a {assigned} to ${variable}, which holds a {existing}")]
    TypeChanged {
        variable: String,
        existing: ValueKind,
        assigned: ValueKind,
    },
    #[error("no option selected before resuming dialogue")]
    NoOptionSelected,
    #[error("cannot select option #{index}, there are {count} options")]
    OptionOutOfRange { index: usize, count: usize },
}

/// One statement list being walked, with the shortcuts gathered so far.
///
/// `position` only moves past a statement once it has run without
/// error.
struct Frame {
    statements: Vec<Statement>,
    position: usize,
    shortcuts: Vec<Shortcut>,
}

impl Frame {
    const fn new(statements: Vec<Statement>) -> Self {
        Self {
            statements,
            position: 0,
            shortcuts: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&Statement> {
        self.statements.get(self.position)
    }
}

/// What running one statement asks of the execution.
enum Outcome {
    Continue,
    Shortcut(Shortcut),
    Enter(Vec<Statement>),
    Yield(DialogueResult, usize),
    Jump(Execution),
    Stop,
}

/// Resume point of a suspended run.
struct Execution {
    metadata: Metadata,
    /// Innermost block last.
    frames: Vec<Frame>,
    /// Set while an option set waits for a selection.
    awaiting: Option<Vec<Shortcut>>,
}

/// Resumable interpreter over a set of loaded nodes.
///
/// `run` positions the runner at a node; each `advance` call walks
/// forward to the next result and suspends there.
pub struct Runner {
    nodes: HashMap<String, DialogueNode>,
    variables: Box<dyn VariableStorage + Send>,
    functions: FunctionRegistry,
    visited: HashSet<String>,
    context: ParseContext,
    no_escape: bool,
    execution: Option<Execution>,
}

impl Runner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            variables: Box::new(MemoryStorage::new()),
            functions: FunctionRegistry::new(),
            visited: HashSet::new(),
            context: ParseContext::locked(),
            no_escape: false,
            execution: None,
        }
    }

    /// Register nodes and seed their declared variables.
    ///
    /// # Errors
    ///
    /// Returns `LoadError` for a missing, dotted or duplicate title, an
    /// empty body, or a bad `<<declare>>`. No node of the batch is
    /// registered on failure.
    #[tracing::instrument(skip_all, fields(count = nodes.len()))]
    pub fn load(&mut self, nodes: Vec<DialogueNode>) -> Result<(), LoadError> {
        let mut titles = HashSet::new();
        for node in &nodes {
            if node.title.is_empty() {
                return Err(LoadError::MissingTitle);
            }
            if node.title.contains('.') {
                return Err(LoadError::InvalidTitle(node.title.clone()));
            }
            if node.body.is_empty() {
                return Err(LoadError::MissingBody(node.title.clone()));
            }
            if self.nodes.contains_key(&node.title) || !titles.insert(node.title.as_str()) {
                return Err(LoadError::DuplicateTitle(node.title.clone()));
            }
        }

        self.context.reset();
        let batch: Vec<&DialogueNode> = nodes.iter().collect();
        let seeded = declarations::prescan(
            &batch,
            &mut self.context,
            &mut *self.variables,
            &self.functions,
        );
        self.context.lock();
        let seeded = seeded?;
        debug!(seeded, "declarations handled");

        for node in nodes {
            self.nodes.insert(node.title.clone(), node);
        }
        Ok(())
    }

    /// Split a multi-node script and load its nodes.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::Source` when the script cannot be split, or
    /// any error of [`Runner::load`].
    pub fn load_source(&mut self, source: &str) -> Result<(), LoadError> {
        let nodes = parse_source(source)?;
        self.load(nodes)
    }

    /// Start running from `title`, discarding any run in progress.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::UnknownNode` if no node has that title,
    /// or a syntax error from its body.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self, title: &str) -> Result<(), RuntimeError> {
        self.execution = None;
        self.execution = Some(self.enter(title)?);
        Ok(())
    }

    /// Walk to the next result.
    ///
    /// `selection` picks an option when the last result was an option
    /// set and is ignored otherwise. Returns `None` once the dialogue
    /// has ended.
    ///
    /// # Errors
    ///
    /// A missing or out-of-range selection leaves the runner waiting on
    /// the same option set. Any other error leaves it suspended before
    /// the failing statement, so a later call retries that statement.
    pub fn advance(
        &mut self,
        selection: Option<usize>,
    ) -> Result<Option<DialogueResult>, RuntimeError> {
        let Some(mut execution) = self.execution.take() else {
            return Ok(None);
        };

        if let Some(shortcuts) = execution.awaiting.take() {
            let index = match select(selection, shortcuts.len()) {
                Ok(index) => index,
                Err(err) => {
                    execution.awaiting = Some(shortcuts);
                    self.execution = Some(execution);
                    return Err(err);
                }
            };
            if let Some(body) = shortcuts.into_iter().nth(index).and_then(|s| s.body) {
                execution.frames.push(Frame::new(body));
            }
        }

        match self.step(&mut execution) {
            Ok(Some(result)) => {
                trace!(?result, "yield");
                self.execution = Some(execution);
                Ok(Some(result))
            }
            Ok(None) => {
                debug!("dialogue ended");
                Ok(None)
            }
            Err(err) => {
                debug!(%err, "step failed");
                self.execution = Some(execution);
                Err(err)
            }
        }
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.execution.is_some()
    }

    #[must_use]
    pub fn has_visited(&self, title: &str) -> bool {
        self.visited.contains(title)
    }

    #[must_use]
    pub fn node(&self, title: &str) -> Option<&DialogueNode> {
        self.nodes.get(title)
    }

    /// Titles of every loaded node, in no particular order.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn variables(&self) -> &dyn VariableStorage {
        &*self.variables
    }

    pub fn variables_mut(&mut self) -> &mut dyn VariableStorage {
        &mut *self.variables
    }

    /// Replace the variable store. Values held by the old store are lost.
    pub fn set_variable_storage(&mut self, storage: Box<dyn VariableStorage + Send>) {
        self.variables = storage;
    }

    pub fn register_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.register(name, function);
    }

    pub fn register_boxed_function(&mut self, name: impl Into<String>, function: NativeFunction) {
        self.functions.register_boxed(name, function);
    }

    /// Keep `\c` escapes in rendered text for a later pass to resolve.
    pub const fn set_no_escape(&mut self, no_escape: bool) {
        self.no_escape = no_escape;
    }

    fn enter(&mut self, title: &str) -> Result<Execution, RuntimeError> {
        let node = self
            .nodes
            .get(title)
            .ok_or_else(|| RuntimeError::UnknownNode(title.to_string()))?;
        let statements = parse(&node.body, &mut self.context)?;
        debug!(title, "entering node");
        self.visited.insert(node.title.clone());
        Ok(Execution {
            metadata: Metadata {
                title: node.title.clone(),
                tags: node.tags.clone(),
            },
            frames: vec![Frame::new(statements)],
            awaiting: None,
        })
    }

    fn step(&mut self, execution: &mut Execution) -> Result<Option<DialogueResult>, RuntimeError> {
        loop {
            let Some(frame) = execution.frames.last_mut() else {
                return Ok(None);
            };

            let next_is_shortcut = matches!(frame.peek(), Some(Statement::Shortcut(_)));
            if !frame.shortcuts.is_empty() && !next_is_shortcut {
                let result = self.present_options(&frame.shortcuts, &execution.metadata)?;
                execution.awaiting = Some(std::mem::take(&mut frame.shortcuts));
                return Ok(Some(result));
            }

            if frame.peek().is_none() {
                execution.frames.pop();
                continue;
            }

            match self.execute(frame, &execution.metadata)? {
                Outcome::Continue => frame.position += 1,
                Outcome::Shortcut(shortcut) => {
                    frame.shortcuts.push(shortcut);
                    frame.position += 1;
                }
                Outcome::Enter(body) => {
                    frame.position += 1;
                    execution.frames.push(Frame::new(body));
                }
                Outcome::Yield(result, consumed) => {
                    frame.position += consumed;
                    return Ok(Some(result));
                }
                Outcome::Jump(next) => *execution = next,
                Outcome::Stop => {
                    debug!("stop");
                    execution.frames.clear();
                    return Ok(None);
                }
            }
        }
    }

    /// Run the statement at the frame's position without moving it.
    fn execute(&mut self, frame: &Frame, metadata: &Metadata) -> Result<Outcome, RuntimeError> {
        let Some(statement) = frame.peek() else {
            return Ok(Outcome::Continue);
        };
        let outcome = match statement {
            Statement::Shortcut(shortcut) => Outcome::Shortcut(shortcut.clone()),
            Statement::Text(line) => {
                let (text, consumed) = self.collect_text(line, frame, metadata)?;
                Outcome::Yield(text, consumed)
            }
            Statement::Assignment(assignment) => {
                self.assign(assignment)?;
                Outcome::Continue
            }
            Statement::Conditional(conditional) => self
                .select_branch(conditional)?
                .map_or(Outcome::Continue, |body| Outcome::Enter(body.to_vec())),
            Statement::Command(Command::Generic(command)) => {
                let text = self.evaluator().render(&command.parts)?;
                let result = DialogueResult::Command(CommandResult {
                    command: text.trim().to_string(),
                    hashtags: command.hashtags.clone(),
                    metadata: metadata.clone(),
                    is_dialogue_end: false,
                });
                Outcome::Yield(result, 1)
            }
            Statement::Command(Command::Jump { target, .. }) => {
                let title = match target {
                    JumpTarget::Title(title) => title.clone(),
                    JumpTarget::Expression(expression) => {
                        self.evaluator().evaluate(expression)?.to_string()
                    }
                };
                debug!(%title, "jump");
                Outcome::Jump(self.enter(&title)?)
            }
            Statement::Command(Command::Stop { .. }) => Outcome::Stop,
        };
        Ok(outcome)
    }

    /// Join text statements that share a source line. Returns the
    /// result and how many statements it covers.
    fn collect_text(
        &self,
        first: &TextLine,
        frame: &Frame,
        metadata: &Metadata,
    ) -> Result<(DialogueResult, usize), RuntimeError> {
        let evaluator = self.evaluator();
        let mut text = evaluator.render(&first.parts)?;
        let mut hashtags = first.hashtags.clone();
        let mut consumed = 1;
        for statement in &frame.statements[frame.position + 1..] {
            let Statement::Text(next) = statement else {
                break;
            };
            if next.line != first.line {
                break;
            }
            text.push_str(&evaluator.render(&next.parts)?);
            hashtags.extend(next.hashtags.iter().cloned());
            consumed += 1;
        }
        text.truncate(text.trim_end().len());

        let result = DialogueResult::Text(TextResult {
            text,
            hashtags,
            metadata: metadata.clone(),
            markup: Vec::new(),
            is_dialogue_end: false,
        });
        Ok((result, consumed))
    }

    fn present_options(
        &self,
        shortcuts: &[Shortcut],
        metadata: &Metadata,
    ) -> Result<DialogueResult, RuntimeError> {
        let evaluator = self.evaluator();
        let options = shortcuts
            .iter()
            .map(|shortcut| {
                let is_available = shortcut
                    .condition
                    .as_ref()
                    .map(|condition| evaluator.evaluate(condition))
                    .transpose()?
                    .is_none_or(|value| value.is_truthy());
                Ok(DialogueOption {
                    text: evaluator.render(&shortcut.text)?.trim().to_string(),
                    is_available,
                    hashtags: shortcut.hashtags.clone(),
                    markup: Vec::new(),
                })
            })
            .collect::<Result<Vec<_>, EvalError>>()?;

        Ok(DialogueResult::Options(OptionsResult {
            options,
            metadata: metadata.clone(),
            text: None,
            hashtags: Vec::new(),
            markup: Vec::new(),
            is_dialogue_end: false,
        }))
    }

    fn assign(&mut self, assignment: &Assignment) -> Result<(), RuntimeError> {
        let value = self.evaluator().evaluate(&assignment.value)?;
        let existing = self
            .variables
            .get(&assignment.variable)
            .map(|existing| existing.kind())
            .filter(|kind| *kind != ValueKind::Null && *kind != value.kind());
        if let Some(existing) = existing {
            return Err(RuntimeError::TypeChanged {
                variable: assignment.variable.clone(),
                existing,
                assigned: value.kind(),
            });
        }
        self.variables.set(&assignment.variable, value);
        Ok(())
    }

    fn select_branch<'a>(
        &self,
        conditional: &'a Conditional,
    ) -> Result<Option<&'a [Statement]>, RuntimeError> {
        let evaluator = self.evaluator();
        let mut current = conditional;
        loop {
            if evaluator.evaluate(&current.condition)?.is_truthy() {
                return Ok(Some(&current.body));
            }
            match current.otherwise.as_deref() {
                None => return Ok(None),
                Some(ElseBranch::Else(body)) => return Ok(Some(body)),
                Some(ElseBranch::ElseIf(next)) => current = next,
            }
        }
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&*self.variables, &self.functions, &self.visited).no_escape(self.no_escape)
    }
}

fn select(selection: Option<usize>, count: usize) -> Result<usize, RuntimeError> {
    match selection {
        None => Err(RuntimeError::NoOptionSelected),
        Some(index) if index >= count => Err(RuntimeError::OptionOutOfRange { index, count }),
        Some(index) => Ok(index),
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("nodes", &self.nodes.len())
            .field("functions", &self.functions)
            .field("visited", &self.visited)
            .field("no_escape", &self.no_escape)
            .field("running", &self.execution.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(body: &str) -> Runner {
        let mut runner = Runner::new();
        runner
            .load(vec![DialogueNode::new("Start", body)])
            .expect("should load");
        runner.run("Start").expect("should start");
        runner
    }

    fn next_text(runner: &mut Runner) -> String {
        match runner.advance(None).expect("should advance") {
            Some(DialogueResult::Text(text)) => text.text,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn conditional_chain_picks_first_true_arm() {
        let mut runner = started(
            "<<set $gold = 5>>\n<<if $gold > 10>>\nRich\n<<elseif $gold > 1>>\nComfortable\n<<else>>\nPoor\n<<endif>>",
        );
        assert_eq!(next_text(&mut runner), "Comfortable");
        assert_eq!(runner.advance(None), Ok(None));
    }

    #[test]
    fn generic_commands_interpolate() {
        let mut runner = started("<<set $n = 3>>\n<<wait {$n}>>");
        let result = runner.advance(None).expect("should advance");
        assert_eq!(
            result.as_ref().and_then(DialogueResult::as_command).map(|c| c.command.as_str()),
            Some("wait 3")
        );
    }

    #[test]
    fn jump_enters_target_and_marks_visited() {
        let mut runner = Runner::new();
        runner
            .load(vec![
                DialogueNode::new("Start", "<<jump Shop>>\nNever"),
                DialogueNode::new("Shop", "Welcome").tag("store"),
            ])
            .expect("should load");
        runner.run("Start").expect("should start");
        let Some(DialogueResult::Text(text)) = runner.advance(None).expect("should advance")
        else {
            panic!("expected text");
        };
        assert_eq!(text.text, "Welcome");
        assert_eq!(text.metadata.title, "Shop");
        assert_eq!(text.metadata.tags, ["store"]);
        assert!(runner.has_visited("Start"));
        assert!(runner.has_visited("Shop"));
    }

    #[test]
    fn assigning_over_null_is_allowed() {
        let mut runner = started("<<set $x = null>>\n<<set $x = 2>>\n{$x}");
        assert_eq!(next_text(&mut runner), "2");
    }

    #[test]
    fn failed_load_registers_nothing() {
        let mut runner = Runner::new();
        let err = runner
            .load(vec![
                DialogueNode::new("A", "Hi"),
                DialogueNode::new("A", "Again"),
            ])
            .expect_err("should fail");
        assert_eq!(err, LoadError::DuplicateTitle("A".into()));
        assert!(runner.node("A").is_none());
    }

    #[test]
    fn dotted_titles_are_rejected() {
        let err = Runner::new()
            .load(vec![DialogueNode::new("a.b", "Hi")])
            .expect_err("should fail");
        assert_eq!(err, LoadError::InvalidTitle("a.b".into()));
    }

    #[test]
    fn unknown_start_node() {
        assert_eq!(
            Runner::new().run("Nowhere"),
            Err(RuntimeError::UnknownNode("Nowhere".into()))
        );
    }

    #[test]
    fn escapes_kept_when_requested() {
        let mut runner = started("Hello \\[there\\]");
        assert_eq!(next_text(&mut runner), "Hello [there]");

        let mut raw = started("Hello \\[there\\]");
        raw.set_no_escape(true);
        assert_eq!(next_text(&mut raw), "Hello \\[there\\]");
    }
}
