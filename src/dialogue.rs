use std::fmt;

use tracing::debug;

use crate::Error;
use crate::config::{CommandHandler, DialogueOptions};
use crate::markup::{self, MarkupError};
use crate::result::{DialogueResult, OptionsResult, TextResult};
use crate::runner::{Runner, RuntimeError};
use crate::source::{DialogueNode, parse_source};

/// Caller-facing driver around a [`Runner`].
///
/// Holds the current result, looks one result ahead to flag the end
/// of the dialogue, applies line markup and keeps a history of what
/// has been shown.
pub struct Dialogue {
    runner: Runner,
    locale: String,
    combine_text_and_options: bool,
    command_handler: Option<CommandHandler>,
    buffered: Option<DialogueResult>,
    current: Option<DialogueResult>,
    history: Vec<DialogueResult>,
}

impl Dialogue {
    /// Load `nodes`, start at the configured node and advance to the
    /// first result.
    pub fn new(nodes: Vec<DialogueNode>, options: DialogueOptions) -> Result<Self, Error> {
        let DialogueOptions {
            start_at,
            locale,
            combine_text_and_options,
            no_escape,
            command_handler,
            variable_storage,
            functions,
        } = options;

        let mut runner = Runner::new();
        runner.set_no_escape(no_escape);
        if let Some(storage) = variable_storage {
            runner.set_variable_storage(storage);
        }
        for (name, function) in functions {
            runner.register_boxed_function(name, function);
        }
        runner.load(nodes)?;
        runner.run(&start_at)?;

        let mut dialogue = Self {
            runner,
            locale,
            combine_text_and_options,
            command_handler,
            buffered: None,
            current: None,
            history: Vec::new(),
        };
        dialogue.advance(None)?;
        Ok(dialogue)
    }

    /// Split a multi-node script, then behave like [`Dialogue::new`].
    pub fn from_source(source: &str, options: DialogueOptions) -> Result<Self, Error> {
        let nodes = parse_source(source)?;
        Self::new(nodes, options)
    }

    /// Move to the next result.
    ///
    /// `selection` is only used when the current result is an option
    /// set. On error the current result stays in place. A failure met
    /// while looking ahead is not returned here; the runner waits at
    /// the failing statement and the next call reports it.
    pub fn advance(&mut self, selection: Option<usize>) -> Result<(), Error> {
        let selection = match self.current {
            Some(DialogueResult::Options(_)) => selection,
            _ => None,
        };

        let mut next = self.buffered.take();
        if next.is_none() {
            next = self.runner.advance(selection)?;
        }
        next = self.intercept_commands(next)?;

        // Nothing sensible lies beyond an option set until it is answered.
        if !matches!(next, Some(DialogueResult::Options(_))) {
            match self.runner.advance(None) {
                Ok(upcoming) => next = self.look_ahead(next, upcoming),
                Err(err) => debug!(%err, "lookahead failed"),
            }
        }

        if let Some(result) = next.as_mut() {
            self.apply_markup(result)?;
        }
        if let Some(previous) = self.current.take() {
            self.history.push(previous);
        }
        self.current = next;
        Ok(())
    }

    #[must_use]
    pub const fn current(&self) -> Option<&DialogueResult> {
        self.current.as_ref()
    }

    /// Results shown before the current one, oldest first.
    #[must_use]
    pub fn history(&self) -> &[DialogueResult] {
        &self.history
    }

    /// `true` once nothing follows the current result.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.current
            .as_ref()
            .is_none_or(DialogueResult::is_dialogue_end)
    }

    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    #[must_use]
    pub const fn runner(&self) -> &Runner {
        &self.runner
    }

    pub const fn runner_mut(&mut self) -> &mut Runner {
        &mut self.runner
    }

    fn look_ahead(
        &mut self,
        next: Option<DialogueResult>,
        upcoming: Option<DialogueResult>,
    ) -> Option<DialogueResult> {
        match (next, upcoming) {
            (Some(DialogueResult::Text(text)), Some(DialogueResult::Options(options)))
                if self.combine_text_and_options =>
            {
                Some(DialogueResult::Options(merge(text, options)))
            }
            (Some(mut last), None) => {
                last.mark_dialogue_end();
                Some(last)
            }
            (current, upcoming) => {
                self.buffered = upcoming;
                current
            }
        }
    }

    fn intercept_commands(
        &mut self,
        mut next: Option<DialogueResult>,
    ) -> Result<Option<DialogueResult>, RuntimeError> {
        let Some(handler) = self.command_handler.as_mut() else {
            return Ok(next);
        };
        while let Some(DialogueResult::Command(command)) = &next {
            handler(command);
            next = self.runner.advance(None)?;
        }
        Ok(next)
    }

    fn apply_markup(&self, result: &mut DialogueResult) -> Result<(), MarkupError> {
        match result {
            DialogueResult::Text(text) => {
                let marked = markup::parse_line(&text.text, &self.locale)?;
                text.text = marked.text;
                text.markup = marked.markup;
            }
            DialogueResult::Options(options) => {
                if let Some(line) = options.text.as_mut() {
                    let marked = markup::parse_line(line, &self.locale)?;
                    *line = marked.text;
                    options.markup = marked.markup;
                }
                for option in &mut options.options {
                    let marked = markup::parse_line(&option.text, &self.locale)?;
                    option.text = marked.text;
                    option.markup = marked.markup;
                }
            }
            DialogueResult::Command(_) => {}
        }
        Ok(())
    }
}

/// Fold a line of text into the option set that follows it.
fn merge(text: TextResult, mut options: OptionsResult) -> OptionsResult {
    options.text = Some(text.text);
    options.hashtags = text.hashtags;
    options
}

impl fmt::Debug for Dialogue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialogue")
            .field("runner", &self.runner)
            .field("locale", &self.locale)
            .field("combine_text_and_options", &self.combine_text_and_options)
            .field("current", &self.current)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}
