use std::fmt;

use crate::functions::NativeFunction;
use crate::result::CommandResult;
use crate::storage::VariableStorage;
use crate::value::Value;

/// Callback receiving intercepted commands.
pub type CommandHandler = Box<dyn FnMut(&CommandResult) + Send>;

/// Settings for a [`Dialogue`](crate::Dialogue).
pub struct DialogueOptions {
    pub(crate) start_at: String,
    pub(crate) locale: String,
    pub(crate) combine_text_and_options: bool,
    pub(crate) no_escape: bool,
    pub(crate) command_handler: Option<CommandHandler>,
    pub(crate) variable_storage: Option<Box<dyn VariableStorage + Send>>,
    pub(crate) functions: Vec<(String, NativeFunction)>,
}

impl DialogueOptions {
    /// Defaults: start at `Start`, locale `en`, escapes left for the
    /// markup pass.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_at: "Start".to_string(),
            locale: "en".to_string(),
            combine_text_and_options: false,
            no_escape: true,
            command_handler: None,
            variable_storage: None,
            functions: Vec::new(),
        }
    }

    /// Set the first node to run.
    #[must_use]
    pub fn start_at(mut self, title: impl Into<String>) -> Self {
        self.start_at = title.into();
        self
    }

    /// Set the locale used for `plural` and `ordinal` markup.
    #[must_use]
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Merge a line of text into the option set that follows it.
    #[must_use]
    pub const fn combine_text_and_options(mut self, combine: bool) -> Self {
        self.combine_text_and_options = combine;
        self
    }

    #[must_use]
    pub const fn no_escape(mut self, no_escape: bool) -> Self {
        self.no_escape = no_escape;
        self
    }

    /// Route commands to `handler` instead of surfacing them.
    #[must_use]
    pub fn handle_command<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&CommandResult) + Send + 'static,
    {
        self.command_handler = Some(Box::new(handler));
        self
    }

    /// Use `storage` instead of a fresh in-memory store.
    #[must_use]
    pub fn variable_storage(mut self, storage: impl VariableStorage + Send + 'static) -> Self {
        self.variable_storage = Some(Box::new(storage));
        self
    }

    /// Register a native function callable from scripts.
    #[must_use]
    pub fn function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.push((name.into(), Box::new(function)));
        self
    }
}

impl Default for DialogueOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DialogueOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let functions: Vec<&str> = self.functions.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("DialogueOptions")
            .field("start_at", &self.start_at)
            .field("locale", &self.locale)
            .field("combine_text_and_options", &self.combine_text_and_options)
            .field("no_escape", &self.no_escape)
            .field("handles_commands", &self.command_handler.is_some())
            .field("custom_storage", &self.variable_storage.is_some())
            .field("functions", &functions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn defaults() {
        let options = DialogueOptions::default();
        assert_eq!(options.start_at, "Start");
        assert_eq!(options.locale, "en");
        assert!(!options.combine_text_and_options);
        assert!(options.no_escape);
        assert!(options.command_handler.is_none());
    }

    #[test]
    fn builder_chains() {
        let options = DialogueOptions::new()
            .start_at("Intro")
            .locale("fr")
            .combine_text_and_options(true)
            .variable_storage(MemoryStorage::new())
            .function("double", |args: &[Value]| {
                Ok(Value::Number(args[0].as_number().unwrap_or(0.0) * 2.0))
            })
            .handle_command(|_| {});
        assert_eq!(options.start_at, "Intro");
        assert_eq!(options.locale, "fr");
        assert!(options.combine_text_and_options);
        assert!(options.variable_storage.is_some());
        assert_eq!(options.functions.len(), 1);
        assert!(format!("{options:?}").contains("double"));
    }
}
