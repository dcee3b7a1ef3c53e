use crate::markup::MarkupAnnotation;

/// Title and tags of the node that produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub title: String,
    pub tags: Vec<String>,
}

/// One rendered line of dialogue.
#[derive(Debug, Clone, PartialEq)]
pub struct TextResult {
    pub text: String,
    pub hashtags: Vec<String>,
    pub metadata: Metadata,
    /// Filled in by the line markup pass.
    pub markup: Vec<MarkupAnnotation>,
    pub is_dialogue_end: bool,
}

/// A single choice within an [`OptionsResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueOption {
    pub text: String,
    /// `false` when the option's guard evaluated false. Unavailable
    /// options are still presented.
    pub is_available: bool,
    pub hashtags: Vec<String>,
    pub markup: Vec<MarkupAnnotation>,
}

/// A set of choices awaiting a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsResult {
    pub options: Vec<DialogueOption>,
    pub metadata: Metadata,
    /// Line merged in when text and options are combined.
    pub text: Option<String>,
    pub hashtags: Vec<String>,
    pub markup: Vec<MarkupAnnotation>,
    pub is_dialogue_end: bool,
}

/// A free-form `<<command>>` with its expressions interpolated.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub command: String,
    pub hashtags: Vec<String>,
    pub metadata: Metadata,
    pub is_dialogue_end: bool,
}

/// Everything a dialogue step can yield.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueResult {
    Text(TextResult),
    Options(OptionsResult),
    Command(CommandResult),
}

impl DialogueResult {
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        match self {
            Self::Text(result) => &result.metadata,
            Self::Options(result) => &result.metadata,
            Self::Command(result) => &result.metadata,
        }
    }

    #[must_use]
    pub const fn is_dialogue_end(&self) -> bool {
        match self {
            Self::Text(result) => result.is_dialogue_end,
            Self::Options(result) => result.is_dialogue_end,
            Self::Command(result) => result.is_dialogue_end,
        }
    }

    pub(crate) const fn mark_dialogue_end(&mut self) {
        match self {
            Self::Text(result) => result.is_dialogue_end = true,
            Self::Options(result) => result.is_dialogue_end = true,
            Self::Command(result) => result.is_dialogue_end = true,
        }
    }

    #[must_use]
    pub const fn as_text(&self) -> Option<&TextResult> {
        match self {
            Self::Text(result) => Some(result),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_options(&self) -> Option<&OptionsResult> {
        match self {
            Self::Options(result) => Some(result),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_command(&self) -> Option<&CommandResult> {
        match self {
            Self::Command(result) => Some(result),
            _ => None,
        }
    }
}
