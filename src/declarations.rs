use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::eval::Evaluator;
use crate::functions::FunctionRegistry;
use crate::parser::{ParseContext, parse};
use crate::runner::LoadError;
use crate::source::DialogueNode;
use crate::storage::VariableStorage;
use crate::value::{Value, ValueKind};

static DECLARE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<<declare\s.+>>").expect("declare pattern is valid"));

/// Declared values not yet written, read on top of the live store.
struct Staged<'a> {
    live: &'a dyn VariableStorage,
    pending: Vec<(String, Value)>,
}

impl VariableStorage for Staged<'_> {
    fn get(&self, name: &str) -> Option<Value> {
        self.pending
            .iter()
            .find(|(pending, _)| pending == name)
            .map(|(_, value)| value.clone())
            .or_else(|| self.live.get(name))
    }

    fn set(&mut self, name: &str, value: Value) {
        self.pending.push((name.to_string(), value));
    }
}

/// Seed `variables` from every `<<declare>>` line of `nodes`.
///
/// Only the declaration lines are parsed, as one batch through
/// `context`, which must be unlocked. Variables that already hold a
/// value keep it. Nothing is written unless every declaration checks
/// out. Returns the number of variables seeded.
pub(crate) fn prescan(
    nodes: &[&DialogueNode],
    context: &mut ParseContext,
    variables: &mut dyn VariableStorage,
    functions: &FunctionRegistry,
) -> Result<usize, LoadError> {
    let batch = nodes
        .iter()
        .flat_map(|node| node.body.lines())
        .filter(|line| DECLARE_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n");
    if batch.is_empty() {
        return Ok(0);
    }

    parse(&batch, context)?;

    let visited = HashSet::new();
    let mut staged = Staged {
        live: &*variables,
        pending: Vec::new(),
    };
    for declaration in context.declarations() {
        let value = Evaluator::new(&staged, functions, &visited)
            .evaluate(&declaration.initializer)
            .map_err(|source| LoadError::Initializer {
                variable: declaration.variable.clone(),
                source,
            })?;

        if let Some(explicit) = declaration.explicit_type {
            let declared = ValueKind::from(explicit);
            if value.kind() != declared {
                return Err(LoadError::DeclarationType {
                    variable: declaration.variable.clone(),
                    declared,
                    found: value.kind(),
                });
            }
        }

        if staged.live.get(&declaration.variable).is_none() {
            staged.set(&declaration.variable, value);
        }
    }

    let pending = staged.pending;
    let seeded = pending.len();
    for (variable, value) in pending {
        debug!(%variable, %value, "seeding declared variable");
        variables.set(&variable, value);
    }
    Ok(seeded)
}
