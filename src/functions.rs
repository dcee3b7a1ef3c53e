use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::eval::EvalError;
use crate::value::Value;

/// Host function callable from script expressions.
///
/// An `Err` message is reported as a failure of the named function.
pub type NativeFunction = Box<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

enum Callable {
    /// `visited(title)`, answered from the runner's visited set.
    Visited,
    Native(NativeFunction),
}

/// Functions available to expressions, keyed by name.
pub struct FunctionRegistry {
    functions: HashMap<String, Callable>,
}

impl FunctionRegistry {
    /// A registry holding only the built-in `visited`.
    #[must_use]
    pub fn new() -> Self {
        let mut functions = HashMap::new();
        functions.insert("visited".to_string(), Callable::Visited);
        Self { functions }
    }

    /// Register or replace a function.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register_boxed(name, Box::new(function));
    }

    pub fn register_boxed(&mut self, name: impl Into<String>, function: NativeFunction) {
        self.functions
            .insert(name.into(), Callable::Native(function));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub(crate) fn call(
        &self,
        name: &str,
        args: &[Value],
        visited: &HashSet<String>,
    ) -> Result<Value, EvalError> {
        match self.functions.get(name) {
            None => Err(EvalError::UnknownFunction(name.to_string())),
            Some(Callable::Visited) => match args {
                [Value::String(title)] => Ok(Value::Bool(visited.contains(title))),
                _ => Err(EvalError::Function {
                    name: name.to_string(),
                    message: "expected a single node title".to_string(),
                }),
            },
            Some(Callable::Native(function)) => {
                function(args).map_err(|message| EvalError::Function {
                    name: name.to_string(),
                    message,
                })
            }
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}
