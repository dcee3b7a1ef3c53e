#![allow(dead_code)]

use yarnbound_rs::{
    Dialogue, DialogueNode, DialogueOptions, DialogueResult, Runner, TokenKind, tokenize,
};

/// Load a single `Start` node and position the runner on it.
pub fn runner(body: &str) -> Runner {
    runner_with(vec![DialogueNode::new("Start", body)])
}

/// Load `nodes` and position the runner on `Start`.
pub fn runner_with(nodes: Vec<DialogueNode>) -> Runner {
    let mut runner = Runner::new();
    runner.load(nodes).expect("load failed");
    runner.run("Start").expect("run failed");
    runner
}

/// Advance with no selection and expect a line of text.
pub fn next_text(runner: &mut Runner) -> String {
    match runner.advance(None).expect("advance failed") {
        Some(DialogueResult::Text(text)) => text.text,
        other => panic!("expected text, got {other:?}"),
    }
}

/// Advance with no selection and expect an option set.
pub fn next_options(runner: &mut Runner) -> Vec<(String, bool)> {
    match runner.advance(None).expect("advance failed") {
        Some(DialogueResult::Options(options)) => options
            .options
            .into_iter()
            .map(|option| (option.text, option.is_available))
            .collect(),
        other => panic!("expected options, got {other:?}"),
    }
}

/// Evaluate `expression` by assigning it and rendering the result.
pub fn evaluate(expression: &str) -> String {
    let mut runner = runner(&format!("<<set $result = {expression}>>\n{{$result}}"));
    next_text(&mut runner)
}

/// Drain every remaining text line until the dialogue ends.
pub fn remaining_lines(runner: &mut Runner) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(result) = runner.advance(None).expect("advance failed") {
        match result {
            DialogueResult::Text(text) => lines.push(text.text),
            other => panic!("expected text, got {other:?}"),
        }
    }
    lines
}

pub fn kinds(input: &str) -> Vec<TokenKind> {
    tokenize(input)
        .expect("tokenize failed")
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

pub fn dialogue(body: &str, options: DialogueOptions) -> Dialogue {
    Dialogue::new(vec![DialogueNode::new("Start", body)], options).expect("dialogue failed")
}

/// Text of the current result, whether a line or a combined option set.
pub fn current_text(dialogue: &Dialogue) -> Option<&str> {
    match dialogue.current()? {
        DialogueResult::Text(text) => Some(&text.text),
        DialogueResult::Options(options) => options.text.as_deref(),
        DialogueResult::Command(command) => Some(&command.command),
    }
}
