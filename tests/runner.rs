mod common;

use common::{evaluate, next_options, next_text, remaining_lines, runner, runner_with};
use yarnbound_rs::{
    DialogueNode, DialogueResult, EvalError, LoadError, MemoryStorage, Runner, RuntimeError,
    Value, ValueKind,
};

// -----------------------------------------------------------
// Expressions
// -----------------------------------------------------------

#[test]
fn arithmetic_precedence() {
    assert_eq!(evaluate("1 + 2 * 3"), "7");
    assert_eq!(evaluate("(1 + 2) * 3"), "9");
    assert_eq!(evaluate("2 ** 3 ** 2"), "512");
    assert_eq!(evaluate("7 / 2"), "3.5");
    assert_eq!(evaluate("-2 ** 2"), "4");
    assert_eq!(evaluate("10 - 4 - 3"), "3");
}

#[test]
fn string_and_comparison_operators() {
    assert_eq!(evaluate("\"a\" + 1"), "a1");
    assert_eq!(evaluate("1 == \"1\""), "false");
    assert_eq!(evaluate("\"abc\" < \"abd\""), "true");
    assert_eq!(evaluate("true xor false"), "true");
    assert_eq!(evaluate("not (1 > 2)"), "true");
}

#[test]
fn declare_then_set() {
    let mut runner = runner("<<declare $x = 5>>\n<<set $x = $x + 1>>\n{$x}");
    assert_eq!(next_text(&mut runner), "6");
    assert_eq!(runner.advance(None), Ok(None));
}

#[test]
fn declared_values_are_visible_before_running() {
    let mut runner = Runner::new();
    runner
        .load(vec![DialogueNode::new(
            "Start",
            "<<declare $name = \"Ada\" as String>>\nHi",
        )])
        .expect("load failed");
    assert_eq!(
        runner.variables().get("name"),
        Some(Value::String("Ada".into()))
    );
}

#[test]
fn undefined_variable_is_an_error() {
    let mut runner = runner("{$missing}");
    assert_eq!(
        runner.advance(None),
        Err(RuntimeError::Eval(EvalError::UndefinedVariable(
            "missing".into()
        )))
    );
}

#[test]
fn assignments_keep_their_type() {
    let mut runner = runner("<<set $x = 1>>\n<<set $x = \"a\">>\nNever");
    assert_eq!(
        runner.advance(None),
        Err(RuntimeError::TypeChanged {
            variable: "x".into(),
            existing: ValueKind::Number,
            assigned: ValueKind::String,
        })
    );
}

#[test]
fn native_functions_are_callable() {
    let mut runner = Runner::new();
    runner.register_function("double", |args: &[Value]| match args {
        [Value::Number(n)] => Ok(Value::Number(n * 2.0)),
        _ => Err("expected one number".to_string()),
    });
    runner
        .load(vec![DialogueNode::new("Start", "{double(21)}\n{double()}")])
        .expect("load failed");
    runner.run("Start").expect("run failed");
    assert_eq!(next_text(&mut runner), "42");
    assert_eq!(
        runner.advance(None),
        Err(RuntimeError::Eval(EvalError::Function {
            name: "double".into(),
            message: "expected one number".into(),
        }))
    );
}

#[test]
fn division_by_zero_renders_infinity() {
    assert_eq!(evaluate("1 / 0"), "Infinity");
    assert_eq!(evaluate("-1 / 0"), "-Infinity");
}

// -----------------------------------------------------------
// Recovery
// -----------------------------------------------------------

#[test]
fn failed_step_can_be_retried() {
    let mut runner = runner("<<set $n = 1>>\nOne\n<<set $n = $n + 1>>\n{roll()}\nTwo");
    assert_eq!(next_text(&mut runner), "One");
    assert_eq!(
        runner.advance(None),
        Err(RuntimeError::Eval(EvalError::UnknownFunction("roll".into())))
    );
    assert!(runner.is_running());

    runner.register_function("roll", |_: &[Value]| Ok(Value::Number(6.0)));
    assert_eq!(next_text(&mut runner), "6");
    assert_eq!(next_text(&mut runner), "Two");
    assert_eq!(runner.variables().get("n"), Some(Value::Number(2.0)));
}

#[test]
fn failed_jump_keeps_the_runner_in_place() {
    let mut runner = runner("One\n<<jump Nowhere>>");
    assert_eq!(next_text(&mut runner), "One");
    for _ in 0..2 {
        assert_eq!(
            runner.advance(None),
            Err(RuntimeError::UnknownNode("Nowhere".into()))
        );
        assert!(runner.is_running());
    }
    assert!(!runner.has_visited("Nowhere"));
}

#[test]
fn failed_assignment_is_not_applied() {
    let mut runner = runner("<<set $x = 1>>\n<<set $x = \"a\">>\nNever");
    assert!(runner.advance(None).is_err());
    assert!(runner.is_running());
    assert_eq!(runner.variables().get("x"), Some(Value::Number(1.0)));
}

// -----------------------------------------------------------
// Options
// -----------------------------------------------------------

#[test]
fn shortcut_options_flow() {
    let mut runner = runner("Hello\n-> A\n    A content\n-> B\n    B content");
    assert_eq!(next_text(&mut runner), "Hello");
    assert_eq!(
        next_options(&mut runner),
        [("A".to_string(), true), ("B".to_string(), true)]
    );
    let Some(DialogueResult::Text(text)) = runner.advance(Some(1)).expect("advance failed")
    else {
        panic!("expected text");
    };
    assert_eq!(text.text, "B content");
    assert_eq!(runner.advance(None), Ok(None));
    assert!(!runner.is_running());
}

#[test]
fn option_without_body_continues_after_group() {
    let mut runner = runner("Q\n-> A\n-> B\nAfter");
    next_text(&mut runner);
    next_options(&mut runner);
    let result = runner.advance(Some(0)).expect("advance failed");
    assert_eq!(
        result.as_ref().and_then(DialogueResult::as_text).map(|t| t.text.as_str()),
        Some("After")
    );
}

#[test]
fn guarded_option_is_unavailable() {
    let mut runner = runner("<<set $gold = 1>>\n-> Buy <<if $gold > 5>>\n-> Leave");
    assert_eq!(
        next_options(&mut runner),
        [("Buy".to_string(), false), ("Leave".to_string(), true)]
    );
}

#[test]
fn bad_selection_keeps_waiting() {
    let mut runner = runner("-> A\n    Picked A\n-> B");
    next_options(&mut runner);

    assert_eq!(runner.advance(None), Err(RuntimeError::NoOptionSelected));
    assert_eq!(
        runner.advance(Some(5)),
        Err(RuntimeError::OptionOutOfRange { index: 5, count: 2 })
    );
    assert!(runner.is_running());

    let result = runner.advance(Some(0)).expect("advance failed");
    assert_eq!(
        result.as_ref().and_then(DialogueResult::as_text).map(|t| t.text.as_str()),
        Some("Picked A")
    );
}

#[test]
fn option_hashtags_are_reported() {
    let mut runner = runner("-> Wave #friendly\n-> Leave");
    let Some(DialogueResult::Options(options)) = runner.advance(None).expect("advance failed")
    else {
        panic!("expected options");
    };
    assert_eq!(options.options[0].hashtags, ["friendly"]);
    assert!(options.options[1].hashtags.is_empty());
}

// -----------------------------------------------------------
// Flow between nodes
// -----------------------------------------------------------

#[test]
fn stop_ends_the_dialogue() {
    let mut runner = runner("One\n<<stop>>\nTwo");
    assert_eq!(next_text(&mut runner), "One");
    assert_eq!(runner.advance(None), Ok(None));
    assert!(!runner.is_running());
    assert_eq!(runner.advance(None), Ok(None));
}

#[test]
fn visited_tracks_entered_nodes() {
    let mut runner = runner_with(vec![
        DialogueNode::new(
            "Start",
            "<<if visited(\"Shop\")>>\nBack\n<<else>>\nFirst\n<<jump Shop>>\n<<endif>>",
        ),
        DialogueNode::new("Shop", "Shop\n<<jump Start>>"),
    ]);
    assert_eq!(remaining_lines(&mut runner), ["First", "Shop", "Back"]);
}

#[test]
fn jump_target_from_expression() {
    let mut runner = runner_with(vec![
        DialogueNode::new("Start", "<<set $next = \"End\">>\n<<jump {$next}>>"),
        DialogueNode::new("End", "Arrived"),
    ]);
    assert_eq!(next_text(&mut runner), "Arrived");
}

#[test]
fn jump_to_missing_node_fails() {
    let mut runner = runner("<<jump Nowhere>>");
    assert_eq!(
        runner.advance(None),
        Err(RuntimeError::UnknownNode("Nowhere".into()))
    );
}

#[test]
fn text_carries_hashtags_and_metadata() {
    let mut runner = runner_with(vec![
        DialogueNode::new("Start", "Hello #greeting #first").tag("intro"),
    ]);
    let Some(DialogueResult::Text(text)) = runner.advance(None).expect("advance failed") else {
        panic!("expected text");
    };
    assert_eq!(text.text, "Hello");
    assert_eq!(text.hashtags, ["greeting", "first"]);
    assert_eq!(text.metadata.title, "Start");
    assert_eq!(text.metadata.tags, ["intro"]);
}

#[test]
fn run_restarts_from_a_node() {
    let mut runner = runner("One\nTwo");
    assert_eq!(next_text(&mut runner), "One");
    runner.run("Start").expect("run failed");
    assert_eq!(next_text(&mut runner), "One");
}

// -----------------------------------------------------------
// Loading
// -----------------------------------------------------------

#[test]
fn load_source_registers_every_node() {
    let mut runner = Runner::new();
    runner
        .load_source("title: Start\n---\nHi\n===\ntitle: Other\n---\nBye\n===\n")
        .expect("load failed");
    let mut titles: Vec<_> = runner.titles().collect();
    titles.sort_unstable();
    assert_eq!(titles, ["Other", "Start"]);
}

#[test]
fn later_batches_cannot_reuse_titles() {
    let mut runner = Runner::new();
    runner
        .load(vec![DialogueNode::new("Start", "Hi")])
        .expect("first load failed");
    assert_eq!(
        runner.load(vec![DialogueNode::new("Start", "Again")]),
        Err(LoadError::DuplicateTitle("Start".into()))
    );
}

#[test]
fn nodes_need_title_and_body() {
    assert_eq!(
        Runner::new().load(vec![DialogueNode::new("", "Hi")]),
        Err(LoadError::MissingTitle)
    );
    assert_eq!(
        Runner::new().load(vec![DialogueNode::new("Start", "")]),
        Err(LoadError::MissingBody("Start".into()))
    );
}

#[test]
fn declaration_type_mismatch_fails_load() {
    let err = Runner::new()
        .load(vec![DialogueNode::new(
            "Start",
            "<<declare $gold = \"lots\" as Number>>",
        )])
        .expect_err("should fail");
    assert_eq!(
        err,
        LoadError::DeclarationType {
            variable: "gold".into(),
            declared: ValueKind::Number,
            found: ValueKind::String,
        }
    );
}

#[test]
fn failed_load_seeds_no_variables() {
    let mut runner = Runner::new();
    let err = runner
        .load(vec![DialogueNode::new(
            "Start",
            "<<declare $a = 1>>\n<<declare $b = \"x\" as Number>>",
        )])
        .expect_err("should fail");
    assert!(matches!(err, LoadError::DeclarationType { .. }));
    assert_eq!(runner.variables().get("a"), None);

    runner
        .load(vec![DialogueNode::new(
            "Start",
            "<<declare $a = 2>>\n<<declare $b = 3 as Number>>\n{$a}",
        )])
        .expect("load failed");
    runner.run("Start").expect("run failed");
    assert_eq!(next_text(&mut runner), "2");
}

#[test]
fn custom_storage_is_used() {
    let mut runner = Runner::new();
    runner.set_variable_storage(Box::new(MemoryStorage::new().with("coins", 3)));
    runner
        .load(vec![DialogueNode::new(
            "Start",
            "<<declare $coins = 0>>\n{$coins}",
        )])
        .expect("load failed");
    runner.run("Start").expect("run failed");
    assert_eq!(next_text(&mut runner), "3");
}
