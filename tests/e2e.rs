//! End-to-end tests over complete multi-node scripts: splitting,
//! loading, running and markup together.

mod common;

use common::current_text;
use yarnbound_rs::{
    Dialogue, DialogueOptions, DialogueResult, Error, LoadError, MemoryStorage, ParseErrorKind,
    TokenKind, parse_str,
};

const MERCHANT: &str = "\
title: Start
tags: intro
---
<<declare $gold = 10 as Number>>
<<declare $met = false>>
Merchant: Welcome, traveller! #greeting
<<if $met>>
    Merchant: Back again?
<<else>>
    <<set $met to true>>
<<endif>>
-> Buy a sword ({$price} gold) <<if $gold >= $price>>
    <<set $gold = $gold - $price>>
    <<jump Shop>>
-> Leave
    Merchant: Farewell.
===
title: Shop
---
<<declare $price = 5>>
You now have {$gold} gold.
<<if visited(\"Start\")>>
[b]Thank you[/b] for your purchase.
<<endif>>
===
";

fn options_of(dialogue: &Dialogue) -> Vec<(String, bool)> {
    dialogue
        .current()
        .and_then(DialogueResult::as_options)
        .expect("should be options")
        .options
        .iter()
        .map(|option| (option.text.clone(), option.is_available))
        .collect()
}

// -----------------------------------------------------------
// Whole-script checks
// -----------------------------------------------------------

#[test]
fn parse_str_returns_every_node() {
    let nodes = parse_str(MERCHANT).expect("should parse");
    let titles: Vec<_> = nodes.iter().map(|(title, _)| title.as_str()).collect();
    assert_eq!(titles, ["Start", "Shop"]);
    assert_eq!(nodes[0].1.len(), 4);
    assert_eq!(nodes[1].1.len(), 2);
}

#[test]
fn parse_str_reports_syntax_errors() {
    let err = parse_str("title: Start\n---\n<<if true>>\nHi\n===\n").expect_err("should fail");
    let Error::Parse(parse) = &err else {
        panic!("expected parse error, got {err:?}");
    };
    assert!(matches!(
        parse.kind,
        ParseErrorKind::UnexpectedToken {
            found: TokenKind::EndOfInput,
            ..
        }
    ));
}

#[test]
fn parse_str_rejects_duplicate_declarations_across_nodes() {
    let script = "title: A\n---\n<<declare $x = 1>>\n===\ntitle: B\n---\n<<declare $x = 2>>\n===\n";
    let err = parse_str(script).expect_err("should fail");
    assert!(matches!(err, Error::Load(LoadError::Declaration(_))));
}

#[test]
fn parse_str_rejects_dotted_titles() {
    let err = parse_str("title: a.b\n---\nHi\n===\n").expect_err("should fail");
    assert_eq!(err, Error::Load(LoadError::InvalidTitle("a.b".into())));
}

// -----------------------------------------------------------
// Playing the merchant script
// -----------------------------------------------------------

#[test]
fn buying_the_sword() {
    let mut dialogue =
        Dialogue::from_source(MERCHANT, DialogueOptions::default()).expect("should start");

    let greeting = dialogue
        .current()
        .and_then(DialogueResult::as_text)
        .expect("should be text");
    assert_eq!(greeting.text, "Welcome, traveller!");
    assert_eq!(greeting.hashtags, ["greeting"]);
    assert_eq!(greeting.markup[0].name, "character");

    dialogue.advance(None).expect("advance failed");
    assert_eq!(
        options_of(&dialogue),
        [
            ("Buy a sword (5 gold)".to_string(), true),
            ("Leave".to_string(), true)
        ]
    );

    dialogue.advance(Some(0)).expect("advance failed");
    assert_eq!(current_text(&dialogue), Some("You now have 5 gold."));

    dialogue.advance(None).expect("advance failed");
    let thanks = dialogue
        .current()
        .and_then(DialogueResult::as_text)
        .expect("should be text");
    assert_eq!(thanks.text, "Thank you for your purchase.");
    assert_eq!(thanks.metadata.title, "Shop");
    assert_eq!(
        (thanks.markup[0].name.as_str(), thanks.markup[0].position, thanks.markup[0].length),
        ("b", 0, 9)
    );
    assert!(dialogue.is_finished());
}

#[test]
fn leaving_the_shop() {
    let mut dialogue =
        Dialogue::from_source(MERCHANT, DialogueOptions::default()).expect("should start");
    dialogue.advance(None).expect("advance failed");
    dialogue.advance(Some(1)).expect("advance failed");
    assert_eq!(current_text(&dialogue), Some("Farewell."));
    assert!(dialogue.is_finished());
    assert!(!dialogue.runner().has_visited("Shop"));
}

#[test]
fn seeded_storage_overrides_declarations() {
    let options = DialogueOptions::new().variable_storage(MemoryStorage::new().with("gold", 2));
    let mut dialogue = Dialogue::from_source(MERCHANT, options).expect("should start");
    dialogue.advance(None).expect("advance failed");
    assert_eq!(
        options_of(&dialogue),
        [
            ("Buy a sword (5 gold)".to_string(), false),
            ("Leave".to_string(), true)
        ]
    );
}

#[test]
fn combined_mode_folds_the_greeting() {
    let options = DialogueOptions::new().combine_text_and_options(true);
    let mut dialogue = Dialogue::from_source(MERCHANT, options).expect("should start");
    let combined = dialogue
        .current()
        .and_then(DialogueResult::as_options)
        .expect("should be options");
    assert_eq!(combined.text.as_deref(), Some("Welcome, traveller!"));
    assert_eq!(combined.hashtags, ["greeting"]);

    dialogue.advance(Some(0)).expect("advance failed");
    assert_eq!(current_text(&dialogue), Some("You now have 5 gold."));
}

// -----------------------------------------------------------
// Indented scripts
// -----------------------------------------------------------

#[test]
fn indented_script_with_nested_options() {
    let script = "
    title: Start
    ---
    Pick one.
    -> Red
        -> Light red
            Pale.
        -> Dark red
            Deep.
    -> Blue
        Calm.
    ===
";
    let mut dialogue =
        Dialogue::from_source(script, DialogueOptions::default()).expect("should start");
    assert_eq!(current_text(&dialogue), Some("Pick one."));

    dialogue.advance(None).expect("advance failed");
    assert_eq!(options_of(&dialogue).len(), 2);

    dialogue.advance(Some(0)).expect("advance failed");
    assert_eq!(
        options_of(&dialogue),
        [
            ("Light red".to_string(), true),
            ("Dark red".to_string(), true)
        ]
    );

    dialogue.advance(Some(1)).expect("advance failed");
    assert_eq!(current_text(&dialogue), Some("Deep."));
    assert!(dialogue.is_finished());
}
