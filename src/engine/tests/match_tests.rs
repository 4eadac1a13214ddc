//! Pattern matcher tests

use super::helpers::*;
use crate::engine::matching::match_event;
use crate::engine::types::{FieldPattern, Val};

#[test]
fn test_name_must_match_exactly() {
    let parts = CtxParts::new();
    let event = user_said("hi", "u-1");

    assert!(match_event(&pattern("UtteranceUserActionFinished"), &event, &parts.ctx()).unwrap());
    assert!(!match_event(&pattern("UtteranceUserActionStarted"), &event, &parts.ctx()).unwrap());
}

#[test]
fn test_field_equality() {
    let parts = CtxParts::new();
    let event = user_said("hi", "u-1");

    let hit = pattern_with("UtteranceUserActionFinished", vec![("final_transcript", eq(lit("hi")))]);
    let miss = pattern_with("UtteranceUserActionFinished", vec![("final_transcript", eq(lit("bye")))]);
    assert!(match_event(&hit, &event, &parts.ctx()).unwrap());
    assert!(!match_event(&miss, &event, &parts.ctx()).unwrap());
}

#[test]
fn test_missing_field_never_matches() {
    let parts = CtxParts::new();
    let event = external("UserIntent", "u-1");

    let p = pattern_with("UserIntent", vec![("intent", eq(lit("greet")))]);
    assert!(!match_event(&p, &event, &parts.ctx()).unwrap());
}

#[test]
fn test_field_expression_reads_scope() {
    let mut parts = CtxParts::new();
    parts
        .scope
        .insert("expected".to_string(), Val::Str("hi".to_string()));
    let event = user_said("hi", "u-1");

    let p = pattern_with(
        "UtteranceUserActionFinished",
        vec![("final_transcript", eq(var("expected")))],
    );
    assert!(match_event(&p, &event, &parts.ctx()).unwrap());
}

#[test]
fn test_regex_is_substring_search() {
    let parts = CtxParts::new();
    let event = user_said("well hi there", "u-1");

    let p = pattern_with(
        "UtteranceUserActionFinished",
        vec![(
            "final_transcript",
            FieldPattern::Regex {
                pattern: r"\bhi\b".to_string(),
            },
        )],
    );
    assert!(match_event(&p, &event, &parts.ctx()).unwrap());

    let p = pattern_with(
        "UtteranceUserActionFinished",
        vec![(
            "final_transcript",
            FieldPattern::Regex {
                pattern: r"^hi$".to_string(),
            },
        )],
    );
    assert!(!match_event(&p, &event, &parts.ctx()).unwrap());
}

#[test]
fn test_invalid_regex_is_an_error() {
    let parts = CtxParts::new();
    let event = user_said("hi", "u-1");
    let p = pattern_with(
        "UtteranceUserActionFinished",
        vec![(
            "final_transcript",
            FieldPattern::Regex {
                pattern: "(".to_string(),
            },
        )],
    );
    assert!(match_event(&p, &event, &parts.ctx()).is_err());
}

#[test]
fn test_numeric_comparators() {
    let parts = CtxParts::new();
    let event = external("SensorReading", "u-1").with_arg("value", Val::Num(5.0));

    let cases = [
        (FieldPattern::LessThan { expr: num(6.0) }, true),
        (FieldPattern::LessThan { expr: num(5.0) }, false),
        (FieldPattern::GreaterThan { expr: num(4.0) }, true),
        (FieldPattern::EqualLessThan { expr: num(5.0) }, true),
        (FieldPattern::EqualGreaterThan { expr: num(5.0) }, true),
        (FieldPattern::NotEqualTo { expr: num(4.0) }, true),
        (FieldPattern::NotEqualTo { expr: num(5.0) }, false),
    ];
    for (field, expected) in cases {
        let p = pattern_with("SensorReading", vec![("value", field)]);
        assert_eq!(match_event(&p, &event, &parts.ctx()).unwrap(), expected);
    }
}

#[test]
fn test_comparator_with_wrong_type_is_a_miss_not_an_error() {
    let parts = CtxParts::new();
    let event = external("SensorReading", "u-1").with_arg("value", Val::Str("high".into()));
    let p = pattern_with(
        "SensorReading",
        vec![("value", FieldPattern::LessThan { expr: num(6.0) })],
    );
    assert_eq!(match_event(&p, &event, &parts.ctx()).unwrap(), false);
}

#[test]
fn test_set_is_unordered_subset() {
    let parts = CtxParts::new();
    let event = external("ItemsPicked", "u-1").with_arg(
        "items",
        Val::List(vec![
            Val::Str("b".into()),
            Val::Str("a".into()),
            Val::Str("c".into()),
        ]),
    );

    let subset = pattern_with(
        "ItemsPicked",
        vec![(
            "items",
            FieldPattern::Set {
                items: vec![eq(lit("a")), eq(lit("c"))],
            },
        )],
    );
    assert!(match_event(&subset, &event, &parts.ctx()).unwrap());

    let not_subset = pattern_with(
        "ItemsPicked",
        vec![(
            "items",
            FieldPattern::Set {
                items: vec![eq(lit("a")), eq(lit("z"))],
            },
        )],
    );
    assert!(!match_event(&not_subset, &event, &parts.ctx()).unwrap());
}

#[test]
fn test_set_items_claim_distinct_elements() {
    let parts = CtxParts::new();
    let event =
        external("ItemsPicked", "u-1").with_arg("items", Val::List(vec![Val::Str("a".into())]));
    // Two pattern items cannot both claim the single "a"
    let p = pattern_with(
        "ItemsPicked",
        vec![(
            "items",
            FieldPattern::Set {
                items: vec![eq(lit("a")), eq(lit("a"))],
            },
        )],
    );
    assert!(!match_event(&p, &event, &parts.ctx()).unwrap());
}

#[test]
fn test_seq_is_ordered_subsequence_with_gaps() {
    let parts = CtxParts::new();
    let event = external("StepsTaken", "u-1").with_arg(
        "steps",
        Val::List(vec![
            Val::Str("a".into()),
            Val::Str("x".into()),
            Val::Str("b".into()),
        ]),
    );

    let in_order = pattern_with(
        "StepsTaken",
        vec![(
            "steps",
            FieldPattern::Seq {
                items: vec![eq(lit("a")), eq(lit("b"))],
            },
        )],
    );
    assert!(match_event(&in_order, &event, &parts.ctx()).unwrap());

    let out_of_order = pattern_with(
        "StepsTaken",
        vec![(
            "steps",
            FieldPattern::Seq {
                items: vec![eq(lit("b")), eq(lit("a"))],
            },
        )],
    );
    assert!(!match_event(&out_of_order, &event, &parts.ctx()).unwrap());
}

#[test]
fn test_dict_checks_listed_keys_only() {
    use std::collections::BTreeMap;

    let parts = CtxParts::new();
    let event = external("FormSubmitted", "u-1").with_arg(
        "form",
        Val::Obj(BTreeMap::from([
            ("name".to_string(), Val::Str("ada".into())),
            ("age".to_string(), Val::Num(36.0)),
        ])),
    );

    let p = pattern_with(
        "FormSubmitted",
        vec![(
            "form",
            FieldPattern::Dict {
                fields: BTreeMap::from([("name".to_string(), eq(lit("ada")))]),
            },
        )],
    );
    assert!(match_event(&p, &event, &parts.ctx()).unwrap());

    let missing_key = pattern_with(
        "FormSubmitted",
        vec![(
            "form",
            FieldPattern::Dict {
                fields: BTreeMap::from([("email".to_string(), eq(lit("x")))]),
            },
        )],
    );
    assert!(!match_event(&missing_key, &event, &parts.ctx()).unwrap());
}

#[test]
fn test_envelope_fields_are_matchable() {
    let parts = CtxParts::new();
    let event = action_finished("TimerBotAction", "action-9", "u-1");
    let p = pattern_with(
        "TimerBotActionFinished",
        vec![("action_uid", eq(lit("action-9")))],
    );
    assert!(match_event(&p, &event, &parts.ctx()).unwrap());
}
