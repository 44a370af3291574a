//! End-to-end scenarios against the public `Engine` façade.

use lazylang::engine::Engine;
use lazylang::error::LazyErrorKind;
use lazylang::format::Style;
use lazylang::token::Span;
use lazylang::value::Value;

fn run(source: &str) -> Value {
    let mut engine = Engine::new(None);
    engine.evaluate(source, "main.lazy", None).expect("evaluation should succeed")
}

fn run_compact(source: &str) -> String {
    let mut engine = Engine::new(None);
    let value = engine.evaluate(source, "main.lazy", None).expect("evaluation should succeed");
    engine.format(&value, Style::Compact, Span::default()).expect("formatting should succeed")
}

#[test]
fn arithmetic_then_multiply() {
    assert_eq!(run_compact("let x = 1 + 2; x * 4"), "12");
}

#[test]
fn lambda_application() {
    assert_eq!(run_compact("let f = n -> n * n; f 7"), "49");
}

#[test]
fn object_merge_overwrites_and_appends() {
    assert_eq!(
        run_compact("{ a: 1, b: 2 } & { b: 20, c: 30 }"),
        "{ a: 1, b: 20, c: 30 }"
    );
}

#[test]
fn patch_field_deep_merge_preserves_siblings() {
    assert_eq!(
        run_compact("{ user: { name: \"a\", age: 1 } } & { user { age: 2 } }"),
        "{ user: { name: \"a\", age: 2 } }"
    );
}

#[test]
fn inclusive_range_comprehension_with_filter() {
    assert_eq!(run_compact("[ n * n for n in 1..4 when n != 2 ]"), "[1, 9, 16]");
}

#[test]
fn when_matches_falls_through_to_otherwise() {
    assert_eq!(
        run_compact("when 3 matches 1 then \"one\"; 2 then \"two\"; otherwise \"many\""),
        "\"many\""
    );
}

#[test]
fn fold_via_pipeline_inside_interpolation() {
    assert_eq!(
        run_compact("let xs = [1, 2, 3]; \"sum=${xs \\ fold 0 (+)}\""),
        "\"sum=6\""
    );
}

#[test]
fn crash_surfaces_as_user_crash_with_message() {
    let mut engine = Engine::new(None);
    let err = engine.evaluate("crash \"nope\"", "main.lazy", None).unwrap_err();
    match err.kind {
        LazyErrorKind::UserCrash { message } => assert_eq!(message, "nope"),
        other => panic!("expected UserCrash, got {other:?}"),
    }
}

#[test]
fn self_referencing_binding_is_a_cycle() {
    // `evaluate` only reaches WHNF, and a bare `rec.a` is already WHNF as
    // an unforced thunk, so the cycle only surfaces once something forces
    // it all the way down — here, `format`.
    let mut engine = Engine::new(None);
    let value = engine
        .evaluate("let rec = { a: rec.a }; rec.a", "main.lazy", None)
        .unwrap();
    let err = engine
        .format(&value, Style::Compact, Span::default())
        .unwrap_err();
    assert!(matches!(err.kind, LazyErrorKind::CycleDetected));
}

#[test]
fn pipeline_is_equivalent_to_direct_application() {
    assert_eq!(run("5 \\ (n -> n * n)"), run("(n -> n * n) 5"));
}

#[test]
fn shared_binding_forces_to_the_same_value_from_every_use_site() {
    assert_eq!(run_compact("let shared = 1 + 1; [shared, shared]"), "[2, 2]");
}

#[test]
fn unforced_binding_never_surfaces_its_error() {
    // `bad` is never demanded, so the division-by-zero inside it must not
    // surface when the rest of the program doesn't need it.
    assert_eq!(run_compact("let bad = 1 / 0; 42"), "42");
}

#[test]
fn json_round_trip_preserves_scalars_and_arrays() {
    let mut engine = Engine::new(None);
    let value = engine
        .evaluate("[1, \"x\", true, null]", "main.lazy", None)
        .unwrap();
    let json = engine.format(&value, Style::Json, Span::default()).unwrap();
    assert_eq!(json, "[1,\"x\",true,null]");
}

#[test]
fn object_merge_is_associative_without_patch_fields() {
    let left = run_compact("({ a: 1 } & { b: 2 }) & { c: 3 }");
    let right = run_compact("{ a: 1 } & ({ b: 2 } & { c: 3 })");
    assert_eq!(left, right);
    assert_eq!(left, "{ a: 1, b: 2, c: 3 }");
}

#[test]
fn empty_object_is_merge_left_identity() {
    assert_eq!(run_compact("{} & { a: 1 }"), "{ a: 1 }");
}
