mod common;

use common::{assert_converges, op, run};
use json1_ot::{
    op_to_value, transform, transform_no_conflict, transform_with_conflicts_pred, try_transform, ConflictType,
    Json1Config, Side,
};
use serde_json::{json, Value};

fn xf(op1: Value, op2: Value, side: Side) -> Value {
    op_to_value(&transform(&op(op1), &op(op2), side).unwrap_or_else(|e| panic!("transform failed: {e}")))
}

#[test]
fn transform_output_table() {
    let move_a_to_b = json!([["a", {"p": 0}], ["b", {"d": 0}]]);
    let cases: Vec<(Value, Value, Side, Value)> = vec![
        (json!(["x", {"r": true}]), json!(["x", {"r": true}]), Side::Left, json!(null)),
        (json!([1, {"i": "a"}]), json!([0, {"i": "b"}]), Side::Left, json!([2, {"i": "a"}])),
        (json!([0, {"i": "a"}]), json!([0, {"i": "b"}]), Side::Left, json!([0, {"i": "a"}])),
        (json!([0, {"i": "a"}]), json!([0, {"i": "b"}]), Side::Right, json!([1, {"i": "a"}])),
        (json!([2, {"r": true}]), json!([0, {"r": true}]), Side::Left, json!([1, {"r": true}])),
        (json!([0, {"r": true}]), json!([2, {"r": true}]), Side::Left, json!([0, {"r": true}])),
        (json!(["a", {"ena": 1}]), move_a_to_b.clone(), Side::Left, json!(["b", {"ena": 1}])),
        (json!(["a", {"r": true}]), move_a_to_b.clone(), Side::Left, json!(["b", {"r": true}])),
        (json!(["a", "x", {"i": 1}]), move_a_to_b.clone(), Side::Left, json!(["b", "x", {"i": 1}])),
        (json!(["n", {"ena": 2}]), json!(["n", {"ena": 3}]), Side::Left, json!(["n", {"ena": 2}])),
        (json!(["s", {"es": [1, "x"]}]), json!(["s", {"es": ["ab"]}]), Side::Left, json!(["s", {"es": [3, "x"]}])),
        (json!(["y", {"i": 1}]), json!(["x", {"r": true}]), Side::Right, json!(["y", {"i": 1}])),
        (
            json!(["x", [0, {"p": 0}], [1, {"r": true}], [2, {"d": 0}]]),
            json!([["a", {"d": 0}], ["x", {"p": 0}]]),
            Side::Left,
            json!(["a", [0, {"p": 0}], [1, {"r": true}], [2, {"d": 0}]]),
        ),
    ];
    for (op1, op2, side, expected) in cases {
        assert_eq!(xf(op1.clone(), op2.clone(), side), expected, "op1 = {op1}, op2 = {op2}, side = {side:?}");
    }
}

#[test]
fn concurrent_ops_converge() {
    let cases: Vec<(Value, Value, Value)> = vec![
        (json!({"a": 1, "b": 2}), json!(["a", {"r": true}]), json!(["c", {"i": 3}])),
        (json!([1, 2, 3]), json!([0, {"r": true}]), json!([2, {"i": 9}])),
        (json!([1, 2, 3]), json!([1, {"i": 7}]), json!([1, {"i": 8}])),
        (json!([1, 2, 3]), json!([[0, {"p": 0}], [2, {"d": 0}]]), json!([1, {"r": true}])),
        (json!({"a": 5, "b": 1}), json!([["a", {"p": 0}], ["c", {"d": 0}]]), json!(["a", {"ena": 2}])),
        (json!({"s": "hello"}), json!(["s", {"es": [5, " world"]}]), json!(["s", {"es": [{"d": 1}]}])),
        (json!({"x": {"y": 1}}), json!(["x", "y", {"r": true}]), json!(["x", {"r": true}])),
        (json!({"l": ["a", "b"]}), json!(["l", 0, {"r": true, "i": "z"}]), json!(["l", 1, {"r": true}])),
        (
            json!({"x": [1, 2, 3, 4]}),
            json!(["x", [0, {"p": 0}], [1, {"r": true}], [2, {"d": 0}]]),
            json!([["a", {"d": 0}], ["x", {"p": 0}]]),
        ),
    ];
    for (doc, op1, op2) in cases {
        assert!(assert_converges(&doc, &op(op1.clone()), &op(op2.clone())), "unexpected conflict: {op1} vs {op2}");
    }
}

#[test]
fn conflict_table() {
    let cases: Vec<(Value, Value, ConflictType)> = vec![
        (json!(["k", {"i": 1}]), json!(["k", {"i": 2}]), ConflictType::DropCollision),
        (json!(["a", "b", {"i": 1}]), json!(["a", {"r": true}]), ConflictType::RmUnexpectedContent),
        (json!(["a", "b", {"ena": 1}]), json!(["a", {"r": true}]), ConflictType::RmUnexpectedContent),
        (
            json!([["a", {"p": 0}], ["b", "x", {"d": 0}]]),
            json!([["a", "y", {"d": 0}], ["b", {"p": 0}]]),
            ConflictType::Blackhole,
        ),
    ];
    for (op1, op2, kind) in cases {
        let conflict = try_transform(&op(op1.clone()), &op(op2.clone()), Side::Left)
            .unwrap()
            .expect_err("expected a conflict");
        assert_eq!(conflict.kind, kind, "op1 = {op1}, op2 = {op2}");
    }
}

#[test]
fn resolved_drop_collision_follows_side() {
    let op1 = op(json!(["k", {"i": 1}]));
    let op2 = op(json!(["k", {"i": 2}]));
    let doc = json!({});

    let left = transform_no_conflict(&op1, &op2, Side::Left).unwrap();
    let right = transform_no_conflict(&op2, &op1, Side::Right).unwrap();
    assert_eq!(run(&doc, &[&op2, &left]), Some(json!({"k": 1})));
    assert_eq!(run(&doc, &[&op1, &right]), Some(json!({"k": 1})));
}

#[test]
fn resolved_remove_beats_insert() {
    let op1 = op(json!(["a", "b", {"i": 1}]));
    let op2 = op(json!(["a", {"r": true}]));
    let doc = json!({"a": {}});

    let left = transform_no_conflict(&op1, &op2, Side::Left).unwrap();
    let right = transform_no_conflict(&op2, &op1, Side::Right).unwrap();
    assert_eq!(run(&doc, &[&op2, &left]), Some(json!({})));
    assert_eq!(run(&doc, &[&op1, &right]), Some(json!({})));
}

#[test]
fn rejected_conflicts_surface_as_errors() {
    let config = Json1Config::default();
    let err = transform_with_conflicts_pred(
        &config,
        |c| c.kind != ConflictType::DropCollision,
        &op(json!(["k", {"i": 1}])),
        &op(json!(["k", {"i": 2}])),
        Side::Left,
    )
    .unwrap_err();
    assert_eq!(err.conflict().map(|c| c.kind), Some(ConflictType::DropCollision));
}
