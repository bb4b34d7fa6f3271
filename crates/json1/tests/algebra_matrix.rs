mod common;

use common::{assert_compose_matches, assert_invertible, op};
use json1_ot::{compose, invert, invert_with_doc, make_invertible, op_to_value, Error};
use serde_json::{json, Value};

#[test]
fn compose_output_table() {
    let cases: Vec<(Value, Value, Value)> = vec![
        (json!(["a", {"i": 1}]), json!(["b", {"i": 2}]), json!([["a", {"i": 1}], ["b", {"i": 2}]])),
        (json!(["a", {"i": 1}]), json!(["a", {"r": true}]), json!(null)),
        (json!(["n", {"ena": 2}]), json!(["n", {"ena": 3}]), json!(["n", {"ena": 5}])),
        (json!(["a", {"i": "x"}]), json!(["a", {"es": [1, "y"]}]), json!(["a", {"i": "xy"}])),
        (json!(["a", {"i": 1}]), json!([["a", {"p": 0}], ["b", {"d": 0}]]), json!(["b", {"i": 1}])),
    ];
    for (op1, op2, expected) in cases {
        let out = compose(&op(op1.clone()), &op(op2.clone())).unwrap_or_else(|e| panic!("compose failed: {e}"));
        assert_eq!(op_to_value(&out), expected, "compose({op1}, {op2})");
    }
}

#[test]
fn compose_matches_sequential_apply() {
    let cases: Vec<(Value, Value, Value)> = vec![
        (json!({"a": {"b": 1}}), json!([["a", {"p": 0}], ["c", {"d": 0}]]), json!(["c", "b", {"ena": 4}])),
        (json!({"a": 1}), json!(["a", {"r": true}]), json!(["a", {"i": 2}])),
        (json!([1, 2, 3]), json!([0, {"r": true}]), json!([0, {"r": true}])),
        (json!([1, 2, 3]), json!([1, {"i": 9}]), json!([[0, {"p": 0}], [3, {"d": 0}]])),
        (json!({"s": "abc"}), json!(["s", {"es": [1, {"d": 1}]}]), json!(["s", {"es": ["z"]}])),
        (json!({"x": {"y": [1]}}), json!(["x", "y", 0, {"r": true, "i": 2}]), json!(["x", {"r": true}])),
        (json!({"a": 1, "b": 2}), json!([["a", {"p": 0}], ["b", {"p": 1}], ["c", {"d": 0}], ["d", {"d": 1}]]), json!(["c", {"ena": 1}])),
    ];
    for (doc, op1, op2) in cases {
        assert_compose_matches(&doc, &op(op1), &op(op2));
    }
}

#[test]
fn invert_round_trips() {
    let cases: Vec<(Value, Value)> = vec![
        (json!({"a": 1}), json!(["a", {"r": true}])),
        (json!({"a": 1}), json!(["b", {"i": [1, 2]}])),
        (json!({"a": 1}), json!(["a", {"r": true, "i": "x"}])),
        (json!({"s": "abc"}), json!(["s", {"es": [1, {"d": 1}]}])),
        (json!({"n": 3}), json!(["n", {"ena": -4}])),
        (json!([1, 2, 3]), json!([[0, {"p": 0}], [2, {"d": 0}]])),
        (json!({"a": {"b": 1}, "c": 2}), json!([["a", {"p": 0}, "b", {"r": true}], ["d", {"d": 0}]])),
        (json!({"l": [{"k": 1}, 2]}), json!(["l", [0, "k", {"ena": 1}], [1, {"r": true}]])),
    ];
    for (doc, o) in cases {
        assert_invertible(&doc, &op(o));
    }
}

#[test]
fn invert_restores_only_recorded_content() {
    let o = op(json!(["a", {"r": true}]));
    assert_eq!(op_to_value(&invert(&o).unwrap()), json!(["a", {"i": true}]));
    assert!(matches!(make_invertible(&o, Some(&json!({}))), Err(Error::InvalidDocument(_))));

    let doc = json!({"a": [1]});
    let full = make_invertible(&o, Some(&doc)).unwrap();
    assert_eq!(op_to_value(&full), json!(["a", {"r": [1]}]));
    assert_eq!(op_to_value(&invert_with_doc(&o, Some(&doc)).unwrap()), json!(["a", {"i": [1]}]));
}
