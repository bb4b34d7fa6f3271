mod common;

use common::op;
use json1_ot::{check_valid_op, is_noop, normalize, op_to_value, Error};
use serde_json::{json, Value};

#[test]
fn valid_ops() {
    for v in [
        json!(null),
        json!([{"i": {"a": 1}}]),
        json!([{"r": true, "i": []}]),
        json!(["a", 1, {"r": {"x": 1}}]),
        json!([["a", {"p": 0}], ["b", {"d": 0}]]),
        json!([["a", {"p": 1}], ["b", {"p": 0}], ["c", {"d": 1}], ["d", {"d": 0}]]),
        json!(["list", [0, {"r": true}], [3, {"i": "x"}], ["meta", {"ena": -1}]]),
        json!(["doc", {"es": [3, "abc", {"d": 2}]}]),
        json!(["doc", {"et": "text-unicode", "e": ["hi"]}]),
        json!(["n", {"et": "number", "e": 4}]),
    ] {
        if let Err(e) = check_valid_op(&op(v.clone())) {
            panic!("{v} rejected: {e}");
        }
    }
}

#[test]
fn invalid_ops() {
    for v in [
        json!([]),
        json!(["a"]),
        json!([{}]),
        json!(["a", {}]),
        json!(["a", {"p": 0}]),
        json!([["a", {"d": 0}], ["b", {"d": 0}]]),
        json!([["a", {"p": 1}], ["b", {"d": 1}]]),
        json!([["b", {"r": true}], ["a", {"r": true}]]),
        json!([["a", {"r": true}]]),
        json!(["__proto__", {"i": 1}]),
        json!(["a", {"p": 0, "r": true}, "b", {"d": 0}]),
        json!(["a", {"d": 0, "i": 1}, "b", {"p": 0}]),
        json!(["a", {"ena": 1, "es": ["x"]}]),
        json!(["a", {"e": 1}]),
        json!(["a", {"et": "nope", "e": 1}]),
        json!(["a", {"es": [3]}]),
        json!(["a", [{"r": true}], ["b", {"r": true}]]),
        json!(["a", ["b", {"r": true}], ["c", {"r": true}], "d", {"r": true}]),
    ] {
        assert!(check_valid_op(&op(v.clone())).is_err(), "{v} accepted");
    }
}

#[test]
fn missing_subtype_is_reported_by_name() {
    let err = check_valid_op(&op(json!(["a", {"et": "rich-text", "e": []}]))).unwrap_err();
    assert_eq!(err, Error::MissingSubtype("rich-text".into()));
}

#[test]
fn normalize_table() {
    let cases: Vec<(Value, Value)> = vec![
        (json!(null), json!(null)),
        (json!([["a", {"r": true}]]), json!(["a", {"r": true}])),
        (json!(["a", ["b", {"r": true}]]), json!(["a", "b", {"r": true}])),
        (json!(["a", {"et": "number", "e": 3}]), json!(["a", {"ena": 3}])),
        (json!(["s", {"et": "text-unicode", "e": ["x"]}]), json!(["s", {"es": ["x"]}])),
        (json!([["b", {"r": true}], ["a", {"r": true}]]), json!([["a", {"r": true}], ["b", {"r": true}]])),
        (json!([["a", {"p": 5}], ["b", {"d": 5}]]), json!([["a", {"p": 0}], ["b", {"d": 0}]])),
    ];
    for (input, expected) in cases {
        let out = normalize(&op(input.clone())).unwrap_or_else(|e| panic!("normalize {input} failed: {e}"));
        assert_eq!(op_to_value(&out), expected, "normalize({input})");
        check_valid_op(&out).unwrap();
    }
}

#[test]
fn only_null_is_a_noop() {
    assert!(is_noop(&None));
    assert!(!is_noop(&op(json!([{"r": true}]))));
    assert!(!is_noop(&op(json!(["x", {"ena": 0}]))));
}
