mod common;

use std::sync::Arc;

use common::op;
use json1_ot::{
    edit_op, get_subtype, path, register_subtype, ConflictType, Error, Json1Config, Json1Type, OtType, Result, Side,
    Subtype,
};
use serde_json::{json, Value};

#[test]
fn config_from_toml() {
    let config = Json1Config::from_toml_str("max_conflict_rounds = 3\ncheck_output = true\n").unwrap();
    assert_eq!(config, Json1Config { max_conflict_rounds: 3, check_output: true });

    let err = Json1Config::from_toml_str("max_rounds = 3").unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{err}");
}

#[test]
fn type_drives_a_full_edit_cycle() {
    let t = Json1Type::with_config(Json1Config { check_output: true, ..Json1Config::default() });
    let doc = t.create(Some(json!({"title": "draft", "count": 1})));

    let mine = op(json!(["title", {"es": [5, "!"]}]));
    let theirs = op(json!(["count", {"ena": 1}]));
    let mine_after = t.transform(&mine, &theirs, Side::Left).unwrap();
    let doc = t.apply(t.apply(doc, &theirs).unwrap(), &mine_after).unwrap();
    assert_eq!(doc, Some(json!({"title": "draft!", "count": 2})));

    let both = t.compose(&theirs, &mine_after).unwrap();
    let undo = t.invert(&both).unwrap();
    assert_eq!(t.apply(doc, &undo).unwrap(), Some(json!({"title": "draft", "count": 1})));
}

#[test]
fn conflict_policy_is_configurable() {
    let op1 = op(json!(["k", {"i": "mine"}]));
    let op2 = op(json!(["k", {"i": "theirs"}]));

    let strict = Json1Type::new();
    assert_eq!(
        strict.transform(&op1, &op2, Side::Left).unwrap_err().conflict().map(|c| c.kind),
        Some(ConflictType::DropCollision)
    );
    assert!(strict.try_transform(&op1, &op2, Side::Left).unwrap().is_err());

    let lenient = Json1Type::new().allowing_conflicts(|_| true);
    let out = lenient.transform(&op1, &op2, Side::Left).unwrap();
    assert_eq!(lenient.apply(Some(json!({"k": "theirs"})), &out).unwrap(), Some(json!({"k": "mine"})));
}

#[test]
fn round_cap_applies_to_the_type() {
    let t = Json1Type::with_config(Json1Config { max_conflict_rounds: 0, ..Json1Config::default() })
        .allowing_conflicts(|_| true);
    let err = t
        .transform(&op(json!(["k", {"i": 1}])), &op(json!(["k", {"i": 2}])), Side::Left)
        .unwrap_err();
    assert!(matches!(err, Error::ConflictRoundsExceeded { rounds: 0, .. }), "{err}");
}

#[test]
fn position_follows_moves() {
    let t = Json1Type::new();
    let mv = op(json!([["a", {"p": 0}], ["b", {"d": 0}]]));
    assert_eq!(t.transform_position(&path!["a", "x"], &mv).unwrap(), Some(path!["b", "x"]));
    assert_eq!(t.transform_position(&path!["a"], &op(json!(["a", {"r": true}]))).unwrap(), None);
    assert_eq!(t.transform_position(&path![3], &op(json!([1, {"i": 0}]))).unwrap(), Some(path![4]));
}

#[derive(Debug)]
struct Max;

impl Subtype for Max {
    fn name(&self) -> &str {
        "test-max"
    }

    fn apply(&self, value: Value, edit: &Value) -> Result<Value> {
        Ok(json!(value.as_i64().unwrap_or(0).max(edit.as_i64().unwrap_or(0))))
    }

    fn compose(&self, a: &Value, b: &Value) -> Result<Value> {
        self.apply(a.clone(), b)
    }

    fn transform(&self, edit: &Value, _other: &Value, _side: Side) -> Result<Value> {
        Ok(edit.clone())
    }
}

#[test]
fn registered_subtypes_take_part_in_ops() {
    register_subtype(Arc::new(Max));
    let max = get_subtype("test-max").unwrap();
    let t = Json1Type::new();

    let o = edit_op(&path!["m"], max.as_ref(), json!(7), false);
    assert_eq!(o, op(json!(["m", {"et": "test-max", "e": 7}])));
    t.check_valid_op(&o).unwrap();
    assert_eq!(t.apply(Some(json!({"m": 3})), &o).unwrap(), Some(json!({"m": 7})));

    let composed = t.compose(&o, &op(json!(["m", {"et": "test-max", "e": 9}]))).unwrap();
    assert_eq!(composed, op(json!(["m", {"et": "test-max", "e": 9}])));
    assert!(matches!(t.invert(&o), Err(Error::Unsupported(_))));
}
