#![allow(dead_code)]

use json1_ot::{apply, compose, invert, make_invertible, op_from_value, transform, try_transform, Op, Side};
use serde_json::Value;

pub fn op(v: Value) -> Op {
    op_from_value(v.clone()).unwrap_or_else(|e| panic!("failed to parse op {v}: {e}"))
}

pub fn run(doc: &Value, ops: &[&Op]) -> Option<Value> {
    let mut cur = Some(doc.clone());
    for o in ops {
        cur = apply(cur, o).unwrap_or_else(|e| panic!("apply {o:?} failed: {e}"));
    }
    cur
}

pub fn assert_compose_matches(doc: &Value, op1: &Op, op2: &Op) {
    let composed = compose(op1, op2).unwrap_or_else(|e| panic!("compose failed: {e}"));
    json1_ot::check_valid_op(&composed).unwrap_or_else(|e| panic!("compose produced {composed:?}: {e}"));
    assert_eq!(run(doc, &[&composed]), run(doc, &[op1, op2]), "compose({op1:?}, {op2:?}) = {composed:?}");
}

/// Returns false when either direction reports a conflict.
pub fn assert_converges(doc: &Value, op1: &Op, op2: &Op) -> bool {
    let (Ok(left), Ok(right)) = (
        try_transform(op1, op2, Side::Left).unwrap(),
        try_transform(op2, op1, Side::Right).unwrap(),
    ) else {
        return false;
    };
    json1_ot::check_valid_op(&left).unwrap();
    json1_ot::check_valid_op(&right).unwrap();
    let via_op2 = run(doc, &[op2, &left]);
    let via_op1 = run(doc, &[op1, &right]);
    assert_eq!(via_op1, via_op2, "op1 = {op1:?}, op2 = {op2:?}, op1' = {left:?}, op2' = {right:?}");
    assert_eq!(left, transform(op1, op2, Side::Left).unwrap());
    true
}

pub fn assert_invertible(doc: &Value, o: &Op) {
    let full = make_invertible(o, Some(doc)).unwrap_or_else(|e| panic!("make_invertible failed: {e}"));
    let inv = invert(&full).unwrap_or_else(|e| panic!("invert failed: {e}"));
    let after = run(doc, &[o]);
    let back = apply(after, &inv).unwrap_or_else(|e| panic!("applying {inv:?} failed: {e}"));
    assert_eq!(back, Some(doc.clone()), "op = {o:?}, inverse = {inv:?}");
}
