//! The `number` subtype: an edit is an amount to add.

use serde_json::{Number, Value};

use crate::error::{Error, Result};
use crate::subtype::{Subtype, NUMBER};
use crate::types::Side;

#[derive(Debug, Default, Clone, Copy)]
pub struct NumberSubtype;

fn not_a_number(v: &Value) -> Error {
    Error::subtype(NUMBER, format!("expected a number, got {v}"))
}

fn from_f64(n: f64) -> Result<Value> {
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| Error::subtype(NUMBER, format!("result {n} is not finite")))
}

/// Integer sums stay integral; anything else goes through `f64`.
fn add(a: &Value, b: &Value) -> Result<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Ok(Value::from(sum));
        }
    }
    let x = a.as_f64().ok_or_else(|| not_a_number(a))?;
    let y = b.as_f64().ok_or_else(|| not_a_number(b))?;
    from_f64(x + y)
}

impl Subtype for NumberSubtype {
    fn name(&self) -> &str {
        NUMBER
    }

    fn apply(&self, value: Value, edit: &Value) -> Result<Value> {
        add(&value, edit)
    }

    fn compose(&self, a: &Value, b: &Value) -> Result<Value> {
        add(a, b)
    }

    fn transform(&self, edit: &Value, _other: &Value, _side: Side) -> Result<Value> {
        Ok(edit.clone())
    }

    fn invert(&self, edit: &Value) -> Result<Value> {
        if let Some(n) = edit.as_i64().and_then(i64::checked_neg) {
            return Ok(Value::from(n));
        }
        edit.as_f64().ok_or_else(|| not_a_number(edit)).and_then(|n| from_f64(-n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_adds() {
        assert_eq!(NumberSubtype.apply(json!(5), &json!(3)).unwrap(), json!(8));
        assert_eq!(NumberSubtype.apply(json!(1.5), &json!(1)).unwrap(), json!(2.5));
    }

    #[test]
    fn compose_adds() {
        assert_eq!(NumberSubtype.compose(&json!(2), &json!(-7)).unwrap(), json!(-5));
    }

    #[test]
    fn invert_negates() {
        assert_eq!(NumberSubtype.invert(&json!(4)).unwrap(), json!(-4));
        assert_eq!(NumberSubtype.invert(&json!(0.5)).unwrap(), json!(-0.5));
    }

    #[test]
    fn transform_is_identity() {
        assert_eq!(
            NumberSubtype.transform(&json!(4), &json!(10), Side::Left).unwrap(),
            json!(4)
        );
    }

    #[test]
    fn applying_to_a_string_fails() {
        assert!(NumberSubtype.apply(json!("x"), &json!(1)).is_err());
    }
}
