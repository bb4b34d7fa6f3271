use std::collections::HashMap;

use crate::cursor::WriteCursor;
use crate::error::Result;
use crate::subtype::{edit_of, write_edit};
use crate::types::{Field, Op};

/// Rewrite `op` into canonical form: nested descents merged and ordered,
/// slots renumbered in order of first appearance, embedded edits passed
/// through their subtype's `normalize` (noop edits disappear).
pub fn normalize(op: &Op) -> Result<Op> {
    let mut next_slot = 0;
    let mut slot_map: HashMap<usize, usize> = HashMap::new();
    let mut slot = |s: usize| {
        *slot_map.entry(s).or_insert_with(|| {
            next_slot += 1;
            next_slot - 1
        })
    };

    let mut w = WriteCursor::new();
    w.merge_tree_with(op, &mut |c, w| {
        if let Some((t, e)) = edit_of(Some(c))? {
            write_edit(w, t.as_ref(), t.normalize(e.clone()), false)?;
        }
        if let Some(r) = &c.r {
            w.write(Field::R(r.clone()))?;
        }
        if let Some(p) = c.p {
            w.write(Field::P(slot(p)))?;
        }
        if let Some(i) = &c.i {
            w.write(Field::I(i.clone()))?;
        }
        if let Some(d) = c.d {
            w.write(Field::D(slot(d)))?;
        }
        Ok(())
    })?;
    Ok(w.into_op())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{op_from_value, op_to_value};
    use serde_json::{json, Value};

    fn norm(v: Value) -> Value {
        op_to_value(&normalize(&op_from_value(v).unwrap()).unwrap())
    }

    #[test]
    fn collapses_single_descent() {
        assert_eq!(norm(json!([["a", {"r": true}]])), json!(["a", {"r": true}]));
    }

    #[test]
    fn renumbers_slots_by_first_appearance() {
        assert_eq!(
            norm(json!([["a", {"p": 1}], ["b", {"d": 1}], ["c", {"p": 0}], ["d", {"d": 0}]])),
            json!([["a", {"p": 0}], ["b", {"d": 0}], ["c", {"p": 1}], ["d", {"d": 1}]])
        );
    }

    #[test]
    fn drops_noop_edits() {
        assert_eq!(norm(json!(["t", {"es": []}])), json!(null));
        assert_eq!(norm(json!(["t", {"es": [3, "x", 2]}])), json!(["t", {"es": [3, "x"]}]));
    }

    #[test]
    fn null_stays_null() {
        assert_eq!(normalize(&None).unwrap(), None);
    }
}
