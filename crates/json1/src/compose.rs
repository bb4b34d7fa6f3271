//! Composition of sequential operations.
//!
//! `op1`'s drop phase and `op2`'s pick phase both act on the intermediate
//! document, so the two are walked together from the root. Each step maps
//! a mid-document position back into `op1`'s pick coordinates and forward
//! into `op2`'s drop coordinates, following moves through their slots.
//! Content inserted by `op1` and then touched by `op2` is rewritten in
//! place inside the insert literal.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::apply::{child, child_mut, insert_child, remove_child};
use crate::cursor::{comp, each_child_of, has_drop, has_pick, index_key, Advancer, ReadCursor, Track, WriteCursor};
use crate::error::{Error, Result};
use crate::subtype::{edit_type, get_edit, same_subtype, write_edit};
use crate::types::{Component, Field, Key, Op};
use crate::validate::check_valid_op;

type Writer = usize;

/// Replace or remove `key` inside a literal being rewritten.
fn set_or_remove_child(container: &mut Value, key: &Key, value: Option<Value>) -> Result<()> {
    match value {
        Some(v) => match child_mut(container, key) {
            Some(slot) => *slot = v,
            None => insert_child(container, key, v)?,
        },
        None => {
            remove_child(container, key);
        }
    }
    Ok(())
}

struct Composer<'a> {
    writers: Vec<WriteCursor>,
    next_slot: usize,
    held1_pick: HashMap<usize, ReadCursor<'a>>,
    held2_drop: HashMap<usize, ReadCursor<'a>>,
    held_pick_writes: HashMap<usize, Writer>,
    held_drop_writes: HashMap<usize, Writer>,
    p1_slot_map: HashMap<usize, usize>,
    p2_slot_map: HashMap<usize, usize>,
    visited_op2_edits: HashSet<*const Component>,
}

impl<'a> Composer<'a> {
    fn new_writer(&mut self) -> Writer {
        self.writers.push(WriteCursor::new());
        self.writers.len() - 1
    }

    fn take_slot(&mut self) -> usize {
        self.next_slot += 1;
        self.next_slot - 1
    }

    /// Walk one node of the intermediate document. `lit_in` is the value of
    /// this node when it sits inside something `op1` inserted. Returns the
    /// rewritten literal when the caller should keep it.
    #[allow(clippy::too_many_arguments)]
    fn xf_boundary(
        &mut self,
        mut r1_pick: Option<ReadCursor<'a>>,
        r1_drop: Option<ReadCursor<'a>>,
        r2_pick: Option<ReadCursor<'a>>,
        mut r2_drop: Option<ReadCursor<'a>>,
        lit_in: Option<Value>,
        rm_parent: bool,
        mut wd: Writer,
        mut wp: Writer,
    ) -> Result<Option<Value>> {
        let c1d = comp(&r1_drop);
        let c2p = comp(&r2_pick);
        let rm_here = c2p.is_some_and(|c| c.r.is_some());
        let ins_here = c1d.is_some_and(|c| c.i.is_some());
        let drop1_slot = c1d.and_then(|c| c.d);
        let pick2_slot = c2p.and_then(|c| c.p);
        let rm_children = (rm_parent || rm_here) && pick2_slot.is_none();

        if let Some(s2) = pick2_slot {
            r2_drop = self.held2_drop.get(&s2).cloned();
            wd = self.new_writer();
            self.held_drop_writes.insert(s2, wd);
        } else if rm_here || comp(&r2_drop).is_some_and(|c| c.d.is_some()) {
            r2_drop = None;
        }
        let c2d = comp(&r2_drop);

        if let Some(s1) = drop1_slot {
            r1_pick = self.held1_pick.get(&s1).cloned();
            wp = self.new_writer();
            self.held_pick_writes.insert(s1, wp);
            if rm_children {
                if rm_parent && !rm_here {
                    self.writers[wp].write(Field::R(Value::Bool(true)))?;
                }
            } else {
                let slot = self.take_slot();
                self.p1_slot_map.insert(s1, slot);
                self.writers[wd].write(Field::D(slot))?;
            }
        } else if ins_here || comp(&r1_pick).is_some_and(|c| c.p.is_some()) {
            r1_pick = None;
        }

        let had_lit = lit_in.is_some();
        let mut lit_out = match c1d.and_then(|c| c.i.as_ref()) {
            Some(i) => Some(i.clone()),
            None => lit_in,
        };
        let write_ins = match pick2_slot {
            None => ins_here && !rm_parent && !rm_here,
            Some(_) => lit_out.is_some(),
        };

        match (pick2_slot, c2p) {
            (Some(s2), _) => {
                if !had_lit && !ins_here {
                    let slot = match drop1_slot.and_then(|s1| self.p1_slot_map.get(&s1).copied()) {
                        Some(slot) => slot,
                        None => self.take_slot(),
                    };
                    self.p2_slot_map.insert(s2, slot);
                    self.writers[wp].write(Field::P(slot))?;
                }
            }
            (None, Some(Component { r: Some(r), .. })) if !ins_here && !had_lit => {
                self.writers[wp].write(Field::R(r.clone()))?;
            }
            _ => {}
        }

        let type1 = if rm_children { None } else { edit_type(c1d)? };
        let type2 = edit_type(c2d)?;
        let e1 = c1d.and_then(get_edit);
        let e2 = c2d.and_then(get_edit);
        match (type1, type2, e1, e2) {
            (Some(t1), Some(t2), Some(e1), Some(e2)) => {
                if !same_subtype(t1.as_ref(), t2.as_ref()) {
                    return Err(Error::IncompatibleEdits(t1.name().into(), t2.name().into()));
                }
                let composed = t1.compose(e1, e2)?;
                write_edit(&mut self.writers[wd], t1.as_ref(), composed, false)?;
                self.visited_op2_edits.extend(c2d.map(|c| c as *const Component));
            }
            (Some(t1), None, Some(e1), _) => {
                write_edit(&mut self.writers[wd], t1.as_ref(), e1.clone(), false)?;
            }
            (None, Some(t2), _, Some(e2)) => {
                write_edit(&mut self.writers[wd], t2.as_ref(), e2.clone(), false)?;
                self.visited_op2_edits.extend(c2d.map(|c| c as *const Component));
            }
            (Some(t), _, _, _) | (_, Some(t), _, _) => {
                return Err(Error::invalid(format!("Missing edit for type {}", t.name())));
            }
            _ => {}
        }

        let has_container_literal = matches!(lit_out, Some(Value::Array(_) | Value::Object(_)));
        let mut p1_drop_off: isize = 0;
        let mut p2_pick_off: isize = 0;
        let mut lit_off: isize = 0;
        let mut p2_drop_adv = Advancer::mapped(r2_drop, Track::Drops);
        let mut p1_pick_adv = Advancer::mapped(r1_pick, Track::Picks);

        each_child_of(r1_drop, r2_pick, |in_key, p1d, p2p| {
            let p1p;
            let p2d;
            let p1_pick_key;
            let p2_drop_key;
            let lit_key;
            match in_key {
                Key::Index(k) => {
                    let k = *k as isize;
                    let p2_mid = k + p2_pick_off;
                    p2d = p2_drop_adv.seek_index(p2_mid);
                    p2_drop_key = index_key(p2_mid + p2_drop_adv.offset(), "p2DropKey")?;
                    let p1_mid = k + p1_drop_off;
                    let found = p1_pick_adv.seek_index(p1_mid);
                    p1p = if has_drop(comp(&p2d)) { None } else { found };
                    p1_pick_key = index_key(p1_mid + p1_pick_adv.offset(), "p1PickKey")?;
                    lit_key = index_key(k + lit_off, "literal key")?;

                    let hd1 = has_drop(comp(&p1d));
                    let hp2 = has_pick(comp(&p2p));
                    if hd1 || (hp2 && !rm_children) {
                        lit_off -= 1;
                    }
                    if hd1 {
                        p1_drop_off -= 1;
                    }
                    if hp2 {
                        p2_pick_off -= 1;
                    }
                }
                Key::Field(_) => {
                    p1p = p1_pick_adv.seek_key(in_key);
                    p2d = p2_drop_adv.seek_key(in_key);
                    p1_pick_key = in_key.clone();
                    p2_drop_key = in_key.clone();
                    lit_key = in_key.clone();
                }
            }

            self.writers[wp].descend(p1_pick_key)?;
            self.writers[wd].descend(p2_drop_key)?;
            let lit = match &lit_out {
                Some(l) if has_container_literal && !has_drop(comp(&p1d)) => child(l, &lit_key).cloned(),
                _ => None,
            };
            let result = self.xf_boundary(p1p, p1d, p2p, p2d, lit.clone(), rm_children, wd, wp)?;
            if has_container_literal && !rm_children && lit != result {
                if let Some(l) = lit_out.as_mut() {
                    set_or_remove_child(l, &lit_key, result)?;
                }
            }
            self.writers[wd].ascend();
            self.writers[wp].ascend();
            Ok(())
        })?;

        if write_ins {
            if let Some(v) = lit_out {
                self.writers[wd].write(Field::I(v))?;
            }
            Ok(None)
        } else if !rm_parent && !rm_here && pick2_slot.is_none() {
            Ok(lit_out)
        } else {
            Ok(None)
        }
    }
}

/// Compose `op1` followed by `op2` into a single operation with the same
/// effect on any document both apply to.
pub fn compose(op1: &Op, op2: &Op) -> Result<Op> {
    check_valid_op(op1)?;
    check_valid_op(op2)?;
    if op1.is_none() {
        return Ok(op2.clone());
    }
    if op2.is_none() {
        return Ok(op1.clone());
    }

    let mut held1_pick = HashMap::new();
    ReadCursor::new(op1).each_pick(None, |slot, r, _| {
        held1_pick.insert(slot, r.clone());
        Ok(())
    })?;
    let mut held2_drop = HashMap::new();
    ReadCursor::new(op2).each_drop(None, |slot, r, _| {
        held2_drop.insert(slot, r.clone());
        Ok(())
    })?;

    let mut cx = Composer {
        writers: vec![WriteCursor::new(), WriteCursor::new()],
        next_slot: 0,
        held1_pick,
        held2_drop,
        held_pick_writes: HashMap::new(),
        held_drop_writes: HashMap::new(),
        p1_slot_map: HashMap::new(),
        p2_slot_map: HashMap::new(),
        visited_op2_edits: HashSet::new(),
    };
    let r1 = ReadCursor::new(op1);
    let r2 = ReadCursor::new(op2);
    cx.xf_boundary(Some(r1.clone()), Some(r1), Some(r2.clone()), Some(r2), None, false, 0, 1)?;

    let mut w = std::mem::take(&mut cx.writers[0]);
    let picks_mid = std::mem::take(&mut cx.writers[1]);
    w.reset();
    w.merge_tree(picks_mid.get())?;
    w.reset();

    ReadCursor::new(op1).traverse(Some(&mut w), &mut |c, _, w| {
        let Some(w) = w else { return Ok(()) };
        if let Some(slot1) = c.p {
            if let Some(&slot) = cx.p1_slot_map.get(&slot1) {
                w.write(Field::P(slot))?;
            }
            if let Some(&held) = cx.held_pick_writes.get(&slot1) {
                w.merge_tree(cx.writers[held].get())?;
            }
        } else if let Some(r) = &c.r {
            w.write(Field::R(r.clone()))?;
        }
        Ok(())
    })?;
    w.reset();

    ReadCursor::new(op2).traverse(Some(&mut w), &mut |c, _, w| {
        let Some(w) = w else { return Ok(()) };
        if let Some(slot2) = c.d {
            if let Some(&slot) = cx.p2_slot_map.get(&slot2) {
                w.write(Field::D(slot))?;
            }
            if let Some(&held) = cx.held_drop_writes.get(&slot2) {
                w.merge_tree(cx.writers[held].get())?;
            }
        } else if let Some(i) = &c.i {
            w.write(Field::I(i.clone()))?;
        }
        if let Some(t) = edit_type(Some(c))? {
            if !cx.visited_op2_edits.contains(&(c as *const Component)) {
                if let Some(e) = get_edit(c) {
                    write_edit(w, t.as_ref(), e.clone(), false)?;
                }
            }
        }
        Ok(())
    })?;

    Ok(w.into_op())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply;
    use crate::types::{op_from_value, op_to_value};
    use serde_json::json;

    fn c(a: Value, b: Value) -> Value {
        op_to_value(&compose(&op_from_value(a).unwrap(), &op_from_value(b).unwrap()).unwrap())
    }

    #[test]
    fn null_is_identity() {
        assert_eq!(c(json!(null), json!(["a", {"r": true}])), json!(["a", {"r": true}]));
        assert_eq!(c(json!(["a", {"r": true}]), json!(null)), json!(["a", {"r": true}]));
    }

    #[test]
    fn insert_then_remove_cancels() {
        assert_eq!(c(json!(["x", {"i": 5}]), json!(["x", {"r": true}])), json!(null));
    }

    #[test]
    fn insert_then_edit_rewrites_literal() {
        assert_eq!(c(json!(["x", {"i": 5}]), json!(["x", {"ena": 2}])), json!(["x", {"i": 5, "ena": 2}]));
        assert_eq!(
            c(json!(["x", {"i": {"a": 1, "b": 2}}]), json!(["x", "a", {"r": true}])),
            json!(["x", {"i": {"b": 2}}])
        );
    }

    #[test]
    fn edits_compose_through_the_subtype() {
        assert_eq!(c(json!(["n", {"ena": 1}]), json!(["n", {"ena": 2}])), json!(["n", {"ena": 3}]));
        assert_eq!(
            c(json!(["t", {"es": ["ab"]}]), json!(["t", {"es": [2, "c"]}])),
            json!(["t", {"es": ["abc"]}])
        );
    }

    #[test]
    fn chained_moves_collapse() {
        assert_eq!(
            c(json!([["a", {"p": 0}], ["b", {"d": 0}]]), json!([["b", {"p": 0}], ["c", {"d": 0}]])),
            json!([["a", {"p": 0}], ["c", {"d": 0}]])
        );
    }

    #[test]
    fn move_then_remove_becomes_remove() {
        assert_eq!(
            c(json!([["a", {"p": 0}], ["b", {"d": 0}]]), json!(["b", {"r": true}])),
            json!(["a", {"r": true}])
        );
    }

    #[test]
    fn list_inserts_compose_to_same_document() {
        let doc = json!(["a", "b", "c"]);
        let op1 = op_from_value(json!([[0, {"r": true}], [2, {"i": "x"}]])).unwrap();
        let op2 = op_from_value(json!([[0, {"i": "y"}], [1, {"r": true}]])).unwrap();
        let seq = apply(apply(doc.clone(), &op1).unwrap(), &op2).unwrap();
        let composed = compose(&op1, &op2).unwrap();
        assert_eq!(apply(doc, &composed).unwrap(), seq);
    }

    #[test]
    fn incompatible_edits_fail() {
        let a = op_from_value(json!(["n", {"ena": 1}])).unwrap();
        let b = op_from_value(json!(["n", {"es": ["x"]}])).unwrap();
        assert!(matches!(compose(&a, &b), Err(Error::IncompatibleEdits(_, _))));
    }
}
