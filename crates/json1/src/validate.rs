//! Structural validation of operations.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::subtype::{edit_type, get_edit};
use crate::types::{Component, Key, Op, OpItem};

#[derive(Default)]
struct SlotSets {
    picked: BTreeSet<usize>,
    dropped: BTreeSet<usize>,
}

fn ensure(cond: bool, msg: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::invalid(msg))
    }
}

fn check_component(c: &Component, slots: &mut SlotSets) -> Result<()> {
    ensure(!c.is_empty(), "Empty component")?;
    if let Some(p) = c.p {
        ensure(slots.picked.insert(p), "Slot picked up twice")?;
        ensure(c.r.is_none(), "Component both picks up and removes")?;
    }
    if let Some(d) = c.d {
        ensure(slots.dropped.insert(d), "Slot dropped twice")?;
        ensure(c.i.is_none(), "Component both drops and inserts")?;
    }
    let edits = [c.e.is_some(), c.es.is_some(), c.ena.is_some()].iter().filter(|&&e| e).count();
    ensure(edits <= 1, "Component has multiple edits")?;
    if edits == 1 || c.et.is_some() {
        let Some(t) = edit_type(Some(c))? else {
            return Err(Error::invalid("Missing type in edit"));
        };
        let Some(edit) = get_edit(c) else {
            return Err(Error::invalid(format!("Missing edit for type {}", t.name())));
        };
        t.check_valid_op(edit)?;
    }
    Ok(())
}

/// Checks one descent list and returns its first key.
fn check_descent<'a>(items: &'a [OpItem], is_root: bool, slots: &mut SlotSets) -> Result<Option<&'a Key>> {
    ensure(!items.is_empty(), "Empty descent")?;
    if !is_root {
        ensure(matches!(items[0], OpItem::Key(_)), "Descent must start with a key")?;
    }

    #[derive(PartialEq)]
    enum Last {
        Scalar,
        Component,
        Descent,
    }
    let mut last = Last::Scalar;
    let mut num_descents = 0;
    let mut last_key: Option<&Key> = None;

    for item in items {
        match item {
            OpItem::Descent(d) => {
                let key = check_descent(d, false, slots)?;
                if num_descents > 0 {
                    ensure(key > last_key, "descent keys are not in order")?;
                }
                last_key = key;
                num_descents += 1;
                last = Last::Descent;
            }
            OpItem::Component(c) => {
                ensure(last == Last::Scalar, "Component must follow a key")?;
                check_component(c, slots)?;
                last = Last::Component;
            }
            OpItem::Key(k) => {
                ensure(last != Last::Descent, "Key after a nested descent")?;
                ensure(k.is_valid_path_item(), "Invalid path key")?;
                last = Last::Scalar;
            }
        }
    }
    ensure(num_descents != 1, "Operation makes multiple descents. Remove some []")?;
    ensure(last != Last::Scalar, "Descent ends with a key")?;
    Ok(items[0].as_key())
}

/// Check that `op` is well formed: see the crate docs for the rules.
pub fn check_valid_op(op: &Op) -> Result<()> {
    let Some(items) = op else { return Ok(()) };
    let mut slots = SlotSets::default();
    check_descent(items, true, &mut slots)?;
    ensure(slots.picked.len() == slots.dropped.len(), "Mismatched picks and drops in op")?;
    for (i, (&p, &d)) in slots.picked.iter().zip(&slots.dropped).enumerate() {
        ensure(p == i && d == i, "Slots are not numbered from zero without gaps")?;
    }
    Ok(())
}

pub fn is_noop(op: &Op) -> bool {
    op.is_none()
}
