//! Applying operations to documents.
//!
//! The document is taken by value and edited in place: the pick phase lifts
//! every picked or removed value out (children before parents, later
//! siblings before earlier ones), then the drop phase places held values and
//! inserts (parents before children) and runs embedded edits.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::subtype::edit_of;
use crate::types::{Component, Key, Op, OpItem};
use crate::validate::check_valid_op;

// ── Document helpers ──────────────────────────────────────────────────────

pub(crate) fn child_mut<'v>(v: &'v mut Value, key: &Key) -> Option<&'v mut Value> {
    match (v, key) {
        (Value::Array(a), Key::Index(i)) => a.get_mut(*i),
        (Value::Object(o), Key::Field(f)) => o.get_mut(f.as_str()),
        _ => None,
    }
}

pub(crate) fn child<'v>(v: &'v Value, key: &Key) -> Option<&'v Value> {
    match (v, key) {
        (Value::Array(a), Key::Index(i)) => a.get(*i),
        (Value::Object(o), Key::Field(f)) => o.get(f.as_str()),
        _ => None,
    }
}

pub(crate) fn remove_child(v: &mut Value, key: &Key) -> Option<Value> {
    match (v, key) {
        (Value::Array(a), Key::Index(i)) if *i < a.len() => Some(a.remove(*i)),
        (Value::Object(o), Key::Field(f)) => o.shift_remove(f.as_str()),
        _ => None,
    }
}

pub(crate) fn insert_child(v: &mut Value, key: &Key, value: Value) -> Result<()> {
    match (v, key) {
        (Value::Array(a), Key::Index(i)) => {
            if *i > a.len() {
                return Err(Error::document("Cannot insert into out of bounds index"));
            }
            a.insert(*i, value);
        }
        (_, Key::Index(_)) => return Err(Error::document("Cannot use numerical key for object container")),
        (Value::Object(o), Key::Field(f)) => {
            if o.contains_key(f.as_str()) {
                return Err(Error::document("Trying to overwrite value at key. Your op needs to remove it first"));
            }
            o.insert(f.clone(), value);
        }
        (_, Key::Field(_)) => return Err(Error::document("Cannot insert into missing item")),
    }
    Ok(())
}

// ── Pick phase ────────────────────────────────────────────────────────────

type Held = Vec<Option<Value>>;

fn pick(slot: &mut Option<Value>, items: &[OpItem], held: &mut Held) -> Result<()> {
    let split = items.iter().position(OpItem::is_descent).unwrap_or(items.len());
    let (path, branches) = items.split_at(split);
    pick_path(slot, path, branches, held)
}

fn pick_path(slot: &mut Option<Value>, path: &[OpItem], branches: &[OpItem], held: &mut Held) -> Result<()> {
    match path.split_first() {
        None => {
            for b in branches.iter().rev() {
                if let OpItem::Descent(d) = b {
                    pick(slot, d, held)?;
                }
            }
            Ok(())
        }
        Some((OpItem::Component(c), rest)) => {
            pick_path(slot, rest, branches, held)?;
            if c.has_pick() {
                let value = slot
                    .take()
                    .ok_or_else(|| Error::document("Cannot pick up or remove undefined"))?;
                if let Some(p) = c.p {
                    if held.len() <= p {
                        held.resize(p + 1, None);
                    }
                    held[p] = Some(value);
                }
            }
            Ok(())
        }
        Some((OpItem::Key(k), rest)) => {
            // The child is swapped for a placeholder so sibling indexes hold
            // still until we know whether it goes away.
            let mut sub = slot.as_mut().and_then(|v| child_mut(v, k)).map(std::mem::take);
            let present = sub.is_some();
            pick_path(&mut sub, rest, branches, held)?;
            if let (true, Some(parent)) = (present, slot.as_mut()) {
                match sub {
                    Some(v) => {
                        if let Some(c) = child_mut(parent, k) {
                            *c = v;
                        }
                    }
                    None => {
                        remove_child(parent, k);
                    }
                }
            }
            Ok(())
        }
        Some((OpItem::Descent(_), _)) => Err(Error::Internal("descent inside a path".into())),
    }
}

// ── Drop phase ────────────────────────────────────────────────────────────

fn writes_anything(items: &[OpItem]) -> bool {
    items.iter().any(|item| match item {
        OpItem::Component(c) => c.has_drop() || c.has_edit(),
        OpItem::Descent(d) => writes_anything(d),
        OpItem::Key(_) => false,
    })
}

fn held_value(held: &mut Held, slot: usize) -> Result<Value> {
    held.get_mut(slot)
        .and_then(Option::take)
        .ok_or_else(|| Error::Internal(format!("nothing held in slot {slot}")))
}

fn apply_edit(target: Option<&mut Value>, c: &Component) -> Result<()> {
    let Some((t, e)) = edit_of(Some(c))? else { return Ok(()) };
    let Some(v) = target else {
        return Err(Error::document(format!("Cannot apply {} edit to a missing value", t.name())));
    };
    *v = t.apply(std::mem::take(v), e)?;
    Ok(())
}

/// Visit the children named by `items` (an inline key, or nested descents).
fn drop_children(node: Option<&mut Value>, items: &[OpItem], held: &mut Held) -> Result<()> {
    let Some(node) = node else {
        if writes_anything(items) {
            return Err(Error::document("Cannot drop or edit inside a missing container"));
        }
        return Ok(());
    };
    match items.split_first() {
        None => Ok(()),
        Some((OpItem::Key(k), rest)) => drop_node(node, k, rest, held),
        Some(_) => {
            for item in items {
                if let Some((OpItem::Key(k), rest)) = item.as_descent().and_then(<[OpItem]>::split_first) {
                    drop_node(node, k, rest, held)?;
                }
            }
            Ok(())
        }
    }
}

/// Handle the node `parent[key]`, whose own items are `items`.
fn drop_node(parent: &mut Value, key: &Key, items: &[OpItem], held: &mut Held) -> Result<()> {
    let (comp, rest) = match items.split_first() {
        Some((OpItem::Component(c), rest)) => (Some(c), rest),
        _ => (None, items),
    };
    if let Some(c) = comp {
        if let Some(d) = c.d {
            insert_child(parent, key, held_value(held, d)?)?;
        } else if let Some(i) = &c.i {
            insert_child(parent, key, i.clone())?;
        }
        apply_edit(child_mut(parent, key), c)?;
    }
    drop_children(child_mut(parent, key), rest, held)
}

/// Apply `op` to `doc`. `None` stands for the empty document (and is what
/// you get back after removing the root).
pub fn apply(doc: impl Into<Option<Value>>, op: &Op) -> Result<Option<Value>> {
    check_valid_op(op)?;
    let mut root = doc.into();
    let Some(items) = op else { return Ok(root) };

    let mut held = Held::new();
    pick(&mut root, items, &mut held)?;

    let (comp, rest) = match items.split_first() {
        Some((OpItem::Component(c), rest)) => (Some(c), rest),
        _ => (None, items.as_slice()),
    };
    if let Some(c) = comp {
        let dropped = match (c.d, &c.i) {
            (Some(d), _) => Some(held_value(&mut held, d)?),
            (None, Some(i)) => Some(i.clone()),
            (None, None) => None,
        };
        if let Some(v) = dropped {
            if root.is_some() {
                return Err(Error::document("Trying to overwrite value at key. Your op needs to remove it first"));
            }
            root = Some(v);
        }
        apply_edit(root.as_mut(), c)?;
    }
    drop_children(root.as_mut(), rest, &mut held)?;
    Ok(root)
}
