//! Inverting operations.
//!
//! An operation is invertible once every `r` carries the removed value and
//! every embedded edit is invertible by itself. [`make_invertible`] fills
//! that information in from the document the operation applies to.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::apply::{child, child_mut, remove_child};
use crate::cursor::{has_drop, Advancer, ReadCursor, Track, WriteCursor};
use crate::error::{Error, Result};
use crate::subtype::{edit_of, edit_type, write_edit};
use crate::types::{Component, Field, Key, Op, OpItem};

fn shifted(key: &Key, by: usize) -> Key {
    match key {
        Key::Index(i) => Key::Index(i - by),
        k => k.clone(),
    }
}

// ── invert ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Inverter<'a> {
    held_pick: HashMap<usize, ReadCursor<'a>>,
    edits_to_transform: HashSet<*const Component>,
    writers: Vec<WriteCursor>,
    held_writes: HashMap<usize, usize>,
}

impl<'a> Inverter<'a> {
    /// Swap picks with drops and removes with inserts. Edits applied to
    /// inserted literals are folded into the literal; the rest are queued
    /// for [`transform_edits`](Self::transform_edits).
    fn invert_simple(&mut self, r: &mut ReadCursor<'a>, w: &mut WriteCursor, mut sub_doc: Option<Value>) -> Result<Option<Value>> {
        let c = r.get_component();
        let mut insert_here = false;
        let mut modified = false;
        if let Some(c) = c {
            if let Some(p) = c.p {
                w.write(Field::D(p))?;
                self.held_pick.insert(p, r.clone());
            }
            if let Some(removed) = &c.r {
                w.write(Field::I(removed.clone()))?;
            }
            if let Some(d) = c.d {
                w.write(Field::P(d))?;
                sub_doc = None;
            }
            if let Some(i) = &c.i {
                sub_doc = Some(i.clone());
                insert_here = true;
            }
            if let Some((t, e)) = edit_of(Some(c))? {
                match sub_doc.take() {
                    None => {
                        self.edits_to_transform.insert(c as *const Component);
                    }
                    Some(v) => {
                        sub_doc = Some(t.apply(v, e)?);
                        modified = true;
                    }
                }
            }
        }

        let mut drop_off = 0;
        r.for_each_child(|r, key| {
            w.descend(key.clone())?;
            let raw = shifted(key, drop_off);
            let child_in = sub_doc.as_ref().and_then(|v| child(v, &raw)).cloned();
            if has_drop(r.get_component()) {
                drop_off += 1;
            }
            let child_out = self.invert_simple(r, w, child_in)?;
            if let (Some(doc), Some(out)) = (sub_doc.as_mut(), child_out) {
                modified = true;
                let slot = child_mut(doc, &raw)
                    .ok_or_else(|| Error::document("Cannot modify child - invalid operation"))?;
                *slot = out;
            }
            w.ascend();
            Ok(())
        })?;

        if insert_here {
            if let Some(v) = sub_doc {
                w.write(Field::R(v))?;
            }
            Ok(None)
        } else if modified {
            Ok(sub_doc)
        } else {
            Ok(None)
        }
    }

    /// Invert the edits that sit on moved content, writing them where the
    /// inverse op drops that content (the original pick location).
    fn transform_edits(&mut self, mut r_pick: Option<ReadCursor<'a>>, r_drop: &mut ReadCursor<'a>, mut w: usize) -> Result<()> {
        if let Some(cd) = r_drop.get_component() {
            if let Some(slot) = cd.d {
                r_pick = self.held_pick.get(&slot).cloned();
                self.writers.push(WriteCursor::new());
                w = self.writers.len() - 1;
                self.held_writes.insert(slot, w);
            }
            if self.edits_to_transform.contains(&(cd as *const Component)) {
                if let Some((t, e)) = edit_of(Some(cd))? {
                    let inverted = t.invert(e)?;
                    write_edit(&mut self.writers[w], t.as_ref(), inverted, false)?;
                }
            }
        }

        let mut ap = Advancer::mapped(r_pick, Track::Picks);
        let mut drop_off = 0isize;
        r_drop.for_each_child(|r, key| {
            match key {
                Key::Index(k) => {
                    let mid = *k as isize - drop_off;
                    let rp = ap.seek_index(mid);
                    let raw = usize::try_from(mid + ap.offset())
                        .map_err(|_| Error::Internal("negative pick index".into()))?;
                    self.writers[w].descend(Key::Index(raw))?;
                    self.transform_edits(rp, r, w)?;
                    if has_drop(r.get_component()) {
                        drop_off += 1;
                    }
                }
                Key::Field(_) => {
                    self.writers[w].descend(key.clone())?;
                    let rp = ap.seek_key(key);
                    self.transform_edits(rp, r, w)?;
                }
            }
            self.writers[w].ascend();
            Ok(())
        })
    }
}

/// The operation that undoes `op`. Fails when a removed value or an
/// embedded edit's inverse is unknown; see [`make_invertible`].
pub fn invert(op: &Op) -> Result<Op> {
    if op.is_none() {
        return Ok(None);
    }
    let mut inv = Inverter { writers: vec![WriteCursor::new()], ..Default::default() };
    let mut w = WriteCursor::new();
    inv.invert_simple(&mut ReadCursor::new(op), &mut w, None)?;

    if !inv.edits_to_transform.is_empty() {
        w.reset();
        inv.writers[0] = w;
        inv.transform_edits(Some(ReadCursor::new(op)), &mut ReadCursor::new(op), 0)?;
        w = std::mem::take(&mut inv.writers[0]);
        if !inv.held_writes.is_empty() {
            w.reset();
            ReadCursor::new(op).traverse(Some(&mut w), &mut |c, _, w| {
                if let (Some(slot), Some(w)) = (c.p, w) {
                    if let Some(&held) = inv.held_writes.get(&slot) {
                        w.merge_tree(inv.writers[held].get())?;
                    }
                }
                Ok(())
            })?;
        }
    }
    Ok(w.into_op())
}

// ── make_invertible ───────────────────────────────────────────────────────

fn any_component(items: &[OpItem], f: &dyn Fn(&Component) -> bool) -> bool {
    items.iter().any(|item| match item {
        OpItem::Component(c) => f(c),
        OpItem::Descent(d) => any_component(d, f),
        OpItem::Key(_) => false,
    })
}

fn invertible_edit(c: &Component) -> bool {
    matches!(edit_type(Some(c)), Ok(Some(t)) if t.supports_make_invertible())
}

#[derive(Default)]
struct PickState<'a> {
    held_pick: HashMap<usize, ReadCursor<'a>>,
    held_doc: HashMap<usize, Option<Value>>,
    has_edits: bool,
}

impl<'a> PickState<'a> {
    /// Copy the pick phase, filling every `r` with the value it removes.
    fn traverse_pick(&mut self, r: &mut ReadCursor<'a>, w: &mut WriteCursor, mut sub_doc: Option<Value>) -> Result<Option<Value>> {
        let c = r.get_component();
        if let Some(c) = c {
            if let Some(d) = c.d {
                w.write(Field::D(d))?;
            }
            if let Some(i) = &c.i {
                w.write(Field::I(i.clone()))?;
            }
            if let Some(p) = c.p {
                self.held_pick.insert(p, r.clone());
                if sub_doc.is_none() {
                    return Err(Error::document("Operation picks up at an invalid key"));
                }
                self.held_doc.insert(p, sub_doc.clone());
                w.write(Field::P(p))?;
            }
            if c.r.is_some() && sub_doc.is_none() {
                return Err(Error::document("Invalid doc / op in makeInvertible: removed item missing from doc"));
            }
            if let Some((t, e)) = edit_of(Some(c))? {
                if t.supports_make_invertible() {
                    self.has_edits = true;
                } else {
                    write_edit(w, t.as_ref(), e.clone(), true)?;
                }
            }
        }

        let mut list_off = 0;
        r.for_each_child(|r, key| {
            w.descend(key.clone())?;
            let raw = shifted(key, list_off);
            let child_in = sub_doc.as_mut().and_then(|v| child_mut(v, &raw)).map(std::mem::take);
            let present = child_in.is_some();
            let child_out = self.traverse_pick(r, w, child_in)?;
            if let (true, Some(doc)) = (present, sub_doc.as_mut()) {
                match child_out {
                    Some(v) => {
                        if let Some(slot) = child_mut(doc, &raw) {
                            *slot = v;
                        }
                    }
                    None => {
                        remove_child(doc, &raw);
                        if raw.is_index() {
                            list_off += 1;
                        }
                    }
                }
            }
            w.ascend();
            Ok(())
        })?;

        match c {
            Some(c) if c.r.is_some() => {
                if let Some(v) = sub_doc {
                    w.write(Field::R(v))?;
                }
                Ok(None)
            }
            Some(c) if c.p.is_some() => Ok(None),
            _ => Ok(sub_doc),
        }
    }

    /// Replace each subtype edit with its invertible form, computed from the
    /// value it applies to.
    fn traverse_drop<'d>(
        &'d self,
        mut r_pick: Option<ReadCursor<'a>>,
        r_drop: &mut ReadCursor<'a>,
        w: &mut WriteCursor,
        mut sub_doc: Option<&'d Value>,
        mut is_literal: bool,
    ) -> Result<()> {
        if let Some(c) = r_drop.get_component() {
            if let Some(i) = &c.i {
                sub_doc = Some(i);
                is_literal = true;
            } else if let Some(d) = c.d {
                sub_doc = self.held_doc.get(&d).and_then(Option::as_ref);
                r_pick = self.held_pick.get(&d).cloned();
                is_literal = false;
            }
            if let Some((t, e)) = edit_of(Some(c))? {
                if t.supports_make_invertible() {
                    write_edit(w, t.as_ref(), t.make_invertible(e, sub_doc)?, true)?;
                }
            }
        }

        let mut ap = Advancer::mapped(r_pick, Track::Picks);
        let mut drop_off = 0isize;
        r_drop.for_each_child(|r, key| {
            w.descend(key.clone())?;
            match key {
                Key::Index(k) => {
                    let mid = *k as isize - drop_off;
                    let rp = ap.seek_index(mid);
                    let raw = mid + ap.offset();
                    let at = if is_literal { mid } else { raw };
                    let sub = usize::try_from(at).ok().and_then(|i| sub_doc.and_then(|v| child(v, &Key::Index(i))));
                    self.traverse_drop(rp, r, w, sub, is_literal)?;
                    if has_drop(r.get_component()) {
                        drop_off += 1;
                    }
                }
                Key::Field(_) => {
                    let sub = sub_doc.and_then(|v| child(v, key));
                    self.traverse_drop(ap.seek_key(key), r, w, sub, is_literal)?;
                }
            }
            w.ascend();
            Ok(())
        })
    }
}

/// Fill in what `op` removes from `doc` (and the invertible form of each
/// subtype edit) so that [`invert`] can undo it.
pub fn make_invertible(op: &Op, doc: Option<&Value>) -> Result<Op> {
    let Some(items) = op else { return Ok(None) };
    if !any_component(items, &|c| c.r.is_some() || invertible_edit(c)) {
        return Ok(op.clone());
    }

    let mut state = PickState::default();
    let mut w = WriteCursor::new();
    state.traverse_pick(&mut ReadCursor::new(op), &mut w, doc.cloned())?;
    if state.has_edits {
        w.reset();
        state.traverse_drop(Some(ReadCursor::new(op)), &mut ReadCursor::new(op), &mut w, doc, false)?;
    }
    Ok(w.into_op())
}

/// [`invert`] after [`make_invertible`] against the pre-op document.
pub fn invert_with_doc(op: &Op, doc: Option<&Value>) -> Result<Op> {
    invert(&make_invertible(op, doc)?)
}
