//! Transforming concurrent operations.
//!
//! [`try_transform`] rebases `op1` so it applies after `op2`. It runs in
//! passes over both operations:
//!
//! 1. scan `op2`'s picks and drops against `op1`, recording where each side's
//!    moves come from and land, and looking for removes that the other side
//!    still expects to find;
//! 2. write `op1`'s pick phase in the coordinates of the document after
//!    `op2`, then its drop phase, remapping list indexes through both ops;
//! 3. place content `op1` moved into places that `op2` itself moved, which
//!    is where blackholes (content moved inside itself) are detected.
//!
//! Any conflict found along the way is returned instead of a result.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, trace};

use crate::builders::{edit_op, insert_op, move_op, remove_op_marker};
use crate::cursor::{comp, has_drop, has_pick, index_key, Advancer, ReadCursor, Track, WriteCursor};
use crate::error::{Error, Result};
use crate::subtype::{edit_type, get_edit, same_subtype, write_edit};
use crate::types::{Component, Conflict, ConflictType, Field, Key, Op, Side};
use crate::validate::check_valid_op;

type Writer = usize;

const MAIN: Writer = 0;

/// Either the transformed operation or the first conflict found.
pub type Transformed = std::result::Result<Op, Conflict>;

/// Insert or move that produced the drop at `drop`.
fn ins_or_mv(pick: Option<&ReadCursor<'_>>, drop: &ReadCursor<'_>, c: &Component) -> Op {
    match pick {
        Some(pick) => move_op(&pick.get_path(), &drop.get_path()),
        None => insert_op(&drop.get_path(), c.i.clone().unwrap_or(Value::Null)),
    }
}

/// Where an op1 pick is written in the output, once its slot is known.
#[derive(Debug, Clone)]
struct PickTarget {
    writer: Writer,
    path: Vec<Key>,
}

struct Transformer<'a> {
    side: Side,
    conflict: Option<Conflict>,
    writers: Vec<WriteCursor>,
    next_slot: usize,

    op1_pick_by_slot1: HashMap<usize, ReadCursor<'a>>,
    op1_drop_by_slot1: HashMap<usize, ReadCursor<'a>>,
    op2_pick_by_slot2: HashMap<usize, ReadCursor<'a>>,
    op2_drop_by_slot2: HashMap<usize, ReadCursor<'a>>,
    op1_pick_by_slot2: HashMap<usize, Option<ReadCursor<'a>>>,
    op2_pick_by_slot1: HashMap<usize, ReadCursor<'a>>,
    op2_drop_by_slot1: HashMap<usize, ReadCursor<'a>>,
    op2_rm_for_slot1: HashMap<usize, ReadCursor<'a>>,
    op1_rm_for_slot2: HashMap<usize, ReadCursor<'a>>,

    /// op2 moves whose source op1 removed.
    cancelled_op2: HashSet<usize>,
    discarded_op2_drop: HashSet<usize>,
    held_pick_writes: BTreeMap<usize, Writer>,
    held_drop_writes: BTreeMap<usize, Writer>,
    /// slot2 -> slot1 for places where both ops pick the same node.
    op1_pick_at_op2_pick: HashMap<usize, usize>,
    op1_picks_op2_drop_slots: HashMap<usize, Vec<usize>>,

    pick_targets: HashMap<usize, Option<PickTarget>>,
    pending_picks: Vec<(PickTarget, usize)>,
    /// op1 remove paths that op2 already removed or moved away.
    cancelled_removes: HashSet<Vec<Key>>,
    /// output slot -> slot1
    output_slot_map: HashMap<usize, usize>,
}

impl<'a> Transformer<'a> {
    fn new(side: Side) -> Self {
        Self {
            side,
            conflict: None,
            writers: vec![WriteCursor::new()],
            next_slot: 0,
            op1_pick_by_slot1: HashMap::new(),
            op1_drop_by_slot1: HashMap::new(),
            op2_pick_by_slot2: HashMap::new(),
            op2_drop_by_slot2: HashMap::new(),
            op1_pick_by_slot2: HashMap::new(),
            op2_pick_by_slot1: HashMap::new(),
            op2_drop_by_slot1: HashMap::new(),
            op2_rm_for_slot1: HashMap::new(),
            op1_rm_for_slot2: HashMap::new(),
            cancelled_op2: HashSet::new(),
            discarded_op2_drop: HashSet::new(),
            held_pick_writes: BTreeMap::new(),
            held_drop_writes: BTreeMap::new(),
            op1_pick_at_op2_pick: HashMap::new(),
            op1_picks_op2_drop_slots: HashMap::new(),
            pick_targets: HashMap::new(),
            pending_picks: Vec::new(),
            cancelled_removes: HashSet::new(),
            output_slot_map: HashMap::new(),
        }
    }

    fn new_writer(&mut self) -> Writer {
        self.writers.push(WriteCursor::new());
        self.writers.len() - 1
    }

    /// Record a conflict. Only the first one is kept.
    fn raise(&mut self, kind: ConflictType, op1: Op, op2: Op) {
        if self.conflict.is_none() {
            debug!(?kind, side = self.side.as_str(), "transform conflict");
            self.conflict = Some(Conflict { kind, op1, op2 });
        }
    }

    fn op1_yields(&self, slot2: usize) -> bool {
        self.side == Side::Left && self.op1_pick_at_op2_pick.contains_key(&slot2)
    }

    // ── Scan ──────────────────────────────────────────────────────────────

    fn scan_op2_pick(
        &mut self,
        r2_pick: &mut ReadCursor<'a>,
        r1_pick: Option<ReadCursor<'a>>,
        mut removed1: Option<ReadCursor<'a>>,
    ) -> Result<()> {
        let c1 = comp(&r1_pick);
        if let Some(c1) = c1 {
            if c1.r.is_some() {
                removed1 = r1_pick.clone();
            } else if let Some(slot1) = c1.p {
                removed1 = None;
                self.op2_pick_by_slot1.insert(slot1, r2_pick.clone());
            }
        }

        if let Some(slot2) = r2_pick.get_component().and_then(|c| c.p) {
            self.op1_pick_by_slot2.insert(slot2, r1_pick.clone());
            self.op2_pick_by_slot2.insert(slot2, r2_pick.clone());
            if let Some(rm) = &removed1 {
                self.cancelled_op2.insert(slot2);
                self.op1_rm_for_slot2.insert(slot2, rm.clone());
            }
            if let Some(slot1) = c1.and_then(|c| c.p) {
                self.op1_pick_at_op2_pick.insert(slot2, slot1);
            }
        }

        let mut ap1 = Advancer::plain(r1_pick);
        r2_pick.for_each_child(|r, key| {
            let r1 = ap1.seek_key(key);
            self.scan_op2_pick(r, r1, removed1.clone())
        })
    }

    /// Returns whether `op2` drops something at this node.
    fn scan_op2_drop(
        &mut self,
        mut r1_pick: Option<ReadCursor<'a>>,
        mut r2_pick: Option<ReadCursor<'a>>,
        r2_drop: &mut ReadCursor<'a>,
        mut pick_slot1: Option<usize>,
        mut removed1: Option<ReadCursor<'a>>,
    ) -> Result<bool> {
        let c2d = r2_drop.get_component();
        let mut dropped_here = false;

        if let Some(c2d) = c2d {
            if let Some(slot2) = c2d.d {
                self.op2_drop_by_slot2.insert(slot2, r2_drop.clone());
                if let Some(slot1) = pick_slot1 {
                    self.op1_picks_op2_drop_slots.entry(slot1).or_default().push(slot2);
                }
                r1_pick = self.op1_pick_by_slot2.get(&slot2).cloned().flatten();
                r2_pick = self.op2_pick_by_slot2.get(&slot2).cloned();
                if self.cancelled_op2.contains(&slot2) {
                    if removed1.is_some() {
                        self.discarded_op2_drop.insert(slot2);
                    }
                    removed1 = self.op1_rm_for_slot2.get(&slot2).cloned();
                } else if let Some(rm) = &removed1 {
                    if !self.op1_yields(slot2) {
                        let from = r2_pick.as_ref().map(ReadCursor::get_path).unwrap_or_default();
                        self.raise(
                            ConflictType::RmUnexpectedContent,
                            remove_op_marker(&rm.get_path()),
                            move_op(&from, &r2_drop.get_path()),
                        );
                    }
                }
                dropped_here = true;
            } else if let Some(i) = &c2d.i {
                r1_pick = None;
                r2_pick = None;
                dropped_here = true;
                if let Some(rm) = &removed1 {
                    self.raise(
                        ConflictType::RmUnexpectedContent,
                        remove_op_marker(&rm.get_path()),
                        insert_op(&r2_drop.get_path(), i.clone()),
                    );
                }
            }
        }

        if let Some(c1p) = comp(&r1_pick) {
            if c1p.r.is_some() {
                removed1 = r1_pick.clone();
            } else if let Some(slot1) = c1p.p {
                pick_slot1 = Some(slot1);
                removed1 = None;
            }
        }

        if let (Some(t2), Some(rm)) = (edit_type(c2d)?, &removed1) {
            if let Some(e2) = c2d.and_then(get_edit) {
                self.raise(
                    ConflictType::RmUnexpectedContent,
                    remove_op_marker(&rm.get_path()),
                    edit_op(&r2_drop.get_path(), t2.as_ref(), e2.clone(), true),
                );
            }
        }

        let mut ap2 = Advancer::mapped(r2_pick, Track::Picks);
        let mut ap1 = Advancer::plain(r1_pick);
        let mut p2_drop_off: isize = 0;
        r2_drop.for_each_child(|r, key| {
            let (p2p, p1p) = match key {
                Key::Index(k) => {
                    let p2_mid = *k as isize - p2_drop_off;
                    let p2p = ap2.seek_index(p2_mid);
                    (p2p, ap1.seek_index(p2_mid + ap2.offset()))
                }
                Key::Field(_) => (ap2.seek_key(key), ap1.seek_key(key)),
            };
            if self.scan_op2_drop(p1p, p2p, r, pick_slot1, removed1.clone())? && key.is_index() {
                p2_drop_off += 1;
            }
            Ok(())
        })?;
        Ok(dropped_here)
    }

    // ── Write op1 picks ───────────────────────────────────────────────────

    fn write_op1_pick(
        &mut self,
        r1_pick: &mut ReadCursor<'a>,
        r2_pick: Option<ReadCursor<'a>>,
        mut r2_drop: Option<ReadCursor<'a>>,
        mut w: Writer,
        mut removed2: Option<ReadCursor<'a>>,
    ) -> Result<()> {
        let mut moved_by_op2 = false;
        let c2p = comp(&r2_pick);
        if has_pick(c2p) {
            match c2p.and_then(|c| c.p) {
                Some(slot2) => {
                    r2_drop = self.op2_drop_by_slot2.get(&slot2).cloned();
                    w = self.new_writer();
                    self.held_pick_writes.insert(slot2, w);
                    moved_by_op2 = true;
                    removed2 = None;
                }
                None => {
                    r2_drop = None;
                    removed2 = r2_pick.clone();
                }
            }
        } else if has_drop(comp(&r2_drop)) {
            r2_drop = None;
        }

        if let Some(c1) = r1_pick.get_component() {
            if let Some(slot1) = c1.p {
                if let Some(rm) = &removed2 {
                    self.op2_rm_for_slot1.insert(slot1, rm.clone());
                }
                let target = if removed2.is_some() || (self.side == Side::Right && moved_by_op2) {
                    None
                } else {
                    Some(PickTarget { writer: w, path: self.writers[w].get_path() })
                };
                self.pick_targets.insert(slot1, target);
                self.op1_pick_by_slot1.insert(slot1, r1_pick.clone());
                if let Some(d) = &r2_drop {
                    self.op2_drop_by_slot1.insert(slot1, d.clone());
                }
            } else if c1.r.is_some() {
                if removed2.is_none() {
                    self.writers[w].write(Field::R(Value::Bool(true)))?;
                }
                if removed2.is_some() || moved_by_op2 {
                    self.cancelled_removes.insert(r1_pick.get_path());
                }
            }
        }

        let mut ap2_pick = Advancer::counting(r2_pick, Track::Picks);
        let mut ap2_drop = Advancer::mapped(r2_drop, Track::Drops);
        r1_pick.for_each_child(|r, key| {
            let (p2p, p2d, out) = match key {
                Key::Field(_) => (ap2_pick.seek_key(key), ap2_drop.seek_key(key), key.clone()),
                Key::Index(k) => {
                    let p2p = ap2_pick.seek_index(*k as isize);
                    let p2_mid = *k as isize - ap2_pick.offset();
                    let p2d = if has_pick(comp(&p2p)) { None } else { ap2_drop.seek_index(p2_mid) };
                    let out = index_key(p2_mid + ap2_drop.offset(), "pick key")?;
                    (p2p, p2d, out)
                }
            };
            self.writers[w].descend(out)?;
            self.write_op1_pick(r, p2p, p2d, w, removed2.clone())?;
            self.writers[w].ascend();
            Ok(())
        })
    }

    // ── Write op1 drops ───────────────────────────────────────────────────

    /// Whether a pick in op1 is still a pick in the output, shifting the
    /// output indexes of later siblings.
    fn picks_in_output(&self, c: &Component, at: &ReadCursor<'_>) -> bool {
        let removes = c.r.is_some() && !self.cancelled_removes.contains(&at.get_path());
        let moves = c.p.is_some_and(|slot1| {
            matches!(self.pick_targets.get(&slot1), Some(Some(_)))
                && !(self.side == Side::Left && self.op1_pick_at_op2_pick.values().any(|&s| s == slot1))
        });
        removes || moves
    }

    /// Returns whether the output drops something at this node.
    #[allow(clippy::too_many_arguments)]
    fn write_op1_drop(
        &mut self,
        mut p1_pick: Option<ReadCursor<'a>>,
        p1_drop: &mut ReadCursor<'a>,
        mut p2_pick: Option<ReadCursor<'a>>,
        mut p2_drop: Option<ReadCursor<'a>>,
        mut w: Writer,
        mut removed2: Option<ReadCursor<'a>>,
    ) -> Result<bool> {
        let c1d = p1_drop.get_component();
        let c2d = comp(&p2_drop);
        let mut dropped_here = false;

        if let Some(d1) = c1d.filter(|c| c.has_drop()) {
            let slot1 = d1.d;
            if let Some(s1) = slot1 {
                self.op1_drop_by_slot1.insert(s1, p1_drop.clone());
            }
            let target = slot1.and_then(|s1| self.pick_targets.get(&s1).cloned().flatten());
            let mut identical = false;

            if d1.i.is_some() || target.is_some() {
                if let (Some(d2), Some(r2d)) = (c2d, p2_drop.as_ref()) {
                    let slot2 = if d2.i.is_some() { None } else { d2.d };
                    if d2.i.is_some() || slot2.is_some_and(|s2| !self.cancelled_op2.contains(&s2)) {
                        identical = match slot2 {
                            Some(s2) => slot1.is_some() && self.op1_pick_at_op2_pick.get(&s2).copied() == slot1,
                            None => d2.i == d1.i,
                        };
                        if !identical && !slot2.is_some_and(|s2| self.op1_yields(s2)) {
                            let op1 = ins_or_mv(slot1.and_then(|s| self.op1_pick_by_slot1.get(&s)), p1_drop, d1);
                            let op2 = ins_or_mv(slot2.and_then(|s| self.op2_pick_by_slot2.get(&s)), r2d, d2);
                            self.raise(ConflictType::DropCollision, op1, op2);
                        }
                    }
                }

                if !identical {
                    if let Some(rm) = &removed2 {
                        let op1 = ins_or_mv(slot1.and_then(|s| self.op1_pick_by_slot1.get(&s)), p1_drop, d1);
                        self.raise(ConflictType::RmUnexpectedContent, op1, remove_op_marker(&rm.get_path()));
                    } else {
                        match (slot1, target) {
                            (Some(s1), Some(target)) => {
                                let slot = self.next_slot;
                                self.next_slot += 1;
                                self.output_slot_map.insert(slot, s1);
                                self.pending_picks.push((target, slot));
                                self.writers[w].write(Field::D(slot))?;
                            }
                            _ => {
                                if let Some(i) = &d1.i {
                                    self.writers[w].write(Field::I(i.clone()))?;
                                }
                            }
                        }
                        dropped_here = true;
                    }
                }
            } else if let Some(s1) = slot1 {
                if let Some(rm) = self.op2_rm_for_slot1.get(&s1) {
                    removed2 = Some(rm.clone());
                }
            }

            if let Some(s1) = slot1 {
                p1_pick = self.op1_pick_by_slot1.get(&s1).cloned();
                p2_pick = self.op2_pick_by_slot1.get(&s1).cloned();
                p2_drop = self.op2_drop_by_slot1.get(&s1).cloned();
            } else if d1.i.is_some() {
                p1_pick = None;
                p2_pick = None;
                if !identical {
                    p2_drop = None;
                }
            }
        } else if has_pick(comp(&p1_pick)) {
            p1_pick = None;
            p2_pick = None;
            p2_drop = None;
        }

        let c1p = comp(&p1_pick);
        let c2p = comp(&p2_pick);
        if has_pick(c2p) {
            let slot2 = c2p.and_then(|c| c.p);
            let op2_removes = c2p.is_some_and(|c| c.r.is_some()) && !c1p.is_some_and(|c| c.r.is_some());
            if op2_removes || slot2.is_some_and(|s2| self.cancelled_op2.contains(&s2)) {
                p2_drop = None;
                removed2 = p2_pick.clone();
            } else if let Some(s2) = slot2 {
                p2_drop = self.op2_drop_by_slot2.get(&s2).cloned();
                if !self.op1_yields(s2) {
                    w = match self.held_drop_writes.get(&s2) {
                        Some(&held) => held,
                        None => {
                            let held = self.new_writer();
                            self.held_drop_writes.insert(s2, held);
                            held
                        }
                    };
                    self.writers[w].reset();
                    removed2 = None;
                }
            }
        } else if !has_drop(c1d) && has_drop(c2d) {
            p2_drop = None;
        }

        if let Some(t1) = edit_type(c1d)? {
            let e1 = c1d
                .and_then(get_edit)
                .ok_or_else(|| Error::invalid(format!("Missing edit for type {}", t1.name())))?;
            if let Some(rm) = &removed2 {
                self.raise(
                    ConflictType::RmUnexpectedContent,
                    edit_op(&p1_drop.get_path(), t1.as_ref(), e1.clone(), true),
                    remove_op_marker(&rm.get_path()),
                );
            } else {
                let c2d = comp(&p2_drop);
                let e = match (edit_type(c2d)?, c2d.and_then(get_edit)) {
                    (Some(t2), Some(e2)) => {
                        if !same_subtype(t1.as_ref(), t2.as_ref()) {
                            return Err(Error::IncompatibleEdits(t1.name().into(), t2.name().into()));
                        }
                        t1.transform(e1, e2, self.side)?
                    }
                    _ => e1.clone(),
                };
                write_edit(&mut self.writers[w], t1.as_ref(), e, false)?;
            }
        }

        let side = self.side;
        let mut p1_pick_off: isize = 0;
        let mut p1_drop_off: isize = 0;
        let mut p2_drop_off: isize = 0;
        let mut out_pick_off: isize = 0;
        let mut out_drop_off: isize = 0;
        let mut p1p = p1_pick;
        let mut p1p_valid = p1p.as_mut().is_some_and(ReadCursor::descend_first);
        let mut ap2p = Advancer::counting(p2_pick, Track::Picks);
        let mut p2d = p2_drop;
        let mut p2d_valid = p2d.as_mut().is_some_and(ReadCursor::descend_first);

        p1_drop.for_each_child(|r, key| {
            match key {
                Key::Index(k) => {
                    let hd1 = has_drop(r.get_component());
                    let k1_mid = *k as isize - p1_drop_off;

                    let mut matched = false;
                    while p1p_valid {
                        let Some(cur) = p1p.as_mut() else { break };
                        let Some(Key::Index(x)) = cur.get_key() else { break };
                        let pk = *x as isize + p1_pick_off;
                        let c = cur.get_component();
                        let hp = has_pick(c);
                        if pk > k1_mid || (pk == k1_mid && (!hp || (side == Side::Left && hd1))) {
                            matched = pk == k1_mid;
                            break;
                        }
                        if let Some(c) = c.filter(|c| c.has_pick()) {
                            p1_pick_off -= 1;
                            if self.picks_in_output(c, cur) {
                                out_pick_off -= 1;
                            }
                        }
                        p1p_valid = cur.next_sibling();
                    }
                    let next_p1p = if p1p_valid && matched { p1p.clone() } else { None };

                    let raw = k1_mid - p1_pick_off;
                    let next_p2p = ap2p.seek_index(raw);
                    let k2_mid = raw - ap2p.offset();

                    let mut next_p2d = None;
                    while p2d_valid {
                        let Some(cur) = p2d.as_mut() else { break };
                        let Some(Key::Index(x)) = cur.get_key() else { break };
                        let op2_mid = *x as isize - p2_drop_off;
                        let c = cur.get_component();
                        if op2_mid > k2_mid {
                            break;
                        }
                        if op2_mid == k2_mid {
                            if !has_drop(c) || (side == Side::Left && hd1) {
                                next_p2d = Some(cur.clone());
                                break;
                            }
                            if side == Side::Left && has_pick(comp(&next_p2p)) {
                                break;
                            }
                        }
                        if let Some(c) = c.filter(|c| c.has_drop()) {
                            let skipped = c.i.is_none()
                                && c.d.is_some_and(|s2| self.cancelled_op2.contains(&s2) || self.op1_yields(s2));
                            if skipped {
                                out_drop_off -= 1;
                            }
                            p2_drop_off += 1;
                        }
                        p2d_valid = cur.next_sibling();
                    }

                    let descend = k2_mid + p2_drop_off + out_pick_off + out_drop_off;
                    self.writers[w].descend(index_key(descend, "drop key")?)?;
                    let dropped = if hd1 {
                        p1_drop_off += 1;
                        self.write_op1_drop(None, r, None, None, w, removed2.clone())?
                    } else {
                        self.write_op1_drop(next_p1p, r, next_p2p, next_p2d, w, removed2.clone())?
                    };
                    if dropped {
                        out_drop_off += 1;
                    }
                    self.writers[w].ascend();
                }
                Key::Field(f) => {
                    while p1p_valid {
                        let Some(cur) = p1p.as_mut() else { break };
                        if let Some(Key::Field(g)) = cur.get_key() {
                            if g >= f {
                                break;
                            }
                        }
                        p1p_valid = cur.next_sibling();
                    }
                    let next_p1p = p1p.clone().filter(|c| p1p_valid && c.get_key() == Some(key));
                    let next_p2p = ap2p.seek_key(key);
                    while p2d_valid {
                        let Some(cur) = p2d.as_mut() else { break };
                        if let Some(Key::Field(g)) = cur.get_key() {
                            if g >= f {
                                break;
                            }
                        }
                        p2d_valid = cur.next_sibling();
                    }
                    let next_p2d = p2d.clone().filter(|c| p2d_valid && c.get_key() == Some(key));

                    self.writers[w].descend(key.clone())?;
                    self.write_op1_drop(next_p1p, r, next_p2p, next_p2d, w, removed2.clone())?;
                    self.writers[w].ascend();
                }
            }
            Ok(())
        })?;
        Ok(dropped_here)
    }

    /// Give every surviving op1 pick its output slot.
    fn flush_pick_slots(&mut self) -> Result<()> {
        for (target, slot) in std::mem::take(&mut self.pending_picks) {
            // Earlier flushes leave the cursor parked deeper in the tree.
            self.writers[target.writer].reset();
            self.writers[target.writer].write_at_path(&target.path, Field::P(slot))?;
        }
        Ok(())
    }

    /// Walk op2's drops with the output writer, removing content whose op2
    /// move op1 cancelled and splicing in op1 picks made inside op2 moves.
    fn merge_at_op2_drops(&mut self, op2: &'a Op) -> Result<()> {
        if self.cancelled_op2.is_empty() && self.held_pick_writes.is_empty() {
            return Ok(());
        }
        let mut w = std::mem::take(&mut self.writers[MAIN]);
        ReadCursor::new(op2).each_drop(Some(&mut w), |slot2, _, w| {
            let Some(w) = w else { return Ok(()) };
            if self.cancelled_op2.contains(&slot2) && !self.discarded_op2_drop.contains(&slot2) {
                w.write(Field::R(Value::Bool(true)))?;
            }
            if let Some(&held) = self.held_pick_writes.get(&slot2) {
                w.merge_tree(self.writers[held].get())?;
            }
            Ok(())
        })?;
        w.reset();
        self.writers[MAIN] = w;
        Ok(())
    }

    /// The moves (in op1 and op2) that carried the content in `orphans`.
    fn blackhole(&self, orphans: &BTreeMap<usize, Op>) -> Result<Conflict> {
        let mut w1 = WriteCursor::new();
        let mut w2 = WriteCursor::new();
        let mut next1 = 0;
        let mut next2 = 0;
        for data in orphans.values() {
            ReadCursor::new(data).each_drop(None, |slot_out, _, _| {
                let slot1 = self
                    .output_slot_map
                    .get(&slot_out)
                    .copied()
                    .ok_or_else(|| Error::Internal(format!("output slot {slot_out} has no source")))?;
                let (Some(pick), Some(drop)) = (self.op1_pick_by_slot1.get(&slot1), self.op1_drop_by_slot1.get(&slot1))
                else {
                    return Err(Error::Internal(format!("op1 slot {slot1} was never seen")));
                };
                w1.write_move(&pick.get_path(), &drop.get_path(), next1)?;
                next1 += 1;
                for &slot2 in self.op1_picks_op2_drop_slots.get(&slot1).into_iter().flatten() {
                    if self.cancelled_op2.contains(&slot2) || self.op1_yields(slot2) {
                        continue;
                    }
                    if let (Some(pick), Some(drop)) =
                        (self.op2_pick_by_slot2.get(&slot2), self.op2_drop_by_slot2.get(&slot2))
                    {
                        w2.write_move(&pick.get_path(), &drop.get_path(), next2)?;
                        next2 += 1;
                    }
                }
                Ok(())
            })?;
        }
        Ok(Conflict { kind: ConflictType::Blackhole, op1: w1.into_op(), op2: w2.into_op() })
    }
}

// ── Held drops ────────────────────────────────────────────────────────────

/// Places output content that lands inside nodes op2 moved. `read` locates
/// every output drop; writes into an output move's destination are held
/// per output slot and merged at the end.
struct HeldDrops<'s> {
    read: HashMap<usize, ReadCursor<'s>>,
    op2_drops: &'s BTreeMap<usize, Op>,
    writers: Vec<WriteCursor>,
    out_writes: BTreeMap<usize, Writer>,
}

impl<'s> HeldDrops<'s> {
    fn write<'a>(
        &mut self,
        p2_drop: &mut ReadCursor<'a>,
        out_pick: Option<ReadCursor<'s>>,
        mut out_drop: Option<ReadCursor<'s>>,
        mut w: Writer,
    ) -> Result<()> {
        let coutp = comp(&out_pick);
        if let Some(c) = coutp.filter(|c| c.has_pick()) {
            if let Some(slot) = c.p {
                let read = self
                    .read
                    .get(&slot)
                    .cloned()
                    .ok_or_else(|| Error::Internal(format!("output slot {slot} is never dropped")))?;
                out_drop = Some(read);
                self.writers.push(WriteCursor::new());
                w = self.writers.len() - 1;
                self.out_writes.insert(slot, w);
            } else if c.r.is_some() {
                out_drop = None;
            }
        } else if has_drop(comp(&out_drop)) {
            out_drop = None;
        }

        if let Some(slot2) = p2_drop.get_component().and_then(|c| c.d) {
            if let Some(held) = self.op2_drops.get(&slot2) {
                self.writers[w].merge_tree(held)?;
                out_drop = Some(ReadCursor::new(held));
            }
        }

        let mut pick_adv = Advancer::counting(out_pick, Track::Picks);
        let mut drop_adv = Advancer::mapped(out_drop, Track::Drops);
        p2_drop.for_each_child(|r, key| {
            let (op, od, out) = match key {
                Key::Index(k) => {
                    let op = pick_adv.seek_index(*k as isize);
                    let mid = *k as isize - pick_adv.offset();
                    let od = drop_adv.seek_index(mid);
                    (op, od, index_key(mid + drop_adv.offset(), "held drop key")?)
                }
                Key::Field(_) => (pick_adv.seek_key(key), drop_adv.seek_key(key), key.clone()),
            };
            self.writers[w].descend(out)?;
            self.write(r, op, od, w)?;
            self.writers[w].ascend();
            Ok(())
        })
    }
}

// ── Entry points ──────────────────────────────────────────────────────────

/// Rebase `op1` so it applies to the document after `op2`. `side` breaks
/// ties when both ops insert at the same place. Conflicts are returned as
/// the inner `Err`; structural problems with the inputs are the outer one.
pub fn try_transform(op1: &Op, op2: &Op, side: Side) -> Result<Transformed> {
    if op2.is_none() {
        return Ok(Ok(op1.clone()));
    }
    check_valid_op(op1)?;
    check_valid_op(op2)?;

    let mut tx = Transformer::new(side);
    let r1 = ReadCursor::new(op1);
    let r2 = ReadCursor::new(op2);

    tx.scan_op2_pick(&mut r2.clone(), Some(r1.clone()), None)?;
    tx.scan_op2_drop(Some(r1.clone()), Some(r2.clone()), &mut r2.clone(), None, None)?;
    if let Some(conflict) = tx.conflict.take() {
        return Ok(Err(conflict));
    }

    tx.write_op1_pick(&mut r1.clone(), Some(r2.clone()), Some(r2.clone()), MAIN, None)?;
    tx.writers[MAIN].reset();
    tx.write_op1_drop(Some(r1.clone()), &mut r1.clone(), Some(r2.clone()), Some(r2), MAIN, None)?;
    if let Some(conflict) = tx.conflict.take() {
        return Ok(Err(conflict));
    }
    tx.writers[MAIN].reset();
    tx.flush_pick_slots()?;
    tx.merge_at_op2_drops(op2)?;

    if tx.held_drop_writes.is_empty() && tx.cancelled_op2.is_empty() {
        trace!("transformed without held drops");
        return Ok(Ok(std::mem::take(&mut tx.writers[MAIN]).into_op()));
    }

    let out = tx.writers[MAIN].get().clone();
    let op2_drops: BTreeMap<usize, Op> =
        tx.held_drop_writes.iter().map(|(&slot2, &w)| (slot2, tx.writers[w].get().clone())).collect();
    let mut read = HashMap::new();
    ReadCursor::new(&out).each_drop(None, |slot, r, _| {
        read.insert(slot, r.clone());
        Ok(())
    })?;
    for held in op2_drops.values() {
        ReadCursor::new(held).each_drop(None, |slot, r, _| {
            read.insert(slot, r.clone());
            Ok(())
        })?;
    }

    let mut held = HeldDrops {
        read,
        op2_drops: &op2_drops,
        writers: vec![std::mem::take(&mut tx.writers[MAIN])],
        out_writes: BTreeMap::new(),
    };
    let r_out = ReadCursor::new(&out);
    held.write(&mut ReadCursor::new(op2), Some(r_out.clone()), Some(r_out), MAIN)?;
    let mut w = std::mem::take(&mut held.writers[MAIN]);
    w.reset();

    if !held.out_writes.is_empty() {
        let mut orphans = BTreeMap::new();
        for (&slot, &hw) in &held.out_writes {
            if let Some(items) = held.writers[hw].get() {
                orphans.insert(slot, Some(items.clone()));
            }
        }
        let snapshot = w.get().clone();
        ReadCursor::new(&snapshot).each_drop(Some(&mut w), |slot, _, w| {
            let Some(w) = w else { return Ok(()) };
            if let Some(data) = orphans.remove(&slot) {
                w.merge_tree(&data)?;
            }
            Ok(())
        })?;
        if !orphans.is_empty() {
            let conflict = tx.blackhole(&orphans)?;
            debug!(orphans = orphans.len(), "blackhole detected");
            return Ok(Err(conflict));
        }
    }
    Ok(Ok(w.into_op()))
}

/// Like [`try_transform`], with conflicts reported as
/// [`Error::WriteConflict`].
pub fn transform(op1: &Op, op2: &Op, side: Side) -> Result<Op> {
    try_transform(op1, op2, side)?.map_err(|c| Error::WriteConflict(Box::new(c)))
}
