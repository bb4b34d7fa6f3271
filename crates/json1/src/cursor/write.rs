use crate::error::{Error, Result};
use crate::types::{Component, Field, Key, Op, OpItem};

/// Builds an operation by navigating to paths and writing component fields.
///
/// Descents are queued and only materialized on the first write below them,
/// so speculative navigation never allocates. Within one pass children must
/// be visited in increasing key order; [`reset`](Self::reset) starts a new
/// pass.
#[derive(Debug, Clone)]
pub struct WriteCursor {
    op: Op,
    /// (parent idx, position of the child list in the parent)
    frames: Vec<(isize, usize)>,
    idx: isize,
    /// Position of the last child list visited in the current container.
    lc_idx: isize,
    pending: Vec<Key>,
}

impl Default for WriteCursor {
    fn default() -> Self {
        Self::new()
    }
}

fn first_key(item: &OpItem) -> Option<&Key> {
    item.as_descent().and_then(|d| d.first()).and_then(OpItem::as_key)
}

fn container_of<'o>(op: &'o Op, frames: &[(isize, usize)]) -> Option<&'o Vec<OpItem>> {
    let mut c = op.as_ref()?;
    for &(_, pos) in frames {
        c = match c.get(pos) {
            Some(OpItem::Descent(child)) => child,
            _ => return None,
        };
    }
    Some(c)
}

fn container_mut<'o>(op: &'o mut Op, frames: &[(isize, usize)]) -> Result<&'o mut Vec<OpItem>> {
    let mut c = op.get_or_insert_with(Vec::new);
    for &(_, pos) in frames {
        c = match c.get_mut(pos) {
            Some(OpItem::Descent(child)) => child,
            _ => return Err(Error::Internal("write cursor lost its container".into())),
        };
    }
    Ok(c)
}

impl WriteCursor {
    pub fn new() -> Self {
        Self { op: None, frames: Vec::new(), idx: -1, lc_idx: -1, pending: Vec::new() }
    }

    /// The operation written so far.
    pub fn get(&self) -> &Op {
        &self.op
    }

    pub fn into_op(self) -> Op {
        self.op
    }

    pub fn reset(&mut self) {
        self.lc_idx = -1;
    }

    fn flush_descent(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            if self.op.is_none() {
                self.op = Some(Vec::new());
            }
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        for k in pending {
            let container = container_mut(&mut self.op, &self.frames)?;
            let mut i = (self.idx + 1) as usize;
            if i < container.len() && container[i].is_component() {
                i += 1;
            }
            if i == container.len() {
                container.push(OpItem::Key(k));
                self.idx = i as isize;
            } else if container[i].as_key() == Some(&k) {
                self.idx = i as isize;
            } else {
                if !container[i].is_descent() {
                    // A different inline child lives here; bundle it into its
                    // own list so the new child can sit beside it.
                    let old: Vec<OpItem> = container.drain(i..).collect();
                    container.push(OpItem::Descent(old));
                    if self.lc_idx > -1 {
                        self.lc_idx = i as isize;
                    }
                }
                let parent_idx = self.idx;
                if self.lc_idx != -1 {
                    let lc = self.lc_idx as usize;
                    if container.get(lc).and_then(first_key).is_some_and(|prev| &k <= prev) {
                        return Err(Error::Internal(format!("descent to {k} is out of order")));
                    }
                    i = lc + 1;
                    self.lc_idx = -1;
                }
                while i < container.len() && first_key(&container[i]).is_some_and(|c| &k > c) {
                    i += 1;
                }
                self.idx = 0;
                let exists = i < container.len() && first_key(&container[i]) == Some(&k);
                if !exists {
                    container.insert(i, OpItem::Descent(vec![OpItem::Key(k)]));
                }
                self.frames.push((parent_idx, i));
            }
        }
        Ok(())
    }

    /// The component at the current position, created if missing. Ops are
    /// not valid with empty components, so write to it straight away.
    pub fn get_component(&mut self) -> Result<&mut Component> {
        self.flush_descent()?;
        let container = container_mut(&mut self.op, &self.frames)?;
        let i = (self.idx + 1) as usize;
        if !(i < container.len() && container[i].is_component()) {
            container.insert(i, OpItem::Component(Component::default()));
            if self.lc_idx >= i as isize {
                self.lc_idx += 1;
            }
        }
        match &mut container[i] {
            OpItem::Component(c) => Ok(c),
            _ => Err(Error::Internal("expected a component".into())),
        }
    }

    /// Write one field of the current component. Writing a different value
    /// over an existing field is a bug in the caller.
    pub fn write(&mut self, field: Field) -> Result<()> {
        let name = field.name();
        if self.get_component()?.set(field) {
            Ok(())
        } else {
            Err(Error::Internal(format!("overwritten component field '{name}'")))
        }
    }

    pub fn descend(&mut self, key: Key) -> Result<()> {
        if !key.is_valid_path_item() {
            return Err(Error::invalid("Invalid JSON key"));
        }
        self.pending.push(key);
        Ok(())
    }

    pub fn descend_path(&mut self, path: &[Key]) -> &mut Self {
        self.pending.extend_from_slice(path);
        self
    }

    pub fn ascend(&mut self) {
        if self.pending.pop().is_some() {
            return;
        }
        if self.idx == 0 {
            match self.frames.pop() {
                Some((idx, pos)) => {
                    self.lc_idx = pos as isize;
                    self.idx = idx;
                }
                None => {
                    self.lc_idx = 0;
                    self.idx = -1;
                }
            }
        } else if self.idx > 0 {
            self.idx -= 1;
            let prev_is_component = container_of(&self.op, &self.frames)
                .and_then(|c| c.get(self.idx as usize))
                .is_some_and(OpItem::is_component);
            if prev_is_component {
                self.idx -= 1;
            }
        }
    }

    /// Splice `data` in at the current position, copying every component.
    pub fn merge_tree(&mut self, data: &Op) -> Result<()> {
        self.merge_tree_with(data, &mut |c, w| {
            for field in c.fields() {
                w.write(field)?;
            }
            Ok(())
        })
    }

    /// Splice `data` in at the current position, handing each component to
    /// `merge` with the cursor positioned on it.
    pub fn merge_tree_with(
        &mut self,
        data: &Op,
        merge: &mut dyn FnMut(&Component, &mut WriteCursor) -> Result<()>,
    ) -> Result<()> {
        match data {
            Some(items) => self.merge_items(items, merge),
            None => Ok(()),
        }
    }

    fn merge_items(
        &mut self,
        data: &[OpItem],
        merge: &mut dyn FnMut(&Component, &mut WriteCursor) -> Result<()>,
    ) -> Result<()> {
        let saved_lc = self.lc_idx;
        let old_depth = self.frames.len();
        let mut depth = 0;
        for item in data {
            match item {
                OpItem::Key(k) => {
                    depth += 1;
                    self.descend(k.clone())?;
                }
                OpItem::Descent(d) => self.merge_items(d, merge)?,
                OpItem::Component(c) => merge(c, self)?,
            }
        }
        for _ in 0..depth {
            self.ascend();
        }
        // Pending descents may have been flushed; start over at this level.
        self.lc_idx = if self.frames.len() == old_depth { saved_lc } else { -1 };
        Ok(())
    }

    /// Descend along `path`, run `f`, then ascend back out.
    pub fn at<F>(&mut self, path: &[Key], f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.descend_path(path);
        let res = f(self);
        for _ in 0..path.len() {
            self.ascend();
        }
        res.map(|_| self)
    }

    /// Write one field at `path`, relaxing the ordering rules so several
    /// calls can be made in any order.
    pub fn write_at_path(&mut self, path: &[Key], field: Field) -> Result<&mut Self> {
        self.at(path, |w| w.write(field))?;
        self.reset();
        Ok(self)
    }

    pub fn write_move(&mut self, from: &[Key], to: &[Key], slot: usize) -> Result<&mut Self> {
        self.write_at_path(from, Field::P(slot))?.write_at_path(to, Field::D(slot))
    }

    /// Scalar keys from the root to the current position, including queued
    /// descents.
    pub fn get_path(&self) -> Vec<Key> {
        let mut containers: Vec<&[OpItem]> = Vec::with_capacity(self.frames.len() + 1);
        let mut c: &[OpItem] = self.op.as_deref().unwrap_or(&[]);
        containers.push(c);
        for &(_, pos) in &self.frames {
            c = c.get(pos).and_then(OpItem::as_descent).unwrap_or(&[]);
            containers.push(c);
        }

        let mut path = Vec::new();
        let mut level = self.frames.len();
        let mut i = self.idx;
        while i >= 0 {
            let c = containers[level];
            if let Some(OpItem::Key(k)) = c.get(i as usize) {
                path.push(k.clone());
            }
            if i == 0 {
                if level == 0 {
                    break;
                }
                level -= 1;
                i = self.frames[level].0;
            } else {
                i -= if c[i as usize - 1].is_component() { 2 } else { 1 };
            }
        }
        path.reverse();
        path.extend(self.pending.iter().cloned());
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use crate::types::op_to_value;
    use serde_json::{json, Value};

    fn out(w: &WriteCursor) -> Value {
        op_to_value(w.get())
    }

    #[test]
    fn lazy_descent_writes_nothing() {
        let mut w = WriteCursor::new();
        w.descend("a".into()).unwrap();
        w.ascend();
        assert_eq!(w.get(), &None);
    }

    #[test]
    fn writes_inline_path() {
        let mut w = WriteCursor::new();
        w.write_at_path(&path!["a", 1], Field::R(json!(true))).unwrap();
        assert_eq!(out(&w), json!(["a", 1, {"r": true}]));
    }

    #[test]
    fn bundles_siblings_in_order() {
        let mut w = WriteCursor::new();
        w.write_move(&path!["b"], &path!["a"], 0).unwrap();
        assert_eq!(out(&w), json!([["a", {"d": 0}], ["b", {"p": 0}]]));
    }

    #[test]
    fn sequential_children_in_one_pass() {
        let mut w = WriteCursor::new();
        w.descend("x".into()).unwrap();
        for (k, v) in [(0usize, 1), (2, 2), (5, 3)] {
            w.descend(Key::Index(k)).unwrap();
            w.write(Field::I(json!(v))).unwrap();
            w.ascend();
        }
        w.ascend();
        assert_eq!(out(&w), json!(["x", [0, {"i": 1}], [2, {"i": 2}], [5, {"i": 3}]]));
    }

    #[test]
    fn component_written_after_children_lands_before_them() {
        let mut w = WriteCursor::new();
        w.descend("x".into()).unwrap();
        w.descend(Key::Index(0)).unwrap();
        w.write(Field::I(json!(1))).unwrap();
        w.ascend();
        w.descend(Key::Index(1)).unwrap();
        w.write(Field::I(json!(2))).unwrap();
        w.ascend();
        w.write(Field::R(json!(true))).unwrap();
        w.descend(Key::Index(4)).unwrap();
        w.write(Field::I(json!(3))).unwrap();
        w.ascend();
        w.ascend();
        assert_eq!(
            out(&w),
            json!(["x", {"r": true}, [0, {"i": 1}], [1, {"i": 2}], [4, {"i": 3}]])
        );
    }

    #[test]
    fn overwriting_a_field_is_an_error() {
        let mut w = WriteCursor::new();
        w.write(Field::P(0)).unwrap();
        assert!(matches!(w.write(Field::P(1)), Err(Error::Internal(_))));
        assert!(w.write(Field::P(0)).is_ok());
    }

    #[test]
    fn proto_key_is_rejected() {
        let mut w = WriteCursor::new();
        assert!(w.descend("__proto__".into()).is_err());
    }

    #[test]
    fn merge_tree_copies_components() {
        let data = crate::types::op_from_value(json!([["a", {"p": 0}], ["b", {"d": 0}]])).unwrap();
        let mut w = WriteCursor::new();
        w.write_at_path(&path!["a", "z"], Field::R(json!(true))).unwrap();
        w.merge_tree(&data).unwrap();
        assert_eq!(out(&w), json!([["a", {"p": 0}, "z", {"r": true}], ["b", {"d": 0}]]));
    }

    #[test]
    fn get_path_includes_pending() {
        let mut w = WriteCursor::new();
        w.descend("a".into()).unwrap();
        w.write(Field::R(json!(true))).unwrap();
        w.descend(Key::Index(2)).unwrap();
        assert_eq!(w.get_path(), path!["a", 2]);
    }
}
