use crate::cursor::WriteCursor;
use crate::error::Result;
use crate::types::{Component, Key, Op, OpItem};

/// Read-only traversal over an operation.
///
/// The position is a container (one descent list), an index into it and a
/// stack of frames recording where each enclosing container was left.
/// `idx == -1` means "at the node the container belongs to, before any key".
#[derive(Debug, Clone)]
pub struct ReadCursor<'a> {
    container: Option<&'a [OpItem]>,
    /// (parent container, parent idx, position of the child list)
    frames: Vec<(&'a [OpItem], isize, usize)>,
    idx: isize,
}

pub type TraverseFn<'f, 'a> =
    dyn FnMut(&'a Component, &ReadCursor<'a>, Option<&mut WriteCursor>) -> Result<()> + 'f;

impl<'a> ReadCursor<'a> {
    pub fn new(op: &'a Op) -> Self {
        Self::from_items(op.as_deref())
    }

    pub fn from_items(items: Option<&'a [OpItem]>) -> Self {
        Self { container: items, frames: Vec::new(), idx: -1 }
    }

    fn item(&self, i: isize) -> Option<&'a OpItem> {
        let c = self.container?;
        usize::try_from(i).ok().and_then(|i| c.get(i))
    }

    /// Key at the current position. Only meaningful after a descent.
    pub fn get_key(&self) -> Option<&'a Key> {
        self.item(self.idx).and_then(OpItem::as_key)
    }

    /// Component of the node at the current position, if any.
    pub fn get_component(&self) -> Option<&'a Component> {
        self.item(self.idx + 1).and_then(OpItem::as_component)
    }

    pub fn descend_first(&mut self) -> bool {
        let Some(container) = self.container else { return false };
        let mut i = (self.idx + 1) as usize;
        if i >= container.len() || (container[i].is_component() && i + 1 >= container.len()) {
            return false;
        }
        if container[i].is_component() {
            i += 1;
        }
        match &container[i] {
            OpItem::Descent(child) => {
                self.frames.push((container, self.idx, i));
                self.container = Some(child);
                self.idx = 0;
            }
            _ => self.idx = i as isize,
        }
        true
    }

    pub fn next_sibling(&mut self) -> bool {
        // Inline children or the root have no siblings.
        if self.idx > 0 {
            return false;
        }
        let Some(frame) = self.frames.last_mut() else { return false };
        let (parent, _, pos) = *frame;
        let i = pos + 1;
        match parent.get(i) {
            Some(OpItem::Descent(child)) => {
                frame.2 = i;
                self.container = Some(child);
                true
            }
            _ => false,
        }
    }

    pub fn ascend(&mut self) {
        if self.idx == 0 {
            match self.frames.pop() {
                Some((parent, idx, _)) => {
                    self.container = Some(parent);
                    self.idx = idx;
                }
                None => self.idx = -1,
            }
        } else if self.idx > 0 {
            self.idx -= 1;
            if self.item(self.idx).is_some_and(OpItem::is_component) {
                self.idx -= 1;
            }
        }
    }

    /// Scalar keys from the root down to the current position.
    pub fn get_path(&self) -> Vec<Key> {
        let mut path = Vec::new();
        let mut c = self.container.unwrap_or(&[]);
        let mut p = self.frames.len();
        let mut i = self.idx;
        while i >= 0 {
            if let Some(OpItem::Key(k)) = c.get(i as usize) {
                path.push(k.clone());
            }
            if i == 0 {
                if p == 0 {
                    break;
                }
                p -= 1;
                let (parent, idx, _) = self.frames[p];
                c = parent;
                i = idx;
            } else {
                i -= if c[i as usize - 1].is_component() { 2 } else { 1 };
            }
        }
        path.reverse();
        path
    }

    /// Visit every child key of the current node, leaving the cursor on that
    /// child while `f` runs.
    pub fn for_each_child<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Self, &'a Key) -> Result<()>,
    {
        if !self.descend_first() {
            return Ok(());
        }
        loop {
            if let Some(key) = self.get_key() {
                f(self, key)?;
            }
            if !self.next_sibling() {
                break;
            }
        }
        self.ascend();
        Ok(())
    }

    /// Child keys of the current node.
    pub fn child_keys(&self) -> Vec<&'a Key> {
        let mut r = self.clone();
        let mut keys = Vec::new();
        let _ = r.for_each_child(|_, k| {
            keys.push(k);
            Ok(())
        });
        keys
    }

    /// Pre-order walk over every component below (and including) the
    /// current node. When `w` is given it is kept at the same path.
    pub fn traverse(&mut self, mut w: Option<&mut WriteCursor>, f: &mut TraverseFn<'_, 'a>) -> Result<()> {
        if let Some(c) = self.get_component() {
            f(c, self, w.as_deref_mut())?;
        }
        self.for_each_child(|r, key| {
            if let Some(w) = w.as_deref_mut() {
                w.descend(key.clone())?;
            }
            r.traverse(w.as_deref_mut(), f)?;
            if let Some(w) = w.as_deref_mut() {
                w.ascend();
            }
            Ok(())
        })
    }

    pub fn each_pick<F>(&mut self, w: Option<&mut WriteCursor>, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &ReadCursor<'a>, Option<&mut WriteCursor>) -> Result<()>,
    {
        self.traverse(w, &mut |c, r, w| match c.p {
            Some(slot) => f(slot, r, w),
            None => Ok(()),
        })
    }

    pub fn each_drop<F>(&mut self, w: Option<&mut WriteCursor>, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &ReadCursor<'a>, Option<&mut WriteCursor>) -> Result<()>,
    {
        self.traverse(w, &mut |c, r, w| match c.d {
            Some(slot) => f(slot, r, w),
            None => Ok(()),
        })
    }
}
