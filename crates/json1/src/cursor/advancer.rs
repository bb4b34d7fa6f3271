use crate::cursor::ReadCursor;
use crate::error::Result;
use crate::types::{Component, Key};

/// A key to advance to. Indexes are signed because callers shift them by
/// running offsets before probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeekKey<'k> {
    Index(isize),
    Field(&'k str),
}

impl<'k> SeekKey<'k> {
    /// All indexes sort before all fields.
    fn is_greater(&self, other: &SeekKey<'_>) -> bool {
        match (self, other) {
            (SeekKey::Index(a), SeekKey::Index(b)) => a > b,
            (SeekKey::Field(a), SeekKey::Field(b)) => a > b,
            (SeekKey::Field(_), SeekKey::Index(_)) => true,
            (SeekKey::Index(_), SeekKey::Field(_)) => false,
        }
    }

    fn same(&self, other: &SeekKey<'_>) -> bool {
        match (self, other) {
            (SeekKey::Index(a), SeekKey::Index(b)) => a == b,
            (SeekKey::Field(a), SeekKey::Field(b)) => a == b,
            _ => false,
        }
    }
}

impl<'k> From<&'k Key> for SeekKey<'k> {
    fn from(k: &'k Key) -> Self {
        match k {
            Key::Index(i) => SeekKey::Index(*i as isize),
            Key::Field(f) => SeekKey::Field(f),
        }
    }
}

/// Which half of a move shifts the indexes of later siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Track {
    Picks,
    Drops,
}

impl Track {
    pub(crate) fn hit(self, c: Option<&Component>) -> bool {
        match self {
            Track::Picks => c.is_some_and(Component::has_pick),
            Track::Drops => c.is_some_and(Component::has_drop),
        }
    }
}

/// Walks the children of one node in key order, stopping at requested keys.
///
/// Counting advancers tally list children that pick (or drop) as they are
/// skipped. Mapped advancers additionally translate each child's index by
/// the tally so far before comparing it with the target, and refuse to
/// match a child that itself picks (or drops): those never line up with a
/// position on the other side of the phase.
pub(crate) struct Advancer<'a> {
    r: Option<ReadCursor<'a>>,
    valid: bool,
    track: Option<Track>,
    mapped: bool,
    offset: isize,
}

impl<'a> Advancer<'a> {
    pub(crate) fn plain(r: Option<ReadCursor<'a>>) -> Self {
        Self::build(r, None, false)
    }

    pub(crate) fn counting(r: Option<ReadCursor<'a>>, track: Track) -> Self {
        Self::build(r, Some(track), false)
    }

    pub(crate) fn mapped(r: Option<ReadCursor<'a>>, track: Track) -> Self {
        Self::build(r, Some(track), true)
    }

    fn build(mut r: Option<ReadCursor<'a>>, track: Option<Track>, mapped: bool) -> Self {
        let valid = r.as_mut().is_some_and(ReadCursor::descend_first);
        Self { r, valid, track, mapped, offset: 0 }
    }

    /// Number of tracked list children skipped so far.
    pub(crate) fn offset(&self) -> isize {
        self.offset
    }

    pub(crate) fn seek_key(&mut self, target: &Key) -> Option<ReadCursor<'a>> {
        self.seek(SeekKey::from(target))
    }

    pub(crate) fn seek_index(&mut self, target: isize) -> Option<ReadCursor<'a>> {
        self.seek(SeekKey::Index(target))
    }

    /// Advance to `target`, returning a cursor on that child when it exists.
    pub(crate) fn seek(&mut self, target: SeekKey<'_>) -> Option<ReadCursor<'a>> {
        let r = self.r.as_mut()?;
        while self.valid {
            let Some(k2) = r.get_key() else { break };
            let mut here = SeekKey::from(k2);
            let mut skip = false;
            if let (true, Some(track), Key::Index(i)) = (self.mapped, self.track, k2) {
                let shifted = *i as isize - self.offset;
                let mut m = if track.hit(r.get_component()) { !shifted } else { shifted };
                if m < 0 {
                    m = !m;
                    skip = true;
                }
                here = SeekKey::Index(m);
            }
            if here.is_greater(&target) {
                return None;
            } else if here.same(&target) && !skip {
                return Some(r.clone());
            }
            if let (Some(track), SeekKey::Index(_)) = (self.track, here) {
                if track.hit(r.get_component()) {
                    self.offset += 1;
                }
            }
            self.valid = r.next_sibling();
        }
        None
    }
}

/// Walk the children of two cursors together in key order. `f` receives
/// the key and a cursor on that child for each side that has it.
pub(crate) fn each_child_of<'a, F>(
    mut r1: Option<ReadCursor<'a>>,
    mut r2: Option<ReadCursor<'a>>,
    mut f: F,
) -> Result<()>
where
    F: FnMut(&'a Key, Option<ReadCursor<'a>>, Option<ReadCursor<'a>>) -> Result<()>,
{
    let mut has1 = r1.as_mut().is_some_and(ReadCursor::descend_first);
    let mut has2 = r2.as_mut().is_some_and(ReadCursor::descend_first);
    while has1 || has2 {
        let mut k1 = if has1 { r1.as_ref().and_then(ReadCursor::get_key) } else { None };
        let mut k2 = if has2 { r2.as_ref().and_then(ReadCursor::get_key) } else { None };
        if let (Some(a), Some(b)) = (k1, k2) {
            if b > a {
                k2 = None;
            } else if a != b {
                k1 = None;
            }
        }
        let Some(key) = k1.or(k2) else { break };
        f(key, k1.and(r1.clone()), k2.and(r2.clone()))?;
        if k1.is_some() && has1 {
            has1 = r1.as_mut().is_some_and(ReadCursor::next_sibling);
        }
        if k2.is_some() && has2 {
            has2 = r2.as_mut().is_some_and(ReadCursor::next_sibling);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{op_from_value, Op};
    use serde_json::json;

    fn op(v: serde_json::Value) -> Op {
        op_from_value(v).unwrap()
    }

    #[test]
    fn plain_advancer_finds_keys_in_order() {
        let o = op(json!([[1, {"r": true}], [3, {"r": true}], ["x", {"r": true}]]));
        let mut adv = Advancer::plain(Some(ReadCursor::new(&o)));
        assert!(adv.seek_index(0).is_none());
        assert_eq!(adv.seek_index(1).unwrap().get_key(), Some(&Key::Index(1)));
        assert!(adv.seek_index(2).is_none());
        assert!(adv.seek_key(&Key::from("x")).is_some());
        assert!(adv.seek_key(&Key::from("y")).is_none());
    }

    #[test]
    fn counting_advancer_tallies_picks() {
        let o = op(json!([[0, {"r": true}], [1, {"i": 5}], [2, {"p": 0}], [4, {"d": 0}]]));
        let mut adv = Advancer::counting(Some(ReadCursor::new(&o)), Track::Picks);
        assert!(adv.seek_index(4).is_some());
        assert_eq!(adv.offset(), 2);
    }

    #[test]
    fn mapped_advancer_shifts_and_skips() {
        // Children 0 and 2 are removed; child 3 becomes index 1 afterwards.
        let o = op(json!([[0, {"r": true}], [2, {"r": true}], [3, {"es": [1, "a"]}]]));
        let mut adv = Advancer::mapped(Some(ReadCursor::new(&o)), Track::Picks);
        assert!(adv.seek_index(0).is_none());
        let hit = adv.seek_index(1).unwrap();
        assert_eq!(hit.get_key(), Some(&Key::Index(3)));
        assert_eq!(adv.offset(), 2);
    }

    #[test]
    fn each_child_of_zips_keys() {
        let a = op(json!([["a", {"r": true}], ["c", {"r": true}]]));
        let b = op(json!([["b", {"r": true}], ["c", {"i": 1}]]));
        let mut seen = Vec::new();
        each_child_of(Some(ReadCursor::new(&a)), Some(ReadCursor::new(&b)), |k, x, y| {
            seen.push((k.clone(), x.is_some(), y.is_some()));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                (Key::from("a"), true, false),
                (Key::from("b"), false, true),
                (Key::from("c"), true, true),
            ]
        );
    }
}
