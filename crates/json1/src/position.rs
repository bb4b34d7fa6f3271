use crate::cursor::{Advancer, ReadCursor, Track};
use crate::error::{Error, Result};
use crate::subtype::edit_of;
use crate::types::{Key, Op};
use crate::validate::check_valid_op;

/// Continue mapping `path[start..]` through the drop phase from `r`.
fn through_drops(mut r: ReadCursor<'_>, mut path: Vec<Key>, start: usize) -> Result<Vec<Key>> {
    for i in start..path.len() {
        if let Some((t, e)) = edit_of(r.get_component())? {
            path[i] = t.transform_position(&path[i], e);
            break;
        }
        let mut adv = Advancer::mapped(Some(r.clone()), Track::Drops);
        let next = adv.seek_key(&path[i]);
        if let Key::Index(n) = &mut path[i] {
            *n += adv.offset() as usize;
        }
        match next {
            Some(child) => r = child,
            None => break,
        }
    }
    Ok(path)
}

/// Where the content at `path` ends up after `op`, or `None` if `op`
/// removes it. Moves carry the path along with the moved subtree and
/// positions inside embedded edits are mapped by the edit's subtype.
pub fn transform_position(path: &[Key], op: &Op) -> Result<Option<Vec<Key>>> {
    check_valid_op(op)?;
    let mut path = path.to_vec();
    let mut r = ReadCursor::new(op);
    let mut picked_at: Option<(usize, usize)> = None;
    let mut removed = false;

    let mut i = 0;
    loop {
        if let Some(c) = r.get_component() {
            if c.r.is_some() {
                removed = true;
            } else if let Some(p) = c.p {
                removed = false;
                picked_at = Some((p, i));
            }
        }
        if i >= path.len() {
            break;
        }
        let mut adv = Advancer::counting(Some(r.clone()), Track::Picks);
        let next = adv.seek_key(&path[i]);
        if let Key::Index(n) = &mut path[i] {
            *n -= adv.offset() as usize;
        }
        match next {
            Some(child) => r = child,
            None => break,
        }
        i += 1;
    }
    if removed {
        return Ok(None);
    }

    let Some((slot, pick_index)) = picked_at else {
        return through_drops(ReadCursor::new(op), path, 0).map(Some);
    };
    let tail = path.split_off(pick_index);
    let mut moved = None;
    ReadCursor::new(op).each_drop(None, |s, rd, _| {
        if s == slot {
            let mut dest = rd.get_path();
            let start = dest.len();
            dest.extend(tail.iter().cloned());
            moved = Some(through_drops(rd.clone(), dest, start)?);
        }
        Ok(())
    })?;
    moved
        .map(Some)
        .ok_or_else(|| Error::Internal(format!("slot {slot} is never dropped")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use crate::types::op_from_value;
    use serde_json::{json, Value};

    fn pos(p: Vec<Key>, op: Value) -> Option<Vec<Key>> {
        transform_position(&p, &op_from_value(op).unwrap()).unwrap()
    }

    #[test]
    fn unrelated_paths_are_unchanged() {
        assert_eq!(pos(path!["x", 1], json!(["y", {"r": true}])), Some(path!["x", 1]));
        assert_eq!(pos(path!["x"], json!(null)), Some(path!["x"]));
    }

    #[test]
    fn removed_content_has_no_position() {
        assert_eq!(pos(path!["x", "y"], json!(["x", {"r": true}])), None);
    }

    #[test]
    fn list_indexes_shift() {
        assert_eq!(pos(path![3], json!([1, {"r": true}])), Some(path![2]));
        assert_eq!(pos(path![3], json!([0, {"i": "a"}])), Some(path![4]));
        assert_eq!(pos(path![1], json!([3, {"i": "a"}])), Some(path![1]));
    }

    #[test]
    fn moved_content_follows_the_move() {
        let op = json!([["a", {"p": 0}], ["b", {"d": 0}]]);
        assert_eq!(pos(path!["a", "c", 2], op), Some(path!["b", "c", 2]));
    }

    #[test]
    fn position_inside_text_edit() {
        assert_eq!(pos(path!["t", 2], json!(["t", {"es": ["ab"]}])), Some(path!["t", 4]));
    }
}
