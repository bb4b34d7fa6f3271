//! Constructors for the common single-step operations.

use serde_json::Value;

use crate::subtype::{NUMBER, TEXT_UNICODE};
use crate::types::{Component, Key, Op, OpItem};

/// `[k1, k2, ..., component]`, or `[component]` at the root.
fn at_path(path: &[Key], c: Component) -> Op {
    let mut items: Vec<OpItem> = path.iter().cloned().map(OpItem::Key).collect();
    items.push(OpItem::Component(c));
    Some(items)
}

/// Remove the value at `path`. `value` is the removed content; pass the
/// real value to keep the op invertible.
pub fn remove_op(path: &[Key], value: Value) -> Op {
    at_path(path, Component { r: Some(value), ..Default::default() })
}

/// Remove the value at `path` without recording it (`{"r": true}`).
pub fn remove_op_marker(path: &[Key]) -> Op {
    remove_op(path, Value::Bool(true))
}

pub fn insert_op(path: &[Key], value: Value) -> Op {
    at_path(path, Component { i: Some(value), ..Default::default() })
}

pub fn replace_op(path: &[Key], old: Value, new: Value) -> Op {
    at_path(path, Component { r: Some(old), i: Some(new), ..Default::default() })
}

/// Embed a subtype edit at `path`. Noop edits produce the noop operation
/// unless `preserve_noop` is set.
pub fn edit_op(path: &[Key], subtype: &dyn crate::subtype::Subtype, edit: Value, preserve_noop: bool) -> Op {
    if !preserve_noop && subtype.is_noop(&edit) {
        return None;
    }
    let c = match subtype.name() {
        NUMBER => Component { ena: Some(edit), ..Default::default() },
        TEXT_UNICODE => Component { es: Some(edit), ..Default::default() },
        name => Component { et: Some(name.to_string()), e: Some(edit), ..Default::default() },
    };
    at_path(path, c)
}

/// Move the value at `from` to `to` (slot 0). `to` is addressed in the
/// document after the pick.
pub fn move_op(from: &[Key], to: &[Key]) -> Op {
    let common = from.iter().zip(to).take_while(|(a, b)| a == b).count();
    let mut items: Vec<OpItem> = from[..common].iter().cloned().map(OpItem::Key).collect();
    let pick = || Component { p: Some(0), ..Default::default() };
    let drop = || Component { d: Some(0), ..Default::default() };

    let branch = |keys: &[Key], c: Component| {
        let mut d: Vec<OpItem> = keys.iter().cloned().map(OpItem::Key).collect();
        d.push(OpItem::Component(c));
        d
    };

    match (&from[common..], &to[common..]) {
        ([], []) => items.push(OpItem::Component(Component { p: Some(0), d: Some(0), ..Default::default() })),
        ([], rest) => {
            items.push(OpItem::Component(pick()));
            items.extend(branch(rest, drop()));
        }
        (rest, []) => {
            items.push(OpItem::Component(drop()));
            items.extend(branch(rest, pick()));
        }
        (f, t) => {
            let (a, b) = (branch(f, pick()), branch(t, drop()));
            if f[0] < t[0] {
                items.extend([OpItem::Descent(a), OpItem::Descent(b)]);
            } else {
                items.extend([OpItem::Descent(b), OpItem::Descent(a)]);
            }
        }
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use crate::subtype::{NumberSubtype, TextUnicodeSubtype};
    use crate::types::op_to_value;
    use serde_json::json;

    #[test]
    fn single_component_builders() {
        assert_eq!(op_to_value(&remove_op(&path!["a", 0], json!(5))), json!(["a", 0, {"r": 5}]));
        assert_eq!(op_to_value(&remove_op_marker(&path![])), json!([{"r": true}]));
        assert_eq!(op_to_value(&insert_op(&path!["x"], json!(null))), json!(["x", {"i": null}]));
        assert_eq!(
            op_to_value(&replace_op(&path![1], json!("a"), json!("b"))),
            json!([1, {"r": "a", "i": "b"}])
        );
    }

    #[test]
    fn edit_op_uses_shorthand_fields() {
        assert_eq!(
            op_to_value(&edit_op(&path!["n"], &NumberSubtype, json!(3), false)),
            json!(["n", {"ena": 3}])
        );
        assert_eq!(
            op_to_value(&edit_op(&path![], &TextUnicodeSubtype, json!(["hi"]), false)),
            json!([{"es": ["hi"]}])
        );
        assert_eq!(edit_op(&path!["t"], &TextUnicodeSubtype, json!([]), false), None);
        assert!(edit_op(&path!["t"], &TextUnicodeSubtype, json!([]), true).is_some());
    }

    #[test]
    fn move_between_siblings() {
        assert_eq!(
            op_to_value(&move_op(&path!["x", "b"], &path!["x", "a"])),
            json!(["x", ["a", {"d": 0}], ["b", {"p": 0}]])
        );
        assert_eq!(
            op_to_value(&move_op(&path![0], &path![2])),
            json!([[0, {"p": 0}], [2, {"d": 0}]])
        );
    }

    #[test]
    fn move_into_own_prefix() {
        assert_eq!(
            op_to_value(&move_op(&path!["a", "b"], &path!["a"])),
            json!(["a", {"d": 0}, "b", {"p": 0}])
        );
        assert_eq!(op_to_value(&move_op(&path!["a"], &path!["a"])), json!(["a", {"p": 0, "d": 0}]));
    }
}
