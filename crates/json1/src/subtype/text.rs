//! The `text-unicode` subtype: reversible text operations addressed in
//! Unicode scalar values.
//!
//! # Operation format
//!
//! A text edit is a JSON list of components:
//! - `n` (number): skip `n` characters
//! - `"s"` (string): insert `s`
//! - `{"d": n}`: delete `n` characters
//! - `{"d": "s"}`: delete the characters `s` (reversible form)
//!
//! Trailing skips are implicit and dropped by [`normalize`].

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::subtype::{Subtype, TEXT_UNICODE};
use crate::types::{Key, Side};

#[derive(Debug, Clone, PartialEq)]
pub enum TextComponent {
    Skip(usize),
    Insert(String),
    Delete(usize),
    DeleteStr(String),
}

pub type TextOp = Vec<TextComponent>;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_str(s: &str, at: usize) -> (String, String) {
    match s.char_indices().nth(at) {
        Some((byte, _)) => (s[..byte].to_string(), s[byte..].to_string()),
        None => (s.to_string(), String::new()),
    }
}

impl TextComponent {
    /// Characters this component consumes from the source text.
    pub fn src_len(&self) -> usize {
        match self {
            TextComponent::Skip(n) | TextComponent::Delete(n) => *n,
            TextComponent::DeleteStr(s) => char_len(s),
            TextComponent::Insert(_) => 0,
        }
    }

    /// Characters this component produces in the result text.
    pub fn dst_len(&self) -> usize {
        match self {
            TextComponent::Skip(n) => *n,
            TextComponent::Insert(s) => char_len(s),
            TextComponent::Delete(_) | TextComponent::DeleteStr(_) => 0,
        }
    }

    fn is_delete(&self) -> bool {
        matches!(self, TextComponent::Delete(_) | TextComponent::DeleteStr(_))
    }

    fn is_empty(&self) -> bool {
        match self {
            TextComponent::Skip(n) | TextComponent::Delete(n) => *n == 0,
            TextComponent::Insert(s) | TextComponent::DeleteStr(s) => s.is_empty(),
        }
    }

    /// Split off the first `n` characters (source characters for skips and
    /// deletes, inserted characters for inserts).
    fn split(self, n: usize) -> (TextComponent, Option<TextComponent>) {
        let (head, tail) = match self {
            TextComponent::Skip(m) => (TextComponent::Skip(n.min(m)), TextComponent::Skip(m.saturating_sub(n))),
            TextComponent::Delete(m) => (TextComponent::Delete(n.min(m)), TextComponent::Delete(m.saturating_sub(n))),
            TextComponent::Insert(s) => {
                let (a, b) = split_str(&s, n);
                (TextComponent::Insert(a), TextComponent::Insert(b))
            }
            TextComponent::DeleteStr(s) => {
                let (a, b) = split_str(&s, n);
                (TextComponent::DeleteStr(a), TextComponent::DeleteStr(b))
            }
        };
        (head, if tail.is_empty() { None } else { Some(tail) })
    }
}

/// Append a component, merging with the last component if same type.
fn append(op: &mut TextOp, comp: TextComponent) {
    if comp.is_empty() {
        return;
    }
    match (op.last_mut(), comp) {
        (Some(TextComponent::Skip(n)), TextComponent::Skip(m)) => *n += m,
        (Some(TextComponent::Insert(s)), TextComponent::Insert(t)) => s.push_str(&t),
        (Some(TextComponent::DeleteStr(s)), TextComponent::DeleteStr(t)) => s.push_str(&t),
        (Some(last), comp) if last.is_delete() && comp.is_delete() => {
            *last = TextComponent::Delete(last.src_len() + comp.src_len());
        }
        (_, comp) => op.push(comp),
    }
}

/// Coalesce adjacent same-type components, drop empty ones and strip the
/// implicit trailing skip.
pub fn normalize(op: TextOp) -> TextOp {
    let mut result: TextOp = Vec::with_capacity(op.len());
    for comp in op {
        append(&mut result, comp);
    }
    while matches!(result.last(), Some(TextComponent::Skip(_))) {
        result.pop();
    }
    result
}

// ── Wire form ─────────────────────────────────────────────────────────────

pub fn parse(edit: &Value) -> Result<TextOp> {
    let Some(items) = edit.as_array() else {
        return Err(Error::subtype(TEXT_UNICODE, "Op must be an array"));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Number(n) => n
                .as_u64()
                .map(|n| TextComponent::Skip(n as usize))
                .ok_or_else(|| Error::subtype(TEXT_UNICODE, format!("invalid skip {n}"))),
            Value::String(s) => Ok(TextComponent::Insert(s.clone())),
            Value::Object(o) if o.len() == 1 => match o.get("d") {
                Some(Value::Number(n)) => n
                    .as_u64()
                    .map(|n| TextComponent::Delete(n as usize))
                    .ok_or_else(|| Error::subtype(TEXT_UNICODE, format!("invalid delete {n}"))),
                Some(Value::String(s)) => Ok(TextComponent::DeleteStr(s.clone())),
                _ => Err(Error::subtype(TEXT_UNICODE, format!("invalid component {item}"))),
            },
            other => Err(Error::subtype(TEXT_UNICODE, format!("invalid component {other}"))),
        })
        .collect()
}

pub fn to_value(op: &TextOp) -> Value {
    Value::Array(
        op.iter()
            .map(|c| match c {
                TextComponent::Skip(n) => json!(n),
                TextComponent::Insert(s) => json!(s),
                TextComponent::Delete(n) => json!({ "d": n }),
                TextComponent::DeleteStr(s) => json!({ "d": s }),
            })
            .collect(),
    )
}

/// Structural checks on the wire form: no empty components, no trailing
/// skip, adjacent components already merged.
pub fn check(edit: &Value) -> Result<()> {
    let op = parse(edit)?;
    let mut last: Option<&TextComponent> = None;
    for c in &op {
        if c.is_empty() {
            return Err(Error::subtype(TEXT_UNICODE, "Empty component"));
        }
        if let Some(prev) = last {
            let same = matches!(
                (prev, c),
                (TextComponent::Skip(_), TextComponent::Skip(_))
                    | (TextComponent::Insert(_), TextComponent::Insert(_))
            ) || (prev.is_delete() && c.is_delete());
            if same {
                return Err(Error::subtype(TEXT_UNICODE, "Adjacent components of the same type"));
            }
        }
        last = Some(c);
    }
    if matches!(last, Some(TextComponent::Skip(_))) {
        return Err(Error::subtype(TEXT_UNICODE, "Op has a trailing skip"));
    }
    Ok(())
}

// ── Algebra ───────────────────────────────────────────────────────────────

/// Apply a text operation.
pub fn apply(s: &str, op: &TextOp) -> Result<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut idx = 0usize;
    let past_end = || Error::subtype(TEXT_UNICODE, "Operation goes past the end of the document");

    for comp in op {
        match comp {
            TextComponent::Skip(n) => {
                let end = idx.checked_add(*n).filter(|&e| e <= chars.len()).ok_or_else(past_end)?;
                result.extend(&chars[idx..end]);
                idx = end;
            }
            TextComponent::Delete(n) => {
                idx = idx.checked_add(*n).filter(|&e| e <= chars.len()).ok_or_else(past_end)?;
            }
            TextComponent::DeleteStr(del) => {
                let end = idx.checked_add(char_len(del)).filter(|&e| e <= chars.len()).ok_or_else(past_end)?;
                if !chars[idx..end].iter().copied().eq(del.chars()) {
                    return Err(Error::subtype(TEXT_UNICODE, "Deleted text does not match the document"));
                }
                idx = end;
            }
            TextComponent::Insert(ins) => result.push_str(ins),
        }
    }
    result.extend(&chars[idx..]);
    Ok(result)
}

/// Compose two sequential operations into one equivalent operation.
pub fn compose(op1: &TextOp, op2: &TextOp) -> TextOp {
    let mut result: TextOp = Vec::new();
    let mut iter1 = op1.iter().cloned();
    let mut iter2 = op2.iter().cloned();
    let mut rem1: Option<TextComponent> = None;
    let mut rem2: Option<TextComponent> = None;

    loop {
        let c1 = rem1.take().or_else(|| iter1.next());
        let c2 = rem2.take().or_else(|| iter2.next());

        match (c1, c2) {
            (None, None) => break,
            // Whatever is left of either side passes through.
            (Some(c), None) | (None, Some(c)) => append(&mut result, c),
            // Deletes in op1 never meet op2: those characters are gone.
            (Some(d), Some(c2)) if d.is_delete() => {
                append(&mut result, d);
                rem2 = Some(c2);
            }
            (Some(c1), Some(TextComponent::Insert(s))) => {
                append(&mut result, TextComponent::Insert(s));
                rem1 = Some(c1);
            }
            (Some(TextComponent::Skip(n)), Some(c2)) => {
                let k = n.min(c2.src_len());
                let (head, tail) = c2.split(k);
                append(&mut result, head);
                rem2 = tail;
                if n > k {
                    rem1 = Some(TextComponent::Skip(n - k));
                }
            }
            (Some(TextComponent::Insert(s)), Some(c2)) => {
                let k = char_len(&s).min(c2.src_len());
                let (head, tail) = TextComponent::Insert(s).split(k);
                // A skip keeps the inserted text; a delete cancels it.
                if matches!(c2, TextComponent::Skip(_)) {
                    append(&mut result, head);
                }
                rem1 = tail;
                rem2 = c2.split(k).1;
            }
            (Some(_), Some(_)) => unreachable!("deletes are handled above"),
        }
    }
    normalize(result)
}

/// Transform `op` so it applies after `against`. On the left side `op`'s
/// inserts go first when both insert at the same position.
pub fn transform(op: &TextOp, against: &TextOp, side: Side) -> TextOp {
    let mut result: TextOp = Vec::new();
    let mut op_iter = op.iter().cloned();
    let mut ag_iter = against.iter().cloned();
    let mut rem_op: Option<TextComponent> = None;
    let mut rem_ag: Option<TextComponent> = None;

    loop {
        let o = rem_op.take().or_else(|| op_iter.next());
        let a = rem_ag.take().or_else(|| ag_iter.next());

        match (o, a) {
            (None, _) => break,
            (Some(o), None) => append(&mut result, o),
            (Some(TextComponent::Insert(s)), Some(a @ TextComponent::Insert(_))) if side == Side::Left => {
                append(&mut result, TextComponent::Insert(s));
                rem_ag = Some(a);
            }
            // Against inserts: skip over the inserted chars.
            (Some(o), Some(TextComponent::Insert(t))) => {
                append(&mut result, TextComponent::Skip(char_len(&t)));
                rem_op = Some(o);
            }
            (Some(TextComponent::Insert(s)), Some(a)) => {
                append(&mut result, TextComponent::Insert(s));
                rem_ag = Some(a);
            }
            (Some(o), Some(a)) => {
                let k = o.src_len().min(a.src_len());
                let (head, tail) = o.split(k);
                // Characters `against` already deleted drop out of `op`.
                if matches!(a, TextComponent::Skip(_)) {
                    append(&mut result, head);
                }
                rem_op = tail;
                rem_ag = a.split(k).1;
            }
        }
    }
    normalize(result)
}

/// Swap inserts and deletes. Deletes must carry their text.
pub fn invert(op: &TextOp) -> Result<TextOp> {
    op.iter()
        .map(|c| match c {
            TextComponent::Skip(n) => Ok(TextComponent::Skip(*n)),
            TextComponent::Insert(s) => Ok(TextComponent::DeleteStr(s.clone())),
            TextComponent::DeleteStr(s) => Ok(TextComponent::Insert(s.clone())),
            TextComponent::Delete(_) => Err(Error::Unsupported(
                "Cannot invert text op: deleted content unknown. Call makeInvertible first".into(),
            )),
        })
        .collect::<Result<TextOp>>()
        .map(normalize)
}

/// Fill in the text of every counted delete from the document.
pub fn make_invertible(op: &TextOp, s: &str) -> Result<TextOp> {
    let chars: Vec<char> = s.chars().collect();
    let mut pos = 0usize;
    let mut out = Vec::with_capacity(op.len());
    for c in op {
        match c {
            TextComponent::Skip(n) => pos += n,
            TextComponent::DeleteStr(d) => pos += char_len(d),
            TextComponent::Insert(_) => {}
            TextComponent::Delete(n) => {
                let end = pos + n;
                let Some(deleted) = chars.get(pos..end) else {
                    return Err(Error::subtype(TEXT_UNICODE, "Delete goes past the end of the document"));
                };
                out.push(TextComponent::DeleteStr(deleted.iter().collect()));
                pos = end;
                continue;
            }
        }
        out.push(c.clone());
    }
    Ok(out)
}

/// Move a caret position across an operation.
pub fn transform_position(cursor: usize, op: &TextOp) -> usize {
    let mut cursor = cursor;
    let mut pos = 0usize;
    for c in op {
        if cursor <= pos {
            break;
        }
        match c {
            TextComponent::Skip(n) => pos += n,
            TextComponent::Insert(s) => {
                let len = char_len(s);
                pos += len;
                cursor += len;
            }
            TextComponent::Delete(_) | TextComponent::DeleteStr(_) => {
                cursor -= c.src_len().min(cursor - pos);
            }
        }
    }
    cursor
}

// ── Subtype ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct TextUnicodeSubtype;

fn expect_text(value: Option<&Value>) -> Result<&str> {
    value
        .and_then(Value::as_str)
        .ok_or_else(|| Error::subtype(TEXT_UNICODE, "document is not a string"))
}

impl Subtype for TextUnicodeSubtype {
    fn name(&self) -> &str {
        TEXT_UNICODE
    }

    fn uri(&self) -> Option<&str> {
        Some("http://sharejs.org/types/text-unicode")
    }

    fn apply(&self, value: Value, edit: &Value) -> Result<Value> {
        let s = expect_text(Some(&value))?;
        apply(s, &parse(edit)?).map(Value::String)
    }

    fn compose(&self, a: &Value, b: &Value) -> Result<Value> {
        Ok(to_value(&compose(&parse(a)?, &parse(b)?)))
    }

    fn transform(&self, edit: &Value, other: &Value, side: Side) -> Result<Value> {
        Ok(to_value(&transform(&parse(edit)?, &parse(other)?, side)))
    }

    fn invert(&self, edit: &Value) -> Result<Value> {
        invert(&parse(edit)?).map(|op| to_value(&op))
    }

    fn supports_make_invertible(&self) -> bool {
        true
    }

    fn make_invertible(&self, edit: &Value, value: Option<&Value>) -> Result<Value> {
        make_invertible(&parse(edit)?, expect_text(value)?).map(|op| to_value(&op))
    }

    fn is_noop(&self, edit: &Value) -> bool {
        edit.as_array().is_some_and(Vec::is_empty)
    }

    fn normalize(&self, edit: Value) -> Value {
        match parse(&edit) {
            Ok(op) => to_value(&normalize(op)),
            Err(_) => edit,
        }
    }

    fn check_valid_op(&self, edit: &Value) -> Result<()> {
        check(edit)
    }

    fn transform_position(&self, pos: &Key, edit: &Value) -> Key {
        match (pos, parse(edit)) {
            (Key::Index(i), Ok(op)) => Key::Index(transform_position(*i, &op)),
            _ => pos.clone(),
        }
    }
}
