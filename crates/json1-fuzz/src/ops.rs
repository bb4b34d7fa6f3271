//! Random valid operations against a known document.

use json1_ot::subtype::{NumberSubtype, TextUnicodeSubtype};
use json1_ot::{
    apply, compose, edit_op, insert_op, move_op, remove_op, remove_op_marker, replace_op, Error, Key, Op, Result,
};
use serde_json::{json, Value};
use tracing::trace;

use crate::doc::{random_number, random_text, random_value, DocOptions, KEYS};
use crate::fuzzer::Fuzzer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Insert,
    Remove,
    Replace,
    Move,
    Edit,
}

const STEP_KINDS: &[StepKind] = &[StepKind::Insert, StepKind::Remove, StepKind::Replace, StepKind::Move, StepKind::Edit];

/// Every node of `v` with its path, parents before children.
pub fn nodes(v: &Value) -> Vec<(Vec<Key>, &Value)> {
    fn walk<'v>(v: &'v Value, path: &mut Vec<Key>, out: &mut Vec<(Vec<Key>, &'v Value)>) {
        out.push((path.clone(), v));
        match v {
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    path.push(Key::Index(i));
                    walk(child, path, out);
                    path.pop();
                }
            }
            Value::Object(map) => {
                for (k, child) in map {
                    path.push(Key::Field(k.clone()));
                    walk(child, path, out);
                    path.pop();
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(v, &mut Vec::new(), &mut out);
    out
}

/// A free slot in some container of `doc`: an unused object key or a list
/// position (the end included).
fn free_slot(f: &mut Fuzzer, doc: &Value) -> Option<Vec<Key>> {
    let containers: Vec<_> = nodes(doc).into_iter().filter(|(_, v)| v.is_object() || v.is_array()).collect();
    if containers.is_empty() {
        return None;
    }
    let (path, container) = &containers[f.index(containers.len())];
    let key = match container {
        Value::Array(items) => Key::Index(f.index(items.len() + 1)),
        Value::Object(map) => {
            let free: Vec<&&str> = KEYS.iter().filter(|k| !map.contains_key(**k)).collect();
            if free.is_empty() {
                return None;
            }
            Key::Field(f.pick(&free).to_string())
        }
        _ => return None,
    };
    let mut out = path.clone();
    out.push(key);
    Some(out)
}

fn text_edit(f: &mut Fuzzer, s: &str) -> Value {
    let chars: Vec<char> = s.chars().collect();
    let pos = f.index(chars.len() + 1);
    let mut edit = Vec::new();
    if pos > 0 {
        edit.push(json!(pos));
    }
    if pos == chars.len() || f.random_bool(0.5) {
        let mut ins = random_text(f, 3);
        if ins.is_empty() {
            ins.push('x');
        }
        edit.push(json!(ins));
    } else {
        let n = 1 + f.index(chars.len() - pos);
        let removed: String = chars[pos..pos + n].iter().collect();
        edit.push(json!({ "d": removed }));
    }
    Value::Array(edit)
}

/// One single-step operation of `kind` valid against `doc`, or `None` when
/// `doc` has nothing for that kind to act on.
pub fn random_step(f: &mut Fuzzer, doc: &Value, kind: StepKind, opts: &DocOptions) -> Result<Option<Op>> {
    let inner: Vec<(Vec<Key>, &Value)> = nodes(doc).into_iter().filter(|(p, _)| !p.is_empty()).collect();
    let op = match kind {
        StepKind::Insert => free_slot(f, doc).map(|path| insert_op(&path, random_value(f, opts, 1))),
        StepKind::Remove if !inner.is_empty() => {
            let (path, v) = &inner[f.index(inner.len())];
            Some(remove_op(path, (*v).clone()))
        }
        StepKind::Replace if !inner.is_empty() => {
            let (path, v) = &inner[f.index(inner.len())];
            Some(replace_op(path, (*v).clone(), random_value(f, opts, 1)))
        }
        StepKind::Move if !inner.is_empty() => {
            let (from, _) = &inner[f.index(inner.len())];
            let picked = apply(doc.clone(), &remove_op_marker(from))?
                .ok_or_else(|| Error::InvalidDocument("fuzz document lost its root".into()))?;
            free_slot(f, &picked).filter(|to| to != from).map(|to| move_op(from, &to))
        }
        StepKind::Edit => {
            let editable: Vec<_> = inner.iter().filter(|(_, v)| v.is_i64() || v.is_string()).collect();
            if editable.is_empty() {
                None
            } else {
                let (path, v) = editable[f.index(editable.len())];
                match v {
                    Value::String(s) => Some(edit_op(path, &TextUnicodeSubtype, text_edit(f, s), false)),
                    _ => {
                        let mut n = random_number(f);
                        if n == json!(0) {
                            n = json!(1);
                        }
                        Some(edit_op(path, &NumberSubtype, n, false))
                    }
                }
            }
        }
        _ => None,
    };
    Ok(op)
}

/// A composition of up to `max_steps` random steps against `doc`, with the
/// document it produces.
pub fn random_op(f: &mut Fuzzer, doc: &Value, max_steps: usize, opts: &DocOptions) -> Result<(Op, Value)> {
    let mut op: Op = None;
    let mut cur = doc.clone();
    let steps = 1 + f.index(max_steps.max(1));
    for _ in 0..steps {
        let kind = *f.pick(STEP_KINDS);
        let Some(step) = random_step(f, &cur, kind, opts)? else { continue };
        trace!(?kind, ?step, "fuzz step");
        cur = apply(cur, &step)?.ok_or_else(|| Error::InvalidDocument("fuzz step removed the root".into()))?;
        op = compose(&op, &step)?;
    }
    Ok((op, cur))
}
