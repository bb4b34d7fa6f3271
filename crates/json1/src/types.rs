//! Core types for json1 operations.
//!
//! An operation is `null` (the no-op) or a nested list. Each list is a
//! *descent*: scalar keys walk down the document, an optional component
//! object after a key says what happens at that node, and trailing nested
//! lists branch into several children of the same node.
//!
//! ```text
//! ["x", {"r": true}]                          remove doc.x
//! [["a", {"p": 0}], ["b", {"d": 0}]]          move doc.a to doc.b
//! ["list", [0, {"i": "hi"}], [2, {"r": 1}]]   insert at list[0], remove list[2]
//! ```

use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ── Keys ──────────────────────────────────────────────────────────────────

/// A single path step: an array index or an object field.
///
/// The derived ordering puts every index before every field, which is the
/// order descents must appear in within one level.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Index(usize),
    Field(String),
}

impl Key {
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Field(_) => None,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Key::Index(_))
    }

    /// Keys that would shadow an object prototype slot are never valid.
    pub fn is_valid_path_item(&self) -> bool {
        match self {
            Key::Index(_) => true,
            Key::Field(f) => f != "__proto__",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Field(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Field(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Field(s)
    }
}

/// Conversion used by the [`path!`](crate::path) macro. `usize` is the only
/// integer implementor, so unsuffixed literals infer it and negative indexes
/// are rejected at compile time.
pub trait IntoKey {
    fn into_key(self) -> Key;
}

impl IntoKey for Key {
    fn into_key(self) -> Key {
        self
    }
}

impl IntoKey for &str {
    fn into_key(self) -> Key {
        Key::from(self)
    }
}

impl IntoKey for String {
    fn into_key(self) -> Key {
        Key::Field(self)
    }
}

impl IntoKey for usize {
    fn into_key(self) -> Key {
        Key::Index(self)
    }
}

/// Build a `Vec<Key>` from string and integer literals.
///
/// ```
/// use json1_ot::{path, Key};
/// assert_eq!(path!["a", 1], vec![Key::from("a"), Key::Index(1)]);
/// ```
///
/// ```compile_fail
/// use json1_ot::path;
/// let _ = path!["a", -1];
/// ```
#[macro_export]
macro_rules! path {
    () => { ::std::vec::Vec::<$crate::Key>::new() };
    ($($k:expr),+ $(,)?) => {
        vec![$($crate::types::IntoKey::into_key($k)),+]
    };
}

// ── Component ─────────────────────────────────────────────────────────────

/// What happens at one node of the document.
///
/// `r` and `i` are present whenever the field exists on the wire, even if
/// its payload is `null`; `p`, `d` and the edit fields treat `null` as
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Component {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub r: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub i: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub et: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub es: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ena: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl Component {
    /// The node's current value is lifted out (moved or removed).
    pub fn has_pick(&self) -> bool {
        self.p.is_some() || self.r.is_some()
    }

    /// Something is placed at this node (moved in or inserted).
    pub fn has_drop(&self) -> bool {
        self.d.is_some() || self.i.is_some()
    }

    pub fn has_edit(&self) -> bool {
        self.e.is_some() || self.es.is_some() || self.ena.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Every present field, in wire order.
    pub fn fields(&self) -> Vec<Field> {
        let mut out = Vec::new();
        if let Some(v) = &self.r {
            out.push(Field::R(v.clone()));
        }
        if let Some(v) = self.p {
            out.push(Field::P(v));
        }
        if let Some(v) = &self.i {
            out.push(Field::I(v.clone()));
        }
        if let Some(v) = self.d {
            out.push(Field::D(v));
        }
        if let Some(v) = &self.et {
            out.push(Field::Et(v.clone()));
        }
        if let Some(v) = &self.e {
            out.push(Field::E(v.clone()));
        }
        if let Some(v) = &self.es {
            out.push(Field::Es(v.clone()));
        }
        if let Some(v) = &self.ena {
            out.push(Field::Ena(v.clone()));
        }
        out
    }

    /// Set one field. Returns `false` (and leaves the component untouched)
    /// when a different value is already stored there.
    pub(crate) fn set(&mut self, field: Field) -> bool {
        fn put<T: PartialEq>(slot: &mut Option<T>, v: T, null_is_empty: fn(&T) -> bool) -> bool {
            match slot {
                Some(old) if *old != v && !null_is_empty(old) => false,
                _ => {
                    *slot = Some(v);
                    true
                }
            }
        }
        fn never<T>(_: &T) -> bool {
            false
        }
        fn is_null(v: &Value) -> bool {
            v.is_null()
        }
        match field {
            Field::R(v) => put(&mut self.r, v, is_null),
            Field::P(v) => put(&mut self.p, v, never),
            Field::I(v) => put(&mut self.i, v, is_null),
            Field::D(v) => put(&mut self.d, v, never),
            Field::Et(v) => put(&mut self.et, v, never),
            Field::E(v) => put(&mut self.e, v, is_null),
            Field::Es(v) => put(&mut self.es, v, is_null),
            Field::Ena(v) => put(&mut self.ena, v, is_null),
        }
    }
}

/// One component field, as written through a
/// [`WriteCursor`](crate::cursor::WriteCursor).
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    R(Value),
    P(usize),
    I(Value),
    D(usize),
    Et(String),
    E(Value),
    Es(Value),
    Ena(Value),
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::R(_) => "r",
            Field::P(_) => "p",
            Field::I(_) => "i",
            Field::D(_) => "d",
            Field::Et(_) => "et",
            Field::E(_) => "e",
            Field::Es(_) => "es",
            Field::Ena(_) => "ena",
        }
    }
}

// ── Operation ─────────────────────────────────────────────────────────────

/// One item of a descent list.
#[derive(Debug, Clone, PartialEq)]
pub enum OpItem {
    Key(Key),
    Component(Component),
    Descent(Vec<OpItem>),
}

impl OpItem {
    pub fn as_key(&self) -> Option<&Key> {
        match self {
            OpItem::Key(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&Component> {
        match self {
            OpItem::Component(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_descent(&self) -> Option<&[OpItem]> {
        match self {
            OpItem::Descent(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self, OpItem::Component(_))
    }

    pub fn is_descent(&self) -> bool {
        matches!(self, OpItem::Descent(_))
    }
}

/// A json1 operation. `None` is the no-op.
pub type Op = Option<Vec<OpItem>>;

/// Parse an operation from its JSON wire form.
pub fn op_from_value(value: Value) -> Result<Op, serde_json::Error> {
    serde_json::from_value(value)
}

/// Render an operation in its JSON wire form.
pub fn op_to_value(op: &Op) -> Value {
    // Serializing these types into a `Value` cannot fail: every key is a
    // string and every leaf is already JSON.
    serde_json::to_value(op).unwrap_or(Value::Null)
}

impl Serialize for OpItem {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            OpItem::Key(Key::Index(i)) => s.serialize_u64(*i as u64),
            OpItem::Key(Key::Field(f)) => s.serialize_str(f),
            OpItem::Component(c) => c.serialize(s),
            OpItem::Descent(d) => d.serialize(s),
        }
    }
}

impl<'de> Deserialize<'de> for OpItem {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct ItemVisitor;

        impl<'de> Visitor<'de> for ItemVisitor {
            type Value = OpItem;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer, string, component object or list")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<OpItem, E> {
                usize::try_from(v)
                    .map(|i| OpItem::Key(Key::Index(i)))
                    .map_err(|_| E::custom("index out of range"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<OpItem, E> {
                if v < 0 {
                    return Err(E::custom(format!("negative index {v}")));
                }
                self.visit_u64(v as u64)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<OpItem, E> {
                if v >= 0.0 && v.fract() == 0.0 && v <= usize::MAX as f64 {
                    Ok(OpItem::Key(Key::Index(v as usize)))
                } else {
                    Err(E::custom(format!("invalid index {v}")))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<OpItem, E> {
                Ok(OpItem::Key(Key::Field(v.to_string())))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<OpItem, E> {
                Ok(OpItem::Key(Key::Field(v)))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<OpItem, A::Error> {
                let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(item) = seq.next_element::<OpItem>()? {
                    items.push(item);
                }
                Ok(OpItem::Descent(items))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<OpItem, A::Error> {
                let c = Component::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(OpItem::Component(c))
            }
        }

        d.deserialize_any(ItemVisitor)
    }
}

// ── Side / conflicts ──────────────────────────────────────────────────────

/// Tie-break used when both operations touch the exact same position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Kinds of conflict `try_transform` can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ConflictType {
    /// One op removes a subtree the other moves, inserts or edits into.
    RmUnexpectedContent = 1,
    /// Both ops place different content at the same location.
    DropCollision = 2,
    /// Content is moved into a subtree that the other op moves inside it.
    Blackhole = 3,
}

impl From<ConflictType> for u8 {
    fn from(t: ConflictType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for ConflictType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(ConflictType::RmUnexpectedContent),
            2 => Ok(ConflictType::DropCollision),
            3 => Ok(ConflictType::Blackhole),
            other => Err(format!("unrecognised conflict type {other}")),
        }
    }
}

/// A transform conflict. `op1` and `op2` are the minimal sub-operations of
/// each side that collided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub kind: ConflictType,
    pub op1: Op,
    pub op2: Op,
}

impl Conflict {
    /// The same conflict seen from the other operand.
    pub fn inverted(&self) -> Conflict {
        Conflict { kind: self.kind, op1: self.op2.clone(), op2: self.op1.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> Op {
        op_from_value(v).unwrap()
    }

    #[test]
    fn keys_order_indexes_before_fields() {
        assert!(Key::Index(100) < Key::from("a"));
        assert!(Key::Index(2) < Key::Index(10));
        assert!(Key::from("a") < Key::from("b"));
    }

    #[test]
    fn parses_nested_op() {
        let op = parse(json!([["a", {"p": 0}], ["b", {"d": 0}]])).unwrap();
        assert_eq!(op.len(), 2);
        let first = op[0].as_descent().unwrap();
        assert_eq!(first[0], OpItem::Key(Key::from("a")));
        assert_eq!(first[1].as_component().unwrap().p, Some(0));
    }

    #[test]
    fn null_op_is_none() {
        assert_eq!(parse(Value::Null), None);
    }

    #[test]
    fn remove_and_insert_of_null_are_present() {
        let op = parse(json!(["x", {"r": null, "i": null}])).unwrap();
        let c = op[1].as_component().unwrap();
        assert_eq!(c.r, Some(Value::Null));
        assert_eq!(c.i, Some(Value::Null));
        assert!(c.has_pick() && c.has_drop());
    }

    #[test]
    fn unknown_component_field_is_rejected() {
        assert!(op_from_value(json!(["x", {"q": 1}])).is_err());
    }

    #[test]
    fn negative_index_is_rejected() {
        assert!(op_from_value(json!([-1, {"r": true}])).is_err());
        assert!(op_from_value(json!([1.5, {"r": true}])).is_err());
    }

    #[test]
    fn wire_form_is_preserved() {
        let wire = json!(["list", [0, {"i": "hi"}], [2, {"r": 1}], ["x", {"es": [1, "a"]}]]);
        let op = parse(wire.clone());
        assert_eq!(op_to_value(&op), wire);
    }

    #[test]
    fn path_macro_builds_keys() {
        assert_eq!(crate::path!["a", 0, "b"], vec![Key::from("a"), Key::Index(0), Key::from("b")]);
        assert!(crate::path![].is_empty());
        let i: usize = 3;
        assert_eq!(crate::path![i, String::from("k")], vec![Key::Index(3), Key::from("k")]);
    }

    #[test]
    fn conflict_type_serializes_as_number() {
        let c = Conflict { kind: ConflictType::DropCollision, op1: None, op2: None };
        assert_eq!(serde_json::to_value(&c).unwrap(), json!({"type": 2, "op1": null, "op2": null}));
    }

    #[test]
    fn component_set_rejects_overwrite() {
        let mut c = Component::default();
        assert!(c.set(Field::P(1)));
        assert!(c.set(Field::P(1)));
        assert!(!c.set(Field::P(2)));
        assert!(c.set(Field::R(Value::Null)));
        assert!(c.set(Field::R(json!(true))));
    }
}
