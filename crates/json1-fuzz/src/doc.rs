//! Random documents small enough that concurrent operations often touch
//! the same keys.

use serde_json::{Map, Value};

use crate::fuzzer::Fuzzer;

/// Object keys drawn by the generators.
pub const KEYS: &[&str] = &["a", "b", "c", "d", "e"];

const TEXT_CHARS: &str = "abcxyzé😛";

/// Relative odds for each kind of generated node.
#[derive(Debug, Clone)]
pub struct NodeOdds {
    pub null: u32,
    pub boolean: u32,
    pub number: u32,
    pub string: u32,
    pub array: u32,
    pub object: u32,
}

impl Default for NodeOdds {
    fn default() -> Self {
        Self { null: 1, boolean: 1, number: 4, string: 4, array: 2, object: 3 }
    }
}

#[derive(Debug, Clone)]
pub struct DocOptions {
    pub odds: NodeOdds,
    pub max_depth: usize,
    pub max_children: usize,
}

impl Default for DocOptions {
    fn default() -> Self {
        Self { odds: NodeOdds::default(), max_depth: 3, max_children: 4 }
    }
}

enum Node {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

fn pick_node(f: &mut Fuzzer, odds: &NodeOdds, leaf_only: bool) -> Node {
    let containers = if leaf_only { 0 } else { odds.array + odds.object };
    let total = odds.null + odds.boolean + odds.number + odds.string + containers;
    let mut roll = f.random_int(0, i64::from(total.max(1)) - 1) as u32;
    for (weight, node) in [
        (odds.null, Node::Null),
        (odds.boolean, Node::Boolean),
        (odds.number, Node::Number),
        (odds.string, Node::String),
    ] {
        if roll < weight {
            return node;
        }
        roll -= weight;
    }
    if roll < odds.array && !leaf_only {
        Node::Array
    } else if !leaf_only {
        Node::Object
    } else {
        Node::Number
    }
}

pub fn random_number(f: &mut Fuzzer) -> Value {
    Value::from(f.random_int(-50, 50))
}

pub fn random_text(f: &mut Fuzzer, max_len: usize) -> String {
    let len = f.index(max_len + 1);
    f.random_string(len, TEXT_CHARS)
}

/// A random value no deeper than `depth`.
pub fn random_value(f: &mut Fuzzer, opts: &DocOptions, depth: usize) -> Value {
    match pick_node(f, &opts.odds, depth == 0) {
        Node::Null => Value::Null,
        Node::Boolean => Value::Bool(f.random_bool(0.5)),
        Node::Number => random_number(f),
        Node::String => Value::String(random_text(f, 6)),
        Node::Array => {
            let n = f.index(opts.max_children + 1);
            Value::Array((0..n).map(|_| random_value(f, opts, depth - 1)).collect())
        }
        Node::Object => Value::Object(random_object(f, opts, depth - 1)),
    }
}

fn random_object(f: &mut Fuzzer, opts: &DocOptions, depth: usize) -> Map<String, Value> {
    let n = f.index(opts.max_children + 1);
    let mut map = Map::new();
    for _ in 0..n {
        let key = f.pick(KEYS).to_string();
        let value = random_value(f, opts, depth);
        map.insert(key, value);
    }
    map
}

/// A random document. The root is always an object or an array, and both
/// kinds turn up across seeds.
///
/// ```
/// use json1_ot_fuzz::{random_doc, DocOptions, Fuzzer};
///
/// let opts = DocOptions::default();
/// let roots: Vec<_> = (0..64).map(|seed| random_doc(&mut Fuzzer::from_u64(seed), &opts)).collect();
/// assert!(roots.iter().any(|d| d.is_object()));
/// assert!(roots.iter().any(|d| d.is_array()));
/// ```
pub fn random_doc(f: &mut Fuzzer, opts: &DocOptions) -> Value {
    if f.random_bool(0.75) {
        Value::Object(random_object(f, opts, opts.max_depth))
    } else {
        let n = f.index(opts.max_children + 1);
        Value::Array((0..n).map(|_| random_value(f, opts, opts.max_depth)).collect())
    }
}
