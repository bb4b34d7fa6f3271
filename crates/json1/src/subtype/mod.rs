//! Pluggable leaf-level OT types embedded in json1 operations.
//!
//! A component edits the value at its node through a named subtype:
//! `{"es": ...}` for `text-unicode`, `{"ena": ...}` for `number`, and
//! `{"et": name, "e": ...}` for anything else registered at startup.

pub mod number;
pub mod text;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::cursor::WriteCursor;
use crate::error::{Error, Result};
use crate::types::{Component, Field, Key, Side};

pub use number::NumberSubtype;
pub use text::TextUnicodeSubtype;

pub const NUMBER: &str = "number";
pub const TEXT_UNICODE: &str = "text-unicode";

/// A leaf-level OT type.
///
/// `apply`, `compose` and `transform` are required. The remaining methods
/// have defaults describing a subtype without that capability.
pub trait Subtype: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn uri(&self) -> Option<&str> {
        None
    }

    fn apply(&self, value: Value, edit: &Value) -> Result<Value>;

    fn compose(&self, a: &Value, b: &Value) -> Result<Value>;

    /// Rebase `edit` so it applies after `other`.
    fn transform(&self, edit: &Value, other: &Value, side: Side) -> Result<Value>;

    fn invert(&self, _edit: &Value) -> Result<Value> {
        Err(Error::Unsupported(format!("Cannot invert subtype {}", self.name())))
    }

    /// Whether [`make_invertible`](Self::make_invertible) needs to see the
    /// value before the edit.
    fn supports_make_invertible(&self) -> bool {
        false
    }

    fn make_invertible(&self, edit: &Value, _value: Option<&Value>) -> Result<Value> {
        Ok(edit.clone())
    }

    fn is_noop(&self, _edit: &Value) -> bool {
        false
    }

    fn normalize(&self, edit: Value) -> Value {
        edit
    }

    fn check_valid_op(&self, _edit: &Value) -> Result<()> {
        Ok(())
    }

    /// Map a child position inside the edited value across the edit.
    fn transform_position(&self, pos: &Key, _edit: &Value) -> Key {
        pos.clone()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────

type Registry = RwLock<HashMap<String, Arc<dyn Subtype>>>;

fn insert(map: &mut HashMap<String, Arc<dyn Subtype>>, subtype: Arc<dyn Subtype>) {
    if let Some(uri) = subtype.uri() {
        map.insert(uri.to_string(), subtype.clone());
    }
    map.insert(subtype.name().to_string(), subtype);
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        insert(&mut map, Arc::new(NumberSubtype));
        insert(&mut map, Arc::new(TextUnicodeSubtype));
        RwLock::new(map)
    })
}

/// Make a subtype available by name (and uri, if it has one).
pub fn register_subtype(subtype: Arc<dyn Subtype>) {
    debug!(name = subtype.name(), uri = ?subtype.uri(), "registering subtype");
    let mut map = registry().write().unwrap_or_else(PoisonError::into_inner);
    insert(&mut map, subtype);
}

pub fn get_subtype(name: &str) -> Result<Arc<dyn Subtype>> {
    let map = registry().read().unwrap_or_else(PoisonError::into_inner);
    map.get(name).cloned().ok_or_else(|| Error::MissingSubtype(name.to_string()))
}

// ── Edit components ───────────────────────────────────────────────────────

/// The subtype a component's edit uses, if it has one.
pub(crate) fn edit_type(c: Option<&Component>) -> Result<Option<Arc<dyn Subtype>>> {
    let Some(c) = c else { return Ok(None) };
    if let Some(name) = &c.et {
        get_subtype(name).map(Some)
    } else if c.es.is_some() {
        get_subtype(TEXT_UNICODE).map(Some)
    } else if c.ena.is_some() {
        get_subtype(NUMBER).map(Some)
    } else {
        Ok(None)
    }
}

/// The edit payload of a component.
pub(crate) fn get_edit(c: &Component) -> Option<&Value> {
    c.es.as_ref().or(c.ena.as_ref()).or(c.e.as_ref())
}

/// A component's edit with its resolved subtype.
pub(crate) fn edit_of(c: Option<&Component>) -> Result<Option<(Arc<dyn Subtype>, &Value)>> {
    let Some(t) = edit_type(c)? else { return Ok(None) };
    match c.and_then(get_edit) {
        Some(e) => Ok(Some((t, e))),
        None => Err(Error::invalid(format!("Missing edit for type {}", t.name()))),
    }
}

pub(crate) fn same_subtype(a: &dyn Subtype, b: &dyn Subtype) -> bool {
    a.name() == b.name()
}

/// Write an edit using the shorthand field for built-in subtypes. Noop
/// edits are skipped unless `preserve_noop` is set.
pub(crate) fn write_edit(
    w: &mut WriteCursor,
    subtype: &dyn Subtype,
    edit: Value,
    preserve_noop: bool,
) -> Result<()> {
    if !preserve_noop && subtype.is_noop(&edit) {
        return Ok(());
    }
    match subtype.name() {
        NUMBER => w.write(Field::Ena(edit)),
        TEXT_UNICODE => w.write(Field::Es(edit)),
        name => {
            w.write(Field::Et(name.to_string()))?;
            w.write(Field::E(edit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Concat;

    impl Subtype for Concat {
        fn name(&self) -> &str {
            "test-concat"
        }

        fn uri(&self) -> Option<&str> {
            Some("http://example.com/types/concat")
        }

        fn apply(&self, value: Value, edit: &Value) -> Result<Value> {
            let s = value.as_str().unwrap_or_default();
            Ok(Value::String(format!("{s}{}", edit.as_str().unwrap_or_default())))
        }

        fn compose(&self, a: &Value, b: &Value) -> Result<Value> {
            self.apply(a.clone(), b)
        }

        fn transform(&self, edit: &Value, _other: &Value, _side: Side) -> Result<Value> {
            Ok(edit.clone())
        }
    }

    #[test]
    fn builtins_are_registered() {
        assert_eq!(get_subtype("number").unwrap().name(), "number");
        assert_eq!(get_subtype("text-unicode").unwrap().name(), "text-unicode");
        assert_eq!(
            get_subtype("http://sharejs.org/types/text-unicode").unwrap().name(),
            "text-unicode"
        );
    }

    #[test]
    fn unknown_subtype_is_an_error() {
        assert_eq!(
            get_subtype("nope").unwrap_err(),
            Error::MissingSubtype("nope".into())
        );
    }

    #[test]
    fn registered_subtype_is_found_by_name_and_uri() {
        register_subtype(Arc::new(Concat));
        assert_eq!(get_subtype("test-concat").unwrap().name(), "test-concat");
        assert_eq!(
            get_subtype("http://example.com/types/concat").unwrap().name(),
            "test-concat"
        );
    }

    #[test]
    fn shorthand_fields_select_builtin_types() {
        let c = Component { ena: Some(json!(3)), ..Default::default() };
        assert_eq!(edit_type(Some(&c)).unwrap().unwrap().name(), NUMBER);
        let c = Component { es: Some(json!(["x"])), ..Default::default() };
        assert_eq!(edit_type(Some(&c)).unwrap().unwrap().name(), TEXT_UNICODE);
        let c = Component { r: Some(json!(true)), ..Default::default() };
        assert!(edit_type(Some(&c)).unwrap().is_none());
    }

    #[test]
    fn write_edit_uses_shorthand() {
        let mut w = WriteCursor::new();
        write_edit(&mut w, &NumberSubtype, json!(2), false).unwrap();
        assert_eq!(crate::types::op_to_value(w.get()), json!([{"ena": 2}]));

        let mut w = WriteCursor::new();
        write_edit(&mut w, &TextUnicodeSubtype, json!([]), false).unwrap();
        assert_eq!(w.get(), &None);
    }
}
