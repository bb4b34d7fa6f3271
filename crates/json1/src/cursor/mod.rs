//! Cursors over json1 operations.
//!
//! A [`ReadCursor`] walks an existing operation without touching it; a
//! [`WriteCursor`] builds one, creating list nodes lazily on first write.
//! Both keep an explicit stack of (container, index) frames instead of
//! parent pointers.

mod advancer;
mod read;
mod write;

pub(crate) use advancer::{each_child_of, Advancer, Track};
pub use read::{ReadCursor, TraverseFn};
pub use write::WriteCursor;

use crate::error::{Error, Result};
use crate::types::{Component, Key};

/// Component under an optional cursor.
pub(crate) fn comp<'a>(r: &Option<ReadCursor<'a>>) -> Option<&'a Component> {
    r.as_ref().and_then(ReadCursor::get_component)
}

pub(crate) fn has_pick(c: Option<&Component>) -> bool {
    c.is_some_and(Component::has_pick)
}

pub(crate) fn has_drop(c: Option<&Component>) -> bool {
    c.is_some_and(Component::has_drop)
}

/// A list key computed from running offsets.
pub(crate) fn index_key(i: isize, what: &str) -> Result<Key> {
    usize::try_from(i)
        .map(Key::Index)
        .map_err(|_| Error::Internal(format!("{what} is negative")))
}
