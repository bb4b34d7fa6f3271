//! json1: operational transformation for JSON documents.
//!
//! Operations are trees of path-addressed components that pick up, drop,
//! insert, remove or edit values. They can be applied, composed,
//! transformed against concurrent operations and inverted. Transform
//! reports semantic conflicts as data; [`transform_with_conflicts_pred`]
//! resolves the ones a caller accepts.
//!
//! # Example
//!
//! ```
//! use json1_ot::{apply, insert_op, path, remove_op_marker, transform, Side};
//! use serde_json::json;
//!
//! let doc = json!({"a": 1, "b": 2});
//! let op1 = remove_op_marker(&path!["a"]);
//! let op2 = insert_op(&path!["c"], json!(3));
//!
//! let op2_after_op1 = transform(&op2, &op1, Side::Right)?;
//! let out = apply(apply(doc, &op1)?, &op2_after_op1)?;
//! assert_eq!(out, Some(json!({"b": 2, "c": 3})));
//! # Ok::<(), json1_ot::Error>(())
//! ```

pub mod cursor;
pub mod subtype;
pub mod types;

mod apply;
mod builders;
mod compose;
mod config;
mod conflict;
mod error;
mod invert;
mod normalize;
mod ot_type;
mod position;
mod transform;
mod validate;

pub use apply::apply;
pub use builders::{edit_op, insert_op, move_op, remove_op, remove_op_marker, replace_op};
pub use compose::compose;
pub use config::Json1Config;
pub use conflict::{resolve_conflict, transform_no_conflict, transform_with_conflicts_pred};
pub use error::{Error, Result};
pub use invert::{invert, invert_with_doc, make_invertible};
pub use normalize::normalize;
pub use ot_type::{Json1Type, OtType, TYPE_NAME, TYPE_URI};
pub use position::transform_position;
pub use subtype::{get_subtype, register_subtype, Subtype};
pub use transform::{transform, try_transform, Transformed};
pub use types::{op_from_value, op_to_value, Component, Conflict, ConflictType, Field, Key, Op, OpItem, Side};
pub use validate::{check_valid_op, is_noop};
