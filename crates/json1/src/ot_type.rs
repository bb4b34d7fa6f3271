//! The json1 type as a pluggable OT type.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::apply::apply;
use crate::compose::compose;
use crate::config::Json1Config;
use crate::conflict::transform_with_conflicts_pred;
use crate::error::Result;
use crate::invert::{invert, invert_with_doc, make_invertible};
use crate::normalize::normalize;
use crate::position::transform_position;
use crate::transform::{transform, try_transform, Transformed};
use crate::types::{Conflict, Key, Op, Side};
use crate::validate::{check_valid_op, is_noop};

pub const TYPE_NAME: &str = "json1presence";
pub const TYPE_URI: &str = "http://sharejs.org/types/JSONv1presence";

/// What a document sync engine needs from an OT type.
pub trait OtType {
    type Doc;
    type Op;

    fn name(&self) -> &str;
    fn uri(&self) -> &str;
    fn create(&self, data: Option<Value>) -> Self::Doc;
    fn apply(&self, doc: Self::Doc, op: &Self::Op) -> Result<Self::Doc>;
    fn compose(&self, op1: &Self::Op, op2: &Self::Op) -> Result<Self::Op>;
    fn transform(&self, op1: &Self::Op, op2: &Self::Op, side: Side) -> Result<Self::Op>;
    fn try_transform(&self, op1: &Self::Op, op2: &Self::Op, side: Side) -> Result<Transformed>;
    fn invert(&self, op: &Self::Op) -> Result<Self::Op>;
    fn invert_with_doc(&self, op: &Self::Op, doc: &Self::Doc) -> Result<Self::Op>;
    fn make_invertible(&self, op: &Self::Op, doc: &Self::Doc) -> Result<Self::Op>;
    fn is_noop(&self, op: &Self::Op) -> bool;
    fn normalize(&self, op: &Self::Op) -> Result<Self::Op>;
    fn transform_position(&self, path: &[Key], op: &Self::Op) -> Result<Option<Vec<Key>>>;
    fn check_valid_op(&self, op: &Self::Op) -> Result<()>;
}

type ConflictPred = Arc<dyn Fn(&Conflict) -> bool + Send + Sync>;

/// json1 documents (`Option<Value>`, `None` being the empty document) and
/// operations ([`Op`]).
#[derive(Clone, Default)]
pub struct Json1Type {
    config: Json1Config,
    allow_conflict: Option<ConflictPred>,
}

impl fmt::Debug for Json1Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Json1Type")
            .field("config", &self.config)
            .field("resolves_conflicts", &self.allow_conflict.is_some())
            .finish()
    }
}

impl Json1Type {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Json1Config) -> Self {
        Self { config, allow_conflict: None }
    }

    /// A type whose `transform` resolves the conflicts `pred` accepts
    /// instead of failing on them.
    pub fn allowing_conflicts<F>(self, pred: F) -> Self
    where
        F: Fn(&Conflict) -> bool + Send + Sync + 'static,
    {
        Self { allow_conflict: Some(Arc::new(pred)), ..self }
    }

    pub fn config(&self) -> &Json1Config {
        &self.config
    }

    fn checked(&self, op: Op) -> Result<Op> {
        if self.config.check_output {
            check_valid_op(&op)?;
        }
        Ok(op)
    }
}

impl OtType for Json1Type {
    type Doc = Option<Value>;
    type Op = Op;

    fn name(&self) -> &str {
        TYPE_NAME
    }

    fn uri(&self) -> &str {
        TYPE_URI
    }

    fn create(&self, data: Option<Value>) -> Option<Value> {
        data
    }

    fn apply(&self, doc: Option<Value>, op: &Op) -> Result<Option<Value>> {
        apply(doc, op)
    }

    fn compose(&self, op1: &Op, op2: &Op) -> Result<Op> {
        self.checked(compose(op1, op2)?)
    }

    fn transform(&self, op1: &Op, op2: &Op, side: Side) -> Result<Op> {
        let op = match &self.allow_conflict {
            Some(pred) => transform_with_conflicts_pred(&self.config, |c| pred(c), op1, op2, side)?,
            None => transform(op1, op2, side)?,
        };
        self.checked(op)
    }

    fn try_transform(&self, op1: &Op, op2: &Op, side: Side) -> Result<Transformed> {
        match try_transform(op1, op2, side)? {
            Ok(op) => Ok(Ok(self.checked(op)?)),
            Err(conflict) => Ok(Err(conflict)),
        }
    }

    fn invert(&self, op: &Op) -> Result<Op> {
        self.checked(invert(op)?)
    }

    fn invert_with_doc(&self, op: &Op, doc: &Option<Value>) -> Result<Op> {
        self.checked(invert_with_doc(op, doc.as_ref())?)
    }

    fn make_invertible(&self, op: &Op, doc: &Option<Value>) -> Result<Op> {
        self.checked(make_invertible(op, doc.as_ref())?)
    }

    fn is_noop(&self, op: &Op) -> bool {
        is_noop(op)
    }

    fn normalize(&self, op: &Op) -> Result<Op> {
        normalize(op)
    }

    fn transform_position(&self, path: &[Key], op: &Op) -> Result<Option<Vec<Key>>> {
        transform_position(path, op)
    }

    fn check_valid_op(&self, op: &Op) -> Result<()> {
        check_valid_op(op)
    }
}
