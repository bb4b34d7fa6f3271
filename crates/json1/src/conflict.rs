//! Turning transform conflicts into edits both sides can live with.

use serde_json::Value;
use tracing::{debug, trace};

use crate::compose::compose;
use crate::config::Json1Config;
use crate::cursor::{ReadCursor, WriteCursor};
use crate::error::{Error, Result};
use crate::normalize::normalize;
use crate::subtype::edit_type;
use crate::transform::try_transform;
use crate::types::{Conflict, ConflictType, Field, Op, Side};

/// An operation removing everything `op` drops or edits. Composed after
/// `op`, it undoes the conflicting part.
fn op_that_removes_drops_and_edits(op: &Op) -> Result<Op> {
    let mut w = WriteCursor::new();
    ReadCursor::new(op).traverse(Some(&mut w), &mut |c, _, w| {
        if c.has_drop() || edit_type(Some(c))?.is_some() {
            if let Some(w) = w {
                w.write(Field::R(Value::Bool(true)))?;
            }
        }
        Ok(())
    })?;
    Ok(w.into_op())
}

fn removes_anything(op: &Op) -> Result<bool> {
    let mut found = false;
    ReadCursor::new(op).traverse(None, &mut |c, _, _| {
        found |= c.r.is_some();
        Ok(())
    })?;
    Ok(found)
}

/// Cleanup operations `(r1, r2)` to compose onto `op1` and `op2` so that
/// `conflict` no longer occurs.
///
/// A drop collision is won by the left side. When one side removes content
/// the other expected, the remove wins. A blackhole drops both moves.
pub fn resolve_conflict(conflict: &Conflict, side: Side) -> Result<(Op, Op)> {
    let Conflict { kind, op1, op2 } = conflict;
    match kind {
        ConflictType::DropCollision => match side {
            Side::Left => Ok((None, op_that_removes_drops_and_edits(op2)?)),
            Side::Right => Ok((op_that_removes_drops_and_edits(op1)?, None)),
        },
        ConflictType::RmUnexpectedContent => {
            if removes_anything(op1)? {
                Ok((None, op_that_removes_drops_and_edits(op2)?))
            } else {
                Ok((op_that_removes_drops_and_edits(op1)?, None))
            }
        }
        ConflictType::Blackhole => {
            Ok((op_that_removes_drops_and_edits(op1)?, op_that_removes_drops_and_edits(op2)?))
        }
    }
}

/// Transform `op1` against `op2`, resolving every conflict `allow` accepts
/// with [`resolve_conflict`]. The part of `op2` discarded along the way is
/// folded into the result so that applying it after `op2` still converges.
pub fn transform_with_conflicts_pred<F>(
    config: &Json1Config,
    mut allow: F,
    op1: &Op,
    op2: &Op,
    side: Side,
) -> Result<Op>
where
    F: FnMut(&Conflict) -> bool,
{
    let mut op1 = op1.clone();
    let mut op2 = op2.clone();
    let mut r2_aggregate: Op = None;

    for round in 0..config.max_conflict_rounds {
        let conflict = match try_transform(&op1, &op2, side)? {
            Ok(result) => return compose(&r2_aggregate, &result),
            Err(conflict) => conflict,
        };
        if !allow(&conflict) {
            return Err(Error::WriteConflict(Box::new(conflict)));
        }
        debug!(round, kind = ?conflict.kind, side = side.as_str(), "resolving transform conflict");
        let (r1, r2) = resolve_conflict(&conflict, side)?;
        trace!(?r1, ?r2, "conflict cleanup ops");
        op1 = compose(&normalize(&op1)?, &r1)?;
        op2 = compose(&normalize(&op2)?, &r2)?;
        r2_aggregate = compose(&r2_aggregate, &r2)?;
    }

    match try_transform(&op1, &op2, side)? {
        Ok(result) => compose(&r2_aggregate, &result),
        Err(conflict) => Err(Error::ConflictRoundsExceeded {
            rounds: config.max_conflict_rounds,
            conflict: Box::new(conflict),
        }),
    }
}

/// Transform resolving every conflict.
pub fn transform_no_conflict(op1: &Op, op2: &Op, side: Side) -> Result<Op> {
    transform_with_conflicts_pred(&Json1Config::default(), |_| true, op1, op2, side)
}
