//! `for` loops over `range()` and over arrays.
//!
//! Both forms lower to a `repeat` whose round count is bounded by a
//! compile-time constant:
//!
//! ```text
//! (repeat <ix> <start> <rounds> <bound> <body>)
//! ```

use crate::stmt::StmtLowerer;
use num_bigint::BigInt;
use num_traits::One;
use stmtir_core::ast::Keyword;
use stmtir_core::builder::{clamp_le, dyn_array_count, element_ptr, make_setter, store};
use stmtir_core::{Context, Expr, ExprKind, IrNode, LowerError, Op, Result, Stmt, Type};
use tracing::debug;

impl StmtLowerer {
    pub(crate) fn lower_for(
        &self,
        target: &str,
        target_type: &Type,
        iter: &Expr,
        body: &[Stmt],
        ctx: &mut Context,
    ) -> Result<IrNode> {
        ctx.block_scope(|ctx| {
            if iter.builtin_name() == Some("range") {
                self.lower_for_range(target, target_type, iter, body, ctx)
            } else {
                self.lower_for_list(target, target_type, iter, body, ctx)
            }
        })
    }

    fn lower_for_range(
        &self,
        target: &str,
        target_type: &Type,
        iter: &Expr,
        body: &[Stmt],
        ctx: &mut Context,
    ) -> Result<IrNode> {
        let (args, keywords) = match &iter.kind {
            ExprKind::Call { args, keywords, .. } => (args, keywords),
            _ => return Err(LowerError::invariant("malformed range() call")),
        };
        let bound = range_bound(keywords)?;

        let (start_expr, end_expr) = match args.as_slice() {
            [end] => (None, end),
            [start, end] => (Some(start), end),
            other => {
                return Err(LowerError::invariant(format!(
                    "range() takes one or two positional arguments, got {}",
                    other.len()
                )));
            }
        };

        let (start, end) = ctx.range_scope(|ctx| {
            let start = match start_expr {
                Some(e) => self.exprs.lower_value(e, ctx)?,
                None => IrNode::int(0).typed(target_type.clone()),
            };
            let end = self.exprs.lower_value(end_expr, ctx)?;
            Ok((start, end))
        })?;
        for endpoint in [&start, &end] {
            if endpoint.typ.as_ref() != Some(target_type) {
                return Err(LowerError::invariant(format!(
                    "range() endpoint `{}` does not match loop variable type {}",
                    endpoint, target_type
                )));
            }
        }

        start.cache_when_complex("start", ctx, |ctx, start| {
            let (rounds, rounds_bound) = match bound {
                Some(bound) => {
                    let signed = target_type.is_signed();
                    let from = start.clone();
                    let rounds = end.cache_when_complex("end", ctx, |_, end| {
                        let clamped_start = clamp_le(from, end.clone(), signed);
                        Ok(IrNode::op(Op::Sub, vec![end, clamped_start]).typed(Type::uint256()))
                    })?;
                    (rounds, bound)
                }
                None => {
                    let (Some(lo), Some(hi)) = (start.int_value(), end.int_value()) else {
                        return Err(LowerError::invariant(
                            "range() without a bound needs constant endpoints",
                        ));
                    };
                    let rounds = hi - lo;
                    (IrNode::int(rounds.clone()), rounds)
                }
            };

            if rounds_bound < BigInt::one() {
                return Err(LowerError::invariant(format!(
                    "loop bound must be at least 1, got {}",
                    rounds_bound
                )));
            }
            debug!(loop_var = target, bound = %rounds_bound, "lowering range loop");

            let ix = IrNode::symbol(ctx.fresh_varname("range_ix")).typed(target_type.clone());
            let iptr = ctx.new_variable(target, target_type.clone())?;
            let body_ir = ctx.with_forvar(target, |ctx| self.lower_body(body, ctx))?;
            let loop_body = IrNode::seq(vec![store(iptr, ix.clone())?, body_ir]);

            Ok(IrNode::op(
                Op::Repeat,
                vec![ix, start, rounds, IrNode::int(rounds_bound), loop_body],
            )
            .with_error_msg("range() bounds check"))
        })
    }

    fn lower_for_list(
        &self,
        target: &str,
        target_type: &Type,
        iter: &Expr,
        body: &[Stmt],
        ctx: &mut Context,
    ) -> Result<IrNode> {
        let iter_list = ctx.range_scope(|ctx| self.exprs.lower(iter, ctx))?;
        let list_typ = iter_list
            .typ
            .clone()
            .ok_or_else(|| LowerError::invariant("loop iterable has no type"))?;
        let (capacity, dynamic) = match (&list_typ, list_typ.value_type()) {
            (Type::SArray(_, n), Some(elem)) | (Type::DArray(_, n), Some(elem)) if elem == target_type => {
                (*n, matches!(list_typ, Type::DArray(..)))
            }
            _ => {
                return Err(LowerError::invariant(format!(
                    "cannot iterate over {} with a {} loop variable",
                    list_typ, target_type
                )));
            }
        };

        let loop_var = ctx.new_variable(target, target_type.clone())?;
        let ix = IrNode::symbol(ctx.fresh_varname("for_list_ix")).typed(Type::uint256());
        let mut ret = Vec::with_capacity(2);

        // literals are forced into memory so elements can be addressed
        let iter_list = if iter_list.is_pointer() {
            iter_list
        } else {
            let tmp = ctx.new_internal_variable(list_typ.clone());
            ret.push(make_setter(tmp.clone(), iter_list, ctx)?);
            tmp
        };

        let looped = iter_list.cache_when_complex("list_iter", ctx, |ctx, list| {
            let elem = element_ptr(list.clone(), ix.clone(), false, ctx)?;
            let set_var = make_setter(loop_var, elem, ctx)?;
            let body_ir = ctx.with_forvar(target, |ctx| self.lower_body(body, ctx))?;
            let rounds = if dynamic {
                dyn_array_count(list)?
            } else {
                IrNode::int(capacity)
            };
            Ok(IrNode::op(
                Op::Repeat,
                vec![
                    ix,
                    IrNode::int(0),
                    rounds,
                    IrNode::int(capacity),
                    IrNode::seq(vec![set_var, body_ir]),
                ],
            ))
        })?;
        ret.push(looped);
        Ok(IrNode::seq(ret))
    }
}

/// The literal `bound=` keyword of a `range()` call, if any.
fn range_bound(keywords: &[Keyword]) -> Result<Option<BigInt>> {
    let mut bound = None;
    for kw in keywords {
        if kw.arg != "bound" {
            return Err(LowerError::invariant(format!(
                "unexpected keyword `{}` to range()",
                kw.arg
            )));
        }
        let value = kw
            .value
            .literal_int()
            .ok_or_else(|| LowerError::invariant("range() bound must be a literal integer"))?;
        bound = Some(value.clone());
    }
    Ok(bound)
}
