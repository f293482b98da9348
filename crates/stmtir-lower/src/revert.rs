//! `assert` and `raise`.
//!
//! A reason string is encoded as `Error(string)`: the four selector bytes
//! followed by the ABI encoding of the one-element tuple `(reason,)`.

use crate::abi::wrap_value_for_external_return;
use crate::stmt::StmtLowerer;
use stmtir_core::builder::{add_ofst, store};
use stmtir_core::utils::{method_id_int, WORD_SIZE};
use stmtir_core::{Constancy, Context, Expr, IrNode, LowerError, Op, Result, Type};

const ERROR_SIGNATURE: &str = "Error(string)";

impl StmtLowerer {
    pub(crate) fn lower_assert(&self, test: &Expr, msg: Option<&Expr>, ctx: &mut Context) -> Result<IrNode> {
        let test_ir = self.exprs.lower_value(test, ctx)?;
        match msg {
            Some(msg) => self.assert_reason(Some(test_ir), msg, ctx),
            None => Ok(IrNode::op(Op::Assert, vec![test_ir]).with_error_msg("user assert")),
        }
    }

    pub(crate) fn lower_raise(&self, exc: Option<&Expr>, ctx: &mut Context) -> Result<IrNode> {
        match exc {
            Some(msg) => self.assert_reason(None, msg, ctx),
            None => Ok(IrNode::op(Op::Revert, vec![IrNode::int(0), IrNode::int(0)]).with_error_msg("user raise")),
        }
    }

    /// Revert with `msg` as reason, unconditionally (`test` is `None`) or
    /// when `test` is false.
    fn assert_reason(&self, test: Option<IrNode>, msg: &Expr, ctx: &mut Context) -> Result<IrNode> {
        if msg.is_unreachable_sentinel() {
            return Ok(match test {
                Some(test) => IrNode::op(Op::AssertUnreachable, vec![test]).with_error_msg("assert unreachable"),
                None => IrNode::op(Op::Invalid, Vec::new()).with_error_msg("raise unreachable"),
            });
        }

        // reasons are lowered as constant expressions
        let reason = ctx.with_constancy(Constancy::Constant, |ctx| self.exprs.lower(msg, ctx))?;
        match &reason.typ {
            Some(Type::String(_)) => {}
            other => {
                return Err(LowerError::invariant(format!(
                    "revert reason must be a string, got {}",
                    other.as_ref().map_or_else(|| "<none>".to_string(), Type::to_string)
                )));
            }
        }

        let reason = wrap_value_for_external_return(reason)?;
        let payload_size = reason.typ.as_ref().map_or(0, Type::abi_size_bound);
        let buf = ctx.new_internal_variable(Type::for_exact_size(WORD_SIZE + payload_size));
        let payload = add_ofst(buf.clone(), IrNode::int(WORD_SIZE));
        let encoded_len = self.abi.abi_encode(payload, reason, ctx, payload_size, true)?;

        let revert_seq = encoded_len.cache_when_complex("encoded_len", ctx, |_, len| {
            let selector = store(buf.clone(), IrNode::int(method_id_int(ERROR_SIGNATURE)))?;
            // the selector sits in the low four bytes of the first word
            let revert = IrNode::op(
                Op::Revert,
                vec![
                    add_ofst(buf, IrNode::int(WORD_SIZE - 4)),
                    IrNode::op(Op::Add, vec![IrNode::int(4), len]),
                ],
            );
            Ok(IrNode::seq(vec![selector, revert]))
        })?;

        Ok(match test {
            Some(test) => IrNode::op(Op::If, vec![IrNode::op(Op::Iszero, vec![test]), revert_seq]),
            None => revert_seq,
        }
        .with_error_msg("user revert with reason"))
    }
}
