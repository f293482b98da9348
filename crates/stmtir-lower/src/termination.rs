//! Statement lists and function bodies.

use crate::stmt::StmtLowerer;
use stmtir_core::{Context, IrNode, LowerError, Result, Stmt, StmtKind};
use tracing::debug;

/// Does every path through `body` leave the function? Only the last
/// statement matters: a terminus, or an `if`/`else` whose branches both
/// terminate.
pub fn is_terminated(body: &[Stmt]) -> bool {
    match body.last() {
        None => false,
        Some(stmt) if stmt.is_terminus => true,
        Some(Stmt {
            kind: StmtKind::If { body, orelse, .. },
            ..
        }) => !orelse.is_empty() && is_terminated(body) && is_terminated(orelse),
        Some(_) => false,
    }
}

impl StmtLowerer {
    /// `(seq s1 ... sn pass)`; the trailing `pass` keeps the block
    /// zerovalent whatever its last statement is.
    pub fn lower_body(&self, body: &[Stmt], ctx: &mut Context) -> Result<IrNode> {
        self.lower_block(body, ctx, false)
    }

    /// Like `lower_body`, for the top level of a function. When
    /// `ensure_terminated` is configured, a function without a return type
    /// that can fall off its end gets an implicit `return`.
    pub fn lower_function_body(&self, body: &[Stmt], ctx: &mut Context) -> Result<IrNode> {
        self.lower_block(body, ctx, self.config.ensure_terminated)
    }

    fn lower_block(&self, body: &[Stmt], ctx: &mut Context, ensure_terminated: bool) -> Result<IrNode> {
        let mut lowered = Vec::with_capacity(body.len() + 2);
        for stmt in body {
            lowered.push(self.lower_stmt(stmt, ctx)?);
        }

        if ensure_terminated && !is_terminated(body) {
            if let Some(typ) = ctx.return_type() {
                return Err(LowerError::invariant(format!(
                    "`{}` can reach the end of its body without returning {}",
                    ctx.sig().name,
                    typ
                )));
            }
            debug!(function = %ctx.sig().name, "appending implicit return");
            lowered.push(self.lower_stmt(&Stmt::ret(None), ctx)?);
        }

        lowered.push(IrNode::pass());
        Ok(IrNode::seq(lowered))
    }
}
