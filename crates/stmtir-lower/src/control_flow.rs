use crate::stmt::StmtLowerer;
use stmtir_core::{Context, Expr, IrNode, LowerError, Op, Result, Stmt, Type};

impl StmtLowerer {
    pub(crate) fn lower_if(&self, test: &Expr, body: &[Stmt], orelse: &[Stmt], ctx: &mut Context) -> Result<IrNode> {
        let test_ir = self.exprs.lower_value(test, ctx)?;
        if test_ir.typ.as_ref() != Some(&Type::Bool) {
            return Err(LowerError::invariant(format!(
                "if condition has type {}",
                test_ir.typ.as_ref().map_or_else(|| "<none>".to_string(), Type::to_string)
            )));
        }

        let then_branch = ctx.block_scope(|ctx| self.lower_body(body, ctx))?;
        let mut args = vec![test_ir, then_branch];
        if !orelse.is_empty() {
            args.push(ctx.block_scope(|ctx| self.lower_body(orelse, ctx))?);
        }
        Ok(IrNode::op(Op::If, args))
    }

    pub(crate) fn lower_return_stmt(&self, value: Option<&Expr>, ctx: &mut Context) -> Result<IrNode> {
        let value_ir = value.map(|v| self.exprs.lower(v, ctx)).transpose()?;
        self.returns.lower_return(value_ir, ctx, self.abi.as_ref())
    }
}
