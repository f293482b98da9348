//! Declarations, assignments and augmented assignments.

use crate::stmt::StmtLowerer;
use stmtir_core::builder::{load, make_setter, potential_overlap, store};
use stmtir_core::{AddrSpace, BinOp, Context, Expr, ExprKind, IrNode, LowerError, Result, Type};
use tracing::debug;

impl StmtLowerer {
    pub(crate) fn lower_ann_assign(&self, target: &str, annotation: &Type, value: &Expr, ctx: &mut Context) -> Result<IrNode> {
        let src = self.exprs.lower(value, ctx)?;
        let dst = ctx.new_variable(target, annotation.clone())?;
        self.copy_with_staging(dst, src, ctx)
    }

    pub(crate) fn lower_assign(&self, target: &Expr, value: &Expr, ctx: &mut Context) -> Result<IrNode> {
        let src = self.exprs.lower(value, ctx)?;
        let dst = self.lower_target(target, ctx)?;
        self.copy_with_staging(dst, src, ctx)
    }

    /// `dst = src`, going through a scratch buffer when writing `dst` could
    /// clobber `src` before the copy finishes.
    fn copy_with_staging(&self, dst: IrNode, src: IrNode, ctx: &mut Context) -> Result<IrNode> {
        if !potential_overlap(&dst, &src) {
            return make_setter(dst, src, ctx);
        }

        let typ = src
            .typ
            .clone()
            .ok_or_else(|| LowerError::invariant(format!("`{}` has no type", src)))?;
        debug!(typ = %typ, "staging assignment through a temporary");
        let tmp = ctx.new_internal_variable(typ);
        let stage = make_setter(tmp.clone(), src, ctx)?;
        let copy = make_setter(dst, tmp, ctx)?;
        Ok(IrNode::seq(vec![stage, copy]))
    }

    pub(crate) fn lower_aug_assign(&self, target: &Expr, op: BinOp, value: &Expr, ctx: &mut Context) -> Result<IrNode> {
        let target_ir = self.lower_target(target, ctx)?;
        let right = self.exprs.lower_value(value, ctx)?;

        let typ = match &target_ir.typ {
            Some(t) if t.is_prim_word() => t.clone(),
            Some(t) => {
                return Err(LowerError::invariant(format!(
                    "augmented assignment to {} target",
                    t
                )));
            }
            None => return Err(LowerError::invariant("augmented assignment target has no type")),
        };

        let rhs_writes = right.variable_writes();
        let rhs_calls_out = right.contains_writeable_call();
        for var in target_ir.referenced_variables().iter() {
            if rhs_writes.contains(var) || (rhs_calls_out && var.is_state_variable()) {
                return Err(LowerError::invariant(format!(
                    "right-hand side of augmented assignment may modify `{}`",
                    var.name
                )));
            }
        }

        target_ir.cache_when_complex("_loc", ctx, |ctx, target| {
            let left = load(target.clone())?;
            let new_value = self.exprs.binop(op, left, right, &typ, ctx)?;
            store(target, new_value)
        })
    }

    /// Lower an assignment target to a writable location (or a `multi` of
    /// them for tuple targets).
    pub(crate) fn lower_target(&self, target: &Expr, ctx: &mut Context) -> Result<IrNode> {
        if let ExprKind::Name { id } = &target.kind {
            if ctx.is_forvar(id) {
                return Err(constancy_fault(target));
            }
        }

        if let ExprKind::Tuple { elts } = &target.kind {
            let items = elts
                .iter()
                .map(|elt| self.lower_target(elt, ctx))
                .collect::<Result<Vec<_>>>()?;
            return Ok(IrNode::multi(items, target.resolved_type()?.clone()));
        }

        let ptr = self.exprs.lower_pointer(target, ctx)?;
        if !self.is_writeable(target, &ptr, ctx) {
            return Err(constancy_fault(target));
        }
        Ok(ptr)
    }

    fn is_writeable(&self, target: &Expr, ptr: &IrNode, ctx: &Context) -> bool {
        match ptr.location {
            Some(AddrSpace::Calldata) | None => return false,
            Some(AddrSpace::Storage) if ctx.is_constant() => return false,
            _ => {}
        }

        match &root_of(target).kind {
            ExprKind::Name { id } => ctx.lookup(id).is_some_and(|record| record.mutable),
            ExprKind::StateVar { id } => ctx
                .state_var(id)
                .is_some_and(|var| !var.is_constant && (!var.is_immutable || ctx.is_ctor_context())),
            _ => true,
        }
    }
}

/// The variable an access path like `a.b[i].c` starts from.
fn root_of(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Subscript { value, .. } | ExprKind::Attribute { value, .. } => root_of(value),
        _ => expr,
    }
}

fn constancy_fault(target: &Expr) -> LowerError {
    let name = match &root_of(target).kind {
        ExprKind::Name { id } => id.clone(),
        ExprKind::StateVar { id } => format!("self.{}", id),
        _ => "expression".to_string(),
    };
    LowerError::invariant(format!("Failed constancy check: cannot write to `{}`", name)).with_span(target.span)
}
