use crate::abi::{AbiEncoding, BasicAbiEncoder};
use crate::config::LoweringConfig;
use crate::events::{BasicEventLowerer, EventLowering};
use crate::expr::{BasicExprLowerer, ExprLowering};
use crate::returns::{AbiReturnLowerer, ReturnLowering};
use stmtir_core::ast::{Keyword, DEBUGGER_SENTINEL};
use stmtir_core::{Context, EventDef, Expr, IrNode, LowerError, Op, Result, StatementNote, Stmt, StmtKind};
use tracing::{debug, debug_span};

/// Lowers statements of one function body into IR.
///
/// Expression lowering, ABI encoding, return sequences and event emission are
/// collaborators behind traits; the defaults cover everything a type-checked
/// body can contain.
pub struct StmtLowerer {
    pub(crate) exprs: Box<dyn ExprLowering>,
    pub(crate) abi: Box<dyn AbiEncoding>,
    pub(crate) returns: Box<dyn ReturnLowering>,
    pub(crate) events: Box<dyn EventLowering>,
    pub(crate) config: LoweringConfig,
}

impl StmtLowerer {
    pub fn new(config: LoweringConfig) -> Self {
        Self {
            exprs: Box::new(BasicExprLowerer::new(config.array_bounds_check)),
            abi: Box::new(BasicAbiEncoder),
            returns: Box::new(AbiReturnLowerer),
            events: Box::new(BasicEventLowerer),
            config,
        }
    }

    pub fn with_exprs(mut self, exprs: Box<dyn ExprLowering>) -> Self {
        self.exprs = exprs;
        self
    }

    pub fn with_abi(mut self, abi: Box<dyn AbiEncoding>) -> Self {
        self.abi = abi;
        self
    }

    pub fn with_returns(mut self, returns: Box<dyn ReturnLowering>) -> Self {
        self.returns = returns;
        self
    }

    pub fn with_events(mut self, events: Box<dyn EventLowering>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &LoweringConfig {
        &self.config
    }

    /// Lower a single statement. Scratch memory requested while lowering it
    /// is released before returning, on success and on failure alike.
    pub fn lower_stmt(&self, stmt: &Stmt, ctx: &mut Context) -> Result<IrNode> {
        let tag = stmt.tag();
        let span = debug_span!("lower_stmt", kind = %tag);
        let _enter = span.enter();

        let mut node = ctx
            .internal_memory_scope(|ctx| self.dispatch(stmt, ctx))
            .map_err(|err| {
                debug!(error = %err, "statement failed to lower");
                err.annotate(StatementNote {
                    kind: tag,
                    source_text: stmt.source_text.clone(),
                    span: stmt.span,
                })
            })?;

        if self.config.annotate_source {
            if let Some(text) = &stmt.source_text {
                node.annotation = Some(text.clone());
            }
        }
        if stmt.span.is_valid() {
            node.source = Some(stmt.span);
        }
        Ok(node)
    }

    fn dispatch(&self, stmt: &Stmt, ctx: &mut Context) -> Result<IrNode> {
        match &stmt.kind {
            StmtKind::Expr { value } => self.lower_expr_stmt(value, ctx),
            StmtKind::Pass => Ok(IrNode::pass()),
            StmtKind::Name { id } => self.lower_bare_name(id),
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => self.lower_ann_assign(target, annotation, value, ctx),
            StmtKind::Assign { target, value } => self.lower_assign(target, value, ctx),
            StmtKind::If { test, body, orelse } => self.lower_if(test, body, orelse, ctx),
            StmtKind::Log {
                event,
                args,
                keywords,
            } => self.lower_log_stmt(event, args, keywords, ctx),
            StmtKind::Assert { test, msg } => self.lower_assert(test, msg.as_ref(), ctx),
            StmtKind::Raise { exc } => self.lower_raise(exc.as_ref(), ctx),
            StmtKind::For {
                target,
                target_type,
                iter,
                body,
            } => self.lower_for(target, target_type, iter, body, ctx),
            StmtKind::AugAssign { target, op, value } => self.lower_aug_assign(target, *op, value, ctx),
            StmtKind::Continue => Ok(IrNode::op(Op::Continue, Vec::new())),
            StmtKind::Break => Ok(IrNode::op(Op::Break, Vec::new())),
            StmtKind::Return { value } => self.lower_return_stmt(value.as_ref(), ctx),
        }
    }

    fn lower_expr_stmt(&self, value: &Expr, ctx: &mut Context) -> Result<IrNode> {
        let node = self.exprs.lower(value, ctx)?;
        if node.valency() > 0 {
            Ok(IrNode::op(Op::Pop, vec![node]))
        } else {
            Ok(node)
        }
    }

    fn lower_bare_name(&self, id: &str) -> Result<IrNode> {
        if id == DEBUGGER_SENTINEL {
            return Ok(IrNode::op(Op::Debugger, Vec::new()));
        }
        Err(LowerError::unsupported(format!(
            "Unsupported statement type: bare name `{}`",
            id
        )))
    }

    fn lower_log_stmt(&self, event: &EventDef, args: &[Expr], keywords: &[Keyword], ctx: &mut Context) -> Result<IrNode> {
        let values: Vec<&Expr> = if keywords.is_empty() {
            args.iter().collect()
        } else {
            event
                .args
                .iter()
                .map(|arg| {
                    keywords
                        .iter()
                        .find(|kw| kw.arg == arg.name)
                        .map(|kw| &kw.value)
                        .ok_or_else(|| {
                            LowerError::invariant(format!("log {}: missing argument `{}`", event.name, arg.name))
                        })
                })
                .collect::<Result<_>>()?
        };
        if values.len() != event.args.len() {
            return Err(LowerError::invariant(format!(
                "event `{}` takes {} arguments, got {}",
                event.name,
                event.args.len(),
                values.len()
            )));
        }

        let mut topics = Vec::new();
        let mut data = Vec::new();
        for (value, arg) in values.into_iter().zip(&event.args) {
            let node = self.exprs.lower(value, ctx)?;
            if arg.indexed {
                topics.push(node);
            } else {
                data.push(node);
            }
        }
        self.events.lower_log(event, topics, data, ctx, self.abi.as_ref())
    }
}

impl Default for StmtLowerer {
    fn default() -> Self {
        Self::new(LoweringConfig::default())
    }
}
