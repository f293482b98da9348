use super::{lowerer, mutable_ctx, u256};
use crate::{LoweringConfig, StmtLowerer};
use pretty_assertions::assert_eq;
use stmtir_core::ast::{StmtKind, DEBUGGER_SENTINEL};
use stmtir_core::{
    Expr, FaultKind, FunctionEffects, Op, SourceSpan, Stmt, StmtTag, Type,
};

fn bare_name(id: &str) -> Stmt {
    Stmt::new(StmtKind::Name { id: id.to_string() })
}

#[test]
fn test_trivial_statements() {
    let mut ctx = mutable_ctx();
    let lowerer = lowerer();

    let pass = lowerer.lower_stmt(&Stmt::pass(), &mut ctx).unwrap();
    assert_eq!(pass.to_string(), "pass");

    let brk = lowerer.lower_stmt(&Stmt::new(StmtKind::Break), &mut ctx).unwrap();
    assert_eq!(brk.to_string(), "break");

    let cont = lowerer.lower_stmt(&Stmt::new(StmtKind::Continue), &mut ctx).unwrap();
    assert_eq!(cont.to_string(), "continue");
}

#[test]
fn test_debugger_name_and_other_bare_names() {
    let mut ctx = mutable_ctx();
    let lowerer = lowerer();

    let dbg = lowerer.lower_stmt(&bare_name(DEBUGGER_SENTINEL), &mut ctx).unwrap();
    assert!(dbg.is_op(Op::Debugger));

    let err = lowerer.lower_stmt(&bare_name("foo"), &mut ctx).unwrap_err();
    assert_eq!(err.kind(), FaultKind::UnsupportedConstruct);
    assert!(err.to_string().contains("Unsupported statement type"));
    assert_eq!(err.fault().trail[0].kind, StmtTag::Name);
}

#[test]
fn test_value_producing_call_is_popped() {
    let mut ctx = mutable_ctx();
    let lowerer = lowerer();

    let call = Expr::internal_call("bump", vec![], FunctionEffects::default(), Some(u256()));
    let ir = lowerer.lower_stmt(&Stmt::expr(call), &mut ctx).unwrap();
    assert_eq!(ir.to_string(), "(pop (invoke bump))");
    assert_eq!(ir.valency(), 0);

    let void_call = Expr::internal_call("touch", vec![], FunctionEffects::default(), None);
    let ir = lowerer.lower_stmt(&Stmt::expr(void_call), &mut ctx).unwrap();
    assert_eq!(ir.to_string(), "(invoke touch)");
}

#[test]
fn test_source_annotation_follows_config() {
    let stmt = Stmt::raise(None)
        .with_source("raise")
        .at(SourceSpan::new(0, 4, 5));

    let mut ctx = mutable_ctx();
    let annotated = StmtLowerer::default().lower_stmt(&stmt, &mut ctx).unwrap();
    assert_eq!(annotated.annotation.as_deref(), Some("raise"));
    assert_eq!(annotated.source, Some(SourceSpan::new(0, 4, 5)));

    let plain = StmtLowerer::new(LoweringConfig::minimal())
        .lower_stmt(&stmt, &mut ctx)
        .unwrap();
    assert_eq!(plain.annotation, None);
    assert_eq!(plain.source, Some(SourceSpan::new(0, 4, 5)));
}

#[test]
fn test_scratch_memory_released_after_failure() {
    let mut ctx = mutable_ctx();
    let lowerer = lowerer();
    let before = ctx.memory().in_use();

    // the literal is materialised before the target turns out to be unknown
    let stmt = Stmt::assign(Expr::name("missing", Type::String(5)), Expr::string("hello"))
        .with_source("missing = \"hello\"");
    let err = lowerer.lower_stmt(&stmt, &mut ctx).unwrap_err();

    assert!(err.is_internal());
    assert_eq!(ctx.memory().in_use(), before);
    let trail = &err.fault().trail;
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].kind, StmtTag::Assign);
    assert_eq!(trail[0].source_text.as_deref(), Some("missing = \"hello\""));
}

#[test]
fn test_fault_trail_lists_enclosing_statements() {
    let mut ctx = mutable_ctx();
    let lowerer = lowerer();

    let inner = Stmt::expr(Expr::name("nope", u256()));
    let stmt = Stmt::if_else(Expr::boolean(true), vec![Stmt::pass(), inner], vec![]);
    let err = lowerer.lower_stmt(&stmt, &mut ctx).unwrap_err();

    let kinds: Vec<_> = err.fault().trail.iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![StmtTag::Expr, StmtTag::If]);
}

#[test]
fn test_if_else_shape() {
    let mut ctx = mutable_ctx();
    ctx.new_variable("flag", Type::Bool).unwrap();
    let lowerer = lowerer();

    let stmt = Stmt::if_else(
        Expr::name("flag", Type::Bool),
        vec![Stmt::pass()],
        vec![Stmt::raise(None)],
    );
    let ir = lowerer.lower_stmt(&stmt, &mut ctx).unwrap();
    assert_eq!(ir.to_string(), "(if (mload 64) (seq pass pass) (seq (revert 0 0) pass))");
    assert_eq!(ir.valency(), 0);
}

#[test]
fn test_branch_locals_do_not_leak() {
    let mut ctx = mutable_ctx();
    let lowerer = lowerer();

    let stmt = Stmt::if_else(
        Expr::boolean(true),
        vec![Stmt::declare("tmp", u256(), Expr::uint(1))],
        vec![Stmt::declare("tmp", u256(), Expr::uint(2))],
    );
    let ir = lowerer.lower_stmt(&stmt, &mut ctx).unwrap();
    assert_eq!(ir.to_string(), "(if 1 (seq (mstore 64 1) pass) (seq (mstore 64 2) pass))");
    assert!(ctx.lookup("tmp").is_none());
    assert_eq!(ctx.memory().in_use(), 0);
}

#[test]
fn test_non_bool_condition_rejected() {
    let mut ctx = mutable_ctx();
    let stmt = Stmt::if_else(Expr::uint(1), vec![Stmt::pass()], vec![]);
    let err = lowerer().lower_stmt(&stmt, &mut ctx).unwrap_err();
    assert!(err.is_internal());
}
