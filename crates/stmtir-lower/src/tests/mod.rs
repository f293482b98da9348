/*! Statement-by-statement lowering checks.
 *
 * Most tests compare the rendered IR of a single statement against the expected s-expression;
 * the rest check which fault a rejected statement produces and that scratch memory is handed
 * back afterwards.
 */

mod stmt_tests;

use crate::{LoweringConfig, StmtLowerer};
use stmtir_core::{Context, FunctionKind, FunctionSignature, Mutability, StateVariable, Type};

pub(crate) fn lowerer() -> StmtLowerer {
    StmtLowerer::new(LoweringConfig::minimal())
}

pub(crate) fn ctx_with(mutability: Mutability, state_vars: Vec<StateVariable>) -> Context {
    Context::new(FunctionSignature::new("f", FunctionKind::External, mutability), state_vars)
}

pub(crate) fn mutable_ctx() -> Context {
    ctx_with(Mutability::Nonpayable, Vec::new())
}

pub(crate) fn u256() -> Type {
    Type::uint256()
}
