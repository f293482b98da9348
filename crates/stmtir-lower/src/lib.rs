/*! Lower type-checked statements into IR.
 *
 * Each statement kind maps to a small IR fragment: assignments become location-aware copies,
 * `for` loops become `repeat` with a compile-time round bound, and `assert`/`raise` with a reason
 * become an `Error(string)` revert. The lowering refuses to emit IR whose safety depends on
 * properties it cannot establish statically, such as an aliasing-free augmented assignment or a
 * function body that returns on every path.
 */

pub mod abi;
pub mod assign;
pub mod config;
pub mod control_flow;
pub mod events;
pub mod expr;
pub mod loops;
pub mod returns;
pub mod revert;
pub mod stmt;
pub mod termination;

pub use abi::{wrap_value_for_external_return, AbiEncoding, BasicAbiEncoder};
pub use config::LoweringConfig;
pub use events::{BasicEventLowerer, EventLowering};
pub use expr::{BasicExprLowerer, ExprLowering};
pub use returns::{AbiReturnLowerer, ReturnLowering};
pub use stmt::StmtLowerer;
pub use termination::is_terminated;

use serde::Serialize;
use stmtir_core::{Context, FunctionDef, IrNode, ModuleDef, Result, StateVariable};
use tracing::info_span;

/// IR for one function body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoweredFunction {
    pub name: String,
    pub body: IrNode,
    /// Highest memory offset the function's variables reach.
    pub frame_size: usize,
}

pub fn lower_function(def: &FunctionDef, state_vars: &[StateVariable], lowerer: &StmtLowerer) -> Result<LoweredFunction> {
    let _span = info_span!("lower_function", name = %def.name).entered();

    let mut ctx = Context::for_function(def, state_vars)?;
    let body = lowerer.lower_function_body(&def.body, &mut ctx)?;
    Ok(LoweredFunction {
        name: def.name.clone(),
        body,
        frame_size: ctx.memory().high_water(),
    })
}

/// Lower every function of `module`, stopping at the first failure.
pub fn lower_module(module: &ModuleDef, lowerer: &StmtLowerer) -> Result<Vec<LoweredFunction>> {
    module
        .functions
        .iter()
        .map(|def| lower_function(def, &module.state_vars, lowerer))
        .collect()
}

#[cfg(test)]
mod tests;
