/*! Statement lowering, end to end.
 *
 * One import for the whole pipeline: the typed AST and IR model, the statement lowerer, and the
 * text emitter and parser for the IR it produces.
 */

pub use stmtir_core as core;
pub use stmtir_emit as emit;
pub use stmtir_lower as lower;
pub use stmtir_parser as parser;

pub use stmtir_core::{
    Context, Expr, FunctionDef, IrNode, LowerError, ModuleDef, Op, StateVariable, Stmt, Type,
};

pub use stmtir_emit::{EmitterConfig, IrEmitter};

pub use stmtir_lower::{lower_function, lower_module, LoweredFunction, LoweringConfig, StmtLowerer};

pub use stmtir_parser::parse_ir;
