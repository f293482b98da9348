/*! Core data model for statement lowering.
 *
 * The lowering stage reads a type-checked statement tree and produces an IR tree for an EVM-class
 * assembler that performs no runtime memory protection of its own. This crate holds the pieces
 * every lowering pass shares: the IR node and its opcode vocabulary, semantic types, the typed
 * statement AST, the per-function `Context` with its scopes and memory allocator, and the
 * location-aware builders that copy values between memory, storage and calldata.
 */

pub mod ast;
pub mod builder;
pub mod context;
pub mod errors;
pub mod ir;
pub mod memory;
pub mod source_location;
pub mod types;
pub mod utils;

pub use ast::{
    BinOp, Callee, CmpOp, EventDef, Expr, ExprKind, FunctionDef, FunctionKind, ModuleDef,
    Mutability, StateVariable, Stmt, StmtKind, StmtTag,
};
pub use context::{Constancy, Context, FunctionSignature, VariableRecord};
pub use errors::{Fault, FaultKind, LowerError, Result, StatementNote};
pub use ir::{AddrSpace, Effects, FunctionEffects, IrNode, IrValue, Op, VarRef, VarScope};
pub use source_location::SourceSpan;
pub use types::Type;

#[cfg(test)]
mod tests;
