/*! Turn lowered IR back into readable text.
 *
 * The IR is an s-expression tree, so the text form is too: block operators (`seq`, `if`, `with`,
 * `repeat`) open a new indentation level and everything else prints on one line. Statement
 * annotations become `;;` comment lines and resolved types can be shown as `<type>` suffixes,
 * both of which the parser skips when reading the text back.
 */

pub mod config;
pub mod emitter;
pub mod ir_emitter;
pub mod output;

pub use config::{EmitterConfig, IndentStyle, VerbosityLevel};
pub use emitter::{EmitContext, EmitHelper, EmitResult, Emitter};
pub use ir_emitter::IrEmitter;
pub use output::OutputFormat;
