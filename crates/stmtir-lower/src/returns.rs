use crate::abi::{wrap_value_for_external_return, AbiEncoding};
use stmtir_core::builder::make_setter;
use stmtir_core::{AddrSpace, Context, IrNode, LowerError, Op, Result, Type};

/// Symbol internal callers pass the address of their return buffer in.
pub const RETURN_BUFFER: &str = "return_buffer";

pub trait ReturnLowering {
    /// IR for `return` / `return value`, ending in a jump to the function's
    /// exit sequence.
    fn lower_return(&self, value: Option<IrNode>, ctx: &mut Context, abi: &dyn AbiEncoding) -> Result<IrNode>;
}

/// Internal functions copy into the caller's buffer; external functions
/// ABI-encode and `return` directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiReturnLowerer;

pub fn exit_label(ctx: &Context) -> String {
    format!("{}_cleanup", ctx.sig().name)
}

impl ReturnLowering for AbiReturnLowerer {
    fn lower_return(&self, value: Option<IrNode>, ctx: &mut Context, abi: &dyn AbiEncoding) -> Result<IrNode> {
        let jump_to_exit = IrNode::op(Op::ExitTo, vec![IrNode::symbol(exit_label(ctx))]);

        let (value, return_type) = match (value, ctx.return_type().cloned()) {
            (None, None) => return Ok(jump_to_exit),
            (Some(value), Some(typ)) => (value, typ),
            (None, Some(typ)) => {
                return Err(LowerError::invariant(format!(
                    "bare return in `{}`, which returns {}",
                    ctx.sig().name,
                    typ
                )));
            }
            (Some(_), None) => {
                return Err(LowerError::invariant(format!(
                    "`{}` returns a value but declares no return type",
                    ctx.sig().name
                )));
            }
        };

        if ctx.is_internal() {
            let dst = IrNode::symbol(RETURN_BUFFER)
                .typed(return_type)
                .located(AddrSpace::Memory);
            return Ok(IrNode::seq(vec![make_setter(dst, value, ctx)?, jump_to_exit]));
        }

        let value = wrap_value_for_external_return(value)?;
        let bufsz = value.typ.as_ref().map_or(0, Type::abi_size_bound);
        let buf = ctx.new_internal_variable(Type::for_exact_size(bufsz.max(32)));
        let encoded_len = abi.abi_encode(buf.clone(), value, ctx, bufsz, true)?;

        encoded_len.cache_when_complex("ret_len", ctx, |_, len| {
            Ok(IrNode::op(Op::Return, vec![buf, len]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::BasicAbiEncoder;
    use stmtir_core::ast::{FunctionKind, Mutability};
    use stmtir_core::FunctionSignature;

    #[test]
    fn test_bare_return_jumps_to_cleanup() {
        let mut ctx = Context::new(
            FunctionSignature::new("foo", FunctionKind::External, Mutability::Nonpayable),
            Vec::new(),
        );
        let ir = AbiReturnLowerer.lower_return(None, &mut ctx, &BasicAbiEncoder).unwrap();
        assert_eq!(ir.to_string(), "(exit_to foo_cleanup)");
    }

    #[test]
    fn test_internal_return_copies_into_buffer() {
        let mut ctx = Context::new(
            FunctionSignature::new("bar", FunctionKind::Internal, Mutability::Nonpayable).returns(Type::uint256()),
            Vec::new(),
        );
        let value = IrNode::int(5).typed(Type::uint256());
        let ir = AbiReturnLowerer
            .lower_return(Some(value), &mut ctx, &BasicAbiEncoder)
            .unwrap();
        assert_eq!(ir.to_string(), "(seq (mstore return_buffer 5) (exit_to bar_cleanup))");
    }

    #[test]
    fn test_missing_value_is_a_fault() {
        let mut ctx = Context::new(
            FunctionSignature::new("baz", FunctionKind::External, Mutability::View).returns(Type::Bool),
            Vec::new(),
        );
        let err = AbiReturnLowerer.lower_return(None, &mut ctx, &BasicAbiEncoder).unwrap_err();
        assert!(err.is_internal());
    }
}
