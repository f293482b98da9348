//! ABI encoding into memory buffers, used by revert reasons, external
//! returns and event data.

use stmtir_core::builder::{add_ofst, dyn_array_count, element_ptr, load, make_setter, member_ptr, store};
use stmtir_core::utils::WORD_SIZE;
use stmtir_core::{AddrSpace, Context, IrNode, LowerError, Op, Result, Type};
use tracing::trace;

pub trait AbiEncoding {
    /// Encode `value` into memory at `dst`. With `returns_len` the produced
    /// IR leaves the encoded length on the stack.
    fn abi_encode(
        &self,
        dst: IrNode,
        value: IrNode,
        ctx: &mut Context,
        bufsz: usize,
        returns_len: bool,
    ) -> Result<IrNode>;
}

/// Single values travel through the ABI as one-element tuples.
pub fn wrap_value_for_external_return(value: IrNode) -> Result<IrNode> {
    let typ = value
        .typ
        .clone()
        .ok_or_else(|| LowerError::invariant(format!("`{}` has no type", value)))?;
    match typ {
        Type::Tuple(_) => Ok(value),
        other => Ok(IrNode::multi(vec![value], Type::Tuple(vec![other]))),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicAbiEncoder;

/// `(x + 31) / 32 * 32`
fn ceil32_ir(x: IrNode) -> IrNode {
    IrNode::op(
        Op::Mul,
        vec![
            IrNode::op(
                Op::Div,
                vec![IrNode::op(Op::Add, vec![x, IrNode::int(WORD_SIZE - 1)]), IrNode::int(WORD_SIZE)],
            ),
            IrNode::int(WORD_SIZE),
        ],
    )
}

fn finish(mut stmts: Vec<IrNode>, len: IrNode, returns_len: bool) -> IrNode {
    if returns_len {
        stmts.push(len.typed(Type::uint256()));
    }
    IrNode::seq(stmts)
}

impl BasicAbiEncoder {
    fn encode(&self, dst: IrNode, value: IrNode, ctx: &mut Context, returns_len: bool) -> Result<IrNode> {
        let typ = value
            .typ
            .clone()
            .ok_or_else(|| LowerError::invariant(format!("cannot encode untyped `{}`", value)))?;
        trace!(typ = %typ, "abi encode");

        if typ.is_prim_word() {
            let word = if value.is_pointer() { load(value)? } else { value };
            let stmt = store(dst.typed(typ), word)?;
            return Ok(finish(vec![stmt], IrNode::int(WORD_SIZE), returns_len));
        }

        if typ.is_bytestring() {
            return self.encode_bytestring(dst, value, typ, ctx, returns_len);
        }

        if let Type::DArray(..) = typ {
            return self.encode_dyn_array(dst, value, typ, ctx, returns_len);
        }

        if value.is_op(Op::Multi) {
            let children = multi_children(&value, &typ)?;
            return self.encode_members(dst, children, &typ, ctx, returns_len);
        }

        if !value.is_pointer() {
            return Err(LowerError::invariant(format!("cannot encode `{}`", value)));
        }
        value.cache_when_complex("src", ctx, |ctx, src| {
            let children = pointer_children(src, &typ, ctx)?;
            self.encode_members(dst, children, &typ, ctx, returns_len)
        })
    }

    fn encode_bytestring(
        &self,
        dst: IrNode,
        value: IrNode,
        typ: Type,
        ctx: &mut Context,
        returns_len: bool,
    ) -> Result<IrNode> {
        if !value.is_pointer() {
            return Err(LowerError::invariant(format!("{} value is not addressable", typ)));
        }
        value.cache_when_complex("src", ctx, |ctx, src| {
            let len = dyn_array_count(src.clone())?;
            // the last data word is zeroed first so the copy leaves clean padding
            let pad = store(
                add_ofst(dst.clone(), ceil32_ir(len.clone())).typed(Type::uint256()),
                IrNode::int(0),
            )?;
            let copy = make_setter(dst.typed(typ), src, ctx)?;
            let encoded_len = IrNode::op(Op::Add, vec![IrNode::int(WORD_SIZE), ceil32_ir(len)]);
            Ok(finish(vec![pad, copy], encoded_len, returns_len))
        })
    }

    fn encode_dyn_array(
        &self,
        dst: IrNode,
        value: IrNode,
        typ: Type,
        ctx: &mut Context,
        returns_len: bool,
    ) -> Result<IrNode> {
        let (elem, capacity) = match &typ {
            Type::DArray(elem, n) => ((**elem).clone(), *n),
            _ => return Err(LowerError::invariant(format!("{} is not a dynamic array", typ))),
        };
        if elem.abi_is_dynamic() {
            return Err(LowerError::unsupported(format!("ABI encoding of {}", typ)));
        }
        if !value.is_pointer() {
            return Err(LowerError::invariant(format!("{} value is not addressable", typ)));
        }

        let elem_size = elem.abi_static_size();
        value.cache_when_complex("src", ctx, |ctx, src| {
            let ix_name = ctx.fresh_varname("abi_ix");
            let ix = IrNode::symbol(ix_name.clone()).typed(Type::uint256());
            let count = dyn_array_count(src.clone())?;

            let elem_dst = add_ofst(
                dst.clone(),
                IrNode::op(
                    Op::Add,
                    vec![
                        IrNode::int(WORD_SIZE),
                        IrNode::op(Op::Mul, vec![ix.clone(), IrNode::int(elem_size)]),
                    ],
                ),
            );
            let elem_src = element_ptr(src, ix.clone(), false, ctx)?;
            let body = self.encode(elem_dst, elem_src, ctx, false)?;

            let stmts = vec![
                store(dst.typed(Type::uint256()), count.clone())?,
                IrNode::op(Op::Repeat, vec![ix, IrNode::int(0), count.clone(), IrNode::int(capacity), body]),
            ];
            let encoded_len = IrNode::op(
                Op::Add,
                vec![IrNode::int(WORD_SIZE), IrNode::op(Op::Mul, vec![count, IrNode::int(elem_size)])],
            );
            Ok(finish(stmts, encoded_len, returns_len))
        })
    }

    /// Head/tail encoding of a tuple-like value.
    fn encode_members(
        &self,
        dst: IrNode,
        children: Vec<IrNode>,
        typ: &Type,
        ctx: &mut Context,
        returns_len: bool,
    ) -> Result<IrNode> {
        let head_size = typ.abi_static_size();

        if !typ.abi_is_dynamic() {
            let mut stmts = Vec::with_capacity(children.len());
            let mut ofst = 0;
            for child in children {
                let size = child.typ.as_ref().map_or(WORD_SIZE, Type::abi_embedded_static_size);
                stmts.push(self.encode(add_ofst(dst.clone(), IrNode::int(ofst)), child, ctx, false)?);
                ofst += size;
            }
            return Ok(finish(stmts, IrNode::int(head_size), returns_len));
        }

        let dyn_name = ctx.fresh_varname("dyn_ofst");
        let dyn_ofst = IrNode::symbol(dyn_name.clone()).typed(Type::uint256());
        let mut stmts = Vec::with_capacity(children.len() * 2 + 1);
        let mut head_ofst = 0;

        for child in children {
            let child_typ = child
                .typ
                .clone()
                .ok_or_else(|| LowerError::invariant(format!("`{}` has no type", child)))?;
            let head = add_ofst(dst.clone(), IrNode::int(head_ofst));

            if child_typ.abi_is_dynamic() {
                stmts.push(store(head.typed(Type::uint256()), dyn_ofst.clone())?);
                let tail = add_ofst(dst.clone(), dyn_ofst.clone());
                let child_len = self.encode(tail, child, ctx, true)?;
                stmts.push(IrNode::op(
                    Op::Set,
                    vec![
                        dyn_ofst.clone(),
                        IrNode::op(Op::Add, vec![dyn_ofst.clone(), child_len]),
                    ],
                ));
            } else {
                stmts.push(self.encode(head, child, ctx, false)?);
            }
            head_ofst += child_typ.abi_embedded_static_size();
        }

        let body = finish(stmts, dyn_ofst, returns_len);
        Ok(IrNode::with_binding(&dyn_name, IrNode::int(head_size), body))
    }
}

fn member_types(typ: &Type) -> Result<Vec<Type>> {
    match typ {
        Type::SArray(elem, n) => Ok(vec![(**elem).clone(); *n]),
        t => t
            .tuple_members()
            .map(|members| members.into_iter().cloned().collect())
            .ok_or_else(|| LowerError::unsupported(format!("ABI encoding of {}", t))),
    }
}

fn multi_children(value: &IrNode, typ: &Type) -> Result<Vec<IrNode>> {
    let types = member_types(typ)?;
    if types.len() != value.args.len() {
        return Err(LowerError::invariant(format!(
            "{} has {} members, got {} values",
            typ,
            types.len(),
            value.args.len()
        )));
    }
    Ok(value
        .args
        .iter()
        .zip(types)
        .map(|(arg, t)| {
            let mut arg = arg.clone();
            if arg.typ.is_none() {
                arg.typ = Some(t);
            }
            arg
        })
        .collect())
}

fn pointer_children(src: IrNode, typ: &Type, ctx: &mut Context) -> Result<Vec<IrNode>> {
    match typ {
        Type::SArray(_, n) => (0..*n)
            .map(|i| element_ptr(src.clone(), IrNode::int(i), false, ctx))
            .collect(),
        _ => (0..member_types(typ)?.len())
            .map(|i| member_ptr(src.clone(), i))
            .collect(),
    }
}

impl AbiEncoding for BasicAbiEncoder {
    fn abi_encode(
        &self,
        dst: IrNode,
        value: IrNode,
        ctx: &mut Context,
        bufsz: usize,
        returns_len: bool,
    ) -> Result<IrNode> {
        let typ = value
            .typ
            .as_ref()
            .ok_or_else(|| LowerError::invariant(format!("cannot encode untyped `{}`", value)))?;
        if bufsz < typ.abi_size_bound() {
            return Err(LowerError::invariant(format!(
                "{}-byte buffer cannot hold an encoded {}",
                bufsz, typ
            )));
        }
        let dst = if dst.location.is_some() {
            dst
        } else {
            dst.located(AddrSpace::Memory)
        };
        self.encode(dst, value, ctx, returns_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stmtir_core::ast::{FunctionKind, Mutability};
    use stmtir_core::FunctionSignature;

    fn ctx() -> Context {
        Context::new(
            FunctionSignature::new("f", FunctionKind::External, Mutability::Nonpayable),
            Vec::new(),
        )
    }

    #[test]
    fn test_wrap_single_value() {
        let v = IrNode::int(1).typed(Type::uint256());
        let wrapped = wrap_value_for_external_return(v).unwrap();
        assert!(wrapped.is_op(Op::Multi));
        assert_eq!(wrapped.typ, Some(Type::Tuple(vec![Type::uint256()])));

        let t = IrNode::multi(vec![], Type::Tuple(vec![]));
        assert_eq!(wrap_value_for_external_return(t.clone()).unwrap(), t);
    }

    #[test]
    fn test_static_tuple_encoding() {
        let mut ctx = ctx();
        let value = IrNode::multi(
            vec![IrNode::int(7).typed(Type::uint256()), IrNode::int(1).typed(Type::Bool)],
            Type::Tuple(vec![Type::uint256(), Type::Bool]),
        );
        let encoded = BasicAbiEncoder
            .abi_encode(IrNode::int(320), value, &mut ctx, 64, true)
            .unwrap();
        assert_eq!(
            encoded.to_string(),
            "(seq (seq (mstore 320 7)) (seq (mstore 352 1)) 64)"
        );
    }

    #[test]
    fn test_undersized_buffer_rejected() {
        let mut ctx = ctx();
        let value = IrNode::int(7).typed(Type::uint256());
        let err = BasicAbiEncoder
            .abi_encode(IrNode::int(320), value, &mut ctx, 16, false)
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_dynamic_member_uses_running_offset() {
        let mut ctx = ctx();
        let s = ctx.new_variable("s", Type::String(7)).unwrap();
        let value = wrap_value_for_external_return(s).unwrap();
        let encoded = BasicAbiEncoder
            .abi_encode(IrNode::int(320), value, &mut ctx, 96, true)
            .unwrap();
        let text = encoded.to_string();
        assert!(text.starts_with("(with $dyn_ofst0 32 (seq (mstore 320 $dyn_ofst0) (set $dyn_ofst0"));
        assert!(text.ends_with("$dyn_ofst0))"));
        assert_eq!(encoded.count_op(Op::Set), 1);
    }
}
