//! Expression lowering.
//!
//! Statement lowering only needs two things from an expression: its IR and
//! the effect metadata attached to that IR. `BasicExprLowerer` covers the
//! expression forms a type-checked body can contain; a fuller expression
//! compiler can be swapped in through the `ExprLowering` trait.

use num_bigint::{BigInt, Sign};
use stmtir_core::ast::{BinOp, BoolOpKind, Callee, CmpOp, Expr, ExprKind, UnaryOp};
use stmtir_core::builder::{add_ofst, dyn_array_count, element_ptr, load, member_ptr, store};
use stmtir_core::utils::{decimal_divisor, int_bounds, method_id_int, MAX_DECIMAL_PLACES, WORD_SIZE};
use stmtir_core::{AddrSpace, Context, IrNode, LowerError, Op, Result, Type, VarRef};

pub trait ExprLowering {
    /// IR for `expr`; addressable expressions come back as pointers.
    fn lower(&self, expr: &Expr, ctx: &mut Context) -> Result<IrNode>;

    /// Like `lower`, but single-word pointers are dereferenced.
    fn lower_value(&self, expr: &Expr, ctx: &mut Context) -> Result<IrNode> {
        let node = self.lower(expr, ctx)?;
        if node.is_pointer() && node.typ.as_ref().is_some_and(Type::is_prim_word) {
            load(node)
        } else {
            Ok(node)
        }
    }

    fn lower_pointer(&self, expr: &Expr, ctx: &mut Context) -> Result<IrNode> {
        let node = self.lower(expr, ctx)?;
        if node.is_pointer() {
            Ok(node)
        } else {
            Err(LowerError::invariant(format!("`{}` does not denote a location", node)).with_span(expr.span))
        }
    }

    /// `left <op> right` on single-word values of type `typ`.
    fn binop(&self, op: BinOp, left: IrNode, right: IrNode, typ: &Type, ctx: &mut Context) -> Result<IrNode>;
}

#[derive(Debug, Clone, Default)]
pub struct BasicExprLowerer {
    bounds_check: bool,
}

impl BasicExprLowerer {
    pub fn new(bounds_check: bool) -> Self {
        Self { bounds_check }
    }

    fn lower_name(&self, id: &str, expr: &Expr, ctx: &mut Context) -> Result<IrNode> {
        if expr.is_unreachable_sentinel() {
            return Err(LowerError::invariant(
                "UNREACHABLE may only appear as an assert or raise reason",
            ));
        }
        ctx.lookup(id)
            .map(|record| record.pointer())
            .ok_or_else(|| LowerError::invariant(format!("undeclared variable `{}`", id)))
    }

    fn lower_state_var(&self, id: &str, ctx: &mut Context) -> Result<IrNode> {
        let var = ctx
            .state_var(id)
            .cloned()
            .ok_or_else(|| LowerError::invariant(format!("unknown state variable `self.{}`", id)))?;

        if var.is_constant {
            let value = var.value.as_ref().ok_or_else(|| {
                LowerError::invariant(format!("constant `{}` has no folded value", id))
            })?;
            return self.lower(value, ctx);
        }

        Ok(IrNode::int(var.slot)
            .typed(var.typ.clone())
            .located(AddrSpace::Storage)
            .with_var(VarRef::state(var.name.clone(), var.typ)))
    }

    fn lower_bytestring(&self, data: &[u8], typ: &Type, ctx: &mut Context) -> Result<IrNode> {
        if typ.count().is_some_and(|n| n < data.len()) {
            return Err(LowerError::invariant(format!(
                "{}-byte literal does not fit in {}",
                data.len(),
                typ
            )));
        }

        let buf = ctx.new_internal_variable(typ.clone());
        let mut stmts = vec![store(buf.clone(), IrNode::int(data.len()))?];
        for (i, chunk) in data.chunks(WORD_SIZE).enumerate() {
            let mut word = [0u8; WORD_SIZE];
            word[..chunk.len()].copy_from_slice(chunk);
            let ptr = add_ofst(buf.clone(), IrNode::int(WORD_SIZE * (i + 1))).typed(Type::uint256());
            stmts.push(store(ptr, IrNode::int(BigInt::from_bytes_be(Sign::Plus, &word)))?);
        }
        stmts.push(buf.clone());

        let mut node = IrNode::seq(stmts).typed(typ.clone()).located(AddrSpace::Memory);
        node.effects.var = buf.effects.var;
        Ok(node)
    }

    fn lower_subscript(&self, value: &Expr, index: &Expr, ctx: &mut Context) -> Result<IrNode> {
        let base = self.lower(value, ctx)?;
        match value.resolved_type()? {
            Type::SArray(..) | Type::DArray(..) => {
                if !base.is_pointer() {
                    return Err(LowerError::invariant("cannot index into a non-addressable array"));
                }
                let ix = self.lower_value(index, ctx)?;
                element_ptr(base, ix, self.bounds_check, ctx)
            }
            Type::Tuple(_) => {
                let ix = index
                    .literal_int()
                    .and_then(num_traits::ToPrimitive::to_usize)
                    .ok_or_else(|| LowerError::invariant("tuple index must be a literal"))?;
                if base.is_op(Op::Multi) {
                    return base
                        .args
                        .get(ix)
                        .cloned()
                        .ok_or_else(|| LowerError::invariant(format!("tuple index {} out of range", ix)));
                }
                member_ptr(base, ix)
            }
            other => Err(LowerError::invariant(format!("cannot subscript {}", other))),
        }
    }

    fn lower_call(
        &self,
        func: &Callee,
        args: &[Expr],
        expr: &Expr,
        ctx: &mut Context,
    ) -> Result<IrNode> {
        match func {
            Callee::Builtin { name } => self.lower_builtin(name, args, expr, ctx),
            Callee::Internal { name, effects } => {
                if ctx.is_constant() && !effects.is_pure() {
                    return Err(LowerError::state_access(format!(
                        "cannot call state-modifying function `{}` from a constant context",
                        name
                    ))
                    .with_span(expr.span));
                }
                let mut operands = vec![IrNode::symbol(name.clone())];
                for arg in args {
                    operands.push(self.lower_operand(arg, ctx)?);
                }
                let node = IrNode::op(Op::Invoke, operands).with_callee(effects.clone());
                Ok(returned(node, expr.typ.clone()))
            }
            Callee::External {
                target,
                name,
                mutability,
            } => {
                if ctx.is_constant() && !mutability.is_constant() {
                    return Err(LowerError::state_access(format!(
                        "cannot call mutating external function `{}` from a constant context",
                        name
                    ))
                    .with_span(expr.span));
                }
                let arg_types = args
                    .iter()
                    .map(|a| a.resolved_type().map(Type::abi_canonical))
                    .collect::<Result<Vec<_>>>()?;
                let selector = method_id_int(&format!("{}({})", name, arg_types.join(",")));

                let mut operands = vec![self.lower_value(target, ctx)?, IrNode::int(selector)];
                for arg in args {
                    operands.push(self.lower_operand(arg, ctx)?);
                }
                let op = if mutability.is_constant() {
                    Op::Staticcall
                } else {
                    Op::Call
                };
                Ok(returned(IrNode::op(op, operands), expr.typ.clone()))
            }
        }
    }

    fn lower_builtin(&self, name: &str, args: &[Expr], expr: &Expr, ctx: &mut Context) -> Result<IrNode> {
        match (name, args) {
            ("len", [arg]) => {
                let node = self.lower(arg, ctx)?;
                match arg.resolved_type()? {
                    Type::SArray(_, n) => Ok(IrNode::int(*n).typed(Type::uint256())),
                    t if t.is_dynamic_length() && node.is_pointer() => dyn_array_count(node),
                    other => Err(LowerError::invariant(format!("len() of {}", other))),
                }
            }
            ("empty", []) => match expr.resolved_type()? {
                t if t.is_prim_word() => Ok(IrNode::int(0).typed(t.clone())),
                other => Err(LowerError::unsupported(format!("empty({})", other))),
            },
            ("range", _) => Err(LowerError::invariant("range() outside of a for loop")),
            _ => Err(LowerError::unsupported(format!("builtin `{}`", name)).with_span(expr.span)),
        }
    }

    fn lower_operand(&self, expr: &Expr, ctx: &mut Context) -> Result<IrNode> {
        if expr.resolved_type()?.is_prim_word() {
            self.lower_value(expr, ctx)
        } else {
            self.lower(expr, ctx)
        }
    }

    fn lower_compare(&self, left: &Expr, op: CmpOp, right: &Expr, ctx: &mut Context) -> Result<IrNode> {
        let typ = left.resolved_type()?;
        if !typ.is_prim_word() {
            return Err(LowerError::unsupported(format!("comparison of {} values", typ)));
        }
        let signed = typ.is_signed();
        let l = self.lower_value(left, ctx)?;
        let r = self.lower_value(right, ctx)?;
        let op = match (op, signed) {
            (CmpOp::Eq, _) => Op::Eq,
            (CmpOp::NotEq, _) => Op::Ne,
            (CmpOp::Lt, false) => Op::Lt,
            (CmpOp::Lt, true) => Op::Slt,
            (CmpOp::LtE, false) => Op::Le,
            (CmpOp::LtE, true) => Op::Sle,
            (CmpOp::Gt, false) => Op::Gt,
            (CmpOp::Gt, true) => Op::Sgt,
            (CmpOp::GtE, false) => Op::Ge,
            (CmpOp::GtE, true) => Op::Sge,
        };
        Ok(IrNode::op(op, vec![l, r]).typed(Type::Bool))
    }

    fn lower_unary(&self, op: UnaryOp, operand: &Expr, expr: &Expr, ctx: &mut Context) -> Result<IrNode> {
        let typ = expr.resolved_type()?.clone();
        let v = self.lower_value(operand, ctx)?;
        match op {
            UnaryOp::Not => Ok(IrNode::op(Op::Iszero, vec![v]).typed(Type::Bool)),
            UnaryOp::Invert => Ok(IrNode::op(Op::Not, vec![v]).typed(typ)),
            UnaryOp::Neg => self.binop(BinOp::Sub, IrNode::int(0).typed(typ.clone()), v, &typ, ctx),
        }
    }

    fn lower_boolop(&self, op: BoolOpKind, values: &[Expr], ctx: &mut Context) -> Result<IrNode> {
        let mut lowered = values
            .iter()
            .map(|v| self.lower_value(v, ctx))
            .collect::<Result<Vec<_>>>()?;
        let mut acc = lowered
            .pop()
            .ok_or_else(|| LowerError::invariant("boolean operation without operands"))?;
        while let Some(v) = lowered.pop() {
            acc = match op {
                BoolOpKind::And => IrNode::op(Op::If, vec![v, acc, IrNode::int(0)]),
                BoolOpKind::Or => IrNode::op(Op::If, vec![v, IrNode::int(1), acc]),
            }
            .typed(Type::Bool);
        }
        Ok(acc)
    }
}

/// Call results of composite type live in a memory buffer.
fn returned(node: IrNode, typ: Option<Type>) -> IrNode {
    match typ {
        Some(t) if !t.is_prim_word() => node.typed(t).located(AddrSpace::Memory),
        Some(t) => node.typed(t),
        None => node,
    }
}

fn parse_decimal(text: &str) -> Result<BigInt> {
    let malformed = || LowerError::invariant(format!("malformed decimal literal `{}`", text));
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if frac_part.len() > MAX_DECIMAL_PLACES as usize {
        return Err(malformed());
    }

    let int_part = if int_part.is_empty() { "0" } else { int_part };
    let scaled = format!("{}{:0<width$}", int_part, frac_part, width = MAX_DECIMAL_PLACES as usize);
    let value: BigInt = scaled.parse().map_err(|_| malformed())?;
    Ok(if negative { -value } else { value })
}

fn assert_ok(cond: IrNode, msg: &str) -> IrNode {
    IrNode::op(Op::Assert, vec![cond]).with_error_msg(msg)
}

/// `res` within the range of `typ`, for types narrower than a word.
fn in_bounds(res: &IrNode, typ: &Type) -> Result<Option<IrNode>> {
    let Some(bits) = typ.bits().filter(|b| *b < 256) else {
        return Ok(None);
    };
    let (lo, hi) = int_bounds(typ.is_signed(), bits)?;
    Ok(if typ.is_signed() {
        Some(IrNode::op(
            Op::And,
            vec![
                IrNode::op(Op::Sge, vec![res.clone(), IrNode::int(lo)]),
                IrNode::op(Op::Sle, vec![res.clone(), IrNode::int(hi)]),
            ],
        ))
    } else {
        Some(IrNode::op(Op::Le, vec![res.clone(), IrNode::int(hi)]))
    })
}

impl ExprLowering for BasicExprLowerer {
    fn lower(&self, expr: &Expr, ctx: &mut Context) -> Result<IrNode> {
        let node = match &expr.kind {
            ExprKind::Int { value } => IrNode::int(value.clone()).typed(expr.resolved_type()?.clone()),
            ExprKind::Decimal { value } => IrNode::int(parse_decimal(value)?).typed(Type::Decimal),
            ExprKind::Bool { value } => IrNode::int(u8::from(*value)).typed(Type::Bool),
            ExprKind::Str { value } => self.lower_bytestring(value.as_bytes(), expr.resolved_type()?, ctx)?,
            ExprKind::Bytes { value } => self.lower_bytestring(value, expr.resolved_type()?, ctx)?,
            ExprKind::Name { id } => self.lower_name(id, expr, ctx)?,
            ExprKind::StateVar { id } => self.lower_state_var(id, ctx)?,
            ExprKind::Attribute { value, attr } => {
                let base = self.lower_pointer(value, ctx)?;
                let typ = value.resolved_type()?;
                let ix = typ
                    .member_index(attr)
                    .ok_or_else(|| LowerError::invariant(format!("{} has no member `{}`", typ, attr)))?;
                member_ptr(base, ix)?
            }
            ExprKind::Subscript { value, index } => self.lower_subscript(value, index, ctx)?,
            ExprKind::BinOp { left, op, right } => {
                let typ = expr.resolved_type()?.clone();
                let l = self.lower_value(left, ctx)?;
                let r = self.lower_value(right, ctx)?;
                self.binop(*op, l, r, &typ, ctx)?
            }
            ExprKind::UnaryOp { op, operand } => self.lower_unary(*op, operand, expr, ctx)?,
            ExprKind::Compare { left, op, right } => self.lower_compare(left, *op, right, ctx)?,
            ExprKind::BoolOp { op, values } => self.lower_boolop(*op, values, ctx)?,
            ExprKind::List { elts } | ExprKind::Tuple { elts } => {
                let items = elts
                    .iter()
                    .map(|e| self.lower(e, ctx))
                    .collect::<Result<Vec<_>>>()?;
                IrNode::multi(items, expr.resolved_type()?.clone())
            }
            ExprKind::Call { func, args, .. } => self.lower_call(func, args, expr, ctx)?,
        };
        Ok(node)
    }

    fn binop(&self, op: BinOp, left: IrNode, right: IrNode, typ: &Type, ctx: &mut Context) -> Result<IrNode> {
        let typ = typ.clone();
        let signed = typ.is_signed();

        let bitwise = match op {
            BinOp::BitAnd => Some(IrNode::op(Op::And, vec![left.clone(), right.clone()])),
            BinOp::BitOr => Some(IrNode::op(Op::Or, vec![left.clone(), right.clone()])),
            BinOp::BitXor => Some(IrNode::op(Op::Xor, vec![left.clone(), right.clone()])),
            BinOp::Shl => Some(IrNode::op(Op::Shl, vec![right.clone(), left.clone()])),
            BinOp::Shr if signed => Some(IrNode::op(Op::Sar, vec![right.clone(), left.clone()])),
            BinOp::Shr => Some(IrNode::op(Op::Shr, vec![right.clone(), left.clone()])),
            BinOp::Pow => Some(IrNode::op(Op::Exp, vec![left.clone(), right.clone()])),
            _ => None,
        };
        if let Some(node) = bitwise {
            return Ok(node.typed(typ));
        }

        if !typ.is_integer() && typ != Type::Decimal {
            return Err(LowerError::invariant(format!("arithmetic on {}", typ)));
        }
        let decimal = typ == Type::Decimal;
        let full_word = typ.bits() == Some(256);

        left.cache_when_complex("l", ctx, |ctx, l| {
            right.cache_when_complex("r", ctx, |ctx, r| {
                let res_name = ctx.fresh_varname("res");
                let res = IrNode::symbol(res_name.clone());
                let nonzero_divisor = IrNode::op(Op::Iszero, vec![IrNode::op(Op::Iszero, vec![r.clone()])]);

                let (value, msg, mut checks) = match op {
                    BinOp::Add => {
                        let value = IrNode::op(Op::Add, vec![l.clone(), r.clone()]);
                        let checks = match (full_word, signed) {
                            (true, false) => vec![IrNode::op(
                                Op::Iszero,
                                vec![IrNode::op(Op::Lt, vec![res.clone(), l.clone()])],
                            )],
                            (true, true) => vec![IrNode::op(
                                Op::Eq,
                                vec![
                                    IrNode::op(Op::Slt, vec![res.clone(), l.clone()]),
                                    IrNode::op(Op::Slt, vec![r.clone(), IrNode::int(0)]),
                                ],
                            )],
                            _ => vec![],
                        };
                        (value, "safeadd", checks)
                    }
                    BinOp::Sub => {
                        let value = IrNode::op(Op::Sub, vec![l.clone(), r.clone()]);
                        let checks = match (full_word, signed) {
                            (_, false) => vec![IrNode::op(Op::Ge, vec![l.clone(), r.clone()])],
                            (true, true) => vec![IrNode::op(
                                Op::Eq,
                                vec![
                                    IrNode::op(Op::Sgt, vec![res.clone(), l.clone()]),
                                    IrNode::op(Op::Slt, vec![r.clone(), IrNode::int(0)]),
                                ],
                            )],
                            (false, true) => vec![],
                        };
                        (value, "safesub", checks)
                    }
                    BinOp::Mul if decimal => {
                        let value = IrNode::op(
                            Op::Sdiv,
                            vec![
                                IrNode::op(Op::Mul, vec![l.clone(), r.clone()]),
                                IrNode::int(decimal_divisor()),
                            ],
                        );
                        (value, "safemul", vec![])
                    }
                    BinOp::Mul => {
                        let value = IrNode::op(Op::Mul, vec![l.clone(), r.clone()]);
                        let div = if signed { Op::Sdiv } else { Op::Div };
                        let mut checks = vec![IrNode::op(
                            Op::Or,
                            vec![
                                IrNode::op(Op::Iszero, vec![l.clone()]),
                                IrNode::op(
                                    Op::Eq,
                                    vec![IrNode::op(div, vec![res.clone(), l.clone()]), r.clone()],
                                ),
                            ],
                        )];
                        if signed && full_word {
                            let (min, _) = int_bounds(true, 256)?;
                            checks.push(IrNode::op(
                                Op::Iszero,
                                vec![IrNode::op(
                                    Op::And,
                                    vec![
                                        IrNode::op(Op::Eq, vec![l.clone(), IrNode::int(-1)]),
                                        IrNode::op(Op::Eq, vec![r.clone(), IrNode::int(min)]),
                                    ],
                                )],
                            ));
                        }
                        (value, "safemul", checks)
                    }
                    BinOp::Div => {
                        let value = if decimal {
                            IrNode::op(
                                Op::Sdiv,
                                vec![
                                    IrNode::op(Op::Mul, vec![l.clone(), IrNode::int(decimal_divisor())]),
                                    r.clone(),
                                ],
                            )
                        } else if signed {
                            IrNode::op(Op::Sdiv, vec![l.clone(), r.clone()])
                        } else {
                            IrNode::op(Op::Div, vec![l.clone(), r.clone()])
                        };
                        (value, "safediv", vec![nonzero_divisor])
                    }
                    BinOp::Mod => {
                        let mod_op = if signed { Op::Smod } else { Op::Mod };
                        let value = IrNode::op(mod_op, vec![l.clone(), r.clone()]);
                        (value, "safemod", vec![nonzero_divisor])
                    }
                    other => {
                        return Err(LowerError::invariant(format!("unexpected operator {:?}", other)));
                    }
                };

                checks.extend(in_bounds(&res, &typ)?);
                let mut body: Vec<IrNode> = checks.into_iter().map(|c| assert_ok(c, msg)).collect();
                body.push(res.clone());
                let body = IrNode::seq(body).typed(typ.clone());
                Ok(IrNode::with_binding(&res_name, value, body))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stmtir_core::ast::{FunctionKind, Mutability};
    use stmtir_core::{FunctionEffects, FunctionSignature};

    fn ctx(mutability: Mutability) -> Context {
        Context::new(
            FunctionSignature::new("f", FunctionKind::External, mutability),
            Vec::new(),
        )
    }

    #[test]
    fn test_decimal_literal_scaling() {
        assert_eq!(parse_decimal("3.25").unwrap(), BigInt::from(32_500_000_000i64));
        assert_eq!(parse_decimal("-0.5").unwrap(), BigInt::from(-5_000_000_000i64));
        assert_eq!(parse_decimal("7").unwrap(), BigInt::from(70_000_000_000i64));
        assert!(parse_decimal("0.12345678901").is_err());
    }

    #[test]
    fn test_string_literal_materialised_in_memory() {
        let mut ctx = ctx(Mutability::Nonpayable);
        let lowerer = BasicExprLowerer::new(true);
        let node = lowerer.lower(&Expr::string("hi"), &mut ctx).unwrap();
        assert!(node.is_pointer());
        assert!(node.is_op(Op::Seq));
        assert_eq!(node.args.len(), 3);
        assert_eq!(node.args[0].to_string(), "(mstore 64 2)");
    }

    #[test]
    fn test_checked_add_binds_result() {
        let mut ctx = ctx(Mutability::Nonpayable);
        let lowerer = BasicExprLowerer::new(true);
        let node = lowerer
            .binop(
                BinOp::Add,
                IrNode::symbol("a"),
                IrNode::symbol("b"),
                &Type::uint256(),
                &mut ctx,
            )
            .unwrap();
        assert_eq!(
            node.to_string(),
            "(with $res0 (add a b) (seq (assert (iszero (lt $res0 a))) $res0))"
        );
    }

    #[test]
    fn test_narrow_types_get_range_check() {
        let mut ctx = ctx(Mutability::Nonpayable);
        let lowerer = BasicExprLowerer::new(true);
        let node = lowerer
            .binop(
                BinOp::Add,
                IrNode::symbol("a"),
                IrNode::symbol("b"),
                &Type::Uint(8),
                &mut ctx,
            )
            .unwrap();
        assert!(node.to_string().contains("(le $res0 255)"));
    }

    #[test]
    fn test_mutating_call_rejected_in_constant_context() {
        let mut ctx = ctx(Mutability::View);
        let lowerer = BasicExprLowerer::new(true);
        let call = Expr::internal_call(
            "bump",
            vec![],
            FunctionEffects {
                writeable_call: true,
                ..Default::default()
            },
            Some(Type::uint256()),
        );
        let err = lowerer.lower(&call, &mut ctx).unwrap_err();
        assert_eq!(err.kind(), stmtir_core::FaultKind::StateAccessViolation);
    }

    #[test]
    fn test_signed_comparison() {
        let mut ctx = ctx(Mutability::Nonpayable);
        ctx.new_variable("x", Type::int256()).unwrap();
        let lowerer = BasicExprLowerer::new(true);
        let cmp = Expr::compare(
            Expr::name("x", Type::int256()),
            CmpOp::Lt,
            Expr::int(0, Type::int256()),
        );
        assert_eq!(lowerer.lower(&cmp, &mut ctx).unwrap().to_string(), "(slt (mload 64) 0)");
    }
}
