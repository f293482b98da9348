//! Location-aware IR construction: loads, stores, pointer arithmetic and
//! whole-value copies between memory, storage and calldata.

use crate::context::Context;
use crate::errors::{LowerError, Result};
use crate::ir::{AddrSpace, IrNode, Op};
use crate::types::Type;
use crate::utils::WORD_SIZE;
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};

/// Largest static copy emitted as straight-line stores.
const MAX_UNROLLED_WORDS: usize = 8;

fn location_of(ptr: &IrNode) -> Result<AddrSpace> {
    ptr.location
        .ok_or_else(|| LowerError::invariant(format!("`{}` is not a pointer", ptr)))
}

fn type_of(node: &IrNode) -> Result<&Type> {
    node.typ
        .as_ref()
        .ok_or_else(|| LowerError::invariant(format!("`{}` has no type", node)))
}

/// Address units taken by one value of `typ` in `location`.
pub fn stride(typ: &Type, location: AddrSpace) -> usize {
    match location {
        AddrSpace::Storage => typ.word_count(),
        AddrSpace::Memory | AddrSpace::Calldata => typ.memory_bytes_required(),
    }
}

pub fn load(ptr: IrNode) -> Result<IrNode> {
    let location = location_of(&ptr)?;
    let typ = ptr.typ.clone();
    let mut node = IrNode::op(location.load_op(), vec![ptr]);
    node.typ = typ;
    Ok(node)
}

pub fn store(ptr: IrNode, value: IrNode) -> Result<IrNode> {
    let location = location_of(&ptr)?;
    let op = location
        .store_op()
        .ok_or_else(|| LowerError::invariant(format!("cannot write to {}", location)))?;
    let writes = ptr.effects.var.clone().into_iter().collect();
    Ok(IrNode::op(op, vec![ptr, value]).with_writes(writes))
}

/// `ptr + ofst`, folded when both are literals. Keeps the pointer's location
/// and addressed variable; the caller assigns the type.
pub fn add_ofst(ptr: IrNode, ofst: IrNode) -> IrNode {
    if ofst.int_value().is_some_and(Zero::is_zero) {
        return ptr;
    }

    let location = ptr.location;
    let var = ptr.effects.var.clone();
    let mut node = match (ptr.int_value(), ofst.int_value()) {
        (Some(a), Some(b)) => IrNode::int(a + b),
        _ => IrNode::op(Op::Add, vec![ptr, ofst]),
    };
    node.location = location;
    node.effects.var = var;
    node
}

fn with_pointer_meta(mut node: IrNode, typ: Type, location: AddrSpace, like: &IrNode) -> IrNode {
    node.typ = Some(typ);
    node.location = Some(location);
    node.effects.var = like.effects.var.clone();
    node
}

/// Number of live elements (or bytes) of a dynamic array or bytestring.
pub fn dyn_array_count(ptr: IrNode) -> Result<IrNode> {
    Ok(load(ptr)?.typed(Type::uint256()))
}

/// Start of the payload after the length word.
pub fn dyn_array_data(ptr: IrNode) -> Result<IrNode> {
    let location = location_of(&ptr)?;
    Ok(add_ofst(ptr, IrNode::int(location.word_scale())))
}

/// Address of `parent[ix]`.
///
/// Literal indices into static arrays are checked here; everything else gets
/// a runtime `assert` when `bounds_check` is set.
pub fn element_ptr(parent: IrNode, ix: IrNode, bounds_check: bool, ctx: &mut Context) -> Result<IrNode> {
    let location = location_of(&parent)?;
    let (elem, capacity, dynamic) = match type_of(&parent)? {
        Type::SArray(elem, n) => ((**elem).clone(), *n, false),
        Type::DArray(elem, n) => ((**elem).clone(), *n, true),
        other => {
            return Err(LowerError::invariant(format!("cannot index into {}", other)));
        }
    };
    let scale = stride(&elem, location);

    if let Some(i) = ix.int_value() {
        if i.sign() == Sign::Minus || (!dynamic && *i >= BigInt::from(capacity)) {
            return Err(LowerError::invariant(format!(
                "index {} out of bounds for {}",
                i,
                type_of(&parent)?
            )));
        }
        if !dynamic || !bounds_check {
            let ofst = IrNode::int(i * scale);
            let data = if dynamic { dyn_array_data(parent)? } else { parent };
            return Ok(add_ofst(data, ofst).typed(elem));
        }
    }

    parent.cache_when_complex("arr", ctx, |ctx, parent| {
        ix.cache_when_complex("ix", ctx, |_, ix| {
            let data = if dynamic {
                dyn_array_data(parent.clone())?
            } else {
                parent.clone()
            };
            let ofst = if scale == 1 {
                ix.clone()
            } else {
                IrNode::op(Op::Mul, vec![ix.clone(), IrNode::int(scale)])
            };
            let ptr = add_ofst(data, ofst).typed(elem.clone());

            if !bounds_check {
                return Ok(ptr);
            }

            let bound = if dynamic {
                dyn_array_count(parent.clone())?
            } else {
                IrNode::int(capacity)
            };
            let check = IrNode::op(Op::Assert, vec![IrNode::op(Op::Lt, vec![ix, bound])])
                .with_error_msg("array bounds check");
            Ok(with_pointer_meta(
                IrNode::seq(vec![check, ptr]),
                elem.clone(),
                location,
                &parent,
            ))
        })
    })
}

/// Address of member `index` of a tuple or struct.
pub fn member_ptr(parent: IrNode, index: usize) -> Result<IrNode> {
    let location = location_of(&parent)?;
    let typ = type_of(&parent)?.clone();
    let members = typ
        .tuple_members()
        .ok_or_else(|| LowerError::invariant(format!("{} has no members", typ)))?;
    let member = members
        .get(index)
        .map(|t| (*t).clone())
        .ok_or_else(|| LowerError::invariant(format!("{} has no member {}", typ, index)))?;
    let ofst: usize = members[..index].iter().map(|t| stride(t, location)).sum();
    Ok(add_ofst(parent, IrNode::int(ofst)).typed(member))
}

/// `arg` if `arg <= hi`, else `hi`.
pub fn clamp_le(arg: IrNode, hi: IrNode, signed: bool) -> IrNode {
    let le = if signed { Op::Sle } else { Op::Le };
    let typ = arg.typ.clone();
    let mut node = IrNode::op(
        Op::Select,
        vec![IrNode::op(le, vec![arg.clone(), hi.clone()]), arg, hi],
    );
    node.typ = typ;
    node
}

/// Could writing `right` into `left` clobber `right` halfway through the
/// copy? Conservative: any shared variable or any call that could touch a
/// referenced variable counts.
pub fn potential_overlap(left: &IrNode, right: &IrNode) -> bool {
    let prim = |n: &IrNode| n.typ.as_ref().is_some_and(Type::is_prim_word);
    if prim(left) && prim(right) {
        return false;
    }

    let left_refs = left.referenced_variables();
    let right_refs = right.referenced_variables();
    if !left_refs.is_disjoint(&right_refs) {
        return true;
    }
    if !left_refs.is_empty() && right.contains_risky_call() {
        return true;
    }
    if left.contains_risky_call() && !right_refs.is_empty() {
        return true;
    }
    false
}

/// IR copying the value `src` into the location `dst`.
pub fn make_setter(dst: IrNode, src: IrNode, ctx: &mut Context) -> Result<IrNode> {
    if dst.is_op(Op::Multi) {
        return setter_into_multi(dst, src, ctx);
    }

    let typ = type_of(&dst)?.clone();

    if typ.is_prim_word() {
        let value = if src.is_pointer() { load(src)? } else { src };
        return store(dst, value);
    }

    if src.is_op(Op::Multi) {
        return dst.cache_when_complex("dst", ctx, |ctx, dst| setter_from_multi(dst, src, &typ, ctx));
    }

    if !src.is_pointer() {
        return Err(LowerError::invariant(format!(
            "cannot copy `{}` into {}: not a pointer",
            src, typ
        )));
    }

    if typ.is_dynamic_length() {
        copy_dynamic(dst, src, &typ, ctx)
    } else {
        copy_static(dst, src, &typ, ctx)
    }
}

fn setter_from_multi(dst: IrNode, src: IrNode, typ: &Type, ctx: &mut Context) -> Result<IrNode> {
    let n_items = src.args.len();
    let mut stmts = Vec::with_capacity(n_items + 1);

    match typ {
        Type::SArray(_, n) | Type::DArray(_, n) => {
            if let Type::DArray(..) = typ {
                if n_items > *n {
                    return Err(LowerError::invariant(format!(
                        "{} items do not fit in {}",
                        n_items, typ
                    )));
                }
                stmts.push(store(dst.clone(), IrNode::int(n_items))?);
            } else if n_items != *n {
                return Err(LowerError::invariant(format!(
                    "expected {} items for {}, got {}",
                    n, typ, n_items
                )));
            }
            for (i, item) in src.args.into_iter().enumerate() {
                let ptr = element_ptr(dst.clone(), IrNode::int(i), false, ctx)?;
                stmts.push(make_setter(ptr, item, ctx)?);
            }
        }
        Type::Tuple(_) | Type::Struct(_) => {
            for (i, item) in src.args.into_iter().enumerate() {
                let ptr = member_ptr(dst.clone(), i)?;
                stmts.push(make_setter(ptr, item, ctx)?);
            }
        }
        other => {
            return Err(LowerError::invariant(format!(
                "cannot build {} from a multi-value",
                other
            )));
        }
    }

    Ok(IrNode::seq(stmts))
}

/// Tuple targets: `a, b = ...`.
fn setter_into_multi(dst: IrNode, src: IrNode, ctx: &mut Context) -> Result<IrNode> {
    let targets = dst.args;

    if src.is_op(Op::Multi) {
        if src.args.len() != targets.len() {
            return Err(LowerError::invariant(format!(
                "cannot unpack {} values into {} targets",
                src.args.len(),
                targets.len()
            )));
        }
        let stmts = targets
            .into_iter()
            .zip(src.args)
            .map(|(target, item)| make_setter(target, item, ctx))
            .collect::<Result<Vec<_>>>()?;
        return Ok(IrNode::seq(stmts));
    }

    if !src.is_pointer() {
        return Err(LowerError::invariant(format!("cannot unpack `{}`", src)));
    }

    src.cache_when_complex("src", ctx, |ctx, src| {
        let mut stmts = Vec::with_capacity(targets.len());
        for (i, target) in targets.into_iter().enumerate() {
            let item = member_ptr(src.clone(), i)?;
            stmts.push(make_setter(target, item, ctx)?);
        }
        Ok(IrNode::seq(stmts))
    })
}

fn copy_static(dst: IrNode, src: IrNode, typ: &Type, ctx: &mut Context) -> Result<IrNode> {
    let dst_loc = location_of(&dst)?;
    let src_loc = location_of(&src)?;

    if dst_loc == AddrSpace::Memory && src_loc == AddrSpace::Memory {
        let writes = dst.effects.var.clone().into_iter().collect();
        let len = IrNode::int(typ.memory_bytes_required());
        return Ok(IrNode::op(Op::Mcopy, vec![dst, src, len]).with_writes(writes));
    }

    let words = typ.word_count();
    copy_words(dst, src, IrNode::int(words), words, ctx)
}

fn copy_dynamic(dst: IrNode, src: IrNode, typ: &Type, ctx: &mut Context) -> Result<IrNode> {
    let dst_loc = location_of(&dst)?;
    let src_loc = location_of(&src)?;
    let typ = typ.clone();

    dst.cache_when_complex("dst", ctx, |ctx, dst| {
        src.cache_when_complex("src", ctx, |ctx, src| {
            let count = dyn_array_count(src.clone())?;

            if dst_loc == AddrSpace::Memory && src_loc == AddrSpace::Memory {
                let payload = match typ.value_type() {
                    Some(elem) => IrNode::op(
                        Op::Mul,
                        vec![count, IrNode::int(elem.memory_bytes_required())],
                    ),
                    None => count,
                };
                let len = IrNode::op(Op::Add, vec![IrNode::int(WORD_SIZE), payload]);
                let writes = dst.effects.var.clone().into_iter().collect();
                return Ok(IrNode::op(Op::Mcopy, vec![dst, src, len]).with_writes(writes));
            }

            let payload_words = match typ.value_type() {
                Some(elem) => IrNode::op(Op::Mul, vec![count, IrNode::int(elem.word_count())]),
                None => IrNode::op(
                    Op::Div,
                    vec![
                        IrNode::op(Op::Add, vec![count, IrNode::int(WORD_SIZE - 1)]),
                        IrNode::int(WORD_SIZE),
                    ],
                ),
            };
            let words = IrNode::op(Op::Add, vec![IrNode::int(1), payload_words]);
            copy_words(dst, src, words, typ.word_count(), ctx)
        })
    })
}

/// Word-by-word copy of `count` words (at most `max_words`).
pub fn copy_words(
    dst: IrNode,
    src: IrNode,
    count: IrNode,
    max_words: usize,
    ctx: &mut Context,
) -> Result<IrNode> {
    let dst_loc = location_of(&dst)?;
    let src_loc = location_of(&src)?;
    let unrolled = count
        .int_value()
        .and_then(ToPrimitive::to_usize)
        .filter(|n| *n <= MAX_UNROLLED_WORDS);

    dst.cache_when_complex("dst", ctx, |ctx, dst| {
        src.cache_when_complex("src", ctx, |ctx, src| {
            if let Some(n) = unrolled {
                let mut stmts = Vec::with_capacity(n);
                for i in 0..n {
                    let d = add_ofst(dst.clone(), IrNode::int(i * dst_loc.word_scale()))
                        .typed(Type::uint256());
                    let s = add_ofst(src.clone(), IrNode::int(i * src_loc.word_scale()))
                        .typed(Type::uint256());
                    stmts.push(store(d, load(s)?)?);
                }
                return Ok(IrNode::seq(stmts));
            }

            let ix = ctx.fresh_varname("copy_ix");
            let scaled = |loc: AddrSpace| {
                if loc.word_scale() == 1 {
                    IrNode::symbol(ix.clone())
                } else {
                    IrNode::op(
                        Op::Mul,
                        vec![IrNode::symbol(ix.clone()), IrNode::int(loc.word_scale())],
                    )
                }
            };
            let d = add_ofst(dst.clone(), scaled(dst_loc)).typed(Type::uint256());
            let s = add_ofst(src.clone(), scaled(src_loc)).typed(Type::uint256());
            let body = store(d, load(s)?)?;
            Ok(IrNode::op(
                Op::Repeat,
                vec![
                    IrNode::symbol(ix.clone()),
                    IrNode::int(0),
                    count,
                    IrNode::int(max_words),
                    body,
                ],
            ))
        })
    })
}
