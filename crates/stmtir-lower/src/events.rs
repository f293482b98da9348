use crate::abi::AbiEncoding;
use num_bigint::{BigInt, Sign};
use stmtir_core::builder::load;
use stmtir_core::utils::keccak256;
use stmtir_core::{Context, EventDef, IrNode, LowerError, Op, Result, Type};
use tracing::debug;

pub trait EventLowering {
    /// `topics` holds the indexed arguments, `data` the rest, both in
    /// declaration order.
    fn lower_log(
        &self,
        event: &EventDef,
        topics: Vec<IrNode>,
        data: Vec<IrNode>,
        ctx: &mut Context,
        abi: &dyn AbiEncoding,
    ) -> Result<IrNode>;
}

/// Topic 0 is the keccak of the event signature; data is ABI-encoded as a
/// tuple.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicEventLowerer;

pub fn event_id(event: &EventDef) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, &keccak256(event.signature().as_bytes()))
}

impl EventLowering for BasicEventLowerer {
    fn lower_log(
        &self,
        event: &EventDef,
        topics: Vec<IrNode>,
        data: Vec<IrNode>,
        ctx: &mut Context,
        abi: &dyn AbiEncoding,
    ) -> Result<IrNode> {
        if topics.len() > 3 {
            return Err(LowerError::invariant(format!(
                "event `{}` has {} indexed arguments",
                event.name,
                topics.len()
            )));
        }

        let mut topic_words = vec![IrNode::int(event_id(event))];
        for topic in topics {
            match &topic.typ {
                Some(t) if t.is_prim_word() => {
                    topic_words.push(if topic.is_pointer() { load(topic)? } else { topic });
                }
                Some(t) => return Err(LowerError::unsupported(format!("indexed {} topic", t))),
                None => return Err(LowerError::invariant(format!("`{}` has no type", topic))),
            }
        }
        debug!(event = %event.name, topics = topic_words.len(), "lowering log");
        let log_op = Op::Log;

        if data.is_empty() {
            let mut args = vec![IrNode::int(0), IrNode::int(0)];
            args.extend(topic_words);
            return Ok(IrNode::op(log_op, args));
        }

        let data_typ = Type::Tuple(
            data.iter()
                .map(|d| d.typ.clone().ok_or_else(|| LowerError::invariant(format!("`{}` has no type", d))))
                .collect::<Result<Vec<_>>>()?,
        );
        let bufsz = data_typ.abi_size_bound();
        let buf = ctx.new_internal_variable(Type::for_exact_size(bufsz.max(32)));
        let encoded_len = abi.abi_encode(buf.clone(), IrNode::multi(data, data_typ), ctx, bufsz, true)?;

        encoded_len.cache_when_complex("log_len", ctx, |_, len| {
            let mut args = vec![buf, len];
            args.extend(topic_words);
            Ok(IrNode::op(log_op, args))
        })
    }
}
