//! The IR tree handed to the assembler.
//!
//! A node is an operator applied to child nodes, an integer literal, or a
//! symbol bound by `with`/`repeat`. Pointer nodes carry the address space
//! they point into; effect metadata records which source variables a subtree
//! touches so assignment lowering can reason about aliasing without
//! re-deriving it from the operators.

use crate::context::Context;
use crate::errors::Result;
use crate::source_location::SourceSpan;
use crate::types::Type;
use crate::utils::OrderedSet;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Seq,
    If,
    With,
    Set,
    Repeat,
    Break,
    Continue,
    Pass,
    Pop,
    ExitTo,
    Return,
    Revert,
    Invalid,
    Assert,
    AssertUnreachable,
    Debugger,
    Mstore,
    Mload,
    Sstore,
    Sload,
    Calldataload,
    Mcopy,
    Add,
    Sub,
    Mul,
    Div,
    Sdiv,
    Mod,
    Smod,
    Exp,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Sar,
    Iszero,
    Eq,
    Ne,
    Lt,
    Gt,
    Slt,
    Sgt,
    Le,
    Ge,
    Sle,
    Sge,
    Select,
    Call,
    Staticcall,
    Delegatecall,
    Create,
    Create2,
    Invoke,
    Log,
    Multi,
    Label,
}

impl Op {
    pub const ALL: &'static [Op] = &[
        Op::Seq,
        Op::If,
        Op::With,
        Op::Set,
        Op::Repeat,
        Op::Break,
        Op::Continue,
        Op::Pass,
        Op::Pop,
        Op::ExitTo,
        Op::Return,
        Op::Revert,
        Op::Invalid,
        Op::Assert,
        Op::AssertUnreachable,
        Op::Debugger,
        Op::Mstore,
        Op::Mload,
        Op::Sstore,
        Op::Sload,
        Op::Calldataload,
        Op::Mcopy,
        Op::Add,
        Op::Sub,
        Op::Mul,
        Op::Div,
        Op::Sdiv,
        Op::Mod,
        Op::Smod,
        Op::Exp,
        Op::And,
        Op::Or,
        Op::Xor,
        Op::Not,
        Op::Shl,
        Op::Shr,
        Op::Sar,
        Op::Iszero,
        Op::Eq,
        Op::Ne,
        Op::Lt,
        Op::Gt,
        Op::Slt,
        Op::Sgt,
        Op::Le,
        Op::Ge,
        Op::Sle,
        Op::Sge,
        Op::Select,
        Op::Call,
        Op::Staticcall,
        Op::Delegatecall,
        Op::Create,
        Op::Create2,
        Op::Invoke,
        Op::Log,
        Op::Multi,
        Op::Label,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Op::Seq => "seq",
            Op::If => "if",
            Op::With => "with",
            Op::Set => "set",
            Op::Repeat => "repeat",
            Op::Break => "break",
            Op::Continue => "continue",
            Op::Pass => "pass",
            Op::Pop => "pop",
            Op::ExitTo => "exit_to",
            Op::Return => "return",
            Op::Revert => "revert",
            Op::Invalid => "invalid",
            Op::Assert => "assert",
            Op::AssertUnreachable => "assert_unreachable",
            Op::Debugger => "debugger",
            Op::Mstore => "mstore",
            Op::Mload => "mload",
            Op::Sstore => "sstore",
            Op::Sload => "sload",
            Op::Calldataload => "calldataload",
            Op::Mcopy => "mcopy",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Sdiv => "sdiv",
            Op::Mod => "mod",
            Op::Smod => "smod",
            Op::Exp => "exp",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Not => "not",
            Op::Shl => "shl",
            Op::Shr => "shr",
            Op::Sar => "sar",
            Op::Iszero => "iszero",
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Lt => "lt",
            Op::Gt => "gt",
            Op::Slt => "slt",
            Op::Sgt => "sgt",
            Op::Le => "le",
            Op::Ge => "ge",
            Op::Sle => "sle",
            Op::Sge => "sge",
            Op::Select => "select",
            Op::Call => "call",
            Op::Staticcall => "staticcall",
            Op::Delegatecall => "delegatecall",
            Op::Create => "create",
            Op::Create2 => "create2",
            Op::Invoke => "invoke",
            Op::Log => "log",
            Op::Multi => "multi",
            Op::Label => "label",
        }
    }

    pub fn from_name(name: &str) -> Option<Op> {
        Op::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Operators that introduce nested control flow or bindings.
    pub fn is_block(self) -> bool {
        matches!(self, Op::Seq | Op::If | Op::With | Op::Repeat)
    }

    fn is_zerovalent(self) -> bool {
        matches!(
            self,
            Op::Repeat
                | Op::Set
                | Op::Label
                | Op::Break
                | Op::Continue
                | Op::Pass
                | Op::Pop
                | Op::ExitTo
                | Op::Return
                | Op::Revert
                | Op::Invalid
                | Op::Assert
                | Op::AssertUnreachable
                | Op::Debugger
                | Op::Mstore
                | Op::Sstore
                | Op::Mcopy
                | Op::Log
        )
    }

    /// Can change state outside the current frame.
    pub fn is_writeable_call(self) -> bool {
        matches!(self, Op::Call | Op::Delegatecall | Op::Create | Op::Create2)
    }

    /// Hands control to code we cannot see, mutating or not.
    pub fn is_risky_call(self) -> bool {
        self.is_writeable_call() || self == Op::Staticcall
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddrSpace {
    Memory,
    Storage,
    Calldata,
}

impl AddrSpace {
    /// Address units per 32-byte word.
    pub fn word_scale(self) -> usize {
        match self {
            AddrSpace::Memory | AddrSpace::Calldata => 32,
            AddrSpace::Storage => 1,
        }
    }

    pub fn load_op(self) -> Op {
        match self {
            AddrSpace::Memory => Op::Mload,
            AddrSpace::Storage => Op::Sload,
            AddrSpace::Calldata => Op::Calldataload,
        }
    }

    pub fn store_op(self) -> Option<Op> {
        match self {
            AddrSpace::Memory => Some(Op::Mstore),
            AddrSpace::Storage => Some(Op::Sstore),
            AddrSpace::Calldata => None,
        }
    }
}

impl fmt::Display for AddrSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrSpace::Memory => write!(f, "memory"),
            AddrSpace::Storage => write!(f, "storage"),
            AddrSpace::Calldata => write!(f, "calldata"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarScope {
    Local,
    State,
}

/// A source-level variable as seen by the aliasing checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    pub name: String,
    pub scope: VarScope,
    pub typ: Type,
}

impl VarRef {
    pub fn local(name: impl Into<String>, typ: Type) -> Self {
        Self {
            name: name.into(),
            scope: VarScope::Local,
            typ,
        }
    }

    pub fn state(name: impl Into<String>, typ: Type) -> Self {
        Self {
            name: name.into(),
            scope: VarScope::State,
            typ,
        }
    }

    pub fn is_state_variable(&self) -> bool {
        self.scope == VarScope::State
    }
}

/// Summary of what calling a function may do, computed by the type checker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEffects {
    #[serde(default)]
    pub reads: Vec<VarRef>,
    #[serde(default)]
    pub writes: Vec<VarRef>,
    #[serde(default)]
    pub writeable_call: bool,
    #[serde(default)]
    pub risky_call: bool,
}

impl FunctionEffects {
    pub fn is_pure(&self) -> bool {
        self.writes.is_empty() && !self.writeable_call
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effects {
    /// The variable whose storage this node addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<VarRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writes: Vec<VarRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callee: Option<FunctionEffects>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.var.is_none() && self.writes.is_empty() && self.callee.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrValue {
    Op(Op),
    Int(BigInt),
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrNode {
    pub value: IrValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<IrNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<Type>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<AddrSpace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSpan>,
    #[serde(default, skip_serializing_if = "Effects::is_empty")]
    pub effects: Effects,
}

impl IrNode {
    pub fn new(value: IrValue, args: Vec<IrNode>) -> Self {
        Self {
            value,
            args,
            typ: None,
            location: None,
            annotation: None,
            error_msg: None,
            source: None,
            effects: Effects::default(),
        }
    }

    pub fn op(op: Op, args: Vec<IrNode>) -> Self {
        Self::new(IrValue::Op(op), args)
    }

    pub fn int(value: impl Into<BigInt>) -> Self {
        Self::new(IrValue::Int(value.into()), Vec::new())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self::new(IrValue::Symbol(name.into()), Vec::new())
    }

    pub fn seq(args: Vec<IrNode>) -> Self {
        Self::op(Op::Seq, args)
    }

    pub fn pass() -> Self {
        Self::op(Op::Pass, Vec::new())
    }

    pub fn multi(args: Vec<IrNode>, typ: Type) -> Self {
        Self::op(Op::Multi, args).typed(typ)
    }

    /// `(with name value body)`; the result inherits the body's type,
    /// location and addressed variable.
    pub fn with_binding(name: &str, value: IrNode, body: IrNode) -> Self {
        let typ = body.typ.clone();
        let location = body.location;
        let var = body.effects.var.clone();
        let mut node = Self::op(Op::With, vec![Self::symbol(name), value, body]);
        node.typ = typ;
        node.location = location;
        node.effects.var = var;
        node
    }

    pub fn typed(mut self, typ: Type) -> Self {
        self.typ = Some(typ);
        self
    }

    pub fn located(mut self, location: AddrSpace) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn with_var(mut self, var: VarRef) -> Self {
        self.effects.var = Some(var);
        self
    }

    pub fn with_writes(mut self, writes: Vec<VarRef>) -> Self {
        self.effects.writes = writes;
        self
    }

    pub fn with_callee(mut self, callee: FunctionEffects) -> Self {
        self.effects.callee = Some(callee);
        self
    }

    pub fn as_op(&self) -> Option<Op> {
        match self.value {
            IrValue::Op(op) => Some(op),
            _ => None,
        }
    }

    pub fn is_op(&self, op: Op) -> bool {
        self.as_op() == Some(op)
    }

    pub fn int_value(&self) -> Option<&BigInt> {
        match &self.value {
            IrValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.value {
            IrValue::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.value, IrValue::Int(_))
    }

    /// Addressable: the value is a pointer into `location`.
    pub fn is_pointer(&self) -> bool {
        self.location.is_some()
    }

    /// Evaluating the node twice could cost gas or repeat side effects.
    pub fn is_complex(&self) -> bool {
        !matches!(self.value, IrValue::Int(_) | IrValue::Symbol(_))
    }

    /// Number of stack items left behind after evaluating the node.
    pub fn valency(&self) -> usize {
        match self.value {
            IrValue::Int(_) | IrValue::Symbol(_) => 1,
            IrValue::Op(op) => match op {
                Op::Seq => self.args.last().map_or(0, IrNode::valency),
                Op::With => self.args.get(2).map_or(0, IrNode::valency),
                Op::If if self.args.len() == 3 => self.args[1].valency(),
                Op::If => 0,
                Op::Invoke | Op::Call | Op::Staticcall | Op::Delegatecall => {
                    usize::from(self.typ.is_some())
                }
                op if op.is_zerovalent() => 0,
                _ => 1,
            },
        }
    }

    pub fn visit<F: FnMut(&IrNode)>(&self, f: &mut F) {
        f(self);
        for arg in &self.args {
            arg.visit(f);
        }
    }

    pub fn find(&self, pred: &dyn Fn(&IrNode) -> bool) -> Option<&IrNode> {
        if pred(self) {
            return Some(self);
        }
        self.args.iter().find_map(|arg| arg.find(pred))
    }

    pub fn count_op(&self, op: Op) -> usize {
        let mut count = 0;
        self.visit(&mut |node| {
            if node.is_op(op) {
                count += 1;
            }
        });
        count
    }

    /// Every source variable the subtree may read or address.
    pub fn referenced_variables(&self) -> OrderedSet<VarRef> {
        let mut ret = OrderedSet::new();
        self.visit(&mut |node| {
            if let Some(var) = &node.effects.var {
                ret.add(var.clone());
            }
            if let Some(callee) = &node.effects.callee {
                ret.extend(callee.reads.iter().cloned());
                ret.extend(callee.writes.iter().cloned());
            }
        });
        ret
    }

    /// Every source variable the subtree may write.
    pub fn variable_writes(&self) -> OrderedSet<VarRef> {
        let mut ret = OrderedSet::new();
        self.visit(&mut |node| {
            ret.extend(node.effects.writes.iter().cloned());
            if let Some(callee) = &node.effects.callee {
                ret.extend(callee.writes.iter().cloned());
            }
        });
        ret
    }

    pub fn contains_writeable_call(&self) -> bool {
        self.find(&|node| {
            node.as_op().is_some_and(Op::is_writeable_call)
                || node.effects.callee.as_ref().is_some_and(|c| c.writeable_call)
        })
        .is_some()
    }

    pub fn contains_risky_call(&self) -> bool {
        self.find(&|node| {
            node.as_op().is_some_and(Op::is_risky_call)
                || node
                    .effects
                    .callee
                    .as_ref()
                    .is_some_and(|c| c.risky_call || c.writeable_call)
        })
        .is_some()
    }

    /// Bind `self` to a fresh name when evaluating it twice would be unsafe
    /// or wasteful, then build dependent IR from the bound value.
    pub fn cache_when_complex<F>(self, name: &str, ctx: &mut Context, build: F) -> Result<IrNode>
    where
        F: FnOnce(&mut Context, IrNode) -> Result<IrNode>,
    {
        if !self.is_complex() {
            return build(ctx, self);
        }

        let varname = ctx.fresh_varname(name);
        let mut bound = IrNode::symbol(varname.clone());
        bound.typ = self.typ.clone();
        bound.location = self.location;
        bound.effects.var = self.effects.var.clone();

        let body = build(ctx, bound)?;
        Ok(IrNode::with_binding(&varname, self, body))
    }
}

impl fmt::Display for IrNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            IrValue::Int(v) => write!(f, "{}", v),
            IrValue::Symbol(s) => write!(f, "{}", s),
            IrValue::Op(op) if self.args.is_empty() => write!(f, "{}", op),
            IrValue::Op(op) => {
                write!(f, "({}", op)?;
                for arg in &self.args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}
