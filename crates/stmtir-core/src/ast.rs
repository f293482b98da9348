//! Typed statement and expression trees, as handed over by the type checker.
//!
//! Nodes are read-only for the lowering stage. Every expression that
//! produces a value carries its resolved type.

use crate::errors::{LowerError, Result};
use crate::ir::FunctionEffects;
use crate::source_location::SourceSpan;
use crate::types::Type;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message value meaning "this revert can never happen".
pub const UNREACHABLE_SENTINEL: &str = "UNREACHABLE";

/// Bare name that drops into the debugger instead of being an error.
pub const DEBUGGER_SENTINEL: &str = "vdb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtTag {
    Expr,
    Pass,
    Name,
    AnnAssign,
    Assign,
    If,
    Log,
    Assert,
    Raise,
    For,
    AugAssign,
    Continue,
    Break,
    Return,
}

impl fmt::Display for StmtTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StmtTag::Expr => "expression",
            StmtTag::Pass => "pass",
            StmtTag::Name => "name",
            StmtTag::AnnAssign => "declaration",
            StmtTag::Assign => "assignment",
            StmtTag::If => "if",
            StmtTag::Log => "log",
            StmtTag::Assert => "assert",
            StmtTag::Raise => "raise",
            StmtTag::For => "for",
            StmtTag::AugAssign => "augmented assignment",
            StmtTag::Continue => "continue",
            StmtTag::Break => "break",
            StmtTag::Return => "return",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    #[serde(flatten)]
    pub kind: StmtKind,
    #[serde(default)]
    pub span: SourceSpan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    /// Unconditionally leaves the function.
    #[serde(default)]
    pub is_terminus: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum StmtKind {
    Expr {
        value: Expr,
    },
    Pass,
    Name {
        id: String,
    },
    AnnAssign {
        target: String,
        annotation: Type,
        value: Expr,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
    },
    Log {
        event: EventDef,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        keywords: Vec<Keyword>,
    },
    Assert {
        test: Expr,
        #[serde(default)]
        msg: Option<Expr>,
    },
    Raise {
        #[serde(default)]
        exc: Option<Expr>,
    },
    For {
        target: String,
        target_type: Type,
        iter: Expr,
        body: Vec<Stmt>,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    Continue,
    Break,
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
}

impl StmtKind {
    pub fn tag(&self) -> StmtTag {
        match self {
            StmtKind::Expr { .. } => StmtTag::Expr,
            StmtKind::Pass => StmtTag::Pass,
            StmtKind::Name { .. } => StmtTag::Name,
            StmtKind::AnnAssign { .. } => StmtTag::AnnAssign,
            StmtKind::Assign { .. } => StmtTag::Assign,
            StmtKind::If { .. } => StmtTag::If,
            StmtKind::Log { .. } => StmtTag::Log,
            StmtKind::Assert { .. } => StmtTag::Assert,
            StmtKind::Raise { .. } => StmtTag::Raise,
            StmtKind::For { .. } => StmtTag::For,
            StmtKind::AugAssign { .. } => StmtTag::AugAssign,
            StmtKind::Continue => StmtTag::Continue,
            StmtKind::Break => StmtTag::Break,
            StmtKind::Return { .. } => StmtTag::Return,
        }
    }
}

impl Stmt {
    /// `return` and `raise` are marked as termini, the way the type checker
    /// marks them.
    pub fn new(kind: StmtKind) -> Self {
        let is_terminus = matches!(kind, StmtKind::Return { .. } | StmtKind::Raise { .. });
        Self {
            kind,
            span: SourceSpan::default(),
            source_text: None,
            is_terminus,
        }
    }

    pub fn with_source(mut self, text: impl Into<String>) -> Self {
        self.source_text = Some(text.into());
        self
    }

    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = span;
        self
    }

    pub fn tag(&self) -> StmtTag {
        self.kind.tag()
    }

    pub fn pass() -> Self {
        Self::new(StmtKind::Pass)
    }

    pub fn expr(value: Expr) -> Self {
        Self::new(StmtKind::Expr { value })
    }

    pub fn declare(target: &str, annotation: Type, value: Expr) -> Self {
        Self::new(StmtKind::AnnAssign {
            target: target.to_string(),
            annotation,
            value,
        })
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::new(StmtKind::Assign { target, value })
    }

    pub fn aug_assign(target: Expr, op: BinOp, value: Expr) -> Self {
        Self::new(StmtKind::AugAssign { target, op, value })
    }

    pub fn if_else(test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt>) -> Self {
        Self::new(StmtKind::If { test, body, orelse })
    }

    pub fn for_loop(target: &str, target_type: Type, iter: Expr, body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::For {
            target: target.to_string(),
            target_type,
            iter,
            body,
        })
    }

    pub fn assert(test: Expr, msg: Option<Expr>) -> Self {
        Self::new(StmtKind::Assert { test, msg })
    }

    pub fn raise(exc: Option<Expr>) -> Self {
        Self::new(StmtKind::Raise { exc })
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(StmtKind::Return { value })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub arg: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDef {
    pub name: String,
    pub args: Vec<EventArg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventArg {
    pub name: String,
    pub typ: Type,
    #[serde(default)]
    pub indexed: bool,
}

impl EventDef {
    /// `Transfer(address,address,uint256)`
    pub fn signature(&self) -> String {
        let args: Vec<_> = self.args.iter().map(|a| a.typ.abi_canonical()).collect();
        format!("{}({})", self.name, args.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    Pure,
    View,
    Nonpayable,
    Payable,
}

impl Mutability {
    pub fn is_constant(self) -> bool {
        matches!(self, Mutability::Pure | Mutability::View)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "callee", rename_all = "snake_case")]
pub enum Callee {
    Builtin {
        name: String,
    },
    Internal {
        name: String,
        #[serde(default)]
        effects: FunctionEffects,
    },
    External {
        target: Box<Expr>,
        name: String,
        mutability: Mutability,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(flatten)]
    pub kind: ExprKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<Type>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum ExprKind {
    Int {
        #[serde(with = "int_literal")]
        value: BigInt,
    },
    /// Decimal literal in source notation, e.g. `"3.25"`.
    Decimal {
        value: String,
    },
    Bool {
        value: bool,
    },
    Str {
        value: String,
    },
    Bytes {
        value: Vec<u8>,
    },
    Name {
        id: String,
    },
    /// `self.<id>`
    StateVar {
        id: String,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        op: CmpOp,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
    },
    List {
        elts: Vec<Expr>,
    },
    Tuple {
        elts: Vec<Expr>,
    },
    Call {
        func: Callee,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        keywords: Vec<Keyword>,
    },
}

mod int_literal {
    use num_bigint::BigInt;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BigInt, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(i64),
            Text(String),
        }

        match Repr::deserialize(d)? {
            Repr::Num(n) => Ok(BigInt::from(n)),
            Repr::Text(text) => text.parse::<BigInt>().map_err(de::Error::custom),
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, typ: Option<Type>) -> Self {
        Self {
            kind,
            typ,
            span: SourceSpan::default(),
        }
    }

    pub fn int(value: impl Into<BigInt>, typ: Type) -> Self {
        Self::new(
            ExprKind::Int {
                value: value.into(),
            },
            Some(typ),
        )
    }

    pub fn uint(value: u64) -> Self {
        Self::int(value, Type::uint256())
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ExprKind::Bool { value }, Some(Type::Bool))
    }

    pub fn string(value: &str) -> Self {
        Self::new(
            ExprKind::Str {
                value: value.to_string(),
            },
            Some(Type::String(value.len())),
        )
    }

    pub fn name(id: &str, typ: Type) -> Self {
        Self::new(ExprKind::Name { id: id.to_string() }, Some(typ))
    }

    pub fn state_var(id: &str, typ: Type) -> Self {
        Self::new(ExprKind::StateVar { id: id.to_string() }, Some(typ))
    }

    pub fn unreachable() -> Self {
        Self::new(
            ExprKind::Name {
                id: UNREACHABLE_SENTINEL.to_string(),
            },
            None,
        )
    }

    pub fn subscript(value: Expr, index: Expr, typ: Type) -> Self {
        Self::new(
            ExprKind::Subscript {
                value: Box::new(value),
                index: Box::new(index),
            },
            Some(typ),
        )
    }

    pub fn attribute(value: Expr, attr: &str, typ: Type) -> Self {
        Self::new(
            ExprKind::Attribute {
                value: Box::new(value),
                attr: attr.to_string(),
            },
            Some(typ),
        )
    }

    /// Result type follows the left operand.
    pub fn binop(left: Expr, op: BinOp, right: Expr) -> Self {
        let typ = left.typ.clone();
        Self::new(
            ExprKind::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            typ,
        )
    }

    pub fn compare(left: Expr, op: CmpOp, right: Expr) -> Self {
        Self::new(
            ExprKind::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            Some(Type::Bool),
        )
    }

    pub fn not(operand: Expr) -> Self {
        Self::new(
            ExprKind::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
            Some(Type::Bool),
        )
    }

    pub fn list(elts: Vec<Expr>, typ: Type) -> Self {
        Self::new(ExprKind::List { elts }, Some(typ))
    }

    pub fn tuple(elts: Vec<Expr>) -> Self {
        let typ = elts
            .iter()
            .map(|e| e.typ.clone())
            .collect::<Option<Vec<_>>>()
            .map(Type::Tuple);
        Self::new(ExprKind::Tuple { elts }, typ)
    }

    /// `range(args...)`, optionally with a `bound=` keyword.
    pub fn range(args: Vec<Expr>, bound: Option<Expr>) -> Self {
        let keywords = bound
            .map(|value| {
                vec![Keyword {
                    arg: "bound".to_string(),
                    value,
                }]
            })
            .unwrap_or_default();
        Self::new(
            ExprKind::Call {
                func: Callee::Builtin {
                    name: "range".to_string(),
                },
                args,
                keywords,
            },
            None,
        )
    }

    pub fn builtin_call(name: &str, args: Vec<Expr>, typ: Option<Type>) -> Self {
        Self::new(
            ExprKind::Call {
                func: Callee::Builtin {
                    name: name.to_string(),
                },
                args,
                keywords: Vec::new(),
            },
            typ,
        )
    }

    pub fn internal_call(
        name: &str,
        args: Vec<Expr>,
        effects: FunctionEffects,
        typ: Option<Type>,
    ) -> Self {
        Self::new(
            ExprKind::Call {
                func: Callee::Internal {
                    name: name.to_string(),
                    effects,
                },
                args,
                keywords: Vec::new(),
            },
            typ,
        )
    }

    pub fn resolved_type(&self) -> Result<&Type> {
        self.typ
            .as_ref()
            .ok_or_else(|| LowerError::invariant("expression has no resolved type").with_span(self.span))
    }

    pub fn literal_int(&self) -> Option<&BigInt> {
        match &self.kind {
            ExprKind::Int { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_name(&self, id: &str) -> bool {
        matches!(&self.kind, ExprKind::Name { id: n } if n == id)
    }

    pub fn is_unreachable_sentinel(&self) -> bool {
        self.is_name(UNREACHABLE_SENTINEL)
    }

    /// Name of the called builtin, if this is a builtin call.
    pub fn builtin_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Call {
                func: Callee::Builtin { name },
                ..
            } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Internal,
    External,
    /// `__init__`; the only place immutables may be written.
    Deploy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: String,
    pub typ: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub kind: FunctionKind,
    pub mutability: Mutability,
    #[serde(default)]
    pub args: Vec<Arg>,
    #[serde(default)]
    pub return_type: Option<Type>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVariable {
    pub name: String,
    pub slot: u64,
    pub typ: Type,
    #[serde(default)]
    pub is_constant: bool,
    #[serde(default)]
    pub is_immutable: bool,
    /// Folded value of a constant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Expr>,
}

impl StateVariable {
    pub fn new(name: &str, slot: u64, typ: Type) -> Self {
        Self {
            name: name.to_string(),
            slot,
            typ,
            is_constant: false,
            is_immutable: false,
            value: None,
        }
    }
}

/// Everything needed to lower the functions of one module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDef {
    #[serde(default)]
    pub state_vars: Vec<StateVariable>,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
}
