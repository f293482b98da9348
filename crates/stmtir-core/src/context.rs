//! Compile-time state for lowering one function.
//!
//! A `Context` is created per function and dropped when the function's IR is
//! complete. Scopes are entered through closures so the matching exit runs on
//! every path, including when the closure fails.

use crate::ast::{FunctionDef, FunctionKind, Mutability, StateVariable};
use crate::errors::{LowerError, Result};
use crate::ir::{AddrSpace, IrNode, VarRef};
use crate::memory::MemoryAllocator;
use crate::types::Type;
use crate::utils::{MemoryPositions, OrderedSet};
use indexmap::IndexMap;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constancy {
    Mutable,
    Constant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub kind: FunctionKind,
    pub mutability: Mutability,
    pub return_type: Option<Type>,
}

impl FunctionSignature {
    pub fn new(name: &str, kind: FunctionKind, mutability: Mutability) -> Self {
        Self {
            name: name.to_string(),
            kind,
            mutability,
            return_type: None,
        }
    }

    pub fn returns(mut self, typ: Type) -> Self {
        self.return_type = Some(typ);
        self
    }

    pub fn is_internal(&self) -> bool {
        self.kind == FunctionKind::Internal
    }
}

impl From<&FunctionDef> for FunctionSignature {
    fn from(def: &FunctionDef) -> Self {
        Self {
            name: def.name.clone(),
            kind: def.kind,
            mutability: def.mutability,
            return_type: def.return_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableRecord {
    pub name: String,
    pub pos: usize,
    pub size: usize,
    pub typ: Type,
    pub mutable: bool,
    pub is_internal: bool,
    pub location: AddrSpace,
}

impl VariableRecord {
    pub fn var_ref(&self) -> VarRef {
        VarRef::local(self.name.clone(), self.typ.clone())
    }

    pub fn pointer(&self) -> IrNode {
        IrNode::int(self.pos)
            .typed(self.typ.clone())
            .located(self.location)
            .with_var(self.var_ref())
    }
}

#[derive(Debug, Default)]
struct ScopeFrame {
    declared: Vec<String>,
    shadowed: Vec<VariableRecord>,
}

#[derive(Debug)]
pub struct Context {
    vars: IndexMap<String, VariableRecord>,
    block_scopes: Vec<ScopeFrame>,
    internal_scopes: Vec<Vec<String>>,
    memory: MemoryAllocator,
    forvars: OrderedSet<String>,
    constancy: Constancy,
    in_range_expr: bool,
    fresh_counter: usize,
    sig: FunctionSignature,
    state_vars: IndexMap<String, StateVariable>,
}

impl Context {
    pub fn new(sig: FunctionSignature, state_vars: impl IntoIterator<Item = StateVariable>) -> Self {
        let constancy = if sig.mutability.is_constant() {
            Constancy::Constant
        } else {
            Constancy::Mutable
        };

        Self {
            vars: IndexMap::new(),
            block_scopes: Vec::new(),
            internal_scopes: Vec::new(),
            memory: MemoryAllocator::new(MemoryPositions::RESERVED_MEMORY),
            forvars: OrderedSet::new(),
            constancy,
            in_range_expr: false,
            fresh_counter: 0,
            sig,
            state_vars: state_vars
                .into_iter()
                .map(|v| (v.name.clone(), v))
                .collect(),
        }
    }

    /// Context for `def` with its arguments already declared.
    pub fn for_function(def: &FunctionDef, state_vars: &[StateVariable]) -> Result<Self> {
        let mut ctx = Self::new(FunctionSignature::from(def), state_vars.iter().cloned());
        for arg in &def.args {
            ctx.declare_argument(&arg.name, arg.typ.clone())?;
        }
        Ok(ctx)
    }

    pub fn sig(&self) -> &FunctionSignature {
        &self.sig
    }

    pub fn return_type(&self) -> Option<&Type> {
        self.sig.return_type.as_ref()
    }

    pub fn is_internal(&self) -> bool {
        self.sig.is_internal()
    }

    pub fn is_ctor_context(&self) -> bool {
        self.sig.kind == FunctionKind::Deploy
    }

    pub fn constancy(&self) -> Constancy {
        self.constancy
    }

    /// State may not be mutated here.
    pub fn is_constant(&self) -> bool {
        self.constancy == Constancy::Constant || self.in_range_expr
    }

    pub fn in_range_expr(&self) -> bool {
        self.in_range_expr
    }

    pub fn lookup(&self, name: &str) -> Option<&VariableRecord> {
        self.vars.get(name)
    }

    pub fn state_var(&self, name: &str) -> Option<&StateVariable> {
        self.state_vars.get(name)
    }

    pub fn is_forvar(&self, name: &str) -> bool {
        self.forvars.contains(&name.to_string())
    }

    pub fn forvars(&self) -> &OrderedSet<String> {
        &self.forvars
    }

    pub fn memory(&self) -> &MemoryAllocator {
        &self.memory
    }

    /// A name no user identifier can collide with.
    pub fn fresh_varname(&mut self, name: &str) -> String {
        let n = self.fresh_counter;
        self.fresh_counter += 1;
        format!("${}{}", name, n)
    }

    pub fn declare_argument(&mut self, name: &str, typ: Type) -> Result<IrNode> {
        self.insert_variable(name, typ, false, false)
    }

    pub fn new_variable(&mut self, name: &str, typ: Type) -> Result<IrNode> {
        self.insert_variable(name, typ, true, false)
    }

    /// Anonymous scratch buffer, released when the innermost internal memory
    /// scope exits.
    pub fn new_internal_variable(&mut self, typ: Type) -> IrNode {
        let name = self.fresh_varname("internal");
        let size = typ.memory_bytes_required();
        let pos = self.memory.allocate(size);
        trace!(name = %name, pos, size, "new internal variable");

        let record = VariableRecord {
            name: name.clone(),
            pos,
            size,
            typ,
            mutable: true,
            is_internal: true,
            location: AddrSpace::Memory,
        };
        let ptr = record.pointer();
        self.vars.insert(name.clone(), record);
        if let Some(scope) = self.internal_scopes.last_mut() {
            scope.push(name);
        }
        ptr
    }

    fn insert_variable(&mut self, name: &str, typ: Type, mutable: bool, is_internal: bool) -> Result<IrNode> {
        let declared_here = match self.block_scopes.last() {
            Some(frame) => frame.declared.iter().any(|n| n == name),
            None => self.vars.contains_key(name),
        };
        if declared_here {
            return Err(LowerError::invariant(format!(
                "variable `{}` declared twice in the same scope",
                name
            )));
        }

        let size = typ.memory_bytes_required();
        let pos = self.memory.allocate(size);
        trace!(name, pos, size, "new variable");

        let record = VariableRecord {
            name: name.to_string(),
            pos,
            size,
            typ,
            mutable,
            is_internal,
            location: AddrSpace::Memory,
        };
        let ptr = record.pointer();

        let shadowed = self.vars.insert(name.to_string(), record);
        if let Some(frame) = self.block_scopes.last_mut() {
            frame.declared.push(name.to_string());
            frame.shadowed.extend(shadowed);
        }
        Ok(ptr)
    }

    fn release_variable(&mut self, name: &str) {
        if let Some(record) = self.vars.shift_remove(name) {
            self.memory.deallocate(record.pos, record.size);
        }
    }

    /// Variables declared inside `f` are dropped and their memory reclaimed
    /// on exit; shadowed outer variables come back.
    pub fn block_scope<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.block_scopes.push(ScopeFrame::default());
        let ret = f(self);

        if let Some(frame) = self.block_scopes.pop() {
            for name in frame.declared.iter().rev() {
                self.release_variable(name);
            }
            for record in frame.shadowed {
                self.vars.insert(record.name.clone(), record);
            }
        }
        ret
    }

    /// Scratch buffers requested inside `f` are reclaimed on exit.
    pub fn internal_memory_scope<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.internal_scopes.push(Vec::new());
        let ret = f(self);

        if let Some(names) = self.internal_scopes.pop() {
            for name in names.iter().rev() {
                self.release_variable(name);
            }
        }
        ret
    }

    /// Evaluation of `range()` endpoints; state is read-only in here.
    pub fn range_scope<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let prev = std::mem::replace(&mut self.in_range_expr, true);
        let ret = f(self);
        self.in_range_expr = prev;
        ret
    }

    pub fn with_constancy<T, F>(&mut self, constancy: Constancy, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let prev = std::mem::replace(&mut self.constancy, constancy);
        let ret = f(self);
        self.constancy = prev;
        ret
    }

    /// Registers `name` as an active loop variable while `f` runs.
    pub fn with_forvar<T, F>(&mut self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let added = self.forvars.add(name.to_string());
        let ret = f(self);
        if added {
            self.forvars.remove(&name.to_string());
        }
        ret
    }
}
