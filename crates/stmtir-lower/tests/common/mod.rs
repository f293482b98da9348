//! A small interpreter for lowered IR, enough to execute function bodies
//! that only touch memory, storage and logs.

#![allow(dead_code)]

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive, Zero};
use std::collections::HashMap;
use stmtir_core::ast::Arg;
use stmtir_core::{
    FunctionDef, FunctionKind, IrNode, IrValue, Mutability, Op, StateVariable, Stmt, Type,
};
use stmtir_lower::{lower_function, LoweredFunction, StmtLowerer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    Revert(Vec<u8>),
    Return(Vec<u8>),
    ExitTo(String),
    Invalid,
    AssertFailed(Option<String>),
    Break,
    Continue,
}

type Flow<T> = Result<T, Halt>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub topics: Vec<BigUint>,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Machine {
    pub memory: Vec<u8>,
    pub storage: HashMap<BigUint, BigUint>,
    pub logs: Vec<LogRecord>,
    env: Vec<(String, BigUint)>,
}

fn modulus() -> BigUint {
    BigUint::one() << 256
}

fn wrap(value: &BigInt) -> BigUint {
    let m = BigInt::from_biguint(Sign::Plus, modulus());
    let mut v = value % &m;
    if v.sign() == Sign::Minus {
        v += &m;
    }
    v.to_biguint().unwrap()
}

fn signed(value: &BigUint) -> BigInt {
    let v = BigInt::from_biguint(Sign::Plus, value.clone());
    if value.bit(255) {
        v - BigInt::from_biguint(Sign::Plus, modulus())
    } else {
        v
    }
}

fn flag(b: bool) -> BigUint {
    if b {
        BigUint::one()
    } else {
        BigUint::zero()
    }
}

fn as_usize(v: &BigUint) -> usize {
    v.to_usize().expect("address out of range")
}

fn symbol_of(node: &IrNode) -> String {
    node.as_symbol()
        .unwrap_or_else(|| panic!("expected a symbol, got `{}`", node))
        .to_string()
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(&mut self, end: usize) {
        if self.memory.len() < end {
            self.memory.resize(end, 0);
        }
    }

    pub fn mload(&mut self, pos: usize) -> BigUint {
        self.ensure(pos + 32);
        BigUint::from_bytes_be(&self.memory[pos..pos + 32])
    }

    pub fn mstore(&mut self, pos: usize, value: &BigUint) {
        self.ensure(pos + 32);
        let bytes = value.to_bytes_be();
        let word = &mut self.memory[pos..pos + 32];
        word.fill(0);
        word[32 - bytes.len()..].copy_from_slice(&bytes);
    }

    pub fn mstore_u64(&mut self, pos: usize, value: u64) {
        self.mstore(pos, &BigUint::from(value));
    }

    pub fn sstore_u64(&mut self, slot: u64, value: u64) {
        self.storage.insert(BigUint::from(slot), BigUint::from(value));
    }

    pub fn sload(&self, slot: u64) -> BigUint {
        self.storage.get(&BigUint::from(slot)).cloned().unwrap_or_default()
    }

    fn read(&mut self, pos: usize, len: usize) -> Vec<u8> {
        self.ensure(pos + len);
        self.memory[pos..pos + len].to_vec()
    }

    /// Runs `node`; `None` means execution fell off the end.
    pub fn execute(&mut self, node: &IrNode) -> Option<Halt> {
        self.run(node).err()
    }

    fn eval(&mut self, node: &IrNode) -> Flow<BigUint> {
        match self.run(node)? {
            Some(v) => Ok(v),
            None => panic!("`{}` produced no value", node),
        }
    }

    fn lookup(&self, name: &str) -> BigUint {
        self.env
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| panic!("unbound symbol `{}`", name))
    }

    fn binary(&mut self, node: &IrNode, f: impl Fn(&BigUint, &BigUint) -> BigUint) -> Flow<Option<BigUint>> {
        let a = self.eval(&node.args[0])?;
        let b = self.eval(&node.args[1])?;
        Ok(Some(f(&a, &b)))
    }

    fn run(&mut self, node: &IrNode) -> Flow<Option<BigUint>> {
        let op = match &node.value {
            IrValue::Int(v) => return Ok(Some(wrap(v))),
            IrValue::Symbol(s) => return Ok(Some(self.lookup(s))),
            IrValue::Op(op) => *op,
        };
        let m = modulus();

        match op {
            Op::Seq => {
                let mut last = None;
                for arg in &node.args {
                    last = self.run(arg)?;
                }
                Ok(last)
            }
            Op::If => {
                let cond = self.eval(&node.args[0])?;
                if !cond.is_zero() {
                    self.run(&node.args[1])
                } else if node.args.len() == 3 {
                    self.run(&node.args[2])
                } else {
                    Ok(None)
                }
            }
            Op::With => {
                let name = symbol_of(&node.args[0]);
                let value = self.eval(&node.args[1])?;
                self.env.push((name, value));
                let ret = self.run(&node.args[2]);
                self.env.pop();
                ret
            }
            Op::Set => {
                let name = symbol_of(&node.args[0]);
                let value = self.eval(&node.args[1])?;
                let slot = self
                    .env
                    .iter_mut()
                    .rev()
                    .find(|(n, _)| *n == name)
                    .unwrap_or_else(|| panic!("set of unbound `{}`", name));
                slot.1 = value;
                Ok(None)
            }
            Op::Repeat => {
                let name = symbol_of(&node.args[0]);
                let start = self.eval(&node.args[1])?;
                let rounds = self.eval(&node.args[2])?;
                let bound = self.eval(&node.args[3])?;
                if rounds > bound {
                    return Err(Halt::AssertFailed(node.error_msg.clone()));
                }
                let rounds = rounds.to_u64().expect("round count");
                for k in 0..rounds {
                    self.env.push((name.clone(), (&start + BigUint::from(k)) % &m));
                    let ret = self.run(&node.args[4]);
                    self.env.pop();
                    match ret {
                        Ok(_) | Err(Halt::Continue) => {}
                        Err(Halt::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(None)
            }
            Op::Break => Err(Halt::Break),
            Op::Continue => Err(Halt::Continue),
            Op::Pass | Op::Debugger => Ok(None),
            Op::Pop => {
                self.run(&node.args[0])?;
                Ok(None)
            }
            Op::ExitTo => Err(Halt::ExitTo(symbol_of(&node.args[0]))),
            Op::Return | Op::Revert => {
                let ofs = as_usize(&self.eval(&node.args[0])?);
                let len = as_usize(&self.eval(&node.args[1])?);
                let data = self.read(ofs, len);
                Err(if op == Op::Return {
                    Halt::Return(data)
                } else {
                    Halt::Revert(data)
                })
            }
            Op::Invalid => Err(Halt::Invalid),
            Op::Assert | Op::AssertUnreachable => {
                if self.eval(&node.args[0])?.is_zero() {
                    Err(Halt::AssertFailed(node.error_msg.clone()))
                } else {
                    Ok(None)
                }
            }
            Op::Mstore => {
                let pos = as_usize(&self.eval(&node.args[0])?);
                let value = self.eval(&node.args[1])?;
                self.mstore(pos, &value);
                Ok(None)
            }
            Op::Mload => {
                let pos = as_usize(&self.eval(&node.args[0])?);
                Ok(Some(self.mload(pos)))
            }
            Op::Sstore => {
                let slot = self.eval(&node.args[0])?;
                let value = self.eval(&node.args[1])?;
                self.storage.insert(slot, value);
                Ok(None)
            }
            Op::Sload => {
                let slot = self.eval(&node.args[0])?;
                Ok(Some(self.storage.get(&slot).cloned().unwrap_or_default()))
            }
            Op::Mcopy => {
                let dst = as_usize(&self.eval(&node.args[0])?);
                let src = as_usize(&self.eval(&node.args[1])?);
                let len = as_usize(&self.eval(&node.args[2])?);
                let data = self.read(src, len);
                self.ensure(dst + len);
                self.memory[dst..dst + len].copy_from_slice(&data);
                Ok(None)
            }
            Op::Add => self.binary(node, |a, b| (a + b) % &m),
            Op::Sub => self.binary(node, |a, b| (a + &m - b) % &m),
            Op::Mul => self.binary(node, |a, b| (a * b) % &m),
            Op::Div => self.binary(node, |a, b| if b.is_zero() { BigUint::zero() } else { a / b }),
            Op::Mod => self.binary(node, |a, b| if b.is_zero() { BigUint::zero() } else { a % b }),
            Op::Sdiv => self.binary(node, |a, b| {
                if b.is_zero() {
                    BigUint::zero()
                } else {
                    wrap(&(signed(a) / signed(b)))
                }
            }),
            Op::Smod => self.binary(node, |a, b| {
                if b.is_zero() {
                    BigUint::zero()
                } else {
                    wrap(&(signed(a) % signed(b)))
                }
            }),
            Op::Exp => self.binary(node, |a, b| a.modpow(b, &m)),
            Op::And => self.binary(node, |a, b| a & b),
            Op::Or => self.binary(node, |a, b| a | b),
            Op::Xor => self.binary(node, |a, b| a ^ b),
            Op::Shl => self.binary(node, |s, v| match s.to_usize() {
                Some(s) if s < 256 => (v << s) % &m,
                _ => BigUint::zero(),
            }),
            Op::Shr => self.binary(node, |s, v| match s.to_usize() {
                Some(s) if s < 256 => v >> s,
                _ => BigUint::zero(),
            }),
            Op::Sar => self.binary(node, |s, v| {
                let s = s.to_usize().unwrap_or(256).min(255);
                wrap(&(signed(v) >> s))
            }),
            Op::Not => {
                let a = self.eval(&node.args[0])?;
                Ok(Some(&m - BigUint::one() - a))
            }
            Op::Iszero => {
                let a = self.eval(&node.args[0])?;
                Ok(Some(flag(a.is_zero())))
            }
            Op::Eq => self.binary(node, |a, b| flag(a == b)),
            Op::Ne => self.binary(node, |a, b| flag(a != b)),
            Op::Lt => self.binary(node, |a, b| flag(a < b)),
            Op::Gt => self.binary(node, |a, b| flag(a > b)),
            Op::Le => self.binary(node, |a, b| flag(a <= b)),
            Op::Ge => self.binary(node, |a, b| flag(a >= b)),
            Op::Slt => self.binary(node, |a, b| flag(signed(a) < signed(b))),
            Op::Sgt => self.binary(node, |a, b| flag(signed(a) > signed(b))),
            Op::Sle => self.binary(node, |a, b| flag(signed(a) <= signed(b))),
            Op::Sge => self.binary(node, |a, b| flag(signed(a) >= signed(b))),
            Op::Select => {
                let cond = self.eval(&node.args[0])?;
                let a = self.eval(&node.args[1])?;
                let b = self.eval(&node.args[2])?;
                Ok(Some(if cond.is_zero() { b } else { a }))
            }
            Op::Log => {
                let ofs = as_usize(&self.eval(&node.args[0])?);
                let len = as_usize(&self.eval(&node.args[1])?);
                let mut topics = Vec::new();
                for topic in &node.args[2..] {
                    topics.push(self.eval(topic)?);
                }
                let data = self.read(ofs, len);
                self.logs.push(LogRecord { topics, data });
                Ok(None)
            }
            other => panic!("interpreter does not model `{}`", other),
        }
    }
}

/// The 32-byte word at byte offset `at`.
pub fn word(data: &[u8], at: usize) -> BigUint {
    BigUint::from_bytes_be(&data[at..at + 32])
}

pub fn word_u64(data: &[u8], at: usize) -> u64 {
    word(data, at).to_u64().expect("word fits in u64")
}

/// Decode `Error(string)` revert data.
pub fn decode_revert_reason(data: &[u8]) -> String {
    assert_eq!(&data[..4], &[0x08, 0xc3, 0x79, 0xa0], "not an Error(string) payload");
    let body = &data[4..];
    let ofs = word_u64(body, 0) as usize;
    let len = word_u64(body, ofs) as usize;
    String::from_utf8(body[ofs + 32..ofs + 32 + len].to_vec()).expect("utf-8 reason")
}

pub fn external_fn(name: &str, args: Vec<(&str, Type)>, return_type: Option<Type>, body: Vec<Stmt>) -> FunctionDef {
    FunctionDef {
        name: name.to_string(),
        kind: FunctionKind::External,
        mutability: Mutability::Nonpayable,
        args: args
            .into_iter()
            .map(|(name, typ)| Arg {
                name: name.to_string(),
                typ,
            })
            .collect(),
        return_type,
        body,
    }
}

pub fn lower(def: &FunctionDef, state_vars: &[StateVariable]) -> LoweredFunction {
    lower_function(def, state_vars, &StmtLowerer::default()).expect("function lowers")
}

/// Lower and run `def`; arguments are written to memory in declaration order.
pub fn call(def: &FunctionDef, state_vars: &[StateVariable], machine: &mut Machine, args: &[u64]) -> Option<Halt> {
    let lowered = lower(def, state_vars);
    for (i, value) in args.iter().enumerate() {
        machine.mstore_u64(64 + 32 * i, *value);
    }
    machine.execute(&lowered.body)
}

/// Expect a `return` of single words and decode them.
pub fn returned_words(halt: Option<Halt>) -> Vec<u64> {
    match halt {
        Some(Halt::Return(data)) => (0..data.len() / 32).map(|i| word_u64(&data, 32 * i)).collect(),
        other => panic!("expected a return, got {:?}", other),
    }
}
