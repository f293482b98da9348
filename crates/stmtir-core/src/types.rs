use crate::utils::{ceil32, WORD_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolved semantic type, as attached by the type checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Bool,
    Uint(u16),
    Int(u16),
    Address,
    /// `bytes1` .. `bytes32`
    BytesM(u8),
    Decimal,
    /// `String[N]`, N is the maximum length in bytes.
    String(usize),
    /// `Bytes[N]`
    Bytes(usize),
    /// `T[N]`
    SArray(Box<Type>, usize),
    /// `DynArray[T, N]`
    DArray(Box<Type>, usize),
    Tuple(Vec<Type>),
    Struct(StructType),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub members: Vec<(String, Type)>,
}

impl Type {
    pub fn uint256() -> Self {
        Type::Uint(256)
    }

    pub fn int256() -> Self {
        Type::Int(256)
    }

    pub fn sarray(elem: Type, count: usize) -> Self {
        Type::SArray(Box::new(elem), count)
    }

    pub fn darray(elem: Type, count: usize) -> Self {
        Type::DArray(Box::new(elem), count)
    }

    /// Smallest `Bytes[..]` occupying exactly `n_bytes` of memory.
    pub fn for_exact_size(n_bytes: usize) -> Self {
        Type::Bytes(n_bytes.saturating_sub(WORD_SIZE))
    }

    /// Fits in a single 32-byte word.
    pub fn is_prim_word(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::Uint(_) | Type::Int(_) | Type::Address | Type::BytesM(_) | Type::Decimal
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Int(_) | Type::Decimal)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Uint(_) | Type::Int(_))
    }

    pub fn is_bytestring(&self) -> bool {
        matches!(self, Type::String(_) | Type::Bytes(_))
    }

    pub fn bits(&self) -> Option<u16> {
        match self {
            Type::Uint(bits) | Type::Int(bits) => Some(*bits),
            Type::Decimal => Some(168),
            Type::Address => Some(160),
            Type::Bool => Some(1),
            _ => None,
        }
    }

    /// Element type of a sequence.
    pub fn value_type(&self) -> Option<&Type> {
        match self {
            Type::SArray(elem, _) | Type::DArray(elem, _) => Some(elem),
            _ => None,
        }
    }

    /// Static capacity of a sequence (maximum length for dynamic ones).
    pub fn count(&self) -> Option<usize> {
        match self {
            Type::SArray(_, n) | Type::DArray(_, n) | Type::String(n) | Type::Bytes(n) => Some(*n),
            Type::Tuple(members) => Some(members.len()),
            Type::Struct(st) => Some(st.members.len()),
            _ => None,
        }
    }

    pub fn is_dynamic_length(&self) -> bool {
        matches!(self, Type::DArray(..)) || self.is_bytestring()
    }

    pub fn tuple_members(&self) -> Option<Vec<&Type>> {
        match self {
            Type::Tuple(members) => Some(members.iter().collect()),
            Type::Struct(st) => Some(st.members.iter().map(|(_, t)| t).collect()),
            _ => None,
        }
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        match self {
            Type::Struct(st) => st.members.iter().position(|(n, _)| n == name),
            _ => None,
        }
    }

    pub fn memory_bytes_required(&self) -> usize {
        match self {
            t if t.is_prim_word() => WORD_SIZE,
            Type::String(n) | Type::Bytes(n) => WORD_SIZE + ceil32(*n),
            Type::SArray(elem, n) => elem.memory_bytes_required() * n,
            Type::DArray(elem, n) => WORD_SIZE + elem.memory_bytes_required() * n,
            Type::Tuple(members) => members.iter().map(Type::memory_bytes_required).sum(),
            Type::Struct(st) => st.members.iter().map(|(_, t)| t.memory_bytes_required()).sum(),
            _ => WORD_SIZE,
        }
    }

    /// Size in words; a word is 32 bytes in memory and one slot in storage.
    pub fn word_count(&self) -> usize {
        self.memory_bytes_required() / WORD_SIZE
    }

    pub fn abi_is_dynamic(&self) -> bool {
        match self {
            Type::String(_) | Type::Bytes(_) | Type::DArray(..) => true,
            Type::SArray(elem, _) => elem.abi_is_dynamic(),
            Type::Tuple(members) => members.iter().any(Type::abi_is_dynamic),
            Type::Struct(st) => st.members.iter().any(|(_, t)| t.abi_is_dynamic()),
            _ => false,
        }
    }

    /// Size of the head section when encoded standalone.
    pub fn abi_static_size(&self) -> usize {
        match self {
            t if t.is_prim_word() => WORD_SIZE,
            Type::String(_) | Type::Bytes(_) | Type::DArray(..) => 0,
            Type::SArray(elem, n) => elem.abi_embedded_static_size() * n,
            Type::Tuple(members) => members.iter().map(Type::abi_embedded_static_size).sum(),
            Type::Struct(st) => st
                .members
                .iter()
                .map(|(_, t)| t.abi_embedded_static_size())
                .sum(),
            _ => WORD_SIZE,
        }
    }

    /// Head size when embedded in a parent tuple: dynamic members take one
    /// offset word.
    pub fn abi_embedded_static_size(&self) -> usize {
        if self.abi_is_dynamic() {
            WORD_SIZE
        } else {
            self.abi_static_size()
        }
    }

    pub fn abi_dynamic_size_bound(&self) -> usize {
        match self {
            Type::String(n) | Type::Bytes(n) => WORD_SIZE + ceil32(*n),
            Type::DArray(elem, n) => {
                WORD_SIZE + n * (elem.abi_embedded_static_size() + elem.abi_dynamic_size_bound())
            }
            Type::SArray(elem, n) => n * elem.abi_dynamic_size_bound(),
            Type::Tuple(members) => members.iter().map(Type::abi_dynamic_size_bound).sum(),
            Type::Struct(st) => st
                .members
                .iter()
                .map(|(_, t)| t.abi_dynamic_size_bound())
                .sum(),
            _ => 0,
        }
    }

    /// Upper bound on the encoded size of a value of this type.
    pub fn abi_size_bound(&self) -> usize {
        self.abi_static_size() + self.abi_dynamic_size_bound()
    }

    /// Canonical ABI type name, as used in selectors and event ids.
    pub fn abi_canonical(&self) -> String {
        match self {
            Type::Bool => "bool".to_string(),
            Type::Uint(bits) => format!("uint{}", bits),
            Type::Int(bits) => format!("int{}", bits),
            Type::Address => "address".to_string(),
            Type::BytesM(n) => format!("bytes{}", n),
            Type::Decimal => "int168".to_string(),
            Type::String(_) => "string".to_string(),
            Type::Bytes(_) => "bytes".to_string(),
            Type::SArray(elem, n) => format!("{}[{}]", elem.abi_canonical(), n),
            Type::DArray(elem, _) => format!("{}[]", elem.abi_canonical()),
            Type::Tuple(members) => format!(
                "({})",
                members
                    .iter()
                    .map(Type::abi_canonical)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Type::Struct(st) => format!(
                "({})",
                st.members
                    .iter()
                    .map(|(_, t)| t.abi_canonical())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Uint(bits) => write!(f, "uint{}", bits),
            Type::Int(bits) => write!(f, "int{}", bits),
            Type::Address => write!(f, "address"),
            Type::BytesM(n) => write!(f, "bytes{}", n),
            Type::Decimal => write!(f, "decimal"),
            Type::String(n) => write!(f, "String[{}]", n),
            Type::Bytes(n) => write!(f, "Bytes[{}]", n),
            Type::SArray(elem, n) => write!(f, "{}[{}]", elem, n),
            Type::DArray(elem, n) => write!(f, "DynArray[{}, {}]", elem, n),
            Type::Tuple(members) => write!(
                f,
                "({})",
                members
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Type::Struct(st) => write!(f, "{}", st.name),
        }
    }
}
