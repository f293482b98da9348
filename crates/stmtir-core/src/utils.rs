//! Numeric and hashing helpers shared by the lowering passes.

use crate::errors::{LowerError, Result};
use indexmap::IndexSet;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{OnceLock, RwLock};
use tiny_keccak::{Hasher, Keccak};

pub const WORD_SIZE: usize = 32;

/// Memory reserved for system use, not for variables.
pub struct MemoryPositions;

impl MemoryPositions {
    pub const FREE_VAR_SPACE: usize = 0;
    pub const FREE_VAR_SPACE2: usize = 32;
    pub const RESERVED_MEMORY: usize = 64;
}

pub struct SizeLimits;

impl SizeLimits {
    pub const MAX_UINT8: u64 = u8::MAX as u64;

    pub fn max_uint256() -> BigInt {
        (BigInt::one() << 256) - 1
    }

    pub fn ceiling_uint256() -> BigInt {
        BigInt::one() << 256
    }
}

/// Decimal values are fixed point with this many fractional digits.
pub const MAX_DECIMAL_PLACES: u32 = 10;

pub fn decimal_divisor() -> BigInt {
    BigInt::from(10u64.pow(MAX_DECIMAL_PLACES))
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut out = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut out);
    out
}

fn selector_cache() -> &'static RwLock<HashMap<String, [u8; 4]>> {
    static CACHE: OnceLock<RwLock<HashMap<String, [u8; 4]>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// 4-byte method id of a canonical signature such as `Error(string)`.
///
/// Entries are never invalidated, so the cache is safe to share between
/// concurrent lowerings.
pub fn method_id(signature: &str) -> [u8; 4] {
    if let Ok(cache) = selector_cache().read() {
        if let Some(id) = cache.get(signature) {
            return *id;
        }
    }

    let hash = keccak256(signature.as_bytes());
    let id = [hash[0], hash[1], hash[2], hash[3]];

    if let Ok(mut cache) = selector_cache().write() {
        cache.insert(signature.to_string(), id);
    }
    id
}

pub fn method_id_int(signature: &str) -> u32 {
    fourbytes_to_int(&method_id(signature))
}

pub fn fourbytes_to_int(bytes: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*bytes)
}

pub fn int_to_fourbytes(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

pub fn bytes_to_int(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Lowest multiple of 32 that is >= `x`.
pub fn ceil32(x: usize) -> usize {
    if x % 32 == 0 {
        x
    } else {
        x + 32 - (x % 32)
    }
}

fn check_width(bits: u16) -> Result<usize> {
    if bits == 0 || bits > 256 {
        return Err(LowerError::invariant(format!("invalid integer width {}", bits)));
    }
    Ok(bits as usize)
}

/// `int_bounds(true, 8)` is `(-128, 127)`, `int_bounds(false, 8)` is `(0, 255)`.
pub fn int_bounds(signed: bool, bits: u16) -> Result<(BigInt, BigInt)> {
    let bits = check_width(bits)?;
    Ok(if signed {
        let half = BigInt::one() << (bits - 1);
        (-half.clone(), half - 1)
    } else {
        (BigInt::zero(), (BigInt::one() << bits) - 1)
    })
}

pub fn signed_to_unsigned(value: &BigInt, bits: u16) -> BigInt {
    if value.sign() == Sign::Minus {
        value + (BigInt::one() << bits as usize)
    } else {
        value.clone()
    }
}

pub fn unsigned_to_signed(value: &BigInt, bits: u16) -> Result<BigInt> {
    Ok(reinterpret_signed(value, check_width(bits)?))
}

fn reinterpret_signed(value: &BigInt, bits: usize) -> BigInt {
    let half = BigInt::one() << (bits - 1);
    if *value >= half {
        value - (BigInt::one() << bits)
    } else {
        value.clone()
    }
}

pub fn wrap256(value: &BigInt, signed: bool) -> BigInt {
    let modulus = SizeLimits::ceiling_uint256();
    let mut ret = value % &modulus;
    if ret.sign() == Sign::Minus {
        ret += &modulus;
    }
    if signed {
        reinterpret_signed(&ret, 256)
    } else {
        ret
    }
}

pub fn is_power_of_two(n: &BigUint) -> bool {
    !n.is_zero() && (n & &(n - 1u32)).is_zero()
}

pub fn int_log2(n: &BigUint) -> u64 {
    n.bits().saturating_sub(1)
}

/// Minimal insertion-ordered set. Iteration order is the order items were
/// first added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedSet<T: Hash + Eq> {
    items: IndexSet<T>,
}

impl<T: Hash + Eq> Default for OrderedSet<T> {
    fn default() -> Self {
        Self {
            items: IndexSet::new(),
        }
    }
}

impl<T: Hash + Eq> OrderedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the item was already present.
    pub fn add(&mut self, item: T) -> bool {
        self.items.insert(item)
    }

    pub fn remove(&mut self, item: &T) -> bool {
        self.items.shift_remove(item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn is_disjoint(&self, other: &OrderedSet<T>) -> bool {
        self.items.is_disjoint(&other.items)
    }
}

impl<T: Hash + Eq> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T: Hash + Eq> Extend<T> for OrderedSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<T: Hash + Eq> IntoIterator for OrderedSet<T> {
    type Item = T;
    type IntoIter = indexmap::set::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
