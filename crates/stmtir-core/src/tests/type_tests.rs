use crate::types::{StructType, Type};
use pretty_assertions::assert_eq;

#[test]
fn test_memory_footprints() {
    assert_eq!(Type::uint256().memory_bytes_required(), 32);
    assert_eq!(Type::String(5).memory_bytes_required(), 64);
    assert_eq!(Type::Bytes(64).memory_bytes_required(), 96);
    assert_eq!(Type::sarray(Type::uint256(), 3).memory_bytes_required(), 96);
    assert_eq!(Type::darray(Type::uint256(), 4).memory_bytes_required(), 160);
    assert_eq!(
        Type::Tuple(vec![Type::Bool, Type::sarray(Type::Address, 2)]).memory_bytes_required(),
        96
    );
}

#[test]
fn test_exact_size_buffer() {
    let typ = Type::for_exact_size(128);
    assert_eq!(typ, Type::Bytes(96));
    assert_eq!(typ.memory_bytes_required(), 128);
}

#[test]
fn test_abi_sizes() {
    let reason = Type::Tuple(vec![Type::String(7)]);
    assert!(reason.abi_is_dynamic());
    assert_eq!(reason.abi_static_size(), 32);
    assert_eq!(reason.abi_size_bound(), 32 + 32 + 32);

    let pair = Type::Tuple(vec![Type::uint256(), Type::Bool]);
    assert!(!pair.abi_is_dynamic());
    assert_eq!(pair.abi_size_bound(), 64);

    let arr = Type::darray(Type::uint256(), 4);
    assert_eq!(arr.abi_size_bound(), 32 + 4 * 32);
}

#[test]
fn test_canonical_names() {
    let point = Type::Struct(StructType {
        name: "Point".into(),
        members: vec![("x".into(), Type::int256()), ("y".into(), Type::int256())],
    });
    assert_eq!(point.abi_canonical(), "(int256,int256)");
    assert_eq!(point.member_index("y"), Some(1));
    assert_eq!(Type::darray(Type::Address, 3).abi_canonical(), "address[]");
    assert_eq!(Type::darray(Type::Address, 3).to_string(), "DynArray[address, 3]");
    assert_eq!(Type::sarray(Type::BytesM(4), 2).to_string(), "bytes4[2]");
}

#[test]
fn test_word_classification() {
    assert!(Type::Decimal.is_prim_word());
    assert!(Type::Decimal.is_signed());
    assert!(!Type::String(1).is_prim_word());
    assert!(Type::String(1).is_dynamic_length());
    assert!(!Type::sarray(Type::Bool, 2).is_dynamic_length());
    assert_eq!(Type::sarray(Type::Bool, 2).word_count(), 2);
}
