mod common;

use common::{call, external_fn, lower, returned_words, word, Halt, Machine};
use num_bigint::BigUint;
use pretty_assertions::assert_eq;
use stmtir_core::ast::{EventArg, Keyword};
use stmtir_core::{EventDef, Expr, FunctionDef, FaultKind, ModuleDef, Op, Stmt, StmtKind, Type};
use stmtir_lower::events::event_id;
use stmtir_lower::{lower_function, lower_module, StmtLowerer};

fn transfer() -> EventDef {
    EventDef {
        name: "Transfer".into(),
        args: vec![
            EventArg {
                name: "sender".into(),
                typ: Type::Address,
                indexed: true,
            },
            EventArg {
                name: "amount".into(),
                typ: Type::uint256(),
                indexed: false,
            },
        ],
    }
}

#[test]
fn test_void_function_exits_through_cleanup() {
    let def = external_fn("f", vec![], None, vec![Stmt::pass()]);
    assert_eq!(
        call(&def, &[], &mut Machine::new(), &[]),
        Some(Halt::ExitTo("f_cleanup".into()))
    );
}

#[test]
fn test_implicit_return_appended_once() {
    let body = lower(&external_fn("f", vec![], None, vec![Stmt::pass()]), &[]).body;
    assert_eq!(body.count_op(Op::ExitTo), 1);
    assert_eq!(body.to_string(), "(seq pass (exit_to f_cleanup) pass)");

    let returns = lower(&external_fn("f", vec![], None, vec![Stmt::pass(), Stmt::ret(None)]), &[]).body;
    assert_eq!(returns.count_op(Op::ExitTo), 1);
    assert_eq!(returns.to_string(), "(seq pass (exit_to f_cleanup) pass)");
}

#[test]
fn test_void_branches_that_both_return_get_no_extra_exit() {
    let def = external_fn(
        "f",
        vec![("flag", Type::Bool)],
        None,
        vec![Stmt::if_else(
            Expr::name("flag", Type::Bool),
            vec![Stmt::ret(None)],
            vec![Stmt::ret(None)],
        )],
    );
    let body = lower(&def, &[]).body;
    // one exit per branch, nothing after the `if`
    assert_eq!(body.count_op(Op::ExitTo), 2);
    assert_eq!(body.args.len(), 2);
    assert!(body.args[0].is_op(Op::If));

    let def = external_fn(
        "f",
        vec![("flag", Type::Bool)],
        None,
        vec![Stmt::if_else(
            Expr::name("flag", Type::Bool),
            vec![Stmt::ret(None)],
            vec![Stmt::raise(None)],
        )],
    );
    assert_eq!(lower(&def, &[]).body.count_op(Op::ExitTo), 1);
}

#[test]
fn test_missing_return_is_rejected() {
    let def = external_fn("f", vec![], Some(Type::uint256()), vec![Stmt::pass()]);
    let err = lower_function(&def, &[], &StmtLowerer::default()).unwrap_err();
    assert_eq!(err.kind(), FaultKind::InvariantViolation);
}

#[test]
fn test_return_on_both_branches() {
    let def = external_fn(
        "pick",
        vec![("flag", Type::Bool)],
        Some(Type::uint256()),
        vec![Stmt::if_else(
            Expr::name("flag", Type::Bool),
            vec![Stmt::ret(Some(Expr::uint(1)))],
            vec![Stmt::ret(Some(Expr::uint(2)))],
        )],
    );
    assert_eq!(returned_words(call(&def, &[], &mut Machine::new(), &[1])), vec![1]);
    assert_eq!(returned_words(call(&def, &[], &mut Machine::new(), &[0])), vec![2]);
}

#[test]
fn test_log_splits_topics_and_data() {
    let args = vec![
        Expr::name("who", Type::Address),
        Expr::name("amount", Type::uint256()),
    ];
    let positional = Stmt::new(StmtKind::Log {
        event: transfer(),
        args: args.clone(),
        keywords: vec![],
    });
    // keywords in a different order than the event declares them
    let by_keyword = Stmt::new(StmtKind::Log {
        event: transfer(),
        args: vec![],
        keywords: vec![
            Keyword {
                arg: "amount".into(),
                value: args[1].clone(),
            },
            Keyword {
                arg: "sender".into(),
                value: args[0].clone(),
            },
        ],
    });

    for stmt in [positional, by_keyword] {
        let def = external_fn(
            "emit",
            vec![("who", Type::Address), ("amount", Type::uint256())],
            None,
            vec![stmt],
        );
        let mut machine = Machine::new();
        call(&def, &[], &mut machine, &[0xbeef, 42]);

        assert_eq!(machine.logs.len(), 1);
        let log = &machine.logs[0];
        assert_eq!(
            log.topics,
            vec![event_id(&transfer()).to_biguint().unwrap(), BigUint::from(0xbeefu32)]
        );
        assert_eq!(log.data.len(), 32);
        assert_eq!(word(&log.data, 0), BigUint::from(42u32));
    }
}

#[test]
fn test_function_from_json() {
    let json = r#"{
        "name": "answer",
        "kind": "external",
        "mutability": "pure",
        "return_type": {"uint": 256},
        "body": [
            {"stmt": "ann_assign", "target": "x", "annotation": {"uint": 256},
             "value": {"expr": "int", "value": 41, "typ": {"uint": 256}}},
            {"stmt": "aug_assign", "target": {"expr": "name", "id": "x", "typ": {"uint": 256}},
             "op": "add", "value": {"expr": "int", "value": 1, "typ": {"uint": 256}}},
            {"stmt": "return", "value": {"expr": "name", "id": "x", "typ": {"uint": 256}},
             "is_terminus": true}
        ]
    }"#;
    let def: FunctionDef = serde_json::from_str(json).unwrap();
    assert_eq!(returned_words(call(&def, &[], &mut Machine::new(), &[])), vec![42]);
}

#[test]
fn test_lower_module_stops_at_first_failure() {
    let good = external_fn("good", vec![], None, vec![Stmt::pass()]);
    let bad = external_fn("bad", vec![], Some(Type::uint256()), vec![Stmt::pass()]);

    let module = ModuleDef {
        state_vars: vec![],
        functions: vec![good.clone()],
    };
    let lowered = lower_module(&module, &StmtLowerer::default()).unwrap();
    assert_eq!(lowered.len(), 1);
    assert_eq!(lowered[0].name, "good");

    let module = ModuleDef {
        state_vars: vec![],
        functions: vec![good, bad],
    };
    assert!(lower_module(&module, &StmtLowerer::default()).is_err());
}
