/*! Parse s-expression IR text back into `IrNode` trees.
 *
 * Reads what the emitter writes: `;;` comment lines are skipped and `<type>` suffixes become the
 * node's resolved type. Annotations, error messages and effects are not part of the text form, so
 * a round trip preserves the tree's structure and types only.
 */

use num_bigint::BigInt;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use std::path::Path;
use stmtir_core::{IrNode, Op, Type};
use thiserror::Error;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct IrParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("syntax error\n{0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),
    #[error("unknown operator `{name}` at line {line}")]
    UnknownOp { name: String, line: usize },
    #[error("invalid {what} `{text}` at line {line}")]
    InvalidLiteral {
        what: &'static str,
        text: String,
        line: usize,
    },
    #[error("malformed parse tree: expected {0}")]
    Malformed(&'static str),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ParseResult<T> = Result<T, ParseError>;

pub fn parse_ir(input: &str) -> ParseResult<IrNode> {
    let mut pairs = IrParser::parse(Rule::program, input).map_err(Box::new)?;
    let program = next(&mut pairs, "program")?;
    build_node(next(&mut program.into_inner(), "node")?)
}

pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<IrNode> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_ir(&text)
}

pub fn check(input: &str) -> bool {
    parse_ir(input).is_ok()
}

fn next<'i>(pairs: &mut Pairs<'i, Rule>, what: &'static str) -> ParseResult<Pair<'i, Rule>> {
    pairs.next().ok_or(ParseError::Malformed(what))
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn build_node(pair: Pair<Rule>) -> ParseResult<IrNode> {
    let mut inner = pair.into_inner();
    let body = next(&mut inner, "list or atom")?;
    let mut node = match body.as_rule() {
        Rule::list => build_list(body)?,
        Rule::atom => build_atom(next(&mut body.into_inner(), "int or word")?)?,
        _ => return Err(ParseError::Malformed("list or atom")),
    };
    if let Some(suffix) = inner.next() {
        node.typ = Some(build_type(next(&mut suffix.into_inner(), "type")?)?);
    }
    Ok(node)
}

fn build_list(pair: Pair<Rule>) -> ParseResult<IrNode> {
    let mut inner = pair.into_inner();
    let head = next(&mut inner, "operator")?;
    let op = Op::from_name(head.as_str()).ok_or_else(|| ParseError::UnknownOp {
        name: head.as_str().to_string(),
        line: line_of(&head),
    })?;
    let args = inner.map(build_node).collect::<ParseResult<Vec<_>>>()?;
    Ok(IrNode::op(op, args))
}

/// A bare operator name is that operator with no arguments; any other word
/// is a symbol.
fn build_atom(pair: Pair<Rule>) -> ParseResult<IrNode> {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::int => text
            .parse::<BigInt>()
            .map(IrNode::int)
            .map_err(|_| invalid("integer", &pair)),
        Rule::word => Ok(match Op::from_name(text) {
            Some(op) => IrNode::op(op, Vec::new()),
            None => IrNode::symbol(text),
        }),
        _ => Err(ParseError::Malformed("int or word")),
    }
}

fn invalid(what: &'static str, pair: &Pair<Rule>) -> ParseError {
    ParseError::InvalidLiteral {
        what,
        text: pair.as_str().to_string(),
        line: line_of(pair),
    }
}

fn build_size(pair: Pair<Rule>) -> ParseResult<usize> {
    pair.as_str().parse().map_err(|_| invalid("size", &pair))
}

fn build_type(pair: Pair<Rule>) -> ParseResult<Type> {
    let mut inner = pair.into_inner();
    let base = next(&mut inner, "type")?;
    let mut typ = match base.as_rule() {
        Rule::prim_ty => build_prim(&base)?,
        Rule::string_ty => Type::String(build_size(next(&mut base.into_inner(), "size")?)?),
        Rule::bytes_ty => Type::Bytes(build_size(next(&mut base.into_inner(), "size")?)?),
        Rule::dyn_array => {
            let mut parts = base.into_inner();
            let elem = build_type(next(&mut parts, "element type")?)?;
            Type::darray(elem, build_size(next(&mut parts, "size")?)?)
        }
        Rule::tuple_ty => Type::Tuple(base.into_inner().map(build_type).collect::<ParseResult<_>>()?),
        _ => return Err(ParseError::Malformed("type")),
    };
    for dim in inner {
        typ = Type::sarray(typ, build_size(next(&mut dim.into_inner(), "size")?)?);
    }
    Ok(typ)
}

fn build_prim(pair: &Pair<Rule>) -> ParseResult<Type> {
    let text = pair.as_str();
    let bits = |digits: &str| digits.parse::<u16>().map_err(|_| invalid("type", pair));
    match text {
        "bool" => Ok(Type::Bool),
        "address" => Ok(Type::Address),
        "decimal" => Ok(Type::Decimal),
        _ => {
            if let Some(digits) = text.strip_prefix("uint") {
                Ok(Type::Uint(bits(digits)?))
            } else if let Some(digits) = text.strip_prefix("int") {
                Ok(Type::Int(bits(digits)?))
            } else if let Some(digits) = text.strip_prefix("bytes") {
                match digits.parse::<u8>() {
                    Ok(n) if (1..=32).contains(&n) => Ok(Type::BytesM(n)),
                    _ => Err(invalid("type", pair)),
                }
            } else {
                Err(invalid("type", pair))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_atoms() {
        assert_eq!(parse_ir("64").unwrap(), IrNode::int(64));
        assert_eq!(parse_ir("-1").unwrap(), IrNode::int(-1));
        assert_eq!(parse_ir("$range_ix0").unwrap(), IrNode::symbol("$range_ix0"));
        assert_eq!(parse_ir("pass").unwrap(), IrNode::pass());
    }

    #[test]
    fn test_nested_list_with_comments() {
        let text = "
            ;; x = y
            (seq
                (mstore 64 (mload 96)) ; trailing
                pass)
        ";
        assert_eq!(
            parse_ir(text).unwrap().to_string(),
            "(seq (mstore 64 (mload 96)) pass)"
        );
    }

    #[test]
    fn test_type_suffixes() {
        let node = parse_ir("(mload 64)<uint256[2][3]>").unwrap();
        assert_eq!(node.typ, Some(Type::sarray(Type::sarray(Type::uint256(), 2), 3)));

        let node = parse_ir("64<(String[5], DynArray[bytes32, 4], bool)>").unwrap();
        assert_eq!(
            node.typ,
            Some(Type::Tuple(vec![
                Type::String(5),
                Type::darray(Type::BytesM(32), 4),
                Type::Bool,
            ]))
        );
    }

    #[test]
    fn test_unknown_operator() {
        match parse_ir("(seq\n  (jumpdest 1))") {
            Err(ParseError::UnknownOp { name, line }) => {
                assert_eq!(name, "jumpdest");
                assert_eq!(line, 2);
            }
            other => panic!("expected unknown operator, got {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors() {
        assert!(!check("(seq pass"));
        assert!(!check("(64 pass)"));
        assert!(!check("pass pass"));
        assert!(matches!(parse_ir("1<bytes33>"), Err(ParseError::InvalidLiteral { .. })));
    }
}
