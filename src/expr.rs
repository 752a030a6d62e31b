//! Condition expressions for `<if expr="...">`.
//!
//! The evaluator only needs an [`ExpressionEngine`]: compile source text into
//! a program, run it against a scope. [`BuiltinEngine`] covers what
//! statement definitions typically need:
//!
//! ```text
//! {name} != nil && len(name) > 0
//! (age >= 18 or admin) and not banned
//! status == 'active' || score * 2 > 10
//! ```
//!
//! Paths may be written bare (`user.name`) or braced (`{user.name}`). A path
//! that does not resolve evaluates to `nil`.

use std::cmp::Ordering;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, map_res, not, opt, peek, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::error::{MapperError, MapperResult};
use crate::value::{Lookup, Path, Value};

/// An external expression language.
pub trait ExpressionEngine: Send + Sync {
    type Program;

    fn compile(&self, source: &str) -> MapperResult<Self::Program>;

    fn run(&self, program: &Self::Program, scope: &dyn Lookup) -> MapperResult<Value>;
}

/// Compile-and-run view of an engine, usable as a trait object.
pub trait Condition: Send + Sync {
    fn evaluate(&self, source: &str, scope: &dyn Lookup) -> MapperResult<Value>;
}

impl<E: ExpressionEngine> Condition for E {
    fn evaluate(&self, source: &str, scope: &dyn Lookup) -> MapperResult<Value> {
        let program = self.compile(source)?;
        self.run(&program, scope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Compiled expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Path),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Len(Box<Expr>),
}

/// The default expression engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEngine;

impl ExpressionEngine for BuiltinEngine {
    type Program = Expr;

    fn compile(&self, source: &str) -> MapperResult<Expr> {
        match delimited(multispace0, or_expr, multispace0)(source) {
            Ok(("", expr)) => Ok(expr),
            Ok((rest, _)) => Err(MapperError::Expression(format!(
                "unexpected '{}' in expression '{}'",
                rest, source
            ))),
            Err(e) => Err(MapperError::Expression(format!(
                "cannot compile '{}': {:?}",
                source, e
            ))),
        }
    }

    fn run(&self, program: &Expr, scope: &dyn Lookup) -> MapperResult<Value> {
        eval(program, scope)
    }
}

fn eval(expr: &Expr, scope: &dyn Lookup) -> MapperResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(path) => match path.resolve(scope) {
            Ok(v) => Ok(v.deref_shared().clone()),
            Err(MapperError::Lookup(_)) => Ok(Value::Null),
            Err(e) => Err(MapperError::Expression(e.to_string())),
        },
        Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!truth(&eval(inner, scope)?, "!")?)),
        Expr::Unary(UnaryOp::Neg, inner) => match eval(inner, scope)? {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| MapperError::Expression("integer overflow".to_string())),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(operand_error("-", &other)),
        },
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            if !truth(&eval(lhs, scope)?, "&&")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truth(&eval(rhs, scope)?, "&&")?))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            if truth(&eval(lhs, scope)?, "||")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truth(&eval(rhs, scope)?, "||")?))
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, scope)?;
            let rhs = eval(rhs, scope)?;
            binary(*op, lhs, rhs)
        }
        Expr::Len(inner) => match eval(inner, scope)? {
            Value::Null => Ok(Value::Int(0)),
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            Value::Tree(ctx) => Ok(Value::Int(ctx.len() as i64)),
            other => Err(operand_error("len", &other)),
        },
    }
}

fn truth(v: &Value, op: &str) -> MapperResult<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => Err(operand_error(op, other)),
    }
}

fn operand_error(op: &str, v: &Value) -> MapperError {
    MapperError::Expression(format!("operator '{}' not defined for {}", op, v.kind()))
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> MapperResult<Value> {
    use BinaryOp::*;
    match op {
        Eq => Ok(Value::Bool(equals(&lhs, &rhs))),
        Ne => Ok(Value::Bool(!equals(&lhs, &rhs))),
        Lt | Le | Gt | Ge => {
            let ord = compare(&lhs, &rhs)?;
            Ok(Value::Bool(match op {
                Lt => ord == Ordering::Less,
                Le => ord != Ordering::Greater,
                Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        Add => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            (a, b) => arithmetic("+", a, b, i64::checked_add, |x, y| x + y),
        },
        Sub => arithmetic("-", lhs, rhs, i64::checked_sub, |x, y| x - y),
        Mul => arithmetic("*", lhs, rhs, i64::checked_mul, |x, y| x * y),
        Div => arithmetic("/", lhs, rhs, i64::checked_div, |x, y| x / y),
        Rem => arithmetic("%", lhs, rhs, i64::checked_rem, |x, y| x % y),
        And | Or => unreachable!("logical operators short-circuit in eval"),
    }
}

fn arithmetic(
    op: &str,
    lhs: Value,
    rhs: Value,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> MapperResult<Value> {
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => int(*a, *b).map(Value::Int).ok_or_else(|| {
            MapperError::Expression(format!("integer overflow or division by zero in '{}'", op))
        }),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(Value::Float(float(as_f64(&lhs), as_f64(&rhs))))
        }
        (Value::Int(_) | Value::Float(_), other) | (other, _) => Err(operand_error(op, other)),
    }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Float(n) => *n,
        _ => f64::NAN,
    }
}

fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (a, b) => a == b,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> MapperResult<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => as_f64(lhs)
            .partial_cmp(&as_f64(rhs))
            .ok_or_else(|| MapperError::Expression("cannot compare NaN".to_string())),
        (a, b) => Err(MapperError::Expression(format!(
            "cannot compare {} with {}",
            a.kind(),
            b.kind()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Grammar
// ---------------------------------------------------------------------------

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A word that is not followed by more identifier characters.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(peek(take_while1(is_ident_char))))
}

fn fold(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |lhs, (op, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(pair(
        ws(value(BinaryOp::Or, alt((tag("||"), keyword("or"))))),
        and_expr,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = comparison(input)?;
    let (input, rest) = many0(pair(
        ws(value(BinaryOp::And, alt((tag("&&"), keyword("and"))))),
        comparison,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = additive(input)?;
    let (input, rhs) = opt(pair(
        ws(alt((
            value(BinaryOp::Eq, tag("==")),
            value(BinaryOp::Ne, tag("!=")),
            value(BinaryOp::Le, tag("<=")),
            value(BinaryOp::Ge, tag(">=")),
            value(BinaryOp::Lt, char('<')),
            value(BinaryOp::Gt, char('>')),
        ))),
        additive,
    ))(input)?;
    Ok((
        input,
        match rhs {
            Some((op, rhs)) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
            None => lhs,
        },
    ))
}

fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        ))),
        term,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
            value(BinaryOp::Rem, char('%')),
        ))),
        unary,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;
    alt((
        map(
            preceded(alt((terminated(tag("!"), not(char('='))), keyword("not"))), unary),
            |e| Expr::Unary(UnaryOp::Not, Box::new(e)),
        ),
        map(preceded(char('-'), unary), |e| Expr::Unary(UnaryOp::Neg, Box::new(e))),
        primary,
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        delimited(char('('), ws(or_expr), char(')')),
        map(
            preceded(pair(keyword("len"), ws(char('('))), terminated(or_expr, ws(char(')')))),
            |e| Expr::Len(Box::new(e)),
        ),
        literal,
        path,
    )))(input)
}

fn literal(input: &str) -> IResult<&str, Expr> {
    map(
        alt((
            value(Value::Null, alt((keyword("nil"), keyword("null")))),
            value(Value::Bool(true), keyword("true")),
            value(Value::Bool(false), keyword("false")),
            number,
            quoted_string,
        )),
        Expr::Literal,
    )(input)
}

fn number(input: &str) -> IResult<&str, Value> {
    let (input, num_str) = recognize(tuple((digit1, opt(pair(char('.'), digit1)))))(input)?;
    if num_str.contains('.') {
        Ok((input, Value::Float(num_str.parse().unwrap_or(0.0))))
    } else {
        map_res(digit1, |s: &str| s.parse::<i64>().map(Value::Int))(num_str)
            .map(|(_, v)| (input, v))
    }
}

fn quoted_string(input: &str) -> IResult<&str, Value> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        |s: &str| Value::String(s.to_string()),
    )(input)
}

fn dotted(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(char('.'), take_while1(is_ident_char)))(input)
}

fn path(input: &str) -> IResult<&str, Expr> {
    map_res(
        alt((delimited(char('{'), ws(dotted), char('}')), dotted)),
        |raw: &str| Path::parse(raw).map(Expr::Path),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Context;

    fn run(source: &str, ctx: &Context) -> MapperResult<Value> {
        BuiltinEngine.evaluate(source, ctx)
    }

    fn ctx() -> Context {
        Context::new()
            .with("name", "ann")
            .with("age", 30)
            .with("score", 4.5)
            .with("ids", vec![1, 2, 3])
            .with("user", Context::new().with("admin", true))
    }

    #[test]
    fn test_nil_checks() {
        let ctx = ctx();
        assert_eq!(run("{name} != nil", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("{missing} == nil", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("missing.deeper == null", &ctx).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logic_and_precedence() {
        let ctx = ctx();
        assert_eq!(run("age >= 18 && user.admin", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("age < 18 or not user.admin", &ctx).unwrap(), Value::Bool(false));
        assert_eq!(run("1 + 2 * 3 == 7", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("(1 + 2) * 3 == 9", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("!(score > 4)", &ctx).unwrap(), Value::Bool(false));
        assert_eq!(run("-age < 0", &ctx).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_strings_and_len() {
        let ctx = ctx();
        assert_eq!(run("name == 'ann'", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("name + \"!\"", &ctx).unwrap(), Value::from("ann!"));
        assert_eq!(run("len(ids) == 3 and len(name) > 0", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("len(missing)", &ctx).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_keywords_need_boundaries() {
        let ctx = Context::new().with("order", 1).with("nothing", true);
        assert_eq!(run("order == 1", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("nothing", &ctx).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_non_boolean_result() {
        assert_eq!(run("age + 1", &ctx()).unwrap(), Value::Int(31));
    }

    #[test]
    fn test_errors() {
        let ctx = ctx();
        assert!(matches!(run("age >", &ctx), Err(MapperError::Expression(_))));
        assert!(matches!(run("name && true", &ctx), Err(MapperError::Expression(_))));
        assert!(matches!(run("age / 0", &ctx), Err(MapperError::Expression(_))));
        assert!(matches!(run("name < 3", &ctx), Err(MapperError::Expression(_))));
    }
}
