//! Expression evaluation collaborator
//!
//! Sequence flow conditions and message correlation keys are opaque strings
//! to the engine. They are evaluated through [`ExpressionEvaluator`]; the
//! bundled [`SimpleExpressionEvaluator`] understands a small comparison
//! language:
//!
//! ```text
//! foo < 5
//! foo >= 5 && foo < 10
//! order.status == "shipped" or !approved
//! ```

use crate::error::EvaluationError;
use crate::types::Variables;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, peek, recognize, value},
    error::{convert_error, VerboseError},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    Finish, IResult,
};
use serde_json::Value;
use std::cmp::Ordering;

type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Evaluates expressions against the flat variable document of an instance.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, variables: &Variables) -> Result<Value, EvaluationError>;

    fn evaluate_bool(&self, expression: &str, variables: &Variables) -> Result<bool, EvaluationError> {
        match self.evaluate(expression, variables)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvaluationError::UnexpectedType {
                expression: expression.to_string(),
                expected: "boolean",
                actual: type_name(&other).to_string(),
            }),
        }
    }

    /// Correlation keys must evaluate to a string or a number.
    fn evaluate_correlation_key(
        &self,
        expression: &str,
        variables: &Variables,
    ) -> Result<String, EvaluationError> {
        match self.evaluate(expression, variables)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(EvaluationError::UnexpectedType {
                expression: expression.to_string(),
                expected: "string or number",
                actual: type_name(&other).to_string(),
            }),
        }
    }
}

// ─── AST ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

// ─── Parser ───────────────────────────────────────────────────

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> ParseResult<'a, O>
where
    F: FnMut(&'a str) -> ParseResult<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// A keyword that is not the prefix of a longer identifier (`or` vs `orderId`).
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> ParseResult<'a, &'a str> {
    terminated(
        tag(kw),
        not(peek(satisfy(|c: char| c.is_alphanumeric() || c == '_'))),
    )
}

fn parse_or(input: &str) -> ParseResult<'_, Expr> {
    let (input, first) = parse_and(input)?;
    let (input, rest) = many0(preceded(ws(alt((tag("||"), keyword("or")))), parse_and))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |lhs, rhs| Expr::Or(Box::new(lhs), Box::new(rhs)));
    Ok((input, expr))
}

fn parse_and(input: &str) -> ParseResult<'_, Expr> {
    let (input, first) = parse_not(input)?;
    let (input, rest) = many0(preceded(ws(alt((tag("&&"), keyword("and")))), parse_not))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |lhs, rhs| Expr::And(Box::new(lhs), Box::new(rhs)));
    Ok((input, expr))
}

fn parse_not(input: &str) -> ParseResult<'_, Expr> {
    alt((
        map(preceded(ws(char('!')), parse_not), |e| Expr::Not(Box::new(e))),
        map(preceded(ws(keyword("not")), parse_not), |e| Expr::Not(Box::new(e))),
        parse_comparison,
    ))(input)
}

fn parse_comparison(input: &str) -> ParseResult<'_, Expr> {
    let (input, lhs) = parse_operand(input)?;
    let (input, rhs) = opt(pair(ws(parse_compare_op), parse_operand))(input)?;
    let expr = match rhs {
        Some((op, rhs)) => Expr::Compare(Box::new(lhs), op, Box::new(rhs)),
        None => lhs,
    };
    Ok((input, expr))
}

fn parse_compare_op(input: &str) -> ParseResult<'_, CompareOp> {
    alt((
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Eq, tag("==")),
        value(CompareOp::Ne, tag("!=")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Gt, tag(">")),
        value(CompareOp::Eq, tag("=")),
    ))(input)
}

fn parse_operand(input: &str) -> ParseResult<'_, Expr> {
    ws(alt((
        delimited(char('('), ws(parse_or), char(')')),
        map(parse_literal, Expr::Literal),
        map(parse_path, Expr::Path),
    )))(input)
}

fn parse_literal(input: &str) -> ParseResult<'_, Value> {
    alt((
        value(Value::Bool(true), keyword("true")),
        value(Value::Bool(false), keyword("false")),
        value(Value::Null, keyword("null")),
        parse_number,
        map(parse_string, Value::String),
    ))(input)
}

fn parse_number(input: &str) -> ParseResult<'_, Value> {
    map_res(
        recognize(tuple((opt(char('-')), digit1, opt(pair(char('.'), digit1))))),
        |num_str: &str| -> Result<Value, String> {
            if let Ok(i) = num_str.parse::<i64>() {
                return Ok(Value::from(i));
            }
            num_str
                .parse::<f64>()
                .map(Value::from)
                .map_err(|e| e.to_string())
        },
    )(input)
}

fn parse_string(input: &str) -> ParseResult<'_, String> {
    map(
        alt((
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        )),
        str::to_string,
    )(input)
}

fn parse_identifier(input: &str) -> ParseResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn parse_path(input: &str) -> ParseResult<'_, Vec<String>> {
    map(separated_list1(char('.'), parse_identifier), |parts| {
        parts.into_iter().map(str::to_string).collect()
    })(input)
}

fn parse_expression(expression: &str) -> Result<Expr, EvaluationError> {
    let source = expression.trim();
    // FEEL-style leading '=' marker is accepted and ignored
    let source = source.strip_prefix('=').unwrap_or(source);
    all_consuming(ws(parse_or))(source)
        .finish()
        .map(|(_, expr)| expr)
        .map_err(|e| EvaluationError::Parse {
            expression: expression.to_string(),
            message: convert_error(source, e),
        })
}

// ─── Evaluation ───────────────────────────────────────────────

/// Stand-in evaluator for conditions and correlation keys.
#[derive(Debug, Default, Clone)]
pub struct SimpleExpressionEvaluator;

impl SimpleExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionEvaluator for SimpleExpressionEvaluator {
    fn evaluate(&self, expression: &str, variables: &Variables) -> Result<Value, EvaluationError> {
        let expr = parse_expression(expression)?;
        eval(&expr, expression, variables)
    }
}

fn eval(expr: &Expr, source: &str, variables: &Variables) -> Result<Value, EvaluationError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(parts) => resolve_path(parts, variables),
        Expr::Not(inner) => Ok(Value::Bool(!as_bool(inner, source, variables)?)),
        Expr::And(lhs, rhs) => Ok(Value::Bool(
            as_bool(lhs, source, variables)? && as_bool(rhs, source, variables)?,
        )),
        Expr::Or(lhs, rhs) => Ok(Value::Bool(
            as_bool(lhs, source, variables)? || as_bool(rhs, source, variables)?,
        )),
        Expr::Compare(lhs, op, rhs) => {
            let l = eval(lhs, source, variables)?;
            let r = eval(rhs, source, variables)?;
            compare(&l, *op, &r, source).map(Value::Bool)
        }
    }
}

fn as_bool(expr: &Expr, source: &str, variables: &Variables) -> Result<bool, EvaluationError> {
    match eval(expr, source, variables)? {
        Value::Bool(b) => Ok(b),
        other => Err(EvaluationError::UnexpectedType {
            expression: source.to_string(),
            expected: "boolean",
            actual: type_name(&other).to_string(),
        }),
    }
}

fn resolve_path(parts: &[String], variables: &Variables) -> Result<Value, EvaluationError> {
    let missing = || EvaluationError::MissingVariable(parts.join("."));
    let (head, tail) = parts.split_first().ok_or_else(missing)?;
    let mut current = variables.get(head).ok_or_else(missing)?;
    for field in tail {
        current = current.get(field).ok_or_else(missing)?;
    }
    Ok(current.clone())
}

fn compare(l: &Value, op: CompareOp, r: &Value, source: &str) -> Result<bool, EvaluationError> {
    let ordering = match (l, r) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match (op, ordering) {
        (CompareOp::Eq, Some(ord)) => Ok(ord == Ordering::Equal),
        (CompareOp::Ne, Some(ord)) => Ok(ord != Ordering::Equal),
        (CompareOp::Eq, None) => Ok(l == r),
        (CompareOp::Ne, None) => Ok(l != r),
        (CompareOp::Lt, Some(ord)) => Ok(ord == Ordering::Less),
        (CompareOp::Le, Some(ord)) => Ok(ord != Ordering::Greater),
        (CompareOp::Gt, Some(ord)) => Ok(ord == Ordering::Greater),
        (CompareOp::Ge, Some(ord)) => Ok(ord != Ordering::Less),
        (_, None) => Err(EvaluationError::UnexpectedType {
            expression: source.to_string(),
            expected: "comparable operands",
            actual: format!("{} and {}", type_name(l), type_name(r)),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
