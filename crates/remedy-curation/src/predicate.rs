//! Row predicates for filter rules.
//!
//! A predicate is parsed once into an AST and evaluated per row without any
//! general expression evaluation:
//!
//! ```text
//! expr        := and_expr (("or" | "||" | "|") and_expr)*
//! and_expr    := unary (("and" | "&&" | "&") unary)*
//! unary       := ("not" | "!" | "~") unary | primary
//! primary     := "(" expr ")" | column_test
//! column_test := column "." method "(" args ")" | column op literal
//! method      := isnull | isna | notnull | notna | isin
//! op          := "==" | "!=" | ">=" | "<=" | ">" | "<"
//! literal     := int | float | 'str' | "str" | true | false | null
//! float       := [+-]? (digits "." digits? | "." digits) exp? | [+-]? digits exp
//! exp         := ("e" | "E") [+-]? digits
//! ```
//!
//! Columns are bare identifiers or backtick-quoted names.

use std::fmt;
use std::str::FromStr;

use remedy_types::{RemedyError, Result};
use winnow::ascii::{digit0, digit1, multispace0};
use winnow::combinator::{alt, cut_err, delimited, not, opt, preceded, repeat, terminated};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::token::{any, literal, one_of, take_while};
use winnow::{ModalResult, Parser};

use crate::table::{Row, Value};

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    NotNull(String),
    IsIn {
        column: String,
        values: Vec<Value>,
    },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn parse(input: &str) -> Result<Self> {
        let mut remaining = input;
        let offset = |rest: &str| input.len() - rest.len();

        match terminated(expr, ws).parse_next(&mut remaining) {
            Ok(predicate) if remaining.is_empty() => Ok(predicate),
            Ok(_) => Err(RemedyError::PredicateParse {
                offset: offset(remaining),
                message: format!(
                    "unexpected input '{}'",
                    remaining.chars().take(20).collect::<String>()
                ),
            }),
            Err(e) => {
                let message = match e {
                    ErrMode::Backtrack(ctx) | ErrMode::Cut(ctx) => ctx.to_string(),
                    ErrMode::Incomplete(_) => String::new(),
                };
                Err(RemedyError::PredicateParse {
                    offset: offset(remaining),
                    message: if message.is_empty() {
                        "expected a column test".to_string()
                    } else {
                        message
                    },
                })
            }
        }
    }

    /// Every column the predicate reads, in order of appearance.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare { column, .. }
            | Predicate::IsNull(column)
            | Predicate::NotNull(column)
            | Predicate::IsIn { column, .. } => {
                if !out.contains(&column.as_str()) {
                    out.push(column);
                }
            }
            Predicate::Not(inner) => inner.collect_columns(out),
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
        }
    }

    /// Both sides of `and`/`or` are evaluated; there is no short-circuit.
    pub fn evaluate(&self, row: &Row<'_>) -> Result<bool> {
        match self {
            Predicate::Compare { column, op, value } => compare(cell(row, column)?, *op, value),
            Predicate::IsNull(column) => Ok(cell(row, column)?.is_null()),
            Predicate::NotNull(column) => Ok(!cell(row, column)?.is_null()),
            Predicate::IsIn { column, values } => {
                let v = cell(row, column)?;
                Ok(values.iter().any(|candidate| v.loose_eq(candidate)))
            }
            Predicate::Not(inner) => Ok(!inner.evaluate(row)?),
            Predicate::And(a, b) => {
                let left = a.evaluate(row)?;
                let right = b.evaluate(row)?;
                Ok(left && right)
            }
            Predicate::Or(a, b) => {
                let left = a.evaluate(row)?;
                let right = b.evaluate(row)?;
                Ok(left || right)
            }
        }
    }
}

impl FromStr for Predicate {
    type Err = RemedyError;

    fn from_str(s: &str) -> Result<Self> {
        Predicate::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { column, op, value } => {
                write!(f, "{column} {} {value}", op.as_str())
            }
            Predicate::IsNull(column) => write!(f, "{column}.isnull()"),
            Predicate::NotNull(column) => write!(f, "{column}.notnull()"),
            Predicate::IsIn { column, values } => {
                let list: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{column}.isin([{}])", list.join(", "))
            }
            Predicate::Not(inner) => write!(f, "not ({inner})"),
            Predicate::And(a, b) => write!(f, "({a} and {b})"),
            Predicate::Or(a, b) => write!(f, "({a} or {b})"),
        }
    }
}

fn cell<'a>(row: &Row<'a>, column: &str) -> Result<&'a Value> {
    row.get(column)
        .ok_or_else(|| RemedyError::PredicateEval(format!("unknown column '{column}'")))
}

/// Nulls compare unequal to everything and never satisfy an ordering.
fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool> {
    if left.is_null() || right.is_null() {
        return Ok(op == CompareOp::Ne);
    }
    let ordering = || {
        left.compare(right).ok_or_else(|| {
            RemedyError::PredicateEval(format!(
                "cannot compare {} with {} using '{}'",
                left.type_name(),
                right.type_name(),
                op.as_str()
            ))
        })
    };
    match op {
        CompareOp::Eq => Ok(left.loose_eq(right)),
        CompareOp::Ne => Ok(!left.loose_eq(right)),
        CompareOp::Gt => Ok(ordering()?.is_gt()),
        CompareOp::Ge => Ok(ordering()?.is_ge()),
        CompareOp::Lt => Ok(ordering()?.is_lt()),
        CompareOp::Le => Ok(ordering()?.is_le()),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

fn make_cut_error(desc: &'static str) -> ErrMode<ContextError<StrContext>> {
    let mut e = ContextError::new();
    e.push(StrContext::Expected(StrContextValue::Description(desc)));
    ErrMode::Cut(e)
}

fn ws<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    multispace0.parse_next(input)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse an identifier: [A-Za-z_][A-Za-z0-9_]*
fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., is_ident_char),
    )
        .take()
        .parse_next(input)
}

/// A word that is not the prefix of a longer identifier.
fn keyword<'i>(word: &'static str) -> impl Parser<&'i str, &'i str, ErrMode<ContextError>> {
    terminated(literal(word), not(take_while(1, is_ident_char)))
}

fn column_name(input: &mut &str) -> ModalResult<String> {
    alt((
        delimited('`', take_while(1.., |c: char| c != '`'), '`').map(str::to_string),
        identifier.map(str::to_string),
    ))
    .parse_next(input)
}

fn or_op(input: &mut &str) -> ModalResult<()> {
    alt((literal("||").void(), literal("|").void(), keyword("or").void())).parse_next(input)
}

fn and_op(input: &mut &str) -> ModalResult<()> {
    alt((literal("&&").void(), literal("&").void(), keyword("and").void())).parse_next(input)
}

fn not_op(input: &mut &str) -> ModalResult<()> {
    alt((
        terminated(literal("!"), not('=')).void(),
        literal("~").void(),
        keyword("not").void(),
    ))
    .parse_next(input)
}

fn compare_op(input: &mut &str) -> ModalResult<CompareOp> {
    alt((
        literal("==").value(CompareOp::Eq),
        literal("!=").value(CompareOp::Ne),
        literal(">=").value(CompareOp::Ge),
        literal("<=").value(CompareOp::Le),
        literal(">").value(CompareOp::Gt),
        literal("<").value(CompareOp::Lt),
    ))
    .parse_next(input)
}

fn next_char(input: &mut &str) -> ModalResult<char> {
    any.parse_next(input)
}

/// Single- or double-quoted string with backslash escapes.
fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let quote = alt(('\'', '"')).parse_next(input)?;
    let mut s = String::new();
    loop {
        let c = next_char(input).map_err(|_| make_cut_error("closing quote"))?;
        match c {
            c if c == quote => break,
            '\\' => {
                let esc = next_char(input).map_err(|_| make_cut_error("escaped character"))?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    other => s.push(other),
                }
            }
            other => s.push(other),
        }
    }
    Ok(s)
}

fn exponent(input: &mut &str) -> ModalResult<()> {
    (one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)
        .void()
        .parse_next(input)
}

/// Parse a float: `1.5`, `1.`, `.5`, or any of those or plain digits with an
/// exponent (`1e3`, `2.5E-2`).
fn float_value(input: &mut &str) -> ModalResult<f64> {
    let s: &str = (
        opt(one_of(['+', '-'])),
        alt((
            (digit1, '.', digit0, opt(exponent)).void(),
            ('.', digit1, opt(exponent)).void(),
            (digit1, exponent).void(),
        )),
    )
        .take()
        .parse_next(input)?;
    s.parse()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))
}

/// Parse an integer: optional sign + digits.
fn integer_value(input: &mut &str) -> ModalResult<i64> {
    let s: &str = (opt(alt(('-', '+'))), digit1).take().parse_next(input)?;
    s.parse()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))
}

fn literal_value(input: &mut &str) -> ModalResult<Value> {
    alt((
        quoted_string.map(Value::Str),
        float_value.map(Value::Float),
        integer_value.map(Value::Int),
        alt((keyword("true"), keyword("True"))).value(Value::Bool(true)),
        alt((keyword("false"), keyword("False"))).value(Value::Bool(false)),
        alt((keyword("null"), keyword("None"))).value(Value::Null),
    ))
    .parse_next(input)
}

/// Comma-separated literals, optionally wrapped in brackets.
fn call_args(input: &mut &str) -> ModalResult<Vec<Value>> {
    ws.parse_next(input)?;
    if opt('(').parse_next(input)?.is_none() {
        return Err(make_cut_error("'(' after method name"));
    }
    ws.parse_next(input)?;
    let bracketed = opt('[').parse_next(input)?.is_some();

    let mut values = Vec::new();
    loop {
        ws.parse_next(input)?;
        match opt(literal_value).parse_next(input)? {
            Some(value) => values.push(value),
            None => break,
        }
        ws.parse_next(input)?;
        if opt(',').parse_next(input)?.is_none() {
            break;
        }
    }

    ws.parse_next(input)?;
    if bracketed && opt(']').parse_next(input)?.is_none() {
        return Err(make_cut_error("closing ']'"));
    }
    ws.parse_next(input)?;
    if opt(')').parse_next(input)?.is_none() {
        return Err(make_cut_error("closing ')'"));
    }
    Ok(values)
}

fn column_test(input: &mut &str) -> ModalResult<Predicate> {
    let column = column_name.parse_next(input)?;

    if opt('.').parse_next(input)?.is_some() {
        let method = identifier
            .parse_next(input)
            .map_err(|_| make_cut_error("method name"))?;
        let args = call_args.parse_next(input)?;
        return match method {
            "isnull" | "isna" if args.is_empty() => Ok(Predicate::IsNull(column)),
            "notnull" | "notna" if args.is_empty() => Ok(Predicate::NotNull(column)),
            "isnull" | "isna" | "notnull" | "notna" => Err(make_cut_error("no arguments")),
            "isin" => Ok(Predicate::IsIn {
                column,
                values: args,
            }),
            _ => Err(make_cut_error("one of isnull, isna, notnull, notna, isin")),
        };
    }

    ws.parse_next(input)?;
    let op = compare_op
        .parse_next(input)
        .map_err(|_| make_cut_error("comparison operator"))?;
    ws.parse_next(input)?;
    let value = literal_value
        .parse_next(input)
        .map_err(|_| make_cut_error("literal value"))?;
    Ok(Predicate::Compare { column, op, value })
}

fn parenthesized(input: &mut &str) -> ModalResult<Predicate> {
    '('.parse_next(input)?;
    let inner = cut_err(expr).parse_next(input)?;
    ws.parse_next(input)?;
    if opt(')').parse_next(input)?.is_none() {
        return Err(make_cut_error("closing ')'"));
    }
    Ok(inner)
}

fn primary(input: &mut &str) -> ModalResult<Predicate> {
    ws.parse_next(input)?;
    alt((parenthesized, column_test)).parse_next(input)
}

fn unary(input: &mut &str) -> ModalResult<Predicate> {
    ws.parse_next(input)?;
    if opt(not_op).parse_next(input)?.is_some() {
        let inner = cut_err(unary).parse_next(input)?;
        return Ok(Predicate::Not(Box::new(inner)));
    }
    primary.parse_next(input)
}

fn and_expr(input: &mut &str) -> ModalResult<Predicate> {
    let first = unary.parse_next(input)?;
    let rest: Vec<Predicate> =
        repeat(0.., preceded((ws, and_op), cut_err(unary))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, p| Predicate::And(Box::new(acc), Box::new(p))))
}

fn expr(input: &mut &str) -> ModalResult<Predicate> {
    let first = and_expr.parse_next(input)?;
    let rest: Vec<Predicate> =
        repeat(0.., preceded((ws, or_op), cut_err(and_expr))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, p| Predicate::Or(Box::new(acc), Box::new(p))))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
