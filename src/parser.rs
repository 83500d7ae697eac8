//! Constraint-expression parser
//!
//! Turns constraint text into a [`CeAst`]. Names are left unresolved; the
//! compiler binds them against a schema.
//!
//! ```text
//! constraint := (dimredef ';')* clause (';' clause)*
//! dimredef   := NAME '=' slice
//! clause     := segtree ('|' filter)?
//! segtree    := NAME slice* ('.' segtree | '.'? '{' clause ((';'|',') clause)* '}')?
//! slice      := '[' ']' | '[' i ']' | '[' i ':' j? ']' | '[' i ':' s ':' j? ']'
//! filter     := conjunct (',' conjunct)*
//! conjunct   := '!' conjunct | '(' filter ')' | primary op primary (op primary)?
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, digit1, multispace0, one_of},
    combinator::{all_consuming, cut, map, map_res, opt, recognize, value},
    error::{
        context, convert_error, ContextError, ErrorKind as NomErrorKind, ParseError as _,
        VerboseError,
    },
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;

use crate::ast::*;
use crate::slice::Slice;
use crate::value::Value;

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Constraint text that does not follow the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("constraint syntax error: {message}")]
pub struct ParseError {
    pub message: String,
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a complete constraint expression. Empty text yields an empty tree.
pub fn parse_constraint(input: &str) -> Result<CeAst, ParseError> {
    finish(input, all_consuming(constraint)(input))
}

/// Parse a bare filter expression (the part after `|`).
pub fn parse_filter(input: &str) -> Result<CeExpr, ParseError> {
    finish(input, all_consuming(ws(filter))(input))
}

fn finish<T>(input: &str, result: PResult<'_, T>) -> Result<T, ParseError> {
    match result {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ParseError {
            message: convert_error(input, e),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ParseError {
            message: "incomplete input".to_string(),
        }),
    }
}

/// Characters allowed unescaped in a name.
pub(crate) fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || "_-+/@$%#".contains(c)
}

/// Backslash-escape every character the name lexer would stop at.
///
/// A name a filter would read as a literal (`true`, `false`, a leading
/// number) gets its first character escaped as well.
pub(crate) fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    if reads_as_literal(name) {
        out.push('\\');
    }
    for c in name.chars() {
        if !is_name_char(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn reads_as_literal(name: &str) -> bool {
    let unsigned = name.strip_prefix('-').unwrap_or(name);
    matches!(name, "true" | "false") || unsigned.starts_with(|c: char| c.is_ascii_digit())
}

// ============================================================================
// Internal Parsers
// ============================================================================

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: FnMut(&'a str) -> PResult<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn constraint(input: &str) -> PResult<'_, CeAst> {
    let (input, redefs) = many0(terminated(ws(dim_redef), ws(char(';'))))(input)?;
    let (input, clauses) = separated_list0(ws(char(';')), clause)(input)?;
    let (input, _) = opt(ws(char(';')))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, CeAst { redefs, clauses }))
}

fn dim_redef(input: &str) -> PResult<'_, DimRedef> {
    let (input, (name, _, slice)) = tuple((name, ws(char('=')), cut(slice)))(input)?;
    Ok((input, DimRedef { name, slice }))
}

fn clause(input: &str) -> PResult<'_, Clause> {
    let (input, projection) = segment_tree(input)?;
    let (input, filter) = opt(preceded(ws(char('|')), cut(filter)))(input)?;
    let clause = match filter {
        Some(filter) => Clause::Selection { projection, filter },
        None => Clause::Projection(projection),
    };
    Ok((input, clause))
}

fn segment_tree(input: &str) -> PResult<'_, SegmentTree> {
    let (input, name) = ws(name)(input)?;
    let (input, slices) = many0(slice)(input)?;
    let tree = SegmentTree::new(name).with_slices(slices);

    if let Some((rest, fields)) = attempt(field_list, input)? {
        return Ok((rest, tree.with_fields(fields)));
    }
    if let Some((rest, _)) = attempt(ws(char('.')), input)? {
        if let Some((rest, fields)) = attempt(field_list, rest)? {
            return Ok((rest, tree.with_fields(fields)));
        }
        let (rest, child) = cut(context("field name", segment_tree))(rest)?;
        return Ok((rest, tree.with_path(child)));
    }
    Ok((input, tree))
}

/// Run a parser, turning a recoverable error into `None` and keeping failures.
fn attempt<'a, O>(
    mut parser: impl FnMut(&'a str) -> PResult<'a, O>,
    input: &'a str,
) -> Result<Option<(&'a str, O)>, nom::Err<VerboseError<&'a str>>> {
    match parser(input) {
        Ok(done) => Ok(Some(done)),
        Err(nom::Err::Error(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn field_list(input: &str) -> PResult<'_, Vec<Clause>> {
    delimited(
        ws(char('{')),
        cut(terminated(
            separated_list1(ws(one_of(";,")), clause),
            opt(ws(char(';'))),
        )),
        cut(context("closing brace", ws(char('}')))),
    )(input)
}

fn name(input: &str) -> PResult<'_, String> {
    map(name_token, |(name, _)| name)(input)
}

/// A name and whether any of it was backslash-escaped.
fn name_token(input: &str) -> PResult<'_, (String, bool)> {
    let mut out = String::new();
    let mut consumed = 0;
    let mut escaped_any = false;
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped) => {
                    out.push(escaped);
                    consumed += 1 + escaped.len_utf8();
                    escaped_any = true;
                }
                None => break,
            }
        } else if is_name_char(c) {
            out.push(c);
            consumed += c.len_utf8();
        } else {
            break;
        }
    }
    if consumed == 0 {
        return Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            NomErrorKind::AlphaNumeric,
        )));
    }
    Ok((&input[consumed..], (out, escaped_any)))
}

// ============================================================================
// Slices
// ============================================================================

fn slice(input: &str) -> PResult<'_, Slice> {
    let (input, _) = ws(char('['))(input)?;
    let (input, sub) = cut(terminated(
        opt(subslice),
        context("closing bracket", ws(char(']'))),
    ))(input)?;
    Ok((input, sub.unwrap_or_else(Slice::whole)))
}

fn subslice(input: &str) -> PResult<'_, Slice> {
    let (input, first) = ws(index)(input)?;
    let (input, rest) = opt(preceded(
        char(':'),
        pair(opt(ws(index)), opt(preceded(char(':'), opt(ws(index))))),
    ))(input)?;
    let slice = match rest {
        None => Slice::index(first),
        Some((None, None)) => Slice::range(first, 1, None),
        Some((Some(last), None)) => Slice::range(first, 1, Some(last)),
        Some((stride, Some(last))) => Slice::range(first, stride.unwrap_or(1), last),
    };
    Ok((input, slice))
}

fn index(input: &str) -> PResult<'_, u64> {
    map_res(digit1, str::parse::<u64>)(input)
}

// ============================================================================
// Filters
// ============================================================================

fn filter(input: &str) -> PResult<'_, CeExpr> {
    let (input, first) = conjunct(input)?;
    let (input, rest) = many0(preceded(ws(char(',')), cut(conjunct)))(input)?;
    Ok((input, rest.into_iter().fold(first, CeExpr::and)))
}

fn conjunct(input: &str) -> PResult<'_, CeExpr> {
    alt((
        map(preceded(ws(char('!')), conjunct), CeExpr::not),
        delimited(
            ws(char('(')),
            filter,
            cut(context("closing parenthesis", ws(char(')')))),
        ),
        predicate,
    ))(input)
}

fn predicate(input: &str) -> PResult<'_, CeExpr> {
    let (input, lhs) = ws(primary)(input)?;
    let (input, op) = cut(context("comparison operator", ws(operator)))(input)?;
    let (input, mid) = cut(ws(primary))(input)?;
    let (rest, tail) = opt(pair(ws(operator), cut(ws(primary))))(input)?;
    match tail {
        None => Ok((rest, CeExpr::compare(op, lhs, mid))),
        Some((op2, rhs)) if is_relop(op) && is_relop(op2) => Ok((
            rest,
            CeExpr::and(
                CeExpr::compare(op, lhs, mid.clone()),
                CeExpr::compare(op2, mid, rhs),
            ),
        )),
        Some(_) => Err(nom::Err::Failure(VerboseError::add_context(
            input,
            "range comparison with <, <=, > or >=",
            VerboseError::from_error_kind(input, NomErrorKind::Verify),
        ))),
    }
}

fn is_relop(op: Operator) -> bool {
    matches!(op, Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge)
}

fn operator(input: &str) -> PResult<'_, Operator> {
    alt((
        value(Operator::Le, tag("<=")),
        value(Operator::Ge, tag(">=")),
        value(Operator::Eq, tag("==")),
        value(Operator::Ne, tag("!=")),
        value(Operator::Req, tag("~=")),
        value(Operator::Lt, char('<')),
        value(Operator::Gt, char('>')),
        value(Operator::Eq, char('=')),
    ))(input)
}

fn primary(input: &str) -> PResult<'_, CeExpr> {
    alt((
        map(string_literal, |s| CeExpr::Constant(Value::Str(s))),
        map(float, |x| CeExpr::Constant(Value::Float(x))),
        map(integer, |i| CeExpr::Constant(Value::Int(i))),
        map(name_token, |(n, escaped)| match n.as_str() {
            "true" if !escaped => CeExpr::Constant(Value::Bool(true)),
            "false" if !escaped => CeExpr::Constant(Value::Bool(false)),
            _ => CeExpr::FieldRef(n),
        }),
    ))(input)
}

fn exponent(input: &str) -> PResult<'_, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn float(input: &str) -> PResult<'_, f64> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        alt((
            recognize(tuple((char('.'), digit0, opt(exponent)))),
            exponent,
        )),
    )))(input)?;
    match text.parse::<f64>() {
        Ok(x) if x.is_finite() => Ok((rest, x)),
        _ => Err(out_of_range(input, "finite floating-point literal")),
    }
}

fn integer(input: &str) -> PResult<'_, i64> {
    let (rest, text) = recognize(pair(opt(char('-')), digit1))(input)?;
    text.parse::<i64>()
        .map(|i| (rest, i))
        .map_err(|_| out_of_range(input, "64-bit integer literal"))
}

fn out_of_range<'a>(input: &'a str, expected: &'static str) -> nom::Err<VerboseError<&'a str>> {
    nom::Err::Failure(VerboseError::add_context(
        input,
        expected,
        VerboseError::from_error_kind(input, NomErrorKind::MapRes),
    ))
}

fn string_literal(input: &str) -> PResult<'_, String> {
    let (rest, _) = char('"')(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&rest[i + 1..], out)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(nom::Err::Failure(VerboseError::add_context(
        input,
        "closing quote",
        VerboseError::from_error_kind(input, NomErrorKind::Char),
    )))
}

// ============================================================================
// Tests
// ============================================================================
