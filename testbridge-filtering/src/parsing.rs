// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing for legacy filter expressions.
//!
//! The grammar, loosest-binding first:
//!
//! ```text
//! expr      := and_expr ('|' and_expr)*
//! and_expr  := unary ('&' unary)*
//! unary     := '!' unary | '(' expr ')' | condition
//! condition := text (op text)?
//! op        := '=' | '!=' | '~' | '!~'
//! ```
//!
//! A condition without an operator is a contains-match against the fully-qualified name.
//!
//! All high level parsing functions should:
//! - always return Ok(_)
//! - on error:
//!     - consume as much input as it makes sense so that we can try to resume parsing
//!     - return an error/none variant of the expected result type
//!     - push an error in the parsing state (in span.state)

use crate::{
    errors::{ParseSingleError, State},
    escape::{ESCAPE_CHARACTER, escape, is_special, unescape},
};
use miette::SourceSpan;
use std::{cell::RefCell, fmt};
use winnow::{
    LocatingSlice, ModalParser, Parser,
    ascii::line_ending,
    combinator::{alt, delimited, eof, opt, preceded, repeat, terminated, trace},
    error::ErrMode,
    stream::{Location, SliceLen, Stream},
    token::{any, take_till},
};

pub(crate) type Span<'a> = winnow::Stateful<LocatingSlice<&'a str>, State<'a>>;
type Error = ();
type PResult<T> = winnow::ModalResult<T, Error>;

pub(crate) fn new_span<'a>(input: &'a str, errors: &'a RefCell<Vec<ParseSingleError>>) -> Span<'a> {
    Span {
        input: LocatingSlice::new(input),
        state: State::new(errors),
    }
}

/// The property that a condition without an operator is matched against.
pub const FULLY_QUALIFIED_NAME_PROPERTY: &str = "FullyQualifiedName";

/// The comparison performed by a [`Condition`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComparisonOperator {
    /// `=`: some value of the property equals the operand.
    Equal,
    /// `!=`: no value of the property equals the operand.
    NotEqual,
    /// `~`: some value of the property contains the operand.
    Contains,
    /// `!~`: no value of the property contains the operand.
    NotContains,
}

impl ComparisonOperator {
    /// Returns true for `!=` and `!~`.
    pub fn is_negated(self) -> bool {
        matches!(self, Self::NotEqual | Self::NotContains)
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => f.write_str("="),
            Self::NotEqual => f.write_str("!="),
            Self::Contains => f.write_str("~"),
            Self::NotContains => f.write_str("!~"),
        }
    }
}

/// A single `property op value` comparison.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Condition {
    /// The property name, unescaped and trimmed.
    pub property: String,

    /// The comparison to perform.
    pub operator: ComparisonOperator,

    /// The operand, unescaped and trimmed.
    pub value: String,

    /// True if the condition was written as a bare value.
    pub implicit: bool,
}

impl Condition {
    /// Creates a new condition.
    pub fn new(
        property: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            operator,
            value: value.into(),
            implicit: false,
        }
    }

    fn implicit(value: String) -> Self {
        Self {
            property: FULLY_QUALIFIED_NAME_PROPERTY.to_owned(),
            operator: ComparisonOperator::Contains,
            value,
            implicit: true,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.implicit {
            write!(f, "{}", escape(&self.value))
        } else {
            write!(
                f,
                "{}{}{}",
                escape(&self.property),
                self.operator,
                escape(&self.value)
            )
        }
    }
}

/// A legacy filter expression that has been parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedExpr {
    /// A comparison against a property.
    Condition(Condition),
    /// `!expr`
    Not(Box<ParsedExpr>),
    /// `expr & expr`
    And(Box<ParsedExpr>, Box<ParsedExpr>),
    /// `expr | expr`
    Or(Box<ParsedExpr>, Box<ParsedExpr>),
    /// `(expr)`
    Parens(Box<ParsedExpr>),
}

impl ParsedExpr {
    fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    fn not(self) -> Self {
        ParsedExpr::Not(self.boxed())
    }

    fn and(expr_1: Self, expr_2: Self) -> Self {
        ParsedExpr::And(expr_1.boxed(), expr_2.boxed())
    }

    fn or(expr_1: Self, expr_2: Self) -> Self {
        ParsedExpr::Or(expr_1.boxed(), expr_2.boxed())
    }

    fn parens(self) -> Self {
        ParsedExpr::Parens(self.boxed())
    }
}

impl fmt::Display for ParsedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(condition) => write!(f, "{condition}"),
            Self::Not(expr) => write!(f, "!{expr}"),
            Self::And(expr_1, expr_2) => write!(f, "{expr_1} & {expr_2}"),
            Self::Or(expr_1, expr_2) => write!(f, "{expr_1} | {expr_2}"),
            Self::Parens(expr) => write!(f, "({expr})"),
        }
    }
}

pub(crate) enum ExprResult {
    Valid(ParsedExpr),
    Error,
}

impl ExprResult {
    fn combine(self, op: impl FnOnce(ParsedExpr, ParsedExpr) -> ParsedExpr, other: Self) -> Self {
        match (self, other) {
            (Self::Valid(expr_1), Self::Valid(expr_2)) => Self::Valid(op(expr_1, expr_2)),
            _ => Self::Error,
        }
    }

    fn negate(self) -> Self {
        match self {
            Self::Valid(expr) => Self::Valid(expr.not()),
            _ => Self::Error,
        }
    }

    fn parens(self) -> Self {
        match self {
            Self::Valid(expr) => Self::Valid(expr.parens()),
            _ => Self::Error,
        }
    }
}

enum SpanLength {
    Unknown,
    Exact(usize),
}

fn expect_inner<'a, F, T>(
    mut parser: F,
    make_err: fn(SourceSpan) -> ParseSingleError,
    limit: SpanLength,
) -> impl ModalParser<Span<'a>, Option<T>, Error>
where
    F: ModalParser<Span<'a>, T, Error>,
{
    move |input: &mut _| match parser.parse_next(input) {
        Ok(out) => Ok(Some(out)),
        Err(ErrMode::Backtrack(_)) | Err(ErrMode::Cut(_)) => {
            let fragment_start = input.current_token_start();
            let fragment_length = input.slice_len();
            let span = match limit {
                SpanLength::Unknown => (fragment_start, fragment_length).into(),
                SpanLength::Exact(x) => (fragment_start, x.min(fragment_length)).into(),
            };
            input.state.report_error(make_err(span));
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn expect<'a, F, T>(
    parser: F,
    make_err: fn(SourceSpan) -> ParseSingleError,
) -> impl ModalParser<Span<'a>, Option<T>, Error>
where
    F: ModalParser<Span<'a>, T, Error>,
{
    expect_inner(parser, make_err, SpanLength::Unknown)
}

fn expect_char<'a>(
    c: char,
    make_err: fn(SourceSpan) -> ParseSingleError,
) -> impl ModalParser<Span<'a>, Option<char>, Error> {
    expect_inner(ws(c), make_err, SpanLength::Exact(0))
}

fn ws<'a, T, P: ModalParser<Span<'a>, T, Error>>(
    mut inner: P,
) -> impl ModalParser<Span<'a>, T, Error> {
    move |input: &mut Span<'a>| {
        let start = input.checkpoint();
        () = repeat(
            0..,
            alt((
                ' '.void(),
                '\t'.void(),
                // Filters may be passed in through multiline settings values.
                line_ending.void(),
            )),
        )
        .parse_next(input)?;
        match inner.parse_next(input) {
            Ok(res) => Ok(res),
            Err(ErrMode::Backtrack(err)) => {
                input.reset(&start);
                Err(ErrMode::Backtrack(err))
            }
            Err(ErrMode::Cut(err)) => {
                input.reset(&start);
                Err(ErrMode::Cut(err))
            }
            Err(err) => Err(err),
        }
    }
}

// A run of literal characters and escape sequences, up to the next unescaped special character.
// Escapes are validated separately so that errors can point at the offending backslash.
fn parse_raw_text<'i>(input: &mut Span<'i>) -> PResult<&'i str> {
    let text_run = |input: &mut Span<'i>| -> PResult<()> {
        repeat(
            1..,
            alt((
                (ESCAPE_CHARACTER, opt(any)).void(),
                take_till(1.., is_special).void(),
            )),
        )
        .parse_next(input)
    };
    trace("parse_raw_text", text_run.take()).parse_next(input)
}

// Fails only if there is no text at all; an invalid escape is reported and yields Ok(None).
fn parse_text<'i>(input: &mut Span<'i>) -> PResult<Option<String>> {
    trace("parse_text", |input: &mut Span<'i>| {
        let start = input.current_token_start();
        let raw = parse_raw_text.parse_next(input)?;
        match unescape(raw) {
            Ok(text) => Ok(Some(text.trim().to_owned())),
            Err(error) => {
                let span = (start + error.offset, 1).into();
                input
                    .state
                    .report_error(ParseSingleError::InvalidEscapeSequence(span));
                Ok(None)
            }
        }
    })
    .parse_next(input)
}

fn parse_operator(input: &mut Span<'_>) -> PResult<ComparisonOperator> {
    trace(
        "parse_operator",
        alt((
            "!=".value(ComparisonOperator::NotEqual),
            "!~".value(ComparisonOperator::NotContains),
            '='.value(ComparisonOperator::Equal),
            '~'.value(ComparisonOperator::Contains),
        )),
    )
    .parse_next(input)
}

fn parse_condition<'i>(input: &mut Span<'i>) -> PResult<Option<Condition>> {
    trace("parse_condition", |input: &mut Span<'i>| {
        let start = input.current_token_start();
        let property = opt(parse_text).parse_next(input)?;
        let op_start = input.current_token_start();

        let Some(operator) = opt(parse_operator).parse_next(input)? else {
            return match property {
                Some(value) => Ok(value.map(Condition::implicit)),
                None => Err(ErrMode::Backtrack(())),
            };
        };

        let property = match property {
            Some(Some(property)) if !property.is_empty() => Some(property),
            // An invalid escape was already reported.
            Some(None) => None,
            Some(Some(_)) | None => {
                let span = (start, op_start - start).into();
                input
                    .state
                    .report_error(ParseSingleError::ExpectedPropertyName(span));
                None
            }
        };

        let value_start = input.current_token_start();
        let value = match expect(parse_text, ParseSingleError::ExpectedValue).parse_next(input)? {
            Some(Some(value)) if !value.is_empty() => Some(value),
            Some(Some(_)) => {
                let value_end = input.current_token_start();
                let span = (value_start, value_end - value_start).into();
                input
                    .state
                    .report_error(ParseSingleError::ExpectedValue(span));
                None
            }
            Some(None) | None => None,
        };

        Ok(property
            .zip(value)
            .map(|(property, value)| Condition::new(property, operator, value)))
    })
    .parse_next(input)
}

fn expect_expr<'a, P: ModalParser<Span<'a>, ExprResult, Error>>(
    inner: P,
) -> impl ModalParser<Span<'a>, ExprResult, Error> {
    expect(inner, ParseSingleError::ExpectedExpr).map(|res| res.unwrap_or(ExprResult::Error))
}

fn parse_parentheses_expr(input: &mut Span<'_>) -> PResult<ExprResult> {
    trace(
        "parse_parentheses_expr",
        delimited(
            '(',
            expect_expr(parse_expr),
            expect_char(')', ParseSingleError::ExpectedCloseParenthesis),
        )
        .map(|expr| expr.parens()),
    )
    .parse_next(input)
}

fn parse_not_expr(input: &mut Span<'_>) -> PResult<ExprResult> {
    trace(
        "parse_not_expr",
        preceded('!', expect_expr(parse_unary_expr)).map(|expr| expr.negate()),
    )
    .parse_next(input)
}

fn parse_unary_expr(input: &mut Span<'_>) -> PResult<ExprResult> {
    trace(
        "parse_unary_expr",
        ws(alt((
            parse_not_expr,
            parse_parentheses_expr,
            parse_condition.map(|condition| {
                condition
                    .map(|condition| ExprResult::Valid(ParsedExpr::Condition(condition)))
                    .unwrap_or(ExprResult::Error)
            }),
        ))),
    )
    .parse_next(input)
}

fn parse_and_expr(input: &mut Span<'_>) -> PResult<ExprResult> {
    trace("parse_and_expr", |input: &mut _| {
        let expr = expect_expr(parse_unary_expr).parse_next(input)?;

        let exprs = repeat(0.., preceded(ws('&'), expect_expr(parse_unary_expr)))
            .fold(Vec::new, |mut exprs, expr| {
                exprs.push(expr);
                exprs
            })
            .parse_next(input)?;

        Ok(exprs
            .into_iter()
            .fold(expr, |expr_1, expr_2| expr_1.combine(ParsedExpr::and, expr_2)))
    })
    .parse_next(input)
}

fn parse_expr(input: &mut Span<'_>) -> PResult<ExprResult> {
    trace("parse_expr", |input: &mut _| {
        // "|" binds less tightly than "&", so parse "&" within "|".
        let expr = expect_expr(parse_and_expr).parse_next(input)?;

        let exprs = repeat(0.., preceded(ws('|'), expect_expr(parse_and_expr)))
            .fold(Vec::new, |mut exprs, expr| {
                exprs.push(expr);
                exprs
            })
            .parse_next(input)?;

        Ok(exprs
            .into_iter()
            .fold(expr, |expr_1, expr_2| expr_1.combine(ParsedExpr::or, expr_2)))
    })
    .parse_next(input)
}

pub(crate) fn parse(input: Span<'_>) -> Result<ExprResult, ErrMode<Error>> {
    let (_, expr) = terminated(
        parse_expr,
        expect(ws(eof), ParseSingleError::ExpectedEndOfExpression),
    )
    .parse_peek(input)?;
    Ok(expr)
}
