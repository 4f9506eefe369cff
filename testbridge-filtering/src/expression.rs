// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{FilterExpressionParseErrors, ParseSingleError},
    parsing::{ComparisonOperator, Condition, ExprResult, ParsedExpr, new_span, parse},
};
use std::{borrow::Cow, cell::RefCell, fmt};

/// The value of a property looked up while evaluating a [`FilterExpression`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PropertyValue<'a> {
    /// A property with a single value, such as a display name.
    Single(Cow<'a, str>),

    /// A property with any number of values, such as a trait.
    Multiple(Vec<&'a str>),
}

impl<'a> PropertyValue<'a> {
    fn any(&self, mut f: impl FnMut(&str) -> bool) -> bool {
        match self {
            Self::Single(value) => f(value.as_ref()),
            Self::Multiple(values) => values.iter().any(|&value| f(value)),
        }
    }
}

impl<'a> From<&'a str> for PropertyValue<'a> {
    fn from(value: &'a str) -> Self {
        Self::Single(Cow::Borrowed(value))
    }
}

impl From<String> for PropertyValue<'_> {
    fn from(value: String) -> Self {
        Self::Single(Cow::Owned(value))
    }
}

/// A parsed legacy filter expression, such as `Category=Unit & FullyQualifiedName~Parser`.
///
/// Property names and values are compared case-insensitively.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FilterExpression {
    /// The input string.
    input: String,

    /// The parsed form of the expression.
    parsed: ParsedExpr,
}

impl FilterExpression {
    /// Parses a filter expression.
    ///
    /// All syntax errors found are returned together.
    pub fn parse(input: impl Into<String>) -> Result<Self, FilterExpressionParseErrors> {
        let input = input.into();
        let errors = RefCell::new(Vec::new());
        let result = parse(new_span(&input, &errors));
        let errors = errors.into_inner();

        match result {
            Ok(ExprResult::Valid(parsed)) if errors.is_empty() => Ok(Self { input, parsed }),
            _ if !errors.is_empty() => {
                Err(FilterExpressionParseErrors::new(input, errors))
            }
            // The parser reported an error variant without recording why, or returned Err(_):
            // both are internal errors.
            _ => Err(FilterExpressionParseErrors::new(
                input,
                vec![ParseSingleError::Unknown],
            )),
        }
    }

    /// Returns the string this expression was parsed from.
    pub fn as_str(&self) -> &str {
        &self.input
    }

    /// Returns the parsed form of this expression.
    pub fn parsed(&self) -> &ParsedExpr {
        &self.parsed
    }

    /// Evaluates this expression, looking up properties through `lookup`.
    ///
    /// `lookup` receives property names as written in the expression and returns `None` for
    /// properties that don't exist. A missing property never equals or contains anything.
    pub fn matches<'a, F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<PropertyValue<'a>>,
    {
        evaluate(&self.parsed, &lookup)
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.input)
    }
}

fn evaluate<'a>(expr: &ParsedExpr, lookup: &dyn Fn(&str) -> Option<PropertyValue<'a>>) -> bool {
    match expr {
        ParsedExpr::Condition(condition) => {
            evaluate_condition(condition, lookup(&condition.property).as_ref())
        }
        ParsedExpr::Not(expr) => !evaluate(expr, lookup),
        ParsedExpr::And(expr_1, expr_2) => evaluate(expr_1, lookup) && evaluate(expr_2, lookup),
        ParsedExpr::Or(expr_1, expr_2) => evaluate(expr_1, lookup) || evaluate(expr_2, lookup),
        ParsedExpr::Parens(expr) => evaluate(expr, lookup),
    }
}

fn evaluate_condition(condition: &Condition, value: Option<&PropertyValue<'_>>) -> bool {
    let Some(value) = value else {
        return condition.operator.is_negated();
    };

    let needle = condition.value.to_lowercase();
    match condition.operator {
        ComparisonOperator::Equal => value.any(|v| v.to_lowercase() == needle),
        ComparisonOperator::NotEqual => !value.any(|v| v.to_lowercase() == needle),
        ComparisonOperator::Contains => value.any(|v| v.to_lowercase().contains(&needle)),
        ComparisonOperator::NotContains => !value.any(|v| v.to_lowercase().contains(&needle)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn lookup(name: &str) -> Option<PropertyValue<'static>> {
        match name.to_ascii_lowercase().as_str() {
            "fullyqualifiedname" => Some("Ns.Parser.ParsesEmptyInput".into()),
            "displayname" => Some("Parses empty input".into()),
            "category" => Some(PropertyValue::Multiple(vec!["Unit", "Fast"])),
            "owner" => Some(PropertyValue::Multiple(vec![])),
            _ => None,
        }
    }

    #[test_case("Category=Unit", true; "equal to one of several values")]
    #[test_case("category=unit", true; "case-insensitive")]
    #[test_case("Category=Integration", false; "no value equal")]
    #[test_case("Category!=Integration", true; "not equal")]
    #[test_case("Category!=Fast", false; "not equal with a matching value")]
    #[test_case("DisplayName~EMPTY", true; "contains")]
    #[test_case("DisplayName!~empty", false; "not contains")]
    #[test_case("Parser", true; "bare value against fully-qualified name")]
    #[test_case("Lexer", false; "bare value not found")]
    #[test_case("Priority=1", false; "missing property never equals")]
    #[test_case("Priority~1", false; "missing property never contains")]
    #[test_case("Priority!=1", true; "missing property is not equal")]
    #[test_case("Owner=alice", false; "empty multi-valued property")]
    #[test_case("Category=Integration | DisplayName~input", true; "or")]
    #[test_case("Category=Unit & DisplayName~slow", false; "and")]
    #[test_case("!(Category=Unit)", false; "not")]
    #[test_case("!Category=Integration & (Parser | Lexer)", true; "nested")]
    fn evaluate_expression(input: &str, expected: bool) {
        let expr = FilterExpression::parse(input).unwrap();
        assert_eq!(expr.matches(lookup), expected, "for expression {input:?}");
    }

    #[test]
    fn parse_errors_collects_all() {
        let errors = FilterExpression::parse("(A= & B").unwrap_err();
        assert_eq!(errors.input, "(A= & B");
        assert!(
            matches!(
                errors.errors.as_slice(),
                [
                    ParseSingleError::ExpectedValue(_),
                    ParseSingleError::ExpectedCloseParenthesis(_)
                ]
            ),
            "errors: {:?}",
            errors.errors
        );
    }
}
