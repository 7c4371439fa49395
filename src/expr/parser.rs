//! Recursive-descent parser for the expression mini-language
//!
//! Grammar (informal):
//!
//! ```text
//! expression := call | literal | array | path
//! call       := identifier "(" [ expression { "," expression } ] ")"
//! literal    := string | number | "true" | "false" | "null"
//! array      := "[" [ expression { "," expression } ] "]"
//! path       := identifier { "." identifier }
//! ```
//!
//! Argument splitting on commas falls out of the grammar: commas inside
//! string literals or nested parens belong to the inner production and never
//! split the outer argument list.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of},
    combinator::{all_consuming, map, opt, recognize, value},
    error::VerboseError,
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use serde_json::{Number, Value};

use super::Expr;
use crate::error::TaxonomyError;

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Parse a complete expression; trailing input is an error
pub fn parse_expression(source: &str) -> Result<Expr, TaxonomyError> {
    match all_consuming(delimited(multispace0, expression, multispace0))(source) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(TaxonomyError::Malformed {
            fragment: source.to_string(),
            message: nom::error::convert_error(source, e),
        }),
        Err(nom::Err::Incomplete(_)) => Err(TaxonomyError::Malformed {
            fragment: source.to_string(),
            message: "incomplete input".to_string(),
        }),
    }
}

fn expression(input: &str) -> PResult<'_, Expr> {
    delimited(
        multispace0,
        alt((call, literal, array, path)),
        multispace0,
    )(input)
}

// ============================================================================
// Calls and paths
// ============================================================================

fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn call(input: &str) -> PResult<'_, Expr> {
    let (input, name) = identifier(input)?;
    let (input, args) = delimited(
        preceded(multispace0, char('(')),
        separated_list0(char(','), expression),
        char(')'),
    )(input)?;
    Ok((
        input,
        Expr::Call {
            name: name.to_string(),
            args,
        },
    ))
}

/// Dotted attribute path, desugared into nested getattr calls over context()
fn path(input: &str) -> PResult<'_, Expr> {
    let (input, head) = identifier(input)?;
    let (input, rest) = many0(preceded(char('.'), identifier))(input)?;

    let mut expr = getattr_of(context_call(), head);
    for segment in rest {
        expr = getattr_of(expr, segment);
    }
    Ok((input, expr))
}

fn context_call() -> Expr {
    Expr::Call {
        name: "context".to_string(),
        args: vec![],
    }
}

fn getattr_of(object: Expr, attr: &str) -> Expr {
    Expr::Call {
        name: "getattr".to_string(),
        args: vec![object, Expr::Literal(Value::String(attr.to_string()))],
    }
}

// ============================================================================
// Literals
// ============================================================================

fn literal(input: &str) -> PResult<'_, Expr> {
    alt((
        map(string_literal, |s| Expr::Literal(Value::String(s))),
        number,
        keyword_literal,
    ))(input)
}

/// `true`/`false`/`null`, rejected when they continue as a longer identifier
fn keyword_literal(input: &str) -> PResult<'_, Expr> {
    let (rest, word) = identifier(input)?;
    let lit = match word {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            return Err(nom::Err::Error(nom::error::VerboseError {
                errors: vec![(input, nom::error::VerboseErrorKind::Context("keyword"))],
            }))
        }
    };
    // `true(...)` or `null.x` would have been claimed by call/path first,
    // so a bare keyword here is unambiguous
    Ok((rest, Expr::Literal(lit)))
}

fn string_literal(input: &str) -> PResult<'_, String> {
    alt((quoted_string('"'), quoted_string('\'')))(input)
}

fn quoted_string(quote: char) -> impl Fn(&str) -> PResult<'_, String> {
    move |input| {
        let (input, _) = char(quote)(input)?;
        // Empty string: escaped_transform requires at least one char
        if let Ok((rest, _)) = char::<_, VerboseError<&str>>(quote)(input) {
            return Ok((rest, String::new()));
        }
        let terminators = format!("\\{quote}");
        let (input, content) = escaped_transform(
            none_of(terminators.as_str()),
            '\\',
            alt((
                value('\\', char('\\')),
                value(quote, char(quote)),
                value('\n', char('n')),
                value('\t', char('t')),
            )),
        )(input)?;
        let (input, _) = char(quote)(input)?;
        Ok((input, content))
    }
}

fn number(input: &str) -> PResult<'_, Expr> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;

    let value = if text.contains('.') {
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
    } else {
        text.parse::<i64>().ok().map(|n| Value::Number(n.into()))
    };

    match value {
        Some(v) => Ok((rest, Expr::Literal(v))),
        None => Err(nom::Err::Error(nom::error::VerboseError {
            errors: vec![(input, nom::error::VerboseErrorKind::Context("number"))],
        })),
    }
}

fn array(input: &str) -> PResult<'_, Expr> {
    map(
        delimited(
            char('['),
            separated_list0(char(','), expression),
            preceded(multispace0, char(']')),
        ),
        Expr::Array,
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_call_with_nested_args() {
        let expr = parse_expression("add(1, mul(2, 3))").unwrap();
        match expr {
            Expr::Call { name, args } => {
                assert_eq!(name, "add");
                assert_eq!(args.len(), 2);
                assert!(matches!(&args[1], Expr::Call { name, .. } if name == "mul"));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn parses_negative_and_float_numbers() {
        assert_eq!(
            parse_expression("-42").unwrap(),
            Expr::Literal(json!(-42))
        );
        assert_eq!(
            parse_expression("3.5").unwrap(),
            Expr::Literal(json!(3.5))
        );
    }

    #[test]
    fn dotted_path_desugars_to_getattr() {
        let expr = parse_expression("a.b").unwrap();
        let Expr::Call { name, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(name, "getattr");
        assert_eq!(args[1], Expr::Literal(json!("b")));
        assert!(matches!(&args[0], Expr::Call { name, .. } if name == "getattr"));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            parse_expression(r#""a\"b""#).unwrap(),
            Expr::Literal(json!("a\"b"))
        );
        assert_eq!(
            parse_expression("'it,(s)'").unwrap(),
            Expr::Literal(json!("it,(s)"))
        );
        assert_eq!(parse_expression("\"\"").unwrap(), Expr::Literal(json!("")));
    }

    #[test]
    fn keyword_literals() {
        assert_eq!(parse_expression("true").unwrap(), Expr::Literal(json!(true)));
        assert_eq!(parse_expression("null").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(parse_expression("add(1, 2").is_err());
        assert!(parse_expression("add(1, 2))").is_err());
    }

    #[test]
    fn array_of_expressions() {
        let expr = parse_expression("[1, add(1, 1), \"x\"]").unwrap();
        assert!(matches!(expr, Expr::Array(ref xs) if xs.len() == 3));
    }
}
