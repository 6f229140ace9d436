use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use super::{CompareOp, Expr, ExpressionError, Value};

#[derive(Parser)]
#[grammar = "expression/grammar.pest"]
struct ExpressionParser;

/// Parses `input`; an expression with no terms yields `None`.
pub(super) fn parse_expression(input: &str) -> Result<Option<Expr>, ExpressionError> {
    let pairs = ExpressionParser::parse(Rule::expression, input)
        .map_err(|e| ExpressionError::Syntax(e.to_string()))?;

    for pair in pairs {
        if pair.as_rule() != Rule::expression {
            continue;
        }
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::or_expr {
                return parse_or(inner).map(Some);
            }
        }
    }

    Ok(None)
}

fn unexpected_rule(rule: Rule) -> ExpressionError {
    ExpressionError::Syntax(format!("unexpected rule: {rule:?}"))
}

fn missing_token(context: &str) -> ExpressionError {
    ExpressionError::Syntax(format!("missing token: {context}"))
}

fn collapse(
    mut operands: Vec<Expr>,
    combine: fn(Vec<Expr>) -> Expr,
) -> Result<Expr, ExpressionError> {
    match operands.len() {
        0 => Err(missing_token("operand")),
        1 => operands.pop().ok_or_else(|| missing_token("operand")),
        _ => Ok(combine(operands)),
    }
}

fn parse_or(pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
    let mut operands = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::and_expr => operands.push(parse_and(inner)?),
            Rule::or_op => {}
            other => return Err(unexpected_rule(other)),
        }
    }
    collapse(operands, Expr::Or)
}

fn parse_and(pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
    let mut operands = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::not_expr => operands.push(parse_not(inner)?),
            Rule::and_op => {}
            other => return Err(unexpected_rule(other)),
        }
    }
    collapse(operands, Expr::And)
}

fn parse_not(pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
    let mut negations = 0;
    let mut operand = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::not_op => negations += 1,
            Rule::comparison => operand = Some(parse_comparison(inner)?),
            other => return Err(unexpected_rule(other)),
        }
    }

    let mut expr = operand.ok_or_else(|| missing_token("negated operand"))?;
    for _ in 0..negations {
        expr = Expr::Not(Box::new(expr));
    }
    Ok(expr)
}

fn parse_comparison(pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
    let mut inner = pair.into_inner();
    let left = parse_primary(inner.next().ok_or_else(|| missing_token("left operand"))?)?;
    let Some(op) = inner.next() else {
        return Ok(left);
    };
    let op = parse_compare_op(op.as_str())?;
    let right = parse_primary(inner.next().ok_or_else(|| missing_token("right operand"))?)?;

    Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
}

fn parse_compare_op(op: &str) -> Result<CompareOp, ExpressionError> {
    match op {
        "==" => Ok(CompareOp::Eq),
        "!=" => Ok(CompareOp::Ne),
        "<" => Ok(CompareOp::Lt),
        "<=" => Ok(CompareOp::Le),
        ">" => Ok(CompareOp::Gt),
        ">=" => Ok(CompareOp::Ge),
        "in" => Ok(CompareOp::In),
        other => Err(ExpressionError::Syntax(format!("unknown operator '{other}'"))),
    }
}

fn parse_primary(pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
    match pair.as_rule() {
        Rule::string => {
            let quoted = pair.as_str();
            Ok(Expr::Literal(Value::Str(quoted[1..quoted.len() - 1].to_string())))
        }
        Rule::integer => pair
            .as_str()
            .parse()
            .map(|value| Expr::Literal(Value::Int(value)))
            .map_err(|e| {
                ExpressionError::Syntax(format!("invalid integer '{}': {e}", pair.as_str()))
            }),
        Rule::boolean => Ok(Expr::Literal(Value::Bool(pair.as_str() == "true"))),
        Rule::null_lit => Ok(Expr::Literal(Value::Null)),
        Rule::identifier => Ok(Expr::Attribute(pair.as_str().to_string())),
        Rule::call => parse_call(pair),
        Rule::or_expr => parse_or(pair),
        other => Err(unexpected_rule(other)),
    }
}

fn parse_call(pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .ok_or_else(|| missing_token("function name"))?
        .as_str()
        .to_string();
    if name != "group" {
        return Err(ExpressionError::UnknownFunction(name));
    }

    let args = inner.map(parse_or).collect::<Result<Vec<_>, _>>()?;
    match args.as_slice() {
        [Expr::Literal(Value::Str(group_name))] => Ok(Expr::Group(group_name.clone())),
        _ => Err(ExpressionError::Syntax(
            "group() takes exactly one string literal".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Expr {
        parse_expression(input).unwrap().unwrap()
    }

    fn attr(name: &str) -> Box<Expr> {
        Box::new(Expr::Attribute(name.to_string()))
    }

    fn string(value: &str) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Str(value.to_string())))
    }

    #[test]
    fn parse_empty_expression() {
        assert_eq!(parse_expression("").unwrap(), None);
        assert_eq!(parse_expression("   ").unwrap(), None);
    }

    #[test]
    fn parse_simple_comparison() {
        assert_eq!(
            parse("id == '1'"),
            Expr::Compare(CompareOp::Eq, attr("id"), string("1"))
        );
    }

    #[test]
    fn parse_double_quoted_string() {
        assert_eq!(
            parse(r#"organization != "CESNET""#),
            Expr::Compare(CompareOp::Ne, attr("organization"), string("CESNET"))
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("a == 1 || b == 2 && c == 3");

        let Expr::Or(operands) = expr else {
            panic!("expected Or, got {expr:?}");
        };
        assert_eq!(operands.len(), 2);
        assert!(matches!(&operands[1], Expr::And(inner) if inner.len() == 2));
    }

    #[test]
    fn keyword_operators_are_accepted() {
        let expr = parse("not true and false or true");

        let Expr::Or(operands) = expr else {
            panic!("expected Or, got {expr:?}");
        };
        assert!(matches!(&operands[0], Expr::And(inner) if matches!(inner[0], Expr::Not(_))));
    }

    #[test]
    fn identifier_may_start_with_keyword() {
        assert_eq!(parse("organization"), Expr::Attribute("organization".to_string()));
        assert_eq!(parse("nullable"), Expr::Attribute("nullable".to_string()));
    }

    #[test]
    fn parse_membership_in_group() {
        assert_eq!(
            parse("id in group('admins')"),
            Expr::Compare(
                CompareOp::In,
                attr("id"),
                Box::new(Expr::Group("admins".to_string()))
            )
        );
    }

    #[test]
    fn parse_negative_integer_and_ordering() {
        assert_eq!(
            parse("loa >= -1"),
            Expr::Compare(
                CompareOp::Ge,
                attr("loa"),
                Box::new(Expr::Literal(Value::Int(-1)))
            )
        );
    }

    #[test]
    fn parenthesized_expression() {
        let expr = parse("!(a == 1 || b == 2)");

        assert!(matches!(expr, Expr::Not(inner) if matches!(*inner, Expr::Or(_))));
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = parse_expression("id in members('x')").unwrap_err();

        assert_eq!(err, ExpressionError::UnknownFunction("members".to_string()));
    }

    #[test]
    fn group_requires_string_literal() {
        assert!(matches!(
            parse_expression("id in group(name)"),
            Err(ExpressionError::Syntax(_))
        ));
        assert!(matches!(
            parse_expression("id in group()"),
            Err(ExpressionError::Syntax(_))
        ));
    }

    #[test]
    fn syntax_error_is_reported() {
        assert!(matches!(
            parse_expression("id == "),
            Err(ExpressionError::Syntax(_))
        ));
        assert!(matches!(
            parse_expression("id = '1'"),
            Err(ExpressionError::Syntax(_))
        ));
    }
}
