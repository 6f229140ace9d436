use std::cmp::Ordering;
use std::collections::HashMap;

use super::{CompareOp, Expr, ExpressionError, IdentityAttributes, Value};
use crate::user_id_set::UserIdSet;

pub(super) fn evaluate(
    expr: &Expr,
    attributes: &IdentityAttributes,
    groups: &HashMap<String, UserIdSet>,
) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Attribute(name) => Ok(attributes.lookup(name)),
        Expr::Group(name) => Ok(Value::Users(groups.get(name).cloned().unwrap_or_default())),
        Expr::Not(inner) => {
            let value = evaluate(inner, attributes, groups)?;
            Ok(Value::Bool(!expect_bool("!", &value)?))
        }
        Expr::And(operands) => {
            for operand in operands {
                if !expect_bool("&&", &evaluate(operand, attributes, groups)?)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Expr::Or(operands) => {
            for operand in operands {
                if expect_bool("||", &evaluate(operand, attributes, groups)?)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Expr::Compare(op, left, right) => {
            let left = evaluate(left, attributes, groups)?;
            let right = evaluate(right, attributes, groups)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

fn expect_bool(op: &'static str, value: &Value) -> Result<bool, ExpressionError> {
    match value {
        Value::Bool(result) => Ok(*result),
        other => Err(ExpressionError::TypeMismatch {
            op,
            left: other.type_name(),
            right: "boolean",
        }),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    let mismatch = || ExpressionError::TypeMismatch {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    };

    let ordering = match op {
        CompareOp::Eq => return Ok(left == right),
        CompareOp::Ne => return Ok(left != right),
        CompareOp::In => {
            return match (left, right) {
                (Value::Null, Value::Users(_)) => Ok(false),
                (Value::Str(id), Value::Users(users)) => Ok(users.contains(id)),
                (Value::Int(id), Value::Users(users)) => Ok(users.contains(&id.to_string())),
                _ => Err(mismatch()),
            };
        }
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => return Err(mismatch()),
        },
    };

    Ok(match op {
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}
