mod eval;
mod parser;

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::user_id_set::UserIdSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("expression evaluated to {0} instead of a boolean")]
    NotBoolean(&'static str),
    #[error("operator '{op}' cannot be applied to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Users(UserIdSet),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Str(_) => "string",
            Self::Users(_) => "user set",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(Value),
    Attribute(String),
    /// `group(name)`: members of the named group.
    Group(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn collect_groups(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::Group(name) => {
                names.insert(name.clone());
            }
            Self::Not(inner) => inner.collect_groups(names),
            Self::And(operands) | Self::Or(operands) => {
                for operand in operands {
                    operand.collect_groups(names);
                }
            }
            Self::Compare(_, left, right) => {
                left.collect_groups(names);
                right.collect_groups(names);
            }
            Self::Literal(_) | Self::Attribute(_) => {}
        }
    }
}

/// Attributes of the identity an expression is evaluated for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityAttributes {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub provider: Option<String>,
    pub loa: Option<i64>,
}

impl IdentityAttributes {
    pub fn lookup(&self, name: &str) -> Value {
        let text = match name {
            "id" => &self.id,
            "first_name" => &self.first_name,
            "last_name" => &self.last_name,
            "email" => &self.email,
            "organization" => &self.organization,
            "provider" => &self.provider,
            "loa" => return self.loa.map_or(Value::Null, Value::Int),
            _ => return Value::Null,
        };
        text.clone().map_or(Value::Null, Value::Str)
    }
}

/// A compiled boolean expression granting a system-wide capability.
#[derive(Debug, Clone)]
pub struct AuthorizationExpression {
    source: String,
    root: Option<Expr>,
}

impl AuthorizationExpression {
    /// Compiles `source`. An absent or blank source always evaluates to `false`.
    pub fn compile(source: Option<&str>) -> Result<Self, ExpressionError> {
        let source = source.unwrap_or_default().trim().to_string();
        let root = parser::parse_expression(&source)?;
        Ok(Self { source, root })
    }

    pub fn never() -> Self {
        Self {
            source: String::new(),
            root: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_constant_false(&self) -> bool {
        self.root.is_none()
    }

    /// Names passed to `group(...)` anywhere in the expression.
    pub fn group_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        if let Some(root) = &self.root {
            root.collect_groups(&mut names);
        }
        names
    }

    /// Evaluates against `attributes`; `groups` maps group names to members
    /// and a missing name is an empty group.
    pub fn evaluate(
        &self,
        attributes: &IdentityAttributes,
        groups: &HashMap<String, UserIdSet>,
    ) -> Result<bool, ExpressionError> {
        let Some(root) = &self.root else {
            return Ok(false);
        };
        match eval::evaluate(root, attributes, groups)? {
            Value::Bool(result) => Ok(result),
            other => Err(ExpressionError::NotBoolean(other.type_name())),
        }
    }
}

impl fmt::Display for AuthorizationExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            f.write_str("false")
        } else {
            f.write_str(&self.source)
        }
    }
}
