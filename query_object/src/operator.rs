//! Comparison operator tree
//!
//! Operators attach to a column through the expression map and render
//! themselves to a dialect-aware SQL fragment. Composite operators own their
//! children, so an operator tree is always acyclic.

use crate::dialect::Dialect;
use crate::errors::QueryObjectError;
use crate::params::ParameterAllocator;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Builder closure for `Operator::RawWith`; receives the parameter token
pub type RawSqlFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Operand of a negation: either a plain value or a nested operator
pub enum NotOperand {
    Value(Value),
    Operator(Box<Operator>),
}

/// A comparison applied to one column of the expression map
pub enum Operator {
    Equal(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    MoreThan(Value),
    MoreThanOrEqual(Value),
    Like(Value),
    /// Case-insensitive LIKE; lowered to `LOWER() LIKE LOWER()` where the
    /// dialect has no native ILIKE
    ILike(Value),
    Between(Value, Value),
    /// Membership test over an expanded list; an empty list renders `1=0`
    In(Vec<Value>),
    /// `= ANY(...)` over a single array parameter
    Any(Vec<Value>),
    IsNull,
    Not(NotOperand),
    /// Disjunction of alternatives for the same column
    Or(Vec<Operator>),
    /// Verbatim SQL fragment, no parameters allocated
    Raw(String),
    /// SQL fragment built from the token of one allocated parameter
    RawWith(Value, RawSqlFn),
    /// Comparison against a value inside a JSON column
    Json { key: String, operator: Box<Operator> },
}

impl Operator {
    pub fn equal(value: impl Into<Value>) -> Self {
        Self::Equal(value.into())
    }

    pub fn less_than(value: impl Into<Value>) -> Self {
        Self::LessThan(value.into())
    }

    pub fn less_than_or_equal(value: impl Into<Value>) -> Self {
        Self::LessThanOrEqual(value.into())
    }

    pub fn more_than(value: impl Into<Value>) -> Self {
        Self::MoreThan(value.into())
    }

    pub fn more_than_or_equal(value: impl Into<Value>) -> Self {
        Self::MoreThanOrEqual(value.into())
    }

    pub fn like(pattern: impl Into<Value>) -> Self {
        Self::Like(pattern.into())
    }

    pub fn ilike(pattern: impl Into<Value>) -> Self {
        Self::ILike(pattern.into())
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::Between(low.into(), high.into())
    }

    pub fn r#in(values: impl IntoIterator<Item = Value>) -> Self {
        Self::In(values.into_iter().collect())
    }

    pub fn any(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Any(values.into_iter().collect())
    }

    pub fn not_value(value: impl Into<Value>) -> Self {
        Self::Not(NotOperand::Value(value.into()))
    }

    pub fn not(inner: Operator) -> Self {
        Self::Not(NotOperand::Operator(Box::new(inner)))
    }

    pub fn or(alternatives: impl IntoIterator<Item = Operator>) -> Self {
        Self::Or(alternatives.into_iter().collect())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    pub fn raw_with<F>(value: impl Into<Value>, build: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::RawWith(value.into(), Arc::new(build))
    }

    pub fn json(key: impl Into<String>, operator: Operator) -> Self {
        Self::Json {
            key: key.into(),
            operator: Box::new(operator),
        }
    }

    /// Render this operator against an aliased column reference
    pub fn to_sql(
        &self,
        dialect: Dialect,
        alias: &str,
        params: &mut ParameterAllocator,
    ) -> Result<String, QueryObjectError> {
        match self {
            Self::Equal(value) => Ok(format!("{} = {}", alias, params.push(value.clone()))),
            Self::LessThan(value) => Ok(format!("{} < {}", alias, params.push(value.clone()))),
            Self::LessThanOrEqual(value) => {
                Ok(format!("{} <= {}", alias, params.push(value.clone())))
            }
            Self::MoreThan(value) => Ok(format!("{} > {}", alias, params.push(value.clone()))),
            Self::MoreThanOrEqual(value) => {
                Ok(format!("{} >= {}", alias, params.push(value.clone())))
            }
            Self::Like(pattern) => Ok(format!("{} LIKE {}", alias, params.push(pattern.clone()))),
            Self::ILike(pattern) => {
                let token = params.push(pattern.clone());
                if dialect.supports_ilike() {
                    Ok(format!("{} ILIKE {}", alias, token))
                } else {
                    Ok(format!("LOWER({}) LIKE LOWER({})", alias, token))
                }
            }
            Self::Between(low, high) => Ok(format!(
                "{} BETWEEN {} AND {}",
                alias,
                params.push(low.clone()),
                params.push(high.clone())
            )),
            Self::In(values) => {
                if values.is_empty() {
                    // IN over an empty list matches nothing
                    return Ok("1=0".to_string());
                }
                let tokens: Vec<String> =
                    values.iter().map(|v| params.push(v.clone())).collect();
                Ok(format!("{} IN ({})", alias, tokens.join(", ")))
            }
            Self::Any(values) => {
                let token = params.push(Value::Array(values.clone()));
                Ok(format!("{} = ANY({})", alias, token))
            }
            Self::IsNull => Ok(format!("{} IS NULL", alias)),
            Self::Not(operand) => match operand {
                NotOperand::Value(value) => {
                    Ok(format!("{} != {}", alias, params.push(value.clone())))
                }
                NotOperand::Operator(inner) => {
                    let inner_sql = inner.to_sql(dialect, alias, params)?;
                    Ok(format!("NOT({})", inner_sql))
                }
            },
            Self::Or(alternatives) => {
                let mut parts = Vec::with_capacity(alternatives.len());
                for alternative in alternatives {
                    parts.push(format!("({})", alternative.to_sql(dialect, alias, params)?));
                }
                Ok(parts.join(" OR "))
            }
            Self::Raw(sql) => Ok(sql.clone()),
            Self::RawWith(value, build) => {
                let token = params.push(value.clone());
                Ok(build(&token))
            }
            Self::Json { key, operator } => {
                let path = dialect.json_path_expression(alias, key)?;
                operator.to_sql(dialect, &path, params)
            }
        }
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal(v) => f.debug_tuple("Equal").field(v).finish(),
            Self::LessThan(v) => f.debug_tuple("LessThan").field(v).finish(),
            Self::LessThanOrEqual(v) => f.debug_tuple("LessThanOrEqual").field(v).finish(),
            Self::MoreThan(v) => f.debug_tuple("MoreThan").field(v).finish(),
            Self::MoreThanOrEqual(v) => f.debug_tuple("MoreThanOrEqual").field(v).finish(),
            Self::Like(v) => f.debug_tuple("Like").field(v).finish(),
            Self::ILike(v) => f.debug_tuple("ILike").field(v).finish(),
            Self::Between(a, b) => f.debug_tuple("Between").field(a).field(b).finish(),
            Self::In(v) => f.debug_tuple("In").field(v).finish(),
            Self::Any(v) => f.debug_tuple("Any").field(v).finish(),
            Self::IsNull => write!(f, "IsNull"),
            Self::Not(NotOperand::Value(v)) => f.debug_tuple("Not").field(v).finish(),
            Self::Not(NotOperand::Operator(inner)) => {
                f.debug_tuple("Not").field(inner).finish()
            }
            Self::Or(v) => f.debug_tuple("Or").field(v).finish(),
            Self::Raw(sql) => f.debug_tuple("Raw").field(sql).finish(),
            Self::RawWith(v, _) => f.debug_tuple("RawWith").field(v).field(&"<fn>").finish(),
            Self::Json { key, operator } => f
                .debug_struct("Json")
                .field("key", key)
                .field("operator", operator)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(op: &Operator, dialect: Dialect) -> (String, ParameterAllocator) {
        let mut params = ParameterAllocator::new();
        let sql = op.to_sql(dialect, "user.age", &mut params).unwrap();
        (sql, params)
    }

    #[test]
    fn test_equal_allocates_one_parameter() {
        let (sql, _) = render(&Operator::equal(30), Dialect::Postgres);
        assert_eq!(sql, "user.age = :orm_param_0");
    }

    #[test]
    fn test_between_allocates_two_parameters() {
        let (sql, _) = render(&Operator::between(18, 65), Dialect::Postgres);
        assert_eq!(sql, "user.age BETWEEN :orm_param_0 AND :orm_param_1");
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let (sql, _) = render(&Operator::r#in(Vec::new()), Dialect::Postgres);
        assert_eq!(sql, "1=0");
    }

    #[test]
    fn test_in_expands_each_value() {
        let op = Operator::r#in(vec![json!(1), json!(2), json!(3)]);
        let (sql, _) = render(&op, Dialect::Postgres);
        assert_eq!(sql, "user.age IN (:orm_param_0, :orm_param_1, :orm_param_2)");
    }

    #[test]
    fn test_any_allocates_single_array_parameter() {
        let op = Operator::any(vec![json!(1), json!(2)]);
        let mut params = ParameterAllocator::new();
        let sql = op.to_sql(Dialect::Postgres, "user.age", &mut params).unwrap();
        assert_eq!(sql, "user.age = ANY(:orm_param_0)");
        let mut bag = std::collections::HashMap::new();
        params.merge_into(&mut bag);
        assert_eq!(bag["orm_param_0"], json!([1, 2]));
    }

    #[test]
    fn test_ilike_native_vs_lowered() {
        let (pg, _) = render(&Operator::ilike("a%"), Dialect::Postgres);
        assert_eq!(pg, "user.age ILIKE :orm_param_0");

        let (mysql, _) = render(&Operator::ilike("a%"), Dialect::MySql);
        assert_eq!(mysql, "LOWER(user.age) LIKE LOWER(:orm_param_0)");
    }

    #[test]
    fn test_not_value_renders_inequality() {
        let (sql, _) = render(&Operator::not_value(5), Dialect::Postgres);
        assert_eq!(sql, "user.age != :orm_param_0");
    }

    #[test]
    fn test_not_operator_wraps_inner_sql() {
        let op = Operator::not(Operator::between(1, 2));
        let (sql, _) = render(&op, Dialect::Postgres);
        assert_eq!(sql, "NOT(user.age BETWEEN :orm_param_0 AND :orm_param_1)");
    }

    #[test]
    fn test_or_parenthesizes_each_alternative() {
        let op = Operator::or(vec![Operator::equal(1), Operator::more_than(10)]);
        let (sql, _) = render(&op, Dialect::Postgres);
        assert_eq!(sql, "(user.age = :orm_param_0) OR (user.age > :orm_param_1)");
    }

    #[test]
    fn test_raw_with_receives_token() {
        let op = Operator::raw_with(json!([1, 2]), |token| {
            format!("user.age = ANY({}::int[])", token)
        });
        let (sql, _) = render(&op, Dialect::Postgres);
        assert_eq!(sql, "user.age = ANY(:orm_param_0::int[])");
    }

    #[test]
    fn test_json_operator_rewrites_column_path() {
        let op = Operator::json("city", Operator::equal("Paris"));
        let (sql, _) = render(&op, Dialect::Postgres);
        assert_eq!(sql, "user.age ->> 'city' = :orm_param_0");

        let (mysql, _) = render(
            &Operator::json("city", Operator::equal("Paris")),
            Dialect::MySql,
        );
        assert_eq!(
            mysql,
            "JSON_EXTRACT(user.age, '$.city') = :orm_param_0"
        );
    }
}
