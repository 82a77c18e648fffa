//! Named parameter handling
//!
//! Builders render SQL with `:name` tokens and collect values into a named
//! bag; `bind_named_parameters` later replaces each token, in encounter
//! order, with the active dialect's positional placeholder and produces the
//! matching value array. Both steps are synchronous.

use crate::dialect::Dialect;
use crate::errors::QueryObjectError;
use serde_json::Value;
use std::collections::HashMap;

/// Allocates deterministic auto-named parameters during one render pass
///
/// The counter restarts at zero for every render, so repeated renders of an
/// unmodified builder yield byte-identical SQL.
#[derive(Debug, Default)]
pub struct ParameterAllocator {
    counter: usize,
    values: HashMap<String, Value>,
}

impl ParameterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under the next generated name, returning its `:token`
    pub fn push(&mut self, value: Value) -> String {
        let name = format!("orm_param_{}", self.counter);
        self.counter += 1;
        let token = format!(":{}", name);
        self.values.insert(name, value);
        token
    }

    /// Merge the allocated values into a caller-owned parameter bag
    pub fn merge_into(self, parameters: &mut HashMap<String, Value>) {
        parameters.extend(self.values);
    }
}

/// Replace every `:name` token with the dialect's positional placeholder
///
/// Tokens are replaced in encounter order and the returned value array
/// matches that order; a token whose name is absent from the bag fails with
/// `MissingParameter`. `::` sequences (casts) are passed through untouched.
pub fn bind_named_parameters(
    sql: &str,
    parameters: &HashMap<String, Value>,
    dialect: Dialect,
) -> Result<(String, Vec<Value>), QueryObjectError> {
    let mut out = String::with_capacity(sql.len());
    let mut values: Vec<Value> = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if c != ':' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            // `::` is a cast, not a parameter
            Some(':') => {
                out.push_str("::");
                chars.next();
            }
            Some(&next) if next.is_alphanumeric() || next == '_' => {
                let mut name = String::new();
                while let Some(&nc) = chars.peek() {
                    if nc.is_alphanumeric() || nc == '_' {
                        name.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = parameters
                    .get(&name)
                    .ok_or_else(|| QueryObjectError::MissingParameter(name.clone()))?;
                values.push(value.clone());
                out.push_str(&dialect.placeholder(values.len())?);
            }
            _ => out.push(':'),
        }
    }

    Ok((out, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replacement_in_encounter_order() {
        let mut parameters = HashMap::new();
        parameters.insert("id".to_string(), json!(1));
        parameters.insert("name".to_string(), json!("test"));

        let (sql, values) = bind_named_parameters(
            "WHERE id = :id AND name = :name",
            &parameters,
            Dialect::Postgres,
        )
        .unwrap();
        assert_eq!(sql, "WHERE id = $1 AND name = $2");
        assert_eq!(values, vec![json!(1), json!("test")]);
    }

    #[test]
    fn test_question_mark_family() {
        let mut parameters = HashMap::new();
        parameters.insert("a".to_string(), json!(true));
        let (sql, values) =
            bind_named_parameters("x = :a OR y = :a", &parameters, Dialect::MySql).unwrap();
        assert_eq!(sql, "x = ? OR y = ?");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_missing_parameter_fails() {
        let parameters = HashMap::new();
        let err =
            bind_named_parameters("id = :missing", &parameters, Dialect::Postgres).unwrap_err();
        assert!(matches!(err, QueryObjectError::MissingParameter(name) if name == "missing"));
    }

    #[test]
    fn test_cast_is_not_a_parameter() {
        let parameters = HashMap::new();
        let (sql, values) =
            bind_named_parameters("id::text = 'x'", &parameters, Dialect::Postgres).unwrap();
        assert_eq!(sql, "id::text = 'x'");
        assert!(values.is_empty());
    }

    #[test]
    fn test_allocator_names_restart_per_render() {
        let mut first = ParameterAllocator::new();
        assert_eq!(first.push(json!(1)), ":orm_param_0");
        assert_eq!(first.push(json!(2)), ":orm_param_1");

        let mut second = ParameterAllocator::new();
        assert_eq!(second.push(json!(3)), ":orm_param_0");
    }
}
