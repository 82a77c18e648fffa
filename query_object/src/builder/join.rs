/// The type of SQL JOIN operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinType {
    pub fn to_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL OUTER JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

/// Condition attached to a join
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// `ON left = right`
    On {
        left_field: String,
        right_field: String,
    },
    /// Verbatim ON fragment, may reference named parameters
    Raw(String),
}

/// One JOIN clause of a select
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub condition: Option<JoinCondition>,
}

impl JoinClause {
    /// Join on an equality between two column references
    pub fn new_on(
        join_type: JoinType,
        table: impl Into<String>,
        left_field: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Self {
        Self {
            join_type,
            table: table.into(),
            alias: None,
            condition: Some(JoinCondition::On {
                left_field: left_field.into(),
                right_field: right_field.into(),
            }),
        }
    }

    /// Join with a caller-written ON fragment
    pub fn new_raw(
        join_type: JoinType,
        table: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            join_type,
            table: table.into(),
            alias: None,
            condition: Some(JoinCondition::Raw(condition.into())),
        }
    }

    /// Cross join, no condition
    pub fn cross(table: impl Into<String>) -> Self {
        Self {
            join_type: JoinType::Cross,
            table: table.into(),
            alias: None,
            condition: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Table reference used in rendered column names
    pub fn table_ref(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Render this clause with a leading space
    pub fn to_sql(&self) -> String {
        let mut sql = format!(" {} {}", self.join_type.to_sql(), self.table);
        if let Some(alias) = &self.alias {
            sql.push_str(&format!(" AS {}", alias));
        }
        match &self.condition {
            Some(JoinCondition::On {
                left_field,
                right_field,
            }) => sql.push_str(&format!(" ON {} = {}", left_field, right_field)),
            Some(JoinCondition::Raw(fragment)) => sql.push_str(&format!(" ON {}", fragment)),
            None => {}
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_type_to_sql() {
        assert_eq!(JoinType::Inner.to_sql(), "INNER JOIN");
        assert_eq!(JoinType::Left.to_sql(), "LEFT JOIN");
        assert_eq!(JoinType::Full.to_sql(), "FULL OUTER JOIN");
        assert_eq!(JoinType::Cross.to_sql(), "CROSS JOIN");
    }

    #[test]
    fn test_on_clause_rendering() {
        let join = JoinClause::new_on(JoinType::Inner, "orders", "user.id", "orders.user_id");
        assert_eq!(join.to_sql(), " INNER JOIN orders ON user.id = orders.user_id");
    }

    #[test]
    fn test_alias_rendering() {
        let join =
            JoinClause::new_on(JoinType::Left, "orders", "user.id", "o.user_id").with_alias("o");
        assert_eq!(join.table_ref(), "o");
        assert_eq!(
            join.to_sql(),
            " LEFT JOIN orders AS o ON user.id = o.user_id"
        );
    }

    #[test]
    fn test_cross_join_has_no_condition() {
        let join = JoinClause::cross("numbers");
        assert_eq!(join.to_sql(), " CROSS JOIN numbers");
    }
}
