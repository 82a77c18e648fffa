//! Dialect capability resolution
//!
//! Every answer here is a pure function of the dialect tag. Builders ask
//! this module what SQL surface is legal and never inspect driver types;
//! adding a dialect means extending the matches in this file, nothing else.

use crate::errors::QueryObjectError;
use std::fmt;
use std::str::FromStr;

/// Supported database dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    CockroachDb,
    AuroraPostgres,
    MySql,
    MariaDb,
    AuroraMySql,
    Sqlite,
    Mssql,
    Oracle,
    Sap,
    Spanner,
    MongoDb,
}

/// Parameter placeholder family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ...
    Dollar,
    /// `?`
    Question,
    /// `:1`, `:2`, ...
    Colon,
    /// `@1`, `@2`, ...
    At,
}

/// How affected-row values can be read back from a mutating statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningSupport {
    /// `RETURNING col, ...` appended to the statement
    Returning,
    /// `OUTPUT INSERTED.col / DELETED.col` between clause head and body
    Output,
    Unsupported,
}

/// Upsert clause family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSyntax {
    /// `ON CONFLICT (...) DO NOTHING / DO UPDATE SET`
    OnConflict,
    /// `INSERT IGNORE` / `ON DUPLICATE KEY UPDATE`
    OnDuplicateKey,
    Unsupported,
}

/// How an absent insert value renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValuePolicy {
    Null,
    DefaultKeyword,
}

/// JSON path predicate family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonPathStyle {
    /// `col ->> 'key'`
    Arrow,
    /// `JSON_EXTRACT(col, '$.key')`
    JsonExtract,
    /// `JSON_VALUE(col, '$.key')`
    JsonValue,
    Unsupported,
}

impl Dialect {
    /// Placeholder family, `None` for engines without parameter support
    pub fn placeholder_style(self) -> Option<PlaceholderStyle> {
        match self {
            Dialect::Postgres | Dialect::CockroachDb | Dialect::AuroraPostgres => {
                Some(PlaceholderStyle::Dollar)
            }
            Dialect::MySql
            | Dialect::MariaDb
            | Dialect::AuroraMySql
            | Dialect::Sqlite
            | Dialect::Sap => Some(PlaceholderStyle::Question),
            Dialect::Oracle => Some(PlaceholderStyle::Colon),
            Dialect::Mssql | Dialect::Spanner => Some(PlaceholderStyle::At),
            Dialect::MongoDb => None,
        }
    }

    /// Render the positional placeholder for a 1-based parameter index
    pub fn placeholder(self, index: usize) -> Result<String, QueryObjectError> {
        match self.placeholder_style() {
            Some(PlaceholderStyle::Dollar) => Ok(format!("${}", index)),
            Some(PlaceholderStyle::Question) => Ok("?".to_string()),
            Some(PlaceholderStyle::Colon) => Ok(format!(":{}", index)),
            Some(PlaceholderStyle::At) => Ok(format!("@{}", index)),
            None => Err(QueryObjectError::ParametersNotSupported(self)),
        }
    }

    pub fn returning_support(self) -> ReturningSupport {
        match self {
            Dialect::Postgres
            | Dialect::CockroachDb
            | Dialect::AuroraPostgres
            | Dialect::Oracle => ReturningSupport::Returning,
            Dialect::Mssql => ReturningSupport::Output,
            _ => ReturningSupport::Unsupported,
        }
    }

    pub fn supports_returning(self) -> bool {
        self.returning_support() != ReturningSupport::Unsupported
    }

    /// Only the MySQL family accepts LIMIT on UPDATE / soft-delete statements
    pub fn supports_limit_on_update(self) -> bool {
        matches!(
            self,
            Dialect::MySql | Dialect::MariaDb | Dialect::AuroraMySql
        )
    }

    pub fn conflict_syntax(self) -> ConflictSyntax {
        match self {
            Dialect::Postgres | Dialect::CockroachDb | Dialect::AuroraPostgres | Dialect::Sqlite => {
                ConflictSyntax::OnConflict
            }
            Dialect::MySql | Dialect::MariaDb | Dialect::AuroraMySql => {
                ConflictSyntax::OnDuplicateKey
            }
            _ => ConflictSyntax::Unsupported,
        }
    }

    /// An explicit table entry, never inferred: the sqlite family renders an
    /// absent insert value as NULL, every other dialect as DEFAULT.
    pub fn missing_value_policy(self) -> MissingValuePolicy {
        match self {
            Dialect::Sqlite => MissingValuePolicy::Null,
            _ => MissingValuePolicy::DefaultKeyword,
        }
    }

    /// Engine-native "now" expression, used for delete/update timestamps
    pub fn now_expression(self) -> &'static str {
        match self {
            Dialect::Postgres
            | Dialect::CockroachDb
            | Dialect::AuroraPostgres
            | Dialect::MySql
            | Dialect::MariaDb
            | Dialect::AuroraMySql => "NOW()",
            Dialect::Mssql => "GETDATE()",
            Dialect::Spanner => "CURRENT_TIMESTAMP()",
            _ => "CURRENT_TIMESTAMP",
        }
    }

    /// Junction bulk inserts run one statement per row for these engines
    pub fn requires_serial_junction_insert(self) -> bool {
        matches!(self, Dialect::Oracle | Dialect::Sap)
    }

    pub fn json_path_style(self) -> JsonPathStyle {
        match self {
            Dialect::Postgres | Dialect::CockroachDb | Dialect::AuroraPostgres | Dialect::Sqlite => {
                JsonPathStyle::Arrow
            }
            Dialect::MySql | Dialect::MariaDb | Dialect::AuroraMySql => JsonPathStyle::JsonExtract,
            Dialect::Mssql | Dialect::Oracle => JsonPathStyle::JsonValue,
            _ => JsonPathStyle::Unsupported,
        }
    }

    /// Render a JSON path lookup over an aliased column
    pub fn json_path_expression(
        self,
        alias: &str,
        key: &str,
    ) -> Result<String, QueryObjectError> {
        match self.json_path_style() {
            JsonPathStyle::Arrow => Ok(format!("{} ->> '{}'", alias, key)),
            JsonPathStyle::JsonExtract => Ok(format!("JSON_EXTRACT({}, '$.{}')", alias, key)),
            JsonPathStyle::JsonValue => Ok(format!("JSON_VALUE({}, '$.{}')", alias, key)),
            JsonPathStyle::Unsupported => {
                Err(QueryObjectError::capability(self, "JSON path predicates"))
            }
        }
    }

    /// True for `ILIKE`-native engines; others fall back to LOWER() LIKE
    pub fn supports_ilike(self) -> bool {
        matches!(
            self,
            Dialect::Postgres | Dialect::CockroachDb | Dialect::AuroraPostgres
        )
    }

    /// File-backed engines need a persistence flush after commit
    pub fn is_file_backed(self) -> bool {
        matches!(self, Dialect::Sqlite)
    }

    /// Render the pagination clause for a SELECT (leading space included)
    pub fn pagination_clause(
        self,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<String, QueryObjectError> {
        if limit.is_none() && offset.is_none() {
            return Ok(String::new());
        }
        match self {
            Dialect::Mssql | Dialect::Oracle => {
                let mut clause = format!(" OFFSET {} ROWS", offset.unwrap_or(0));
                if let Some(limit) = limit {
                    clause.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
                }
                Ok(clause)
            }
            Dialect::MySql | Dialect::MariaDb | Dialect::AuroraMySql => {
                // MySQL has no bare OFFSET; an offset without a limit needs
                // the engine's maximum row count as the limit.
                match (limit, offset) {
                    (Some(limit), Some(offset)) => Ok(format!(" LIMIT {} OFFSET {}", limit, offset)),
                    (Some(limit), None) => Ok(format!(" LIMIT {}", limit)),
                    (None, Some(offset)) => {
                        Ok(format!(" LIMIT 18446744073709551615 OFFSET {}", offset))
                    }
                    (None, None) => Ok(String::new()),
                }
            }
            Dialect::MongoDb => Err(QueryObjectError::capability(self, "LIMIT/OFFSET clauses")),
            _ => {
                let mut clause = String::new();
                if let Some(limit) = limit {
                    clause.push_str(&format!(" LIMIT {}", limit));
                }
                if let Some(offset) = offset {
                    clause.push_str(&format!(" OFFSET {}", offset));
                }
                Ok(clause)
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Postgres => "postgres",
            Dialect::CockroachDb => "cockroachdb",
            Dialect::AuroraPostgres => "aurora-postgres",
            Dialect::MySql => "mysql",
            Dialect::MariaDb => "mariadb",
            Dialect::AuroraMySql => "aurora-mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Mssql => "mssql",
            Dialect::Oracle => "oracle",
            Dialect::Sap => "sap",
            Dialect::Spanner => "spanner",
            Dialect::MongoDb => "mongodb",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Dialect {
    type Err = QueryObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "cockroachdb" => Ok(Dialect::CockroachDb),
            "aurora-postgres" => Ok(Dialect::AuroraPostgres),
            "mysql" => Ok(Dialect::MySql),
            "mariadb" => Ok(Dialect::MariaDb),
            "aurora-mysql" => Ok(Dialect::AuroraMySql),
            "sqlite" => Ok(Dialect::Sqlite),
            "mssql" | "sqlserver" => Ok(Dialect::Mssql),
            "oracle" => Ok(Dialect::Oracle),
            "sap" => Ok(Dialect::Sap),
            "spanner" => Ok(Dialect::Spanner),
            "mongodb" => Ok(Dialect::MongoDb),
            other => Err(QueryObjectError::MissingConfiguration(format!(
                "unknown database dialect \"{}\"",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_families() {
        assert_eq!(Dialect::Postgres.placeholder(3).unwrap(), "$3");
        assert_eq!(Dialect::MySql.placeholder(3).unwrap(), "?");
        assert_eq!(Dialect::Sqlite.placeholder(1).unwrap(), "?");
        assert_eq!(Dialect::Oracle.placeholder(2).unwrap(), ":2");
        assert_eq!(Dialect::Mssql.placeholder(4).unwrap(), "@4");
        assert_eq!(Dialect::Spanner.placeholder(1).unwrap(), "@1");
    }

    #[test]
    fn test_mongodb_has_no_parameters() {
        let err = Dialect::MongoDb.placeholder(1).unwrap_err();
        assert!(matches!(err, QueryObjectError::ParametersNotSupported(_)));
        assert!(err.to_string().contains("does not support parameters"));
    }

    #[test]
    fn test_limit_on_update_gate() {
        assert!(Dialect::MySql.supports_limit_on_update());
        assert!(Dialect::MariaDb.supports_limit_on_update());
        assert!(!Dialect::Postgres.supports_limit_on_update());
        assert!(!Dialect::Mssql.supports_limit_on_update());
        assert!(!Dialect::Sqlite.supports_limit_on_update());
    }

    #[test]
    fn test_missing_value_policy_table() {
        assert_eq!(
            Dialect::Sqlite.missing_value_policy(),
            MissingValuePolicy::Null
        );
        assert_eq!(
            Dialect::Postgres.missing_value_policy(),
            MissingValuePolicy::DefaultKeyword
        );
        assert_eq!(
            Dialect::Oracle.missing_value_policy(),
            MissingValuePolicy::DefaultKeyword
        );
    }

    #[test]
    fn test_pagination_families() {
        assert_eq!(
            Dialect::Postgres
                .pagination_clause(Some(10), Some(20))
                .unwrap(),
            " LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            Dialect::Mssql.pagination_clause(Some(10), Some(20)).unwrap(),
            " OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(
            Dialect::MySql.pagination_clause(None, Some(5)).unwrap(),
            " LIMIT 18446744073709551615 OFFSET 5"
        );
        assert_eq!(Dialect::Sqlite.pagination_clause(None, None).unwrap(), "");
    }

    #[test]
    fn test_dialect_parsing() {
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlserver".parse::<Dialect>().unwrap(), Dialect::Mssql);
        assert!("dbase".parse::<Dialect>().is_err());
    }
}
