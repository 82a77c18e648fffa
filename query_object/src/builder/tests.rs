//! Rendering tests for the query builders
//!
//! Everything here is synchronous: builders are rendered, never executed.

use super::*;
use crate::errors::QueryObjectError;
use crate::expression::{CellValue, OrderBySpec};
use crate::metadata::{ColumnMetadata, ColumnRole, DeleteDateValue, EntityMetadata};
use crate::operator::Operator;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn context(dialect: crate::dialect::Dialect) -> QueryBuilderContext {
    QueryBuilderContext::new(dialect)
}

fn user_metadata() -> Arc<EntityMetadata> {
    Arc::new(
        EntityMetadata::new("user")
            .column(ColumnMetadata::new("id").primary().generated())
            .column(ColumnMetadata::new("name"))
            .column(ColumnMetadata::new("email"))
            .column(ColumnMetadata::new("deleted_at").role(ColumnRole::DeleteDate))
            .column(ColumnMetadata::new("updated_at").role(ColumnRole::UpdateDate))
            .column(ColumnMetadata::new("version").role(ColumnRole::Version)),
    )
}

mod select {
    use super::*;
    use crate::dialect::Dialect;

    #[test]
    fn test_basic_select_uses_table_as_alias() {
        let builder = SelectQueryBuilder::new(context(Dialect::Postgres), "user");
        assert_eq!(builder.get_query().unwrap(), "SELECT user.* FROM user");
    }

    #[test]
    fn test_select_with_explicit_alias_and_columns() {
        let builder = SelectQueryBuilder::new(context(Dialect::Postgres), "user")
            .alias("u")
            .select(["u.id", "u.name"]);
        assert_eq!(
            builder.get_query().unwrap(),
            "SELECT u.id, u.name FROM user AS u"
        );
    }

    #[test]
    fn test_where_chain_connectors() {
        let builder = SelectQueryBuilder::new(context(Dialect::Postgres), "user")
            .where_raw("name = :name")
            .and_where("email IS NOT NULL")
            .or_where("id = :id");
        assert_eq!(
            builder.get_query().unwrap(),
            "SELECT user.* FROM user WHERE name = :name AND email IS NOT NULL OR id = :id"
        );
    }

    #[test]
    fn test_operator_where_qualifies_bare_columns() {
        let builder = SelectQueryBuilder::new(context(Dialect::Postgres), "user")
            .alias("u")
            .and_where_op("age", Operator::more_than(21));
        assert_eq!(
            builder.get_query().unwrap(),
            "SELECT u.* FROM user AS u WHERE u.age > :orm_param_0"
        );
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let builder = SelectQueryBuilder::new(context(Dialect::Postgres), "user")
            .and_where_op("age", Operator::between(18, 65))
            .and_where_op("name", Operator::like("a%"));
        let first = builder.get_query().unwrap();
        let second = builder.get_query().unwrap();
        assert_eq!(first, second);

        let (sql_a, params_a) = builder.get_query_and_parameters().unwrap();
        let (sql_b, params_b) = builder.get_query_and_parameters().unwrap();
        assert_eq!(sql_a, sql_b);
        assert_eq!(params_a, params_b);
    }

    #[test]
    fn test_parameter_binding_per_dialect() {
        let build = |dialect| {
            SelectQueryBuilder::new(context(dialect), "user")
                .where_raw("name = :name AND age > :age")
                .set_parameter("name", json!("ada"))
                .set_parameter("age", json!(30))
                .get_query_and_parameters()
                .unwrap()
        };

        let (pg_sql, pg_params) = build(Dialect::Postgres);
        assert_eq!(pg_sql, "SELECT user.* FROM user WHERE name = $1 AND age > $2");
        assert_eq!(pg_params, vec![json!("ada"), json!(30)]);

        let (my_sql, _) = build(Dialect::MySql);
        assert_eq!(my_sql, "SELECT user.* FROM user WHERE name = ? AND age > ?");

        let (ms_sql, _) = build(Dialect::Mssql);
        assert_eq!(ms_sql, "SELECT user.* FROM user WHERE name = @1 AND age > @2");

        let (ora_sql, _) = build(Dialect::Oracle);
        assert_eq!(ora_sql, "SELECT user.* FROM user WHERE name = :1 AND age > :2");
    }

    #[test]
    fn test_missing_named_parameter_fails() {
        let builder =
            SelectQueryBuilder::new(context(Dialect::Postgres), "user").where_raw("id = :id");
        let err = builder.get_query_and_parameters().unwrap_err();
        assert!(matches!(err, QueryObjectError::MissingParameter(_)));
    }

    #[test]
    fn test_order_by_and_nulls() {
        let builder = SelectQueryBuilder::new(context(Dialect::Postgres), "user")
            .add_order_by("name", OrderBySpec::asc())
            .add_order_by("id", OrderBySpec::desc())
            .nulls(crate::expression::NullsOrder::Last);
        assert_eq!(
            builder.get_query().unwrap(),
            "SELECT user.* FROM user ORDER BY user.name ASC, user.id DESC NULLS LAST"
        );
    }

    #[test]
    fn test_pagination_families() {
        let pg = SelectQueryBuilder::new(context(Dialect::Postgres), "user")
            .limit(10)
            .offset(20);
        assert_eq!(
            pg.get_query().unwrap(),
            "SELECT user.* FROM user LIMIT 10 OFFSET 20"
        );

        let ms = SelectQueryBuilder::new(context(Dialect::Mssql), "user")
            .limit(10)
            .offset(20);
        assert_eq!(
            ms.get_query().unwrap(),
            "SELECT user.* FROM user OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_take_and_skip_win_over_limit_and_offset() {
        let builder = SelectQueryBuilder::new(context(Dialect::Postgres), "user")
            .limit(100)
            .offset(50)
            .take(10)
            .skip(5);
        assert_eq!(
            builder.get_query().unwrap(),
            "SELECT user.* FROM user LIMIT 10 OFFSET 5"
        );
    }

    #[test]
    fn test_join_rendering() {
        let builder = SelectQueryBuilder::new(context(Dialect::Postgres), "user")
            .join(JoinClause::new_on(
                JoinType::Left,
                "orders",
                "user.id",
                "o.user_id",
            ).with_alias("o"))
            .and_where("o.total > :min")
            .set_parameter("min", json!(100));
        assert_eq!(
            builder.get_query().unwrap(),
            "SELECT user.* FROM user LEFT JOIN orders AS o ON user.id = o.user_id WHERE o.total > :min"
        );
    }

    #[test]
    fn test_native_parameter_overrides_named() {
        let builder = SelectQueryBuilder::new(context(Dialect::Postgres), "user")
            .where_raw("id = :id")
            .set_parameter("id", json!(1))
            .set_native_parameter("id", json!(2));
        let (_, params) = builder.get_query_and_parameters().unwrap();
        assert_eq!(params, vec![json!(2)]);
    }
}

mod insert {
    use super::*;
    use crate::dialect::Dialect;

    #[test]
    fn test_multi_row_insert_from_entities() {
        let builder = InsertQueryBuilder::new(context(Dialect::Postgres), "user")
            .columns(["name", "email"])
            .values(vec![
                json!({"name": "ada", "email": "ada@db.io"}),
                json!({"name": "alan", "email": "alan@db.io"}),
            ]);
        assert_eq!(
            builder.get_query().unwrap(),
            "INSERT INTO user (name, email) VALUES (:orm_param_0, :orm_param_1), (:orm_param_2, :orm_param_3)"
        );
    }

    #[test]
    fn test_column_inference_from_metadata_skips_generated() {
        let builder =
            InsertQueryBuilder::with_metadata(context(Dialect::Postgres), "user", user_metadata())
                .values(vec![json!({"name": "ada"})]);
        let sql = builder.get_query().unwrap();
        assert!(sql.starts_with("INSERT INTO user (name, email, deleted_at, updated_at, version)"));
    }

    #[test]
    fn test_column_inference_from_rows_is_sorted() {
        let builder = InsertQueryBuilder::new(context(Dialect::Postgres), "user")
            .values(vec![json!({"zeta": 1, "alpha": 2})]);
        let sql = builder.get_query().unwrap();
        assert!(sql.starts_with("INSERT INTO user (alpha, zeta)"));
    }

    #[test]
    fn test_missing_value_policy() {
        let rows = vec![json!({"name": "ada", "email": "ada@db.io"}), json!({"name": "alan"})];

        let pg = InsertQueryBuilder::new(context(Dialect::Postgres), "user")
            .columns(["name", "email"])
            .values(rows.clone());
        assert!(pg.get_query().unwrap().ends_with("(:orm_param_2, DEFAULT)"));

        let lite = InsertQueryBuilder::new(context(Dialect::Sqlite), "user")
            .columns(["name", "email"])
            .values(rows);
        assert!(lite.get_query().unwrap().ends_with("(:orm_param_2, NULL)"));
    }

    #[test]
    fn test_expression_cells_render_verbatim() {
        let mut row = HashMap::new();
        row.insert("name".to_string(), CellValue::from("ada"));
        row.insert(
            "created_at".to_string(),
            CellValue::Expression("NOW()".to_string()),
        );
        let builder = InsertQueryBuilder::new(context(Dialect::Postgres), "user")
            .columns(["name", "created_at"])
            .value_map(row);
        assert_eq!(
            builder.get_query().unwrap(),
            "INSERT INTO user (name, created_at) VALUES (:orm_param_0, NOW())"
        );
    }

    #[test]
    fn test_on_conflict_do_update() {
        let builder = InsertQueryBuilder::new(context(Dialect::Postgres), "user")
            .columns(["email", "name"])
            .values(vec![json!({"email": "ada@db.io", "name": "ada"})])
            .on_conflict(["email"])
            .or_update(["name"]);
        assert_eq!(
            builder.get_query().unwrap(),
            "INSERT INTO user (email, name) VALUES (:orm_param_0, :orm_param_1) ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name"
        );
    }

    #[test]
    fn test_or_update_without_conflict_target_fails() {
        let builder = InsertQueryBuilder::new(context(Dialect::Postgres), "user")
            .columns(["name"])
            .values(vec![json!({"name": "ada"})])
            .or_update(["name"]);
        assert!(matches!(
            builder.get_query().unwrap_err(),
            QueryObjectError::MissingConfiguration(_)
        ));
    }

    #[test]
    fn test_on_duplicate_key_update() {
        let builder = InsertQueryBuilder::new(context(Dialect::MySql), "user")
            .columns(["email", "name"])
            .values(vec![json!({"email": "ada@db.io", "name": "ada"})])
            .or_update(["name"]);
        assert_eq!(
            builder.get_query().unwrap(),
            "INSERT INTO user (email, name) VALUES (:orm_param_0, :orm_param_1) ON DUPLICATE KEY UPDATE name = VALUES(name)"
        );
    }

    #[test]
    fn test_or_ignore_per_dialect() {
        let pg = InsertQueryBuilder::new(context(Dialect::Postgres), "user")
            .columns(["name"])
            .values(vec![json!({"name": "ada"})])
            .or_ignore();
        assert!(pg.get_query().unwrap().ends_with(" ON CONFLICT DO NOTHING"));

        let my = InsertQueryBuilder::new(context(Dialect::MySql), "user")
            .columns(["name"])
            .values(vec![json!({"name": "ada"})])
            .or_ignore();
        assert!(my.get_query().unwrap().starts_with("INSERT IGNORE INTO user"));
    }

    #[test]
    fn test_upsert_unsupported_dialect_fails() {
        let builder = InsertQueryBuilder::new(context(Dialect::Mssql), "user")
            .columns(["name"])
            .values(vec![json!({"name": "ada"})])
            .or_ignore();
        assert!(matches!(
            builder.get_query().unwrap_err(),
            QueryObjectError::Capability { .. }
        ));
    }

    #[test]
    fn test_returning_placement() {
        let pg = InsertQueryBuilder::new(context(Dialect::Postgres), "user")
            .columns(["name"])
            .values(vec![json!({"name": "ada"})])
            .returning(["id", "name"]);
        assert_eq!(
            pg.get_query().unwrap(),
            "INSERT INTO user (name) VALUES (:orm_param_0) RETURNING id, name"
        );

        // OUTPUT sits between the column list and VALUES
        let ms = InsertQueryBuilder::new(context(Dialect::Mssql), "user")
            .columns(["name"])
            .values(vec![json!({"name": "ada"})])
            .returning(["id"]);
        assert_eq!(
            ms.get_query().unwrap(),
            "INSERT INTO user (name) OUTPUT INSERTED.id VALUES (:orm_param_0)"
        );
    }

    #[test]
    fn test_returning_unsupported_dialect_fails() {
        let builder = InsertQueryBuilder::new(context(Dialect::MySql), "user")
            .columns(["name"])
            .values(vec![json!({"name": "ada"})])
            .returning(["id"]);
        assert!(matches!(
            builder.get_query().unwrap_err(),
            QueryObjectError::Capability { .. }
        ));
    }

    #[test]
    fn test_empty_insert_fails() {
        let builder = InsertQueryBuilder::new(context(Dialect::Postgres), "user");
        assert!(matches!(
            builder.get_query().unwrap_err(),
            QueryObjectError::MissingConfiguration(_)
        ));
    }
}

mod update {
    use super::*;
    use crate::dialect::Dialect;

    #[test]
    fn test_set_renders_in_insertion_order() {
        let builder = UpdateQueryBuilder::new(context(Dialect::Postgres), "user")
            .set("name", "ada")
            .set("email", "ada@db.io")
            .where_raw("id = :id")
            .set_parameter("id", json!(1));
        assert_eq!(
            builder.get_query().unwrap(),
            "UPDATE user SET name = :orm_param_0, email = :orm_param_1 WHERE id = :id"
        );
    }

    #[test]
    fn test_set_entity_bumps_version_and_update_date() {
        let builder =
            UpdateQueryBuilder::with_metadata(context(Dialect::Postgres), "user", user_metadata())
                .set_entity(json!({"id": 7, "name": "ada"}));
        assert_eq!(
            builder.get_query().unwrap(),
            "UPDATE user SET name = :orm_param_0, version = version + 1, updated_at = NOW() WHERE id IN (:orm_param_1)"
        );
    }

    #[test]
    fn test_empty_set_fails() {
        let builder = UpdateQueryBuilder::new(context(Dialect::Postgres), "user")
            .where_raw("id = 1");
        assert!(matches!(
            builder.get_query().unwrap_err(),
            QueryObjectError::UpdateValuesMissing
        ));
    }

    #[test]
    fn test_limit_gated_by_dialect() {
        let pg = UpdateQueryBuilder::new(context(Dialect::Postgres), "user")
            .set("name", "ada")
            .limit(5);
        assert!(matches!(
            pg.get_query().unwrap_err(),
            QueryObjectError::Capability { .. }
        ));

        let my = UpdateQueryBuilder::new(context(Dialect::MySql), "user")
            .set("name", "ada")
            .order_by("id", OrderBySpec::asc())
            .limit(5);
        assert_eq!(
            my.get_query().unwrap(),
            "UPDATE user SET name = :orm_param_0 ORDER BY id ASC LIMIT 5"
        );
    }

    #[test]
    fn test_returning_placement() {
        let pg = UpdateQueryBuilder::new(context(Dialect::Postgres), "user")
            .set("name", "ada")
            .where_raw("id = 1")
            .returning(["version"]);
        assert_eq!(
            pg.get_query().unwrap(),
            "UPDATE user SET name = :orm_param_0 WHERE id = 1 RETURNING version"
        );

        let ms = UpdateQueryBuilder::new(context(Dialect::Mssql), "user")
            .set("name", "ada")
            .where_raw("id = 1")
            .returning(["version"]);
        assert_eq!(
            ms.get_query().unwrap(),
            "UPDATE user SET name = :orm_param_0 OUTPUT INSERTED.version WHERE id = 1"
        );
    }

    #[test]
    fn test_where_in_ids() {
        let builder =
            UpdateQueryBuilder::with_metadata(context(Dialect::Postgres), "user", user_metadata())
                .set("name", "ada")
                .where_in_ids(vec![json!(1), json!(2)])
                .unwrap();
        assert_eq!(
            builder.get_query().unwrap(),
            "UPDATE user SET name = :orm_param_0 WHERE id IN (:orm_param_1, :orm_param_2)"
        );
    }
}

mod delete {
    use super::*;
    use crate::dialect::Dialect;

    #[test]
    fn test_basic_delete() {
        let builder = DeleteQueryBuilder::new(context(Dialect::Postgres), "user")
            .where_raw("id = :id")
            .set_parameter("id", json!(1));
        assert_eq!(builder.get_query().unwrap(), "DELETE FROM user WHERE id = :id");
    }

    #[test]
    fn test_delete_where_in_ids() {
        let builder =
            DeleteQueryBuilder::with_metadata(context(Dialect::Postgres), "user", user_metadata())
                .where_in_ids(vec![json!(1), json!(2)])
                .unwrap();
        assert_eq!(
            builder.get_query().unwrap(),
            "DELETE FROM user WHERE id IN (:orm_param_0, :orm_param_1)"
        );
    }

    #[test]
    fn test_output_reads_deleted_rows_before_where() {
        let builder = DeleteQueryBuilder::new(context(Dialect::Mssql), "user")
            .where_raw("id = 1")
            .returning(["id", "name"]);
        assert_eq!(
            builder.get_query().unwrap(),
            "DELETE FROM user OUTPUT DELETED.id, DELETED.name WHERE id = 1"
        );
    }

    #[test]
    fn test_delete_where_entities_composite_key() {
        let metadata = Arc::new(
            EntityMetadata::new("membership")
                .column(ColumnMetadata::new("user_id").primary())
                .column(ColumnMetadata::new("group_id").primary()),
        );
        let builder =
            DeleteQueryBuilder::with_metadata(context(Dialect::Postgres), "membership", metadata)
                .where_entities(vec![
                    json!({"user_id": 1, "group_id": 2}),
                    json!({"user_id": 3, "group_id": 4}),
                ]);
        assert_eq!(
            builder.get_query().unwrap(),
            "DELETE FROM membership WHERE (user_id = :orm_param_0 AND group_id = :orm_param_1) OR (user_id = :orm_param_2 AND group_id = :orm_param_3)"
        );
    }
}

mod soft_delete {
    use super::*;
    use crate::dialect::Dialect;

    #[test]
    fn test_soft_delete_defaults_to_now_expression() {
        let builder = SoftDeleteQueryBuilder::new(
            context(Dialect::Postgres),
            "user",
            user_metadata(),
            SoftDeleteKind::SoftDelete,
        )
        .where_raw("id = 1");
        assert_eq!(
            builder.get_query().unwrap(),
            "UPDATE user SET deleted_at = NOW(), version = version + 1, updated_at = NOW() WHERE id = 1"
        );
    }

    #[test]
    fn test_restore_clears_the_delete_date() {
        let builder = SoftDeleteQueryBuilder::new(
            context(Dialect::Postgres),
            "user",
            user_metadata(),
            SoftDeleteKind::Restore,
        )
        .where_raw("id = 1");
        assert_eq!(
            builder.get_query().unwrap(),
            "UPDATE user SET deleted_at = NULL, version = version + 1, updated_at = NOW() WHERE id = 1"
        );
    }

    #[test]
    fn test_missing_delete_date_column_fails_before_sql() {
        let metadata = Arc::new(
            EntityMetadata::new("plain").column(ColumnMetadata::new("id").primary()),
        );
        let builder = SoftDeleteQueryBuilder::new(
            context(Dialect::Postgres),
            "plain",
            metadata,
            SoftDeleteKind::SoftDelete,
        );
        assert!(matches!(
            builder.get_query().unwrap_err(),
            QueryObjectError::MissingDeleteDateColumn(table) if table == "plain"
        ));
    }

    #[test]
    fn test_declared_literal_becomes_a_parameter() {
        let metadata = Arc::new(
            EntityMetadata::new("user")
                .column(ColumnMetadata::new("id").primary())
                .column(
                    ColumnMetadata::new("deleted_at")
                        .role(ColumnRole::DeleteDate)
                        .delete_date_value(DeleteDateValue::Literal(
                            "2024-01-01T00:00:00Z".to_string(),
                        )),
                ),
        );
        let builder = SoftDeleteQueryBuilder::new(
            context(Dialect::Postgres),
            "user",
            metadata,
            SoftDeleteKind::SoftDelete,
        )
        .where_raw("id = 1");
        assert_eq!(
            builder.get_query().unwrap(),
            "UPDATE user SET deleted_at = :orm_param_0 WHERE id = 1"
        );
    }

    #[test]
    fn test_declared_factory_renders_raw_expression() {
        let metadata = Arc::new(
            EntityMetadata::new("user")
                .column(ColumnMetadata::new("id").primary())
                .column(
                    ColumnMetadata::new("deleted_at")
                        .role(ColumnRole::DeleteDate)
                        .delete_date_value(DeleteDateValue::Factory(Arc::new(|| {
                            "CURRENT_TIMESTAMP".to_string()
                        }))),
                ),
        );
        let builder = SoftDeleteQueryBuilder::new(
            context(Dialect::Postgres),
            "user",
            metadata,
            SoftDeleteKind::SoftDelete,
        )
        .where_raw("id = 1");
        assert_eq!(
            builder.get_query().unwrap(),
            "UPDATE user SET deleted_at = CURRENT_TIMESTAMP WHERE id = 1"
        );
    }

    #[test]
    fn test_engine_specific_now_expression() {
        let builder = SoftDeleteQueryBuilder::new(
            context(Dialect::Mssql),
            "user",
            user_metadata(),
            SoftDeleteKind::SoftDelete,
        )
        .where_raw("id = 1");
        assert_eq!(
            builder.get_query().unwrap(),
            "UPDATE user SET deleted_at = GETDATE(), version = version + 1, updated_at = GETDATE() WHERE id = 1"
        );
    }

    #[test]
    fn test_limit_gated_like_update() {
        let builder = SoftDeleteQueryBuilder::new(
            context(Dialect::Postgres),
            "user",
            user_metadata(),
            SoftDeleteKind::SoftDelete,
        )
        .limit(3);
        assert!(matches!(
            builder.get_query().unwrap_err(),
            QueryObjectError::Capability { .. }
        ));
    }
}
