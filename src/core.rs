//! Core QueryHaus functionality
//!
//! This module contains the main QueryHaus struct and its implementation,
//! providing centralized coordination for connections, query builders,
//! caching and signals.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::QueryHausError;
use crate::runner::PostgresRunnerFactory;
use cache_system::prelude::{InMemoryResultCache, QueryResultCache};
use config::AppConfig;
use query_object::{
    DeleteQueryBuilder, Dialect, EntityMetadata, InsertQueryBuilder, QueryBuilderContext,
    RelationQueryBuilder, SelectQueryBuilder, SoftDeleteKind, SoftDeleteQueryBuilder,
    UpdateQueryBuilder,
};
use signal_system::prelude::{Broadcaster, Subscriber};

/// Main QueryHaus coordinator that manages the connection pool, the signal
/// broadcaster, the result cache and builder construction
pub struct QueryHaus {
    pool: PgPool,
    dialect: Dialect,
    broadcaster: Arc<Broadcaster>,
    cache: Option<Arc<dyn QueryResultCache>>,
}

impl QueryHaus {
    /// Connect using the full application configuration
    pub async fn connect(config: AppConfig) -> Result<Self, QueryHausError> {
        let dialect: Dialect = config.database.dialect.parse()?;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .min_connections(config.database.min_connections)
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(
                config.database.connection_timeout_seconds,
            ))
            .connect(&config.database.connection_string())
            .await?;

        let cache: Option<Arc<dyn QueryResultCache>> = if config.cache.enabled {
            Some(Arc::new(InMemoryResultCache::new(&config.cache)))
        } else {
            None
        };

        Ok(Self {
            pool,
            dialect,
            broadcaster: Arc::new(Broadcaster::new()),
            cache,
        })
    }

    /// Get database pool reference
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Register a lifecycle event subscriber
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.broadcaster.subscribe(subscriber).await;
    }

    /// Swap in a different cache backend
    pub fn set_cache(&mut self, cache: Arc<dyn QueryResultCache>) {
        self.cache = Some(cache);
    }

    /// The shared context new builders are created with
    fn context(&self) -> QueryBuilderContext {
        let mut context = QueryBuilderContext::new(self.dialect)
            .with_runner_factory(Arc::new(PostgresRunnerFactory::new(self.pool.clone())))
            .with_broadcaster(self.broadcaster.clone());
        if let Some(cache) = &self.cache {
            context = context.with_cache(cache.clone());
        }
        context
    }

    pub fn select(&self, table: impl Into<String>) -> SelectQueryBuilder {
        SelectQueryBuilder::new(self.context(), table)
    }

    pub fn insert(&self, table: impl Into<String>) -> InsertQueryBuilder {
        InsertQueryBuilder::new(self.context().transactional(), table)
    }

    pub fn insert_into(
        &self,
        table: impl Into<String>,
        metadata: Arc<EntityMetadata>,
    ) -> InsertQueryBuilder {
        InsertQueryBuilder::with_metadata(self.context().transactional(), table, metadata)
    }

    pub fn update(&self, table: impl Into<String>) -> UpdateQueryBuilder {
        UpdateQueryBuilder::new(self.context().transactional(), table)
    }

    pub fn update_entity(
        &self,
        table: impl Into<String>,
        metadata: Arc<EntityMetadata>,
    ) -> UpdateQueryBuilder {
        UpdateQueryBuilder::with_metadata(self.context().transactional(), table, metadata)
    }

    pub fn delete(&self, table: impl Into<String>) -> DeleteQueryBuilder {
        DeleteQueryBuilder::new(self.context().transactional(), table)
    }

    pub fn soft_delete(
        &self,
        table: impl Into<String>,
        metadata: Arc<EntityMetadata>,
    ) -> SoftDeleteQueryBuilder {
        SoftDeleteQueryBuilder::new(
            self.context().transactional(),
            table,
            metadata,
            SoftDeleteKind::SoftDelete,
        )
    }

    pub fn restore(
        &self,
        table: impl Into<String>,
        metadata: Arc<EntityMetadata>,
    ) -> SoftDeleteQueryBuilder {
        SoftDeleteQueryBuilder::new(
            self.context().transactional(),
            table,
            metadata,
            SoftDeleteKind::Restore,
        )
    }

    pub fn relation(
        &self,
        metadata: Arc<EntityMetadata>,
        relation_name: impl Into<String>,
    ) -> RelationQueryBuilder {
        RelationQueryBuilder::new(self.context().transactional(), metadata, relation_name)
    }

    /// Check database connection health
    pub async fn health_check(&self) -> Result<(), QueryHausError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
