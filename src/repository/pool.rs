//! PostgreSQL connection pool.

use diesel_async::pooled_connection::deadpool::Pool as DeadPool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

use super::{StoreError, StoreResult};

/// Default pool size when none is configured.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Pooled async PostgreSQL connection.
pub type PgConn = deadpool::managed::Object<AsyncDieselConnectionManager<AsyncPgConnection>>;

#[derive(Clone)]
pub struct PgPool {
    pool: DeadPool<AsyncPgConnection>,
}

impl PgPool {
    pub fn new(database_url: &str, max_size: usize) -> StoreResult<Self> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = DeadPool::builder(config)
            .max_size(max_size.max(1))
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn get(&self) -> StoreResult<PgConn> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }

    /// Detach `conn` from the pool and close it. Ending the session frees
    /// every session-level advisory lock it still holds.
    pub fn discard(conn: PgConn) {
        drop(deadpool::managed::Object::take(conn));
    }
}

/// Whether `url` names a PostgreSQL database.
pub fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}
