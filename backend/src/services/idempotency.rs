//! Idempotency key store
//!
//! A claimed `(key, method, path)` triple is the only record kept. No response is cached: a
//! replay is rejected, not answered.

use std::collections::HashSet;
use std::sync::Mutex;

use sqlx::PgPool;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub key: String,
    pub method: String,
    pub path: String,
}

#[axum::async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Record the key. `false` means it was already claimed.
    async fn claim(&self, key: &IdempotencyKey) -> AppResult<bool>;

    /// Forget a claim whose request had no effect.
    async fn release(&self, key: &IdempotencyKey) -> AppResult<()>;
}

/// Keys persisted in the `idempotency_keys` table
#[derive(Clone)]
pub struct PgIdempotencyStore {
    db: PgPool,
}

impl PgIdempotencyStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[axum::async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn claim(&self, key: &IdempotencyKey) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, method, path)
            VALUES ($1, $2, $3)
            ON CONFLICT (key, method, path) DO NOTHING
            "#,
        )
        .bind(&key.key)
        .bind(&key.method)
        .bind(&key.path)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, key: &IdempotencyKey) -> AppResult<()> {
        sqlx::query("DELETE FROM idempotency_keys WHERE key = $1 AND method = $2 AND path = $3")
            .bind(&key.key)
            .bind(&key.method)
            .bind(&key.path)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

/// Process-local store for tests and single-node tooling
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    keys: Mutex<HashSet<IdempotencyKey>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().map(|keys| keys.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[axum::async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn claim(&self, key: &IdempotencyKey) -> AppResult<bool> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| AppError::Internal("idempotency store poisoned".to_string()))?;
        Ok(keys.insert(key.clone()))
    }

    async fn release(&self, key: &IdempotencyKey) -> AppResult<()> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| AppError::Internal("idempotency store poisoned".to_string()))?;
        keys.remove(key);
        Ok(())
    }
}
