//! PostgreSQL store. The database is the single consistency boundary:
//! every invariant-bearing mutation runs inside one transaction and
//! re-validates its preconditions from rows locked with `FOR UPDATE`.

pub mod actions;
pub mod gifts;
pub mod kinds;
pub mod receive_tokens;
pub mod schema;
pub mod users;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::error::GiftError;

/// PostgreSQL connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Assert that a mutation touched exactly the expected number of rows.
///
/// A mismatch means an invariant the schema is supposed to uphold did not
/// hold; it is surfaced as an integrity violation, never swallowed.
pub fn expect_rows(actual: u64, expected: u64, what: &str) -> Result<(), GiftError> {
    if actual == expected {
        Ok(())
    } else {
        Err(GiftError::Integrity(format!(
            "expected {expected} row(s) affected by {what}, got {actual}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_rows() {
        assert!(expect_rows(1, 1, "update").is_ok());
        let err = expect_rows(0, 1, "gift kind counter update").unwrap_err();
        match err {
            GiftError::Integrity(msg) => {
                assert!(msg.contains("gift kind counter update"));
                assert!(msg.contains("expected 1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
