//! User projections. The engine only ever reads users (for notifications
//! and rank queries) and bumps `received_gifts_count` when a transfer
//! commits.

use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::expect_rows;
use crate::error::GiftError;
use crate::models::User;

pub struct UserStore;

impl UserStore {
    pub async fn get(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, GiftError> {
        let row = sqlx::query(
            r#"SELECT id, name, tg_id, language_code, received_gifts_count, created_at
               FROM users WHERE id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| row_to_user(&r)))
    }

    /// Credit a received gift to the user. Exactly one row must change;
    /// anything else means the receiver row vanished mid-transaction.
    pub async fn increment_received(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<(), GiftError> {
        let result = sqlx::query(
            r#"UPDATE users SET received_gifts_count = received_gifts_count + 1 WHERE id = $1"#,
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        expect_rows(result.rows_affected(), 1, "received gifts counter update")
    }

    /// Number of users with strictly more received gifts; rank is this + 1.
    pub async fn count_with_more_gifts(pool: &PgPool, than: i32) -> Result<i64, GiftError> {
        let count: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM users WHERE received_gifts_count > $1"#)
                .bind(than)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    /// One leaderboard page ordered by received gifts, rank carried through
    /// ties.
    pub async fn leaderboard(
        pool: &PgPool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<(User, i64)>, GiftError> {
        let rows = sqlx::query(
            r#"SELECT id, name, tg_id, language_code, received_gifts_count, created_at,
                      RANK() OVER (ORDER BY received_gifts_count DESC) AS rank
               FROM users
               ORDER BY received_gifts_count DESC
               OFFSET $1 LIMIT $2"#,
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (row_to_user(r), r.get::<i64, _>("rank")))
            .collect())
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        tg_id: row.get("tg_id"),
        language_code: row.get("language_code"),
        received_gifts_count: row.get("received_gifts_count"),
        created_at: row.get("created_at"),
    }
}
