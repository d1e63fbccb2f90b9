//! Receive-token records: a capability keyed one-to-one with its gift.
//!
//! Re-issuing refreshes `issued_at` but keeps the token string, so a
//! previously shared link stays valid while remaining time-bounded. Expiry
//! is checked at redemption, not enforced by deletion.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::error::GiftError;
use crate::models::ReceiveToken;

pub struct ReceiveTokenStore;

impl ReceiveTokenStore {
    /// Upsert by gift id: insert `candidate_token` on first issue, refresh
    /// only `issued_at` afterwards. Returns the stored record either way.
    pub async fn upsert(
        pool: &PgPool,
        gift_id: Uuid,
        candidate_token: String,
        issued_at: DateTime<Utc>,
    ) -> Result<ReceiveToken, GiftError> {
        let row = sqlx::query(
            r#"INSERT INTO gift_receive_tokens (token, gift_id, issued_at)
               VALUES ($1, $2, $3)
               ON CONFLICT (gift_id) DO UPDATE SET issued_at = EXCLUDED.issued_at
               RETURNING token, gift_id, issued_at"#,
        )
        .bind(candidate_token)
        .bind(gift_id)
        .bind(issued_at)
        .fetch_one(pool)
        .await?;

        Ok(row_to_token(&row))
    }

    pub async fn get(
        conn: &mut PgConnection,
        token: &str,
    ) -> Result<Option<ReceiveToken>, GiftError> {
        let row = sqlx::query(
            r#"SELECT token, gift_id, issued_at FROM gift_receive_tokens WHERE token = $1"#,
        )
        .bind(token)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| row_to_token(&r)))
    }
}

fn row_to_token(row: &sqlx::postgres::PgRow) -> ReceiveToken {
    ReceiveToken {
        token: row.get("token"),
        gift_id: row.get("gift_id"),
        issued_at: row.get("issued_at"),
    }
}
