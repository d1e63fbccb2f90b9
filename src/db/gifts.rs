//! Gift record store: the single source of truth for a gift's lifecycle
//! state. Only the reservation transactor, the reconciler and the transfer
//! protocol write here, always inside a transaction.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::expect_rows;
use crate::cryptopay::Invoice;
use crate::error::GiftError;
use crate::models::{GIFT_STATUS_PURCHASED, GIFT_STATUS_RESERVED, GIFT_STATUS_SENT, Gift, GiftState};

/// Projection of a reserved gift used by the reconciliation batch: just
/// enough to query the provider and re-validate later.
#[derive(Debug, Clone)]
pub struct ReservedGiftRef {
    pub id: Uuid,
    pub invoice_id: i64,
}

pub struct GiftStore;

impl GiftStore {
    /// Insert a freshly reserved gift.
    pub async fn insert_reserved(conn: &mut PgConnection, gift: &Gift) -> Result<(), GiftError> {
        debug_assert_eq!(gift.state, GiftState::Reserved);

        sqlx::query(
            r#"INSERT INTO gifts
                   (id, kind_id, purchaser_id, send_token, invoice, invoice_id, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(gift.id)
        .bind(gift.kind_id)
        .bind(gift.purchaser_id)
        .bind(&gift.send_token)
        .bind(Json(&gift.invoice))
        .bind(gift.invoice.invoice_id)
        .bind(GIFT_STATUS_RESERVED)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Find the purchaser's live reservation for a kind, if any.
    pub async fn find_reserved(
        conn: &mut PgConnection,
        kind_id: Uuid,
        purchaser_id: Uuid,
    ) -> Result<Option<Gift>, GiftError> {
        let row = sqlx::query(
            r#"SELECT id, kind_id, purchaser_id, send_token, invoice, status,
                      order_num, sent_at, receiver_id
               FROM gifts
               WHERE kind_id = $1 AND purchaser_id = $2 AND status = $3"#,
        )
        .bind(kind_id)
        .bind(purchaser_id)
        .bind(GIFT_STATUS_RESERVED)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(|r| row_to_gift(&r)).transpose()
    }

    /// Re-read a gift and lock it for the rest of the transaction. Every
    /// state transition starts here so that batch snapshots are never
    /// trusted at commit time.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Gift>, GiftError> {
        let row = sqlx::query(
            r#"SELECT id, kind_id, purchaser_id, send_token, invoice, status,
                      order_num, sent_at, receiver_id
               FROM gifts WHERE id = $1
               FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(|r| row_to_gift(&r)).transpose()
    }

    /// Plain read for presentation-layer lookups.
    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Gift>, GiftError> {
        let row = sqlx::query(
            r#"SELECT id, kind_id, purchaser_id, send_token, invoice, status,
                      order_num, sent_at, receiver_id
               FROM gifts WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.map(|r| row_to_gift(&r)).transpose()
    }

    /// Persist a refreshed invoice snapshot without touching state.
    pub async fn refresh_invoice(
        conn: &mut PgConnection,
        id: Uuid,
        invoice: &Invoice,
    ) -> Result<(), GiftError> {
        let result = sqlx::query(r#"UPDATE gifts SET invoice = $1 WHERE id = $2"#)
            .bind(Json(invoice))
            .bind(id)
            .execute(&mut *conn)
            .await?;

        expect_rows(result.rows_affected(), 1, "gift invoice refresh")
    }

    /// Advance a gift to `purchased` with its assigned order number and the
    /// paid invoice snapshot.
    pub async fn mark_purchased(
        conn: &mut PgConnection,
        id: Uuid,
        invoice: &Invoice,
        order: i32,
    ) -> Result<(), GiftError> {
        let result = sqlx::query(
            r#"UPDATE gifts SET status = $1, invoice = $2, order_num = $3 WHERE id = $4"#,
        )
        .bind(GIFT_STATUS_PURCHASED)
        .bind(Json(invoice))
        .bind(order)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        expect_rows(result.rows_affected(), 1, "gift purchase transition")
    }

    /// Advance a gift to `sent`.
    pub async fn mark_sent(
        conn: &mut PgConnection,
        id: Uuid,
        sent_at: DateTime<Utc>,
        receiver_id: Uuid,
    ) -> Result<(), GiftError> {
        let result = sqlx::query(
            r#"UPDATE gifts SET status = $1, sent_at = $2, receiver_id = $3 WHERE id = $4"#,
        )
        .bind(GIFT_STATUS_SENT)
        .bind(sent_at)
        .bind(receiver_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        expect_rows(result.rows_affected(), 1, "gift sent transition")
    }

    /// Remove an expired reservation. The send token is not recycled.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<(), GiftError> {
        let result = sqlx::query(r#"DELETE FROM gifts WHERE id = $1"#)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        expect_rows(result.rows_affected(), 1, "expired gift deletion")
    }

    /// Batch of reserved gifts for reconciliation, projected down to id and
    /// invoice id only.
    pub async fn reserved_batch(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<ReservedGiftRef>, GiftError> {
        let rows = sqlx::query(r#"SELECT id, invoice_id FROM gifts WHERE status = $1 LIMIT $2"#)
            .bind(GIFT_STATUS_RESERVED)
            .bind(limit)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| ReservedGiftRef {
                id: r.get("id"),
                invoice_id: r.get("invoice_id"),
            })
            .collect())
    }
}

pub(crate) fn row_to_gift(row: &sqlx::postgres::PgRow) -> Result<Gift, GiftError> {
    let id: Uuid = row.get("id");
    let tag: i16 = row.get("status");

    let state = GiftState::from_columns(
        tag,
        row.get("order_num"),
        row.get("sent_at"),
        row.get("receiver_id"),
    )
    .ok_or_else(|| {
        GiftError::Integrity(format!("gift {id} has inconsistent state columns (tag {tag})"))
    })?;

    let Json(invoice): Json<Invoice> = row.try_get("invoice").map_err(|e| {
        GiftError::Integrity(format!("gift {id} carries an undecodable invoice: {e}"))
    })?;

    Ok(Gift {
        id,
        kind_id: row.get("kind_id"),
        purchaser_id: row.get("purchaser_id"),
        send_token: row.get("send_token"),
        invoice,
        state,
    })
}
