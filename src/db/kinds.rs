//! Inventory ledger: gift-kind rows and their supply counters.
//!
//! Counter mutations only make sense inside a caller-owned transaction with
//! the kind row locked, so every function here takes a `PgConnection` that
//! the caller obtained from an open transaction.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::expect_rows;
use crate::error::GiftError;
use crate::models::{GiftKind, Price};

pub struct KindStore;

impl KindStore {
    /// Read a kind row and lock it for the rest of the transaction.
    /// All capacity decisions must be made against this locked snapshot.
    pub async fn lock(
        conn: &mut PgConnection,
        kind_id: Uuid,
    ) -> Result<Option<GiftKind>, GiftError> {
        let row = sqlx::query(
            r#"SELECT id, name, price_asset, price_amount, limit_count,
                      purchased_count, reserved_count
               FROM gift_kinds WHERE id = $1
               FOR UPDATE"#,
        )
        .bind(kind_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| row_to_kind(&r)))
    }

    /// Take one reservation slot. The caller has already verified capacity
    /// against the locked row.
    pub async fn take_reservation(
        conn: &mut PgConnection,
        kind_id: Uuid,
    ) -> Result<(), GiftError> {
        let result = sqlx::query(
            r#"UPDATE gift_kinds SET reserved_count = reserved_count + 1 WHERE id = $1"#,
        )
        .bind(kind_id)
        .execute(&mut *conn)
        .await?;

        expect_rows(result.rows_affected(), 1, "gift kind reservation increment")
    }

    /// Convert one reservation into a purchase and return the
    /// post-increment `purchased_count` - the new gift's 1-based order.
    pub async fn apply_purchase(
        conn: &mut PgConnection,
        kind_id: Uuid,
    ) -> Result<i32, GiftError> {
        let row = sqlx::query(
            r#"UPDATE gift_kinds
               SET purchased_count = purchased_count + 1,
                   reserved_count = reserved_count - 1
               WHERE id = $1
               RETURNING purchased_count"#,
        )
        .bind(kind_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(r) => Ok(r.get("purchased_count")),
            None => Err(GiftError::Integrity(format!(
                "gift kind {kind_id} missing while applying a purchase"
            ))),
        }
    }

    /// Return one reservation slot to the pool (expired invoice).
    pub async fn release_reservation(
        conn: &mut PgConnection,
        kind_id: Uuid,
    ) -> Result<(), GiftError> {
        let result = sqlx::query(
            r#"UPDATE gift_kinds SET reserved_count = reserved_count - 1 WHERE id = $1"#,
        )
        .bind(kind_id)
        .execute(&mut *conn)
        .await?;

        expect_rows(result.rows_affected(), 1, "gift kind reservation release")
    }

    /// Plain read, no lock. For presentation-layer projections.
    pub async fn get(pool: &PgPool, kind_id: Uuid) -> Result<Option<GiftKind>, GiftError> {
        let row = sqlx::query(
            r#"SELECT id, name, price_asset, price_amount, limit_count,
                      purchased_count, reserved_count
               FROM gift_kinds WHERE id = $1"#,
        )
        .bind(kind_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| row_to_kind(&r)))
    }

    /// Full catalog listing.
    pub async fn list(pool: &PgPool) -> Result<Vec<GiftKind>, GiftError> {
        let rows = sqlx::query(
            r#"SELECT id, name, price_asset, price_amount, limit_count,
                      purchased_count, reserved_count
               FROM gift_kinds ORDER BY name"#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(row_to_kind).collect())
    }
}

fn row_to_kind(row: &sqlx::postgres::PgRow) -> GiftKind {
    GiftKind {
        id: row.get("id"),
        name: row.get("name"),
        price: Price {
            asset: row.get("price_asset"),
            amount: row.get::<Decimal, _>("price_amount"),
        },
        limit: row.get("limit_count"),
        purchased_count: row.get("purchased_count"),
        reserved_count: row.get("reserved_count"),
    }
}
