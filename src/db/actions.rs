//! Append-only audit log of gift transitions. Written once per transition
//! inside the same transaction; never read back by the engine.

use sqlx::PgConnection;

use crate::error::GiftError;
use crate::models::{ACTION_PURCHASE, ACTION_SENDING, GiftAction, GiftActionDetail};

pub struct ActionStore;

impl ActionStore {
    pub async fn record(conn: &mut PgConnection, action: &GiftAction) -> Result<(), GiftError> {
        let (kind, purchaser_id, sender_id, receiver_id, price_asset, price_amount) =
            match &action.detail {
                GiftActionDetail::Purchase {
                    purchaser_id,
                    price,
                } => (
                    ACTION_PURCHASE,
                    Some(*purchaser_id),
                    None,
                    None,
                    Some(price.asset.clone()),
                    Some(price.amount),
                ),
                GiftActionDetail::Sending {
                    sender_id,
                    receiver_id,
                } => (
                    ACTION_SENDING,
                    None,
                    Some(*sender_id),
                    Some(*receiver_id),
                    None,
                    None,
                ),
            };

        sqlx::query(
            r#"INSERT INTO gift_actions
                   (id, gift_id, occurred_at, kind,
                    purchaser_id, sender_id, receiver_id, price_asset, price_amount)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(action.id)
        .bind(action.gift_id)
        .bind(action.occurred_at)
        .bind(kind)
        .bind(purchaser_id)
        .bind(sender_id)
        .bind(receiver_id)
        .bind(price_asset)
        .bind(price_amount)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
