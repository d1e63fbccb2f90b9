//! Read-through projections for presentation layers.
//!
//! Nothing here mutates state or carries invariants; these are the simple
//! queries the mini-app and bot layers render from.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::db::Database;
use crate::db::gifts::{GiftStore, row_to_gift};
use crate::db::kinds::KindStore;
use crate::db::users::UserStore;
use crate::error::GiftError;
use crate::models::{GIFT_STATUS_PURCHASED, GIFT_STATUS_SENT, Gift, GiftState, Price};
use crate::tokens::parse_send_token;

/// Catalog entry. `in_stock` leaves reserved units in: a reservation may
/// still expire back into stock.
#[derive(Debug, Clone, Serialize)]
pub struct GiftKindSummary {
    pub id: Uuid,
    pub name: String,
    pub price: Price,
    pub limit: i32,
    pub in_stock: i32,
}

/// A purchased gift its owner can still send.
#[derive(Debug, Clone, Serialize)]
pub struct SendableGift {
    pub id: Uuid,
    pub kind_id: Uuid,
    pub order: i32,
    pub send_token: String,
    pub purchase_date: DateTime<Utc>,
    pub purchase_price: Price,
}

/// A gift as seen on its receiver's profile.
#[derive(Debug, Clone, Serialize)]
pub struct SentGift {
    pub id: Uuid,
    pub kind_id: Uuid,
    pub order: i32,
    pub sent_at: DateTime<Utc>,
    pub sender_id: Uuid,
    pub purchase_price: Price,
}

/// Purchaser-facing status of a single gift.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GiftStatusView {
    /// Still reserved, awaiting payment.
    Pending,
    Purchased { gift: SendableGift },
    Sent { gift: SentGift },
}

/// Profile projection with the user's leaderboard rank.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub received_gifts_count: i32,
    pub rank: i64,
}

pub struct Queries;

impl Queries {
    /// Full catalog with availability.
    pub async fn list_kinds(db: &Database) -> Result<Vec<GiftKindSummary>, GiftError> {
        let kinds = KindStore::list(db.pool()).await?;
        Ok(kinds
            .into_iter()
            .map(|kind| GiftKindSummary {
                id: kind.id,
                name: kind.name.clone(),
                price: kind.price.clone(),
                limit: kind.limit,
                in_stock: kind.in_stock(),
            })
            .collect())
    }

    /// The purchaser's gifts that are paid for but not yet sent.
    pub async fn sendable_gifts(
        db: &Database,
        purchaser_id: Uuid,
    ) -> Result<Vec<SendableGift>, GiftError> {
        let rows = sqlx::query(
            r#"SELECT id, kind_id, purchaser_id, send_token, invoice, status,
                      order_num, sent_at, receiver_id
               FROM gifts
               WHERE purchaser_id = $1 AND status = $2"#,
        )
        .bind(purchaser_id)
        .bind(GIFT_STATUS_PURCHASED)
        .fetch_all(db.pool())
        .await?;

        let mut gifts = Vec::with_capacity(rows.len());
        for row in rows {
            let gift = row_to_gift(&row)?;
            gifts.push(to_sendable(&gift)?);
        }
        Ok(gifts)
    }

    /// Look up one sendable gift by its owner's send token. The token is
    /// shape-checked before any store lookup.
    pub async fn sendable_gift_by_token(
        db: &Database,
        purchaser_id: Uuid,
        send_token: &str,
    ) -> Result<Option<SendableGift>, GiftError> {
        let Some(send_token) = parse_send_token(send_token) else {
            return Ok(None);
        };

        let row = sqlx::query(
            r#"SELECT id, kind_id, purchaser_id, send_token, invoice, status,
                      order_num, sent_at, receiver_id
               FROM gifts
               WHERE purchaser_id = $1 AND send_token = $2 AND status = $3"#,
        )
        .bind(purchaser_id)
        .bind(send_token)
        .bind(GIFT_STATUS_PURCHASED)
        .fetch_optional(db.pool())
        .await?;

        match row {
            Some(row) => {
                let gift = row_to_gift(&row)?;
                Ok(Some(to_sendable(&gift)?))
            }
            None => Ok(None),
        }
    }

    /// Gifts a user has received, newest first.
    pub async fn received_gifts(db: &Database, user_id: Uuid) -> Result<Vec<SentGift>, GiftError> {
        let rows = sqlx::query(
            r#"SELECT id, kind_id, purchaser_id, send_token, invoice, status,
                      order_num, sent_at, receiver_id
               FROM gifts
               WHERE receiver_id = $1 AND status = $2
               ORDER BY sent_at DESC"#,
        )
        .bind(user_id)
        .bind(GIFT_STATUS_SENT)
        .fetch_all(db.pool())
        .await?;

        let mut gifts = Vec::with_capacity(rows.len());
        for row in rows {
            let gift = row_to_gift(&row)?;
            gifts.push(to_sent(&gift)?);
        }
        Ok(gifts)
    }

    /// Status of one gift, visible only to its purchaser.
    pub async fn gift_status(
        db: &Database,
        gift_id: Uuid,
        purchaser_id: Uuid,
    ) -> Result<GiftStatusView, GiftError> {
        let gift = GiftStore::get(db.pool(), gift_id)
            .await?
            .filter(|g| g.purchaser_id == purchaser_id)
            .ok_or(GiftError::GiftNotFound)?;

        match gift.state {
            GiftState::Reserved => Ok(GiftStatusView::Pending),
            GiftState::Purchased { .. } => Ok(GiftStatusView::Purchased {
                gift: to_sendable(&gift)?,
            }),
            GiftState::Sent { .. } => Ok(GiftStatusView::Sent {
                gift: to_sent(&gift)?,
            }),
        }
    }

    /// Profile with leaderboard rank.
    pub async fn profile(db: &Database, user_id: Uuid) -> Result<UserProfile, GiftError> {
        let user = UserStore::get(db.pool(), user_id)
            .await?
            .ok_or(GiftError::UserNotFound)?;
        let better =
            UserStore::count_with_more_gifts(db.pool(), user.received_gifts_count).await?;

        Ok(UserProfile {
            id: user.id,
            name: user.name,
            received_gifts_count: user.received_gifts_count,
            rank: better + 1,
        })
    }

    /// One page of the received-gifts leaderboard.
    pub async fn leaderboard(
        db: &Database,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<UserProfile>, GiftError> {
        let rows = UserStore::leaderboard(db.pool(), offset, limit).await?;
        Ok(rows
            .into_iter()
            .map(|(user, rank)| UserProfile {
                id: user.id,
                name: user.name,
                received_gifts_count: user.received_gifts_count,
                rank,
            })
            .collect())
    }
}

fn purchase_price(gift: &Gift) -> Price {
    match (&gift.invoice.paid_asset, gift.invoice.paid_amount) {
        (Some(asset), Some(amount)) => Price {
            asset: asset.clone(),
            amount,
        },
        _ => {
            warn!(
                invoice_id = gift.invoice.invoice_id,
                "invoice doesn't have paid_amount or paid_asset"
            );
            Price {
                asset: "TON".to_string(),
                amount: rust_decimal::Decimal::ZERO,
            }
        }
    }
}

fn to_sendable(gift: &Gift) -> Result<SendableGift, GiftError> {
    let GiftState::Purchased { order } = gift.state else {
        return Err(GiftError::Integrity(format!(
            "gift {} is not sendable in state {}",
            gift.id, gift.state
        )));
    };

    let purchase_date = gift.invoice.paid_at.unwrap_or_else(|| {
        warn!(gift_id = %gift.id, "purchased gift doesn't have paid_at");
        DateTime::<Utc>::UNIX_EPOCH
    });

    Ok(SendableGift {
        id: gift.id,
        kind_id: gift.kind_id,
        order,
        send_token: gift.send_token.clone(),
        purchase_date,
        purchase_price: purchase_price(gift),
    })
}

fn to_sent(gift: &Gift) -> Result<SentGift, GiftError> {
    let GiftState::Sent { order, sent_at, .. } = gift.state else {
        return Err(GiftError::Integrity(format!(
            "gift {} is not sent in state {}",
            gift.id, gift.state
        )));
    };

    Ok(SentGift {
        id: gift.id,
        kind_id: gift.kind_id,
        order,
        sent_at,
        sender_id: gift.purchaser_id,
        purchase_price: purchase_price(gift),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cryptopay::{Invoice, InvoiceStatus};
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn paid_gift() -> Gift {
        Gift {
            id: Uuid::new_v4(),
            kind_id: Uuid::new_v4(),
            purchaser_id: Uuid::new_v4(),
            send_token: "=Aa0Bb1Cc2D".to_string(),
            invoice: Invoice {
                invoice_id: 7,
                hash: "h".to_string(),
                currency_type: "crypto".to_string(),
                asset: Some("TON".to_string()),
                amount: Decimal::new(5, 0),
                status: InvoiceStatus::Paid,
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
                description: None,
                payload: None,
                bot_invoice_url: String::new(),
                mini_app_invoice_url: String::new(),
                expiration_date: None,
                paid_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap()),
                paid_asset: Some("TON".to_string()),
                paid_amount: Some(Decimal::new(5, 0)),
            },
            state: GiftState::Purchased { order: 3 },
        }
    }

    #[test]
    fn test_to_sendable_projection() {
        let gift = paid_gift();
        let sendable = to_sendable(&gift).unwrap();
        assert_eq!(sendable.order, 3);
        assert_eq!(sendable.send_token, gift.send_token);
        assert_eq!(sendable.purchase_price.asset, "TON");
        assert_eq!(sendable.purchase_date, gift.invoice.paid_at.unwrap());
    }

    #[test]
    fn test_to_sendable_rejects_wrong_state() {
        let mut gift = paid_gift();
        gift.state = GiftState::Reserved;
        assert!(matches!(
            to_sendable(&gift),
            Err(GiftError::Integrity(_))
        ));
    }

    #[test]
    fn test_to_sent_projection() {
        let mut gift = paid_gift();
        let receiver = Uuid::new_v4();
        let sent_at = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
        gift.state = GiftState::Sent {
            order: 3,
            sent_at,
            receiver_id: receiver,
        };

        let sent = to_sent(&gift).unwrap();
        assert_eq!(sent.sent_at, sent_at);
        assert_eq!(sent.sender_id, gift.purchaser_id);
    }

    #[test]
    fn test_price_fallback_when_paid_fields_missing() {
        let mut gift = paid_gift();
        gift.invoice.paid_asset = None;
        gift.invoice.paid_amount = None;

        let price = purchase_price(&gift);
        assert_eq!(price.asset, "TON");
        assert_eq!(price.amount, Decimal::ZERO);
    }
}
