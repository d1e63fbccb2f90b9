//! Core documents: gift kinds, gifts and their lifecycle state, users,
//! audit actions and receive tokens.
//!
//! Gift state is a tagged union stored as a SMALLINT discriminant plus
//! nullable columns; the decoder refuses inconsistent rows instead of
//! defaulting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::cryptopay::Invoice;

/// Asset/amount pair as quoted by the payment provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub asset: String,
    pub amount: Decimal,
}

/// A purchasable catalog item with a fixed supply limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftKind {
    pub id: Uuid,
    pub name: String,
    pub price: Price,
    /// Total supply. Never exceeded by `purchased_count + reserved_count`.
    pub limit: i32,
    pub purchased_count: i32,
    pub reserved_count: i32,
}

impl GiftKind {
    /// No more purchases can ever complete for this kind.
    pub fn is_sold_out(&self) -> bool {
        self.limit - self.purchased_count <= 0
    }

    /// A new reservation can be taken right now.
    pub fn has_capacity(&self) -> bool {
        self.limit - self.purchased_count - self.reserved_count > 0
    }

    /// Units still available for sale. Reserved units are intentionally
    /// not subtracted: a reservation may still expire back into stock.
    pub fn in_stock(&self) -> i32 {
        self.limit - self.purchased_count
    }
}

/// Lifecycle state of a gift. Transitions are strictly
/// `Reserved -> Purchased -> Sent`, or `Reserved -> (deleted)` on expiry.
#[derive(Debug, Clone, PartialEq)]
pub enum GiftState {
    /// Awaiting payment; no visible order number yet.
    Reserved,
    /// Paid. `order` is the 1-based purchase sequence number for the kind,
    /// assigned from the post-increment `purchased_count`.
    Purchased { order: i32 },
    /// Transferred to a receiver.
    Sent {
        order: i32,
        sent_at: DateTime<Utc>,
        receiver_id: Uuid,
    },
}

pub const GIFT_STATUS_RESERVED: i16 = 0;
pub const GIFT_STATUS_PURCHASED: i16 = 1;
pub const GIFT_STATUS_SENT: i16 = 2;

impl GiftState {
    /// Numeric discriminant for SMALLINT storage.
    pub fn tag(&self) -> i16 {
        match self {
            GiftState::Reserved => GIFT_STATUS_RESERVED,
            GiftState::Purchased { .. } => GIFT_STATUS_PURCHASED,
            GiftState::Sent { .. } => GIFT_STATUS_SENT,
        }
    }

    /// Rebuild the state from its stored columns.
    ///
    /// Returns `None` when the discriminant is unknown or the companion
    /// columns do not match it; callers surface that as an integrity
    /// violation, never as a silent default.
    pub fn from_columns(
        tag: i16,
        order: Option<i32>,
        sent_at: Option<DateTime<Utc>>,
        receiver_id: Option<Uuid>,
    ) -> Option<Self> {
        match (tag, order, sent_at, receiver_id) {
            (GIFT_STATUS_RESERVED, None, None, None) => Some(GiftState::Reserved),
            (GIFT_STATUS_PURCHASED, Some(order), None, None) => {
                Some(GiftState::Purchased { order })
            }
            (GIFT_STATUS_SENT, Some(order), Some(sent_at), Some(receiver_id)) => {
                Some(GiftState::Sent {
                    order,
                    sent_at,
                    receiver_id,
                })
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GiftState::Reserved => "reserved",
            GiftState::Purchased { .. } => "purchased",
            GiftState::Sent { .. } => "sent",
        }
    }
}

impl fmt::Display for GiftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A gift instance. The document is the single source of truth for the
/// gift's lifecycle state.
#[derive(Debug, Clone)]
pub struct Gift {
    pub id: Uuid,
    pub kind_id: Uuid,
    pub purchaser_id: Uuid,
    /// Capability string proving ownership, unique per purchaser.
    /// Assigned once at creation, immutable thereafter.
    pub send_token: String,
    /// Latest snapshot of the provider invoice backing this gift.
    pub invoice: Invoice,
    pub state: GiftState,
}

/// The slice of the platform user the engine reads and writes.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub tg_id: i64,
    pub language_code: Option<String>,
    pub received_gifts_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Short-lived, reissuable capability granting one recipient the right to
/// claim a specific gift. One-to-one with the gift; a refresh keeps the
/// token string and only bumps `issued_at`.
#[derive(Debug, Clone)]
pub struct ReceiveToken {
    pub token: String,
    pub gift_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

pub const ACTION_PURCHASE: i16 = 0;
pub const ACTION_SENDING: i16 = 1;

/// Append-only audit log entry, written once per transition and never read
/// back by the engine.
#[derive(Debug, Clone)]
pub struct GiftAction {
    pub id: Uuid,
    pub gift_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub detail: GiftActionDetail,
}

#[derive(Debug, Clone)]
pub enum GiftActionDetail {
    Purchase { purchaser_id: Uuid, price: Price },
    Sending { sender_id: Uuid, receiver_id: Uuid },
}

impl GiftAction {
    pub fn purchase(
        gift_id: Uuid,
        purchaser_id: Uuid,
        price: Price,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            gift_id,
            occurred_at,
            detail: GiftActionDetail::Purchase {
                purchaser_id,
                price,
            },
        }
    }

    pub fn sending(
        gift_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            gift_id,
            occurred_at,
            detail: GiftActionDetail::Sending {
                sender_id,
                receiver_id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_checks() {
        let mut kind = GiftKind {
            id: Uuid::new_v4(),
            name: "Blue Star".to_string(),
            price: Price {
                asset: "TON".to_string(),
                amount: Decimal::new(5, 0),
            },
            limit: 3,
            purchased_count: 0,
            reserved_count: 0,
        };

        assert!(!kind.is_sold_out());
        assert!(kind.has_capacity());
        assert_eq!(kind.in_stock(), 3);

        kind.purchased_count = 2;
        kind.reserved_count = 1;
        assert!(!kind.is_sold_out());
        assert!(!kind.has_capacity());
        assert_eq!(kind.in_stock(), 1);

        kind.purchased_count = 3;
        kind.reserved_count = 0;
        assert!(kind.is_sold_out());
        assert!(!kind.has_capacity());
        assert_eq!(kind.in_stock(), 0);
    }

    #[test]
    fn test_state_tag_roundtrip() {
        let receiver = Uuid::new_v4();
        let sent_at = Utc::now();
        let states = [
            GiftState::Reserved,
            GiftState::Purchased { order: 7 },
            GiftState::Sent {
                order: 7,
                sent_at,
                receiver_id: receiver,
            },
        ];

        for state in states {
            let (order, at, rec) = match &state {
                GiftState::Reserved => (None, None, None),
                GiftState::Purchased { order } => (Some(*order), None, None),
                GiftState::Sent {
                    order,
                    sent_at,
                    receiver_id,
                } => (Some(*order), Some(*sent_at), Some(*receiver_id)),
            };
            let decoded = GiftState::from_columns(state.tag(), order, at, rec).unwrap();
            assert_eq!(decoded, state);
        }
    }

    #[test]
    fn test_state_rejects_inconsistent_columns() {
        // Purchased without an order number.
        assert!(GiftState::from_columns(GIFT_STATUS_PURCHASED, None, None, None).is_none());
        // Sent missing the receiver.
        assert!(
            GiftState::from_columns(GIFT_STATUS_SENT, Some(1), Some(Utc::now()), None).is_none()
        );
        // Reserved carrying leftovers from a later state.
        assert!(GiftState::from_columns(GIFT_STATUS_RESERVED, Some(1), None, None).is_none());
        // Unknown discriminant.
        assert!(GiftState::from_columns(9, None, None, None).is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(GiftState::Reserved.to_string(), "reserved");
        assert_eq!(GiftState::Purchased { order: 1 }.to_string(), "purchased");
    }
}
