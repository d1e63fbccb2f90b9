//! Transfer token protocol: issue/refresh receive tokens and redeem them.
//!
//! Transfer is capability-based. Possession of a fresh receive token - not
//! any identity check - is what grants the right to claim a gift, so the
//! token is high-entropy, time-bounded, and consumed by the first
//! successful redemption (idempotent only for the recorded receiver).

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::GiftConfig;
use crate::db::Database;
use crate::db::actions::ActionStore;
use crate::db::gifts::GiftStore;
use crate::db::kinds::KindStore;
use crate::db::receive_tokens::ReceiveTokenStore;
use crate::db::users::UserStore;
use crate::error::GiftError;
use crate::models::{Gift, GiftAction, GiftState, ReceiveToken};
use crate::notify::{GiftEvent, Notifier, spawn_notification};
use crate::tokens::generate_receive_token;

pub struct TransferService;

impl TransferService {
    /// Issue the receive token for a gift, or refresh the existing one.
    ///
    /// Refreshing keeps the token string and only bumps `issued_at`, so a
    /// link already shared out-of-band keeps working while remaining
    /// time-bounded.
    pub async fn get_or_create_receive_token(
        db: &Database,
        gift_id: Uuid,
    ) -> Result<ReceiveToken, GiftError> {
        ReceiveTokenStore::upsert(db.pool(), gift_id, generate_receive_token(), Utc::now()).await
    }

    /// Redeem a receive token, moving the gift to `Sent`.
    ///
    /// The sole committing path is a `Purchased` gift; redeeming an
    /// already-`Sent` gift succeeds idempotently for the recorded receiver
    /// and fails for anyone else, so a consumed token cannot be replayed
    /// by a second user.
    pub async fn redeem(
        db: &Database,
        notifier: &Arc<dyn Notifier>,
        config: &GiftConfig,
        receive_token: &str,
        receiver_id: Uuid,
    ) -> Result<Gift, GiftError> {
        if receive_token.is_empty() {
            return Err(GiftError::InvalidOrExpiredToken);
        }

        let now = Utc::now();
        let ttl = Duration::seconds(config.receive_token_ttl_secs);

        let mut tx = db.pool().begin().await?;

        let token = ReceiveTokenStore::get(&mut tx, receive_token)
            .await?
            .ok_or(GiftError::InvalidOrExpiredToken)?;
        if token_expired(token.issued_at, now, ttl) {
            return Err(GiftError::InvalidOrExpiredToken);
        }

        let Some(gift) = GiftStore::lock(&mut tx, token.gift_id).await? else {
            warn!(gift_id = %token.gift_id, "cannot find receive token's gift");
            return Err(GiftError::InvalidOrExpiredToken);
        };

        match gift.state {
            GiftState::Reserved => {
                // A receive token should only exist for a purchased-or-later
                // gift.
                warn!(gift_id = %gift.id, "receive token's gift is still reserved");
                Err(GiftError::InvalidOrExpiredToken)
            }
            GiftState::Purchased { order } => {
                GiftStore::mark_sent(&mut tx, gift.id, now, receiver_id).await?;
                UserStore::increment_received(&mut tx, receiver_id).await?;
                let action = GiftAction::sending(gift.id, gift.purchaser_id, receiver_id, now);
                ActionStore::record(&mut tx, &action).await?;

                tx.commit().await?;

                info!(
                    gift_id = %gift.id,
                    sender_id = %gift.purchaser_id,
                    %receiver_id,
                    "gift sent"
                );

                Self::notify_both(db, notifier, &gift, receiver_id);

                Ok(Gift {
                    state: GiftState::Sent {
                        order,
                        sent_at: now,
                        receiver_id,
                    },
                    ..gift
                })
            }
            GiftState::Sent {
                receiver_id: recorded,
                ..
            } => {
                if recorded == receiver_id {
                    // Retried client request; nothing to mutate.
                    Ok(gift)
                } else {
                    Err(GiftError::InvalidOrExpiredToken)
                }
            }
        }
    }

    /// Best-effort notifications to the receiver and the original
    /// purchaser, detached from the redeem transaction. Either send
    /// failing is logged and never retried.
    fn notify_both(db: &Database, notifier: &Arc<dyn Notifier>, gift: &Gift, receiver_id: Uuid) {
        let pool = db.pool().clone();
        let notifier = notifier.clone();
        let gift_id = gift.id;
        let kind_id = gift.kind_id;
        let sender_id = gift.purchaser_id;

        tokio::spawn(async move {
            let result = async {
                let sender = UserStore::get(&pool, sender_id)
                    .await?
                    .ok_or_else(|| GiftError::Integrity("sender is not found".to_string()))?;
                let receiver = UserStore::get(&pool, receiver_id)
                    .await?
                    .ok_or_else(|| GiftError::Integrity("receiver is not found".to_string()))?;
                let kind = KindStore::get(&pool, kind_id)
                    .await?
                    .ok_or_else(|| GiftError::Integrity("gift kind is not found".to_string()))?;

                spawn_notification(
                    notifier.clone(),
                    receiver.clone(),
                    GiftEvent::Received {
                        kind_name: kind.name.clone(),
                        sender_name: sender.name.clone(),
                    },
                    gift_id,
                );
                spawn_notification(
                    notifier,
                    sender,
                    GiftEvent::Delivered {
                        kind_name: kind.name,
                        receiver_name: receiver.name,
                    },
                    gift_id,
                );
                Ok::<(), GiftError>(())
            }
            .await;

            if let Err(err) = result {
                error!(%gift_id, "failed to notify users about receiving a gift: {err}");
            }
        });
    }
}

/// A token older than its TTL is rejected even if the gift is still
/// transferable.
fn token_expired(issued_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    issued_at < now - ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_token_expiry_window() {
        let ttl = Duration::seconds(3600);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let fresh = now - Duration::seconds(10);
        assert!(!token_expired(fresh, now, ttl));

        let boundary = now - Duration::seconds(3600);
        assert!(!token_expired(boundary, now, ttl));

        let stale = now - Duration::seconds(3601);
        assert!(token_expired(stale, now, ttl));
    }
}
