//! Invoice reconciliation: match reserved gifts against the payment
//! provider's authoritative invoice status and advance each gift in its
//! own transaction.
//!
//! The poller may race request handlers and, in a multi-process
//! deployment, other poller instances. Every transition therefore
//! re-validates the gift's state and invoice id from a locked re-read
//! inside the transaction; a gift that already moved on is skipped as
//! stale, not treated as an error.

use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::GiftConfig;
use crate::cryptopay::{Invoice, InvoiceProvider, InvoiceStatus};
use crate::db::Database;
use crate::db::actions::ActionStore;
use crate::db::gifts::{GiftStore, ReservedGiftRef};
use crate::db::kinds::KindStore;
use crate::db::users::UserStore;
use crate::error::GiftError;
use crate::models::{GiftAction, GiftState, Price};
use crate::notify::{GiftEvent, Notifier, spawn_notification};
use crate::scheduler::{Task, TaskOutcome};

/// Aggregate result of one reconciliation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub pending: u32,
    pub paid: u32,
    pub expired: u32,
    pub error: u32,
}

impl fmt::Display for ReconcileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending:{},paid:{},expired:{},error:{}",
            self.pending, self.paid, self.expired, self.error
        )
    }
}

/// Per-gift reconciliation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GiftOutcome {
    Pending,
    Paid,
    Expired,
    /// The gift already advanced past `Reserved` (or its invoice changed)
    /// between the batch read and the transaction. Nothing to do.
    Stale,
}

/// The reconciliation poller, packaged as a scheduler task.
pub struct ReconcileTask {
    db: Database,
    provider: Arc<dyn InvoiceProvider>,
    notifier: Arc<dyn Notifier>,
    config: GiftConfig,
}

impl ReconcileTask {
    pub fn new(
        db: Database,
        provider: Arc<dyn InvoiceProvider>,
        notifier: Arc<dyn Notifier>,
        config: GiftConfig,
    ) -> Self {
        Self {
            db,
            provider,
            notifier,
            config,
        }
    }

    /// One full run: batch, query the provider, advance every matched gift.
    pub async fn run_once(&self) -> Result<TaskOutcome, GiftError> {
        let repeat_after = Duration::from_millis(self.config.poll_delay_ms);

        let reserved = GiftStore::reserved_batch(self.db.pool(), self.config.db_batch_size).await?;
        let total = reserved.len();
        if total == 0 {
            return Ok(TaskOutcome {
                message: None,
                repeat_after,
            });
        }

        let mut stats = ReconcileStats::default();
        for chunk in reserved.chunks(self.config.provider_batch_size) {
            let ids: Vec<i64> = chunk.iter().map(|g| g.invoice_id).collect();
            let invoices = self.provider.get_invoices(&ids).await?;

            let (pairs, missing) = pair_with_invoices(chunk, invoices);
            for gift in missing {
                error!(
                    gift_id = %gift.id,
                    invoice_id = gift.invoice_id,
                    "invoice for the gift was not returned by the provider"
                );
                stats.error += 1;
            }

            for (gift, invoice) in pairs {
                match self.process_reserved_gift(&gift, invoice).await {
                    Ok(GiftOutcome::Pending) => stats.pending += 1,
                    Ok(GiftOutcome::Paid) => stats.paid += 1,
                    Ok(GiftOutcome::Expired) => stats.expired += 1,
                    Ok(GiftOutcome::Stale) => {
                        debug!(gift_id = %gift.id, "gift already advanced, skipping");
                    }
                    Err(err) => {
                        error!(gift_id = %gift.id, "failed to update a reserved gift: {err}");
                        stats.error += 1;
                    }
                }
            }
        }

        Ok(TaskOutcome {
            message: Some(format!("Updated {total} gifts ({stats}).")),
            repeat_after,
        })
    }

    /// Advance one gift based on its invoice status, in its own
    /// transaction. The batch snapshot is only a hint: the gift is
    /// re-read and re-validated under a row lock before any write.
    async fn process_reserved_gift(
        &self,
        gift_ref: &ReservedGiftRef,
        invoice: Invoice,
    ) -> Result<GiftOutcome, GiftError> {
        let mut tx = self.db.pool().begin().await?;

        let Some(gift) = GiftStore::lock(&mut tx, gift_ref.id).await? else {
            // Deleted since the batch read (e.g. a concurrent expiry).
            return Ok(GiftOutcome::Stale);
        };
        if gift.state != GiftState::Reserved || gift.invoice.invoice_id != invoice.invoice_id {
            return Ok(GiftOutcome::Stale);
        }

        match invoice.status {
            InvoiceStatus::Active => {
                GiftStore::refresh_invoice(&mut tx, gift.id, &invoice).await?;
                tx.commit().await?;
                Ok(GiftOutcome::Pending)
            }
            InvoiceStatus::Paid => {
                let order = KindStore::apply_purchase(&mut tx, gift.kind_id).await?;
                GiftStore::mark_purchased(&mut tx, gift.id, &invoice, order).await?;

                let occurred_at = invoice.paid_at.unwrap_or_else(Utc::now);
                let action = GiftAction::purchase(
                    gift.id,
                    gift.purchaser_id,
                    price_from_invoice(&invoice),
                    occurred_at,
                );
                ActionStore::record(&mut tx, &action).await?;

                tx.commit().await?;

                self.notify_purchaser(gift.id, gift.kind_id, gift.purchaser_id);
                Ok(GiftOutcome::Paid)
            }
            InvoiceStatus::Expired => {
                GiftStore::delete(&mut tx, gift.id).await?;
                KindStore::release_reservation(&mut tx, gift.kind_id).await?;
                tx.commit().await?;
                Ok(GiftOutcome::Expired)
            }
            InvoiceStatus::Unknown => Err(GiftError::Integrity(format!(
                "invoice {} has an unknown status",
                invoice.invoice_id
            ))),
        }
    }

    /// Best-effort purchase notification, detached from the transaction.
    fn notify_purchaser(&self, gift_id: Uuid, kind_id: Uuid, purchaser_id: Uuid) {
        let pool = self.db.pool().clone();
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let result = async {
                let user = UserStore::get(&pool, purchaser_id)
                    .await?
                    .ok_or_else(|| GiftError::Integrity("purchaser is not found".to_string()))?;
                let kind = KindStore::get(&pool, kind_id)
                    .await?
                    .ok_or_else(|| GiftError::Integrity("gift kind is not found".to_string()))?;
                spawn_notification(
                    notifier,
                    user,
                    GiftEvent::Purchased {
                        kind_name: kind.name,
                    },
                    gift_id,
                );
                Ok::<(), GiftError>(())
            }
            .await;

            if let Err(err) = result {
                error!(%gift_id, %purchaser_id, "failed to notify purchaser: {err}");
            }
        });
    }
}

#[async_trait]
impl Task for ReconcileTask {
    fn name(&self) -> &'static str {
        "update-invoices"
    }

    async fn run(&self) -> Result<TaskOutcome, GiftError> {
        self.run_once().await
    }
}

/// Match a batch chunk against the invoices the provider returned.
/// Gifts whose invoice is absent come back separately; they must not block
/// the rest of the chunk.
fn pair_with_invoices(
    chunk: &[ReservedGiftRef],
    invoices: Vec<Invoice>,
) -> (Vec<(ReservedGiftRef, Invoice)>, Vec<ReservedGiftRef>) {
    let mut pairs = Vec::with_capacity(chunk.len());
    let mut missing = Vec::new();

    for gift in chunk {
        match invoices.iter().find(|i| i.invoice_id == gift.invoice_id) {
            Some(invoice) => pairs.push((gift.clone(), invoice.clone())),
            None => missing.push(gift.clone()),
        }
    }

    (pairs, missing)
}

/// Price actually paid. Falls back to the invoiced asset/amount fields
/// when the provider omits the paid ones (it should not for a paid
/// invoice).
fn price_from_invoice(invoice: &Invoice) -> Price {
    match (&invoice.paid_asset, invoice.paid_amount) {
        (Some(asset), Some(amount)) => Price {
            asset: asset.clone(),
            amount,
        },
        _ => {
            warn!(
                invoice_id = invoice.invoice_id,
                "paid invoice is missing paid_asset/paid_amount"
            );
            Price {
                asset: invoice.asset.clone().unwrap_or_else(|| "TON".to_string()),
                amount: invoice.amount,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn invoice(id: i64, status: InvoiceStatus) -> Invoice {
        Invoice {
            invoice_id: id,
            hash: format!("hash{id}"),
            currency_type: "crypto".to_string(),
            asset: Some("TON".to_string()),
            amount: Decimal::new(5, 0),
            status,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            description: None,
            payload: None,
            bot_invoice_url: String::new(),
            mini_app_invoice_url: String::new(),
            expiration_date: None,
            paid_at: None,
            paid_asset: None,
            paid_amount: None,
        }
    }

    fn gift_ref(invoice_id: i64) -> ReservedGiftRef {
        ReservedGiftRef {
            id: Uuid::new_v4(),
            invoice_id,
        }
    }

    #[test]
    fn test_pairing_matches_by_invoice_id() {
        let chunk = vec![gift_ref(1), gift_ref(2), gift_ref(3)];
        let invoices = vec![
            invoice(3, InvoiceStatus::Active),
            invoice(1, InvoiceStatus::Paid),
        ];

        let (pairs, missing) = pair_with_invoices(&chunk, invoices);

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0.invoice_id, 1);
        assert_eq!(pairs[0].1.status, InvoiceStatus::Paid);
        assert_eq!(pairs[1].0.invoice_id, 3);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].invoice_id, 2);
    }

    #[test]
    fn test_pairing_empty_provider_response() {
        let chunk = vec![gift_ref(1), gift_ref(2)];
        let (pairs, missing) = pair_with_invoices(&chunk, Vec::new());
        assert!(pairs.is_empty());
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn test_price_prefers_paid_fields() {
        let mut inv = invoice(1, InvoiceStatus::Paid);
        inv.paid_asset = Some("USDT".to_string());
        inv.paid_amount = Some(Decimal::new(51, 1));

        let price = price_from_invoice(&inv);
        assert_eq!(price.asset, "USDT");
        assert_eq!(price.amount, Decimal::new(51, 1));
    }

    #[test]
    fn test_price_falls_back_to_invoiced_amount() {
        let inv = invoice(1, InvoiceStatus::Paid);
        let price = price_from_invoice(&inv);
        assert_eq!(price.asset, "TON");
        assert_eq!(price.amount, Decimal::new(5, 0));
    }

    #[test]
    fn test_stats_line() {
        let stats = ReconcileStats {
            pending: 4,
            paid: 2,
            expired: 1,
            error: 0,
        };
        assert_eq!(stats.to_string(), "pending:4,paid:2,expired:1,error:0");
    }
}
