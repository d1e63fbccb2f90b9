//! Reservation transactor: claim a unit of a gift kind and open the
//! invoice that backs it, atomically.

use tracing::info;
use uuid::Uuid;

use crate::config::GiftConfig;
use crate::cryptopay::{CreateInvoiceRequest, InvoiceProvider};
use crate::db::Database;
use crate::db::gifts::GiftStore;
use crate::db::kinds::KindStore;
use crate::error::GiftError;
use crate::models::{Gift, GiftState};
use crate::tokens::generate_send_token;

pub struct ReservationService;

impl ReservationService {
    /// Reserve a gift of `kind_id` for `purchaser_id`.
    ///
    /// Idempotent per (kind, purchaser): a retried request returns the
    /// existing reservation instead of opening a second invoice. The
    /// capacity check, invoice creation, gift insert and counter increment
    /// all commit in one transaction; if invoice creation fails the whole
    /// reservation aborts, so a committed reservation always has a live
    /// invoice behind it.
    ///
    /// The provider call deliberately happens inside the transaction while
    /// the kind row is locked. A higher-volume deployment would pre-create
    /// the invoice and transact only with its id; the invariant to keep is
    /// that no reservation ever commits without one.
    pub async fn reserve(
        db: &Database,
        provider: &dyn InvoiceProvider,
        config: &GiftConfig,
        kind_id: Uuid,
        purchaser_id: Uuid,
    ) -> Result<Gift, GiftError> {
        let mut tx = db.pool().begin().await?;

        let kind = KindStore::lock(&mut tx, kind_id)
            .await?
            .ok_or(GiftError::KindNotFound)?;

        if let Some(existing) = GiftStore::find_reserved(&mut tx, kind_id, purchaser_id).await? {
            return Ok(existing);
        }

        if kind.is_sold_out() {
            return Err(GiftError::SoldOut);
        }
        if !kind.has_capacity() {
            return Err(GiftError::CapacityExhausted);
        }

        let mut request = CreateInvoiceRequest::crypto(
            kind.price.asset.clone(),
            kind.price.amount,
            config.invoice_expires_in_secs,
        );
        request.description = Some(format!("Gift: {}", kind.name));
        request.payload = Some(
            serde_json::json!({ "userId": purchaser_id, "kindId": kind_id }).to_string(),
        );

        // Aborts the transaction on failure: dropping `tx` rolls back.
        let invoice = provider.create_invoice(request).await?;

        let gift = Gift {
            id: Uuid::new_v4(),
            kind_id,
            purchaser_id,
            send_token: generate_send_token(),
            invoice,
            state: GiftState::Reserved,
        };

        GiftStore::insert_reserved(&mut tx, &gift).await?;
        KindStore::take_reservation(&mut tx, kind_id).await?;

        tx.commit().await?;

        info!(
            gift_id = %gift.id,
            %kind_id,
            %purchaser_id,
            invoice_id = gift.invoice.invoice_id,
            "gift reserved"
        );

        Ok(gift)
    }
}
