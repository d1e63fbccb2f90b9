//! Wire types for the crypto-invoicing provider API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Invoice lifecycle status as reported by the provider.
///
/// `Unknown` captures any status value outside the documented set; the
/// reconciler treats it as a fatal schema surprise rather than coercing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Active,
    Paid,
    Expired,
    #[serde(other)]
    Unknown,
}

/// An invoice document as returned by the provider. Stored verbatim on the
/// gift as its proof-of-intent-to-pay and refreshed on reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: i64,
    pub hash: String,
    pub currency_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    pub amount: Decimal,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    pub bot_invoice_url: String,
    pub mini_app_invoice_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_amount: Option<Decimal>,
}

/// Parameters for `createInvoice`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateInvoiceRequest {
    pub currency_type: &'static str,
    pub asset: String,
    pub amount: Decimal,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    pub allow_comments: bool,
    pub allow_anonymous: bool,
}

impl CreateInvoiceRequest {
    pub fn crypto(asset: String, amount: Decimal, expires_in: i64) -> Self {
        Self {
            currency_type: "crypto",
            asset,
            amount,
            expires_in,
            description: None,
            payload: None,
            allow_comments: true,
            allow_anonymous: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOICE_JSON: &str = r#"{
        "invoice_id": 42,
        "hash": "IVlJKeXW",
        "currency_type": "crypto",
        "asset": "TON",
        "amount": "5.5",
        "status": "paid",
        "created_at": "2024-05-01T10:00:00Z",
        "bot_invoice_url": "https://t.me/CryptoBot?start=IVlJKeXW",
        "mini_app_invoice_url": "https://t.me/CryptoBot/app?startapp=invoice-IVlJKeXW",
        "paid_at": "2024-05-01T10:05:00Z",
        "paid_asset": "TON",
        "paid_amount": "5.5"
    }"#;

    #[test]
    fn test_invoice_deserializes() {
        let invoice: Invoice = serde_json::from_str(INVOICE_JSON).unwrap();
        assert_eq!(invoice.invoice_id, 42);
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.asset.as_deref(), Some("TON"));
        assert_eq!(invoice.amount, Decimal::new(55, 1));
        assert!(invoice.paid_at.is_some());
    }

    #[test]
    fn test_unknown_status_is_not_coerced_to_known() {
        let json = INVOICE_JSON.replace("\"paid\"", "\"refunded\"");
        let invoice: Invoice = serde_json::from_str(&json).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Unknown);
    }

    #[test]
    fn test_invoice_roundtrips_through_json() {
        let invoice: Invoice = serde_json::from_str(INVOICE_JSON).unwrap();
        let text = serde_json::to_string(&invoice).unwrap();
        let back: Invoice = serde_json::from_str(&text).unwrap();
        assert_eq!(back.invoice_id, invoice.invoice_id);
        assert_eq!(back.status, invoice.status);
        assert_eq!(back.paid_amount, invoice.paid_amount);
    }

    #[test]
    fn test_create_request_serializes_amount_as_string() {
        let req = CreateInvoiceRequest::crypto("TON".to_string(), Decimal::new(25, 1), 3600);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["currency_type"], "crypto");
        assert_eq!(value["amount"], "2.5");
        assert!(value.get("description").is_none());
    }
}
