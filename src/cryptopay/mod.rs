//! Crypto-invoicing provider client.
//!
//! The engine consumes the provider as a black box: `createInvoice` when a
//! reservation is opened, `getInvoices` when the reconciler polls. The
//! provider's own invoice lifecycle is out of scope.

mod client;
mod error;
mod types;

pub use client::{CryptoPay, InvoiceProvider};
pub use error::CryptoPayError;
pub use types::{CreateInvoiceRequest, Invoice, InvoiceStatus};
