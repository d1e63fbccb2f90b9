//! giftbox - Gift Lifecycle & Reconciliation Engine
//!
//! Users reserve, pay for and transfer scarce, limited-supply virtual
//! gifts; payment settles through an external crypto-invoicing provider.
//!
//! # Modules
//!
//! - [`models`] - Gift kinds, gifts, lifecycle state, users, audit actions
//! - [`db`] - PostgreSQL store: the single consistency boundary
//! - [`cryptopay`] - Payment provider client
//! - [`tokens`] - Send/receive capability tokens
//! - [`reserve`] - Reservation transactor
//! - [`reconcile`] - Invoice reconciliation poller
//! - [`transfer`] - Token-based transfer protocol
//! - [`queries`] - Read projections for presentation layers
//! - [`scheduler`] - Self-rescheduling task runner with error backoff
//! - [`notify`] - Best-effort user notifications

pub mod config;
pub mod cryptopay;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod notify;
pub mod queries;
pub mod reconcile;
pub mod reserve;
pub mod scheduler;
pub mod tokens;
pub mod transfer;

// Convenient re-exports at crate root
pub use cryptopay::{CryptoPay, Invoice, InvoiceProvider, InvoiceStatus};
pub use db::Database;
pub use error::GiftError;
pub use models::{Gift, GiftAction, GiftKind, GiftState, Price, ReceiveToken, User};
pub use reconcile::{ReconcileStats, ReconcileTask};
pub use reserve::ReservationService;
pub use transfer::TransferService;
