//! HTTP client for the crypto-invoicing provider.
//!
//! Every call is a POST of a JSON payload to `{base_url}/{method}` with the
//! API token in a header; responses arrive in an `{ok, result | error}`
//! envelope. The `InvoiceProvider` trait is the seam the reservation
//! transactor and the reconciler are written against.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::error;

use super::error::CryptoPayError;
use super::types::{CreateInvoiceRequest, Invoice};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Unified interface to the payment provider.
#[async_trait]
pub trait InvoiceProvider: Send + Sync {
    /// Open a new invoice. Failure here must abort whatever reservation
    /// transaction it was called from.
    async fn create_invoice(&self, req: CreateInvoiceRequest) -> Result<Invoice, CryptoPayError>;

    /// Bulk status query by invoice id. Invoices unknown to the provider
    /// are simply absent from the result.
    async fn get_invoices(&self, ids: &[i64]) -> Result<Vec<Invoice>, CryptoPayError>;
}

/// Response envelope shared by all provider methods.
#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    code: i64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct InvoiceList {
    items: Vec<Invoice>,
}

#[derive(serde::Serialize)]
struct GetInvoicesRequest {
    invoice_ids: String,
}

/// Crypto Pay API client.
pub struct CryptoPay {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl CryptoPay {
    pub fn new(base_url: &str, token: &str) -> Result<Self, CryptoPayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(CryptoPayError::Network)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    async fn request<P, T>(&self, method: &str, payload: &P) -> Result<T, CryptoPayError>
    where
        P: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .header("Crypto-Pay-API-Token", &self.token)
            .json(payload)
            .send()
            .await
            .map_err(CryptoPayError::Network)?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| CryptoPayError::InvalidResponse(e.to_string()))?;

        if !body.ok {
            let (code, name) = body
                .error
                .map(|e| (e.code, e.name.unwrap_or_default()))
                .unwrap_or((0, String::new()));
            error!(method, code, name, "payment provider rejected request");
            return Err(CryptoPayError::RequestFailed { code, name });
        }

        body.result.ok_or_else(|| {
            CryptoPayError::InvalidResponse("ok response without a result".to_string())
        })
    }
}

#[async_trait]
impl InvoiceProvider for CryptoPay {
    async fn create_invoice(&self, req: CreateInvoiceRequest) -> Result<Invoice, CryptoPayError> {
        self.request("createInvoice", &req).await
    }

    async fn get_invoices(&self, ids: &[i64]) -> Result<Vec<Invoice>, CryptoPayError> {
        let req = GetInvoicesRequest {
            invoice_ids: ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
        };
        let list: InvoiceList = self.request("getInvoices", &req).await?;
        Ok(list.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses_success() {
        let body: ApiResponse<InvoiceList> =
            serde_json::from_str(r#"{"ok": true, "result": {"items": []}}"#).unwrap();
        assert!(body.ok);
        assert!(body.result.unwrap().items.is_empty());
    }

    #[test]
    fn test_envelope_parses_error() {
        let body: ApiResponse<InvoiceList> =
            serde_json::from_str(r#"{"ok": false, "error": {"code": 400, "name": "EXPIRES_IN_INVALID"}}"#)
                .unwrap();
        assert!(!body.ok);
        let err = body.error.unwrap();
        assert_eq!(err.code, 400);
        assert_eq!(err.name.as_deref(), Some("EXPIRES_IN_INVALID"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = CryptoPay::new("https://pay.example/api/", "token").unwrap();
        assert_eq!(client.base_url, "https://pay.example/api");
    }
}
