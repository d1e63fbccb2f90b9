use thiserror::Error;

/// Payment provider failures. Network and malformed-response errors are
/// distinct so callers can tell a dead provider from a schema drift; both
/// abort whatever transaction they happen inside.
#[derive(Debug, Error)]
pub enum CryptoPayError {
    #[error("request to payment provider failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("payment provider returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("payment provider rejected the request (code {code}: {name})")]
    RequestFailed { code: i64, name: String },
}
