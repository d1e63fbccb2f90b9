use thiserror::Error;

use crate::cryptopay::CryptoPayError;

/// Engine-level error taxonomy.
///
/// The first five variants are recoverable at the transport boundary and map
/// to client-visible errors. `Provider`, `Integrity` and `Database` surface
/// as opaque internal errors; provider payloads are logged, never echoed.
#[derive(Debug, Error)]
pub enum GiftError {
    #[error("Gift kind not found")]
    KindNotFound,

    #[error("Gifts of this kind are sold out")]
    SoldOut,

    #[error("Cannot reserve a gift for now, try again later")]
    CapacityExhausted,

    #[error("Gift not found")]
    GiftNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Payment provider error: {0}")]
    Provider(#[from] CryptoPayError),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl GiftError {
    /// Whether this error is safe to show to an end user as-is.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            GiftError::KindNotFound
                | GiftError::SoldOut
                | GiftError::CapacityExhausted
                | GiftError::GiftNotFound
                | GiftError::UserNotFound
                | GiftError::InvalidOrExpiredToken
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_split() {
        assert!(GiftError::SoldOut.is_user_facing());
        assert!(GiftError::CapacityExhausted.is_user_facing());
        assert!(GiftError::InvalidOrExpiredToken.is_user_facing());
        assert!(!GiftError::Integrity("x".to_string()).is_user_facing());
        assert!(!GiftError::Database(sqlx::Error::RowNotFound).is_user_facing());
    }
}
