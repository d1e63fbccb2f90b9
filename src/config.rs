use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL for the gift store.
    pub postgres_url: String,
    pub crypto_pay: CryptoPayConfig,
    pub bot: BotConfig,
    #[serde(default)]
    pub gifts: GiftConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CryptoPayConfig {
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BotConfig {
    pub api_url: String,
    pub token: String,
}

/// Tunables of the gift lifecycle engine.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GiftConfig {
    /// Lifetime the provider gives a new invoice before it expires.
    pub invoice_expires_in_secs: i64,
    /// Receive-token validity window, checked at redemption.
    pub receive_token_ttl_secs: i64,
    /// Reserved gifts fetched per reconciliation run.
    pub db_batch_size: i64,
    /// Provider bulk-query limit per getInvoices call.
    pub provider_batch_size: usize,
    /// Nominal delay between reconciliation runs.
    pub poll_delay_ms: u64,
}

impl Default for GiftConfig {
    fn default() -> Self {
        Self {
            invoice_expires_in_secs: 3600,
            receive_token_ttl_secs: 24 * 3600,
            db_batch_size: 100,
            provider_batch_size: 10,
            poll_delay_ms: 1000,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gift_config_defaults() {
        let config = GiftConfig::default();
        assert_eq!(config.invoice_expires_in_secs, 3600);
        assert_eq!(config.receive_token_ttl_secs, 86400);
        assert_eq!(config.db_batch_size, 100);
        assert_eq!(config.provider_batch_size, 10);
        assert_eq!(config.poll_delay_ms, 1000);
    }

    #[test]
    fn test_config_parses_with_defaulted_gifts_section() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: giftbox.log
use_json: false
rotation: daily
postgres_url: postgres://localhost/giftbox
crypto_pay:
  base_url: https://testnet-pay.crypt.bot/api
  token: test-token
bot:
  api_url: https://api.telegram.org
  token: bot-token
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.gifts.db_batch_size, 100);
        assert_eq!(config.crypto_pay.base_url, "https://testnet-pay.crypt.bot/api");
    }
}
