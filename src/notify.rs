//! Best-effort user notifications.
//!
//! Notification sends are moved outside every transaction boundary: a
//! transition commits first, then the send runs on a detached task. A
//! failed send is logged with its gift context and never retried, never
//! rolled back.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::models::User;

/// Something worth telling a user about.
#[derive(Debug, Clone)]
pub enum GiftEvent {
    /// The user's payment settled.
    Purchased { kind_name: String },
    /// The user claimed a gift someone sent them.
    Received {
        kind_name: String,
        sender_name: String,
    },
    /// A gift the user purchased was claimed by its receiver.
    Delivered {
        kind_name: String,
        receiver_name: String,
    },
}

impl GiftEvent {
    pub fn text(&self) -> String {
        match self {
            GiftEvent::Purchased { kind_name } => {
                format!("You purchased the gift \"{kind_name}\".")
            }
            GiftEvent::Received {
                kind_name,
                sender_name,
            } => format!("{sender_name} sent you the gift \"{kind_name}\"."),
            GiftEvent::Delivered {
                kind_name,
                receiver_name,
            } => format!("{receiver_name} received your gift \"{kind_name}\"."),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to reach notification transport: {0}")]
    Network(String),

    #[error("notification transport rejected the message: {0}")]
    Rejected(String),
}

/// Notification transport seam. Implementations must be cheap to call from
/// detached tasks; the engine never awaits delivery inside a transaction.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user: &User, event: GiftEvent) -> Result<(), NotifyError>;
}

/// Fire-and-forget dispatch. Spawns the send and logs any failure with the
/// gift it belongs to; the caller gets nothing back by design.
pub fn spawn_notification(
    notifier: Arc<dyn Notifier>,
    user: User,
    event: GiftEvent,
    gift_id: Uuid,
) {
    tokio::spawn(async move {
        if let Err(err) = notifier.notify(&user, event).await {
            error!(%gift_id, user_id = %user.id, "failed to notify user: {err}");
        }
    });
}

/// Messaging-bot HTTP notifier: posts a `sendMessage` call to the bot API.
pub struct BotNotifier {
    api_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

impl BotNotifier {
    pub fn new(api_url: &str, token: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for BotNotifier {
    async fn notify(&self, user: &User, event: GiftEvent) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.token);
        let text = event.text();
        let response = self
            .client
            .post(&url)
            .json(&SendMessageRequest {
                chat_id: user.tg_id,
                text: &text,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    //! Recording notifier for unit tests.

    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(Uuid, String)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, user: &User, event: GiftEvent) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Network("connection refused".to_string()));
            }
            self.sent.lock().await.push((user.id, event.text()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            tg_id: 1001,
            language_code: Some("en".to_string()),
            received_gifts_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_texts() {
        let purchased = GiftEvent::Purchased {
            kind_name: "Blue Star".to_string(),
        };
        assert_eq!(purchased.text(), "You purchased the gift \"Blue Star\".");

        let received = GiftEvent::Received {
            kind_name: "Blue Star".to_string(),
            sender_name: "Bob".to_string(),
        };
        assert_eq!(received.text(), "Bob sent you the gift \"Blue Star\".");

        let delivered = GiftEvent::Delivered {
            kind_name: "Blue Star".to_string(),
            receiver_name: "Alice".to_string(),
        };
        assert_eq!(delivered.text(), "Alice received your gift \"Blue Star\".");
    }

    #[tokio::test]
    async fn test_recording_notifier_captures_sends() {
        let notifier = RecordingNotifier::default();
        let user = user();
        notifier
            .notify(
                &user,
                GiftEvent::Purchased {
                    kind_name: "Blue Star".to_string(),
                },
            )
            .await
            .unwrap();

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, user.id);
    }

    #[tokio::test]
    async fn test_spawned_notification_failure_is_swallowed() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        spawn_notification(
            notifier.clone(),
            user(),
            GiftEvent::Purchased {
                kind_name: "Blue Star".to_string(),
            },
            Uuid::new_v4(),
        );
        // Let the detached task run; nothing to assert beyond "no panic,
        // nothing recorded".
        tokio::task::yield_now().await;
        assert!(notifier.sent.lock().await.is_empty());
    }
}
