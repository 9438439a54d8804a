// Copyright (c) 2025 - Cowboy AI, Inc.
//! Quota Notification Delivery
//!
//! Delivers due quota notifications to their callback url. Delivery is
//! decoupled from the limit decision: a failed call is reported back to the
//! quota engine, which logs it and still returns the limit verdict.
//!
//! # Architecture
//!
//! ```text
//! report_quota_usage
//!      │
//!      ▼
//! NotificationDue fact ──> QuotaNotifier.notify() ──> Notified fact
//!                             │ (POST, application/json)
//!                             ▼
//!                        non-2xx = failure
//! ```

use async_trait::async_trait;
use tracing::info;

use crate::events::Fact;

/// Errors that can occur while delivering a notification
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The request could not be sent
    #[error("notification transport error: {0}")]
    Transport(String),

    /// The callback answered with a non-2xx status
    #[error("notification callback returned status {0}")]
    Status(u16),
}

/// Delivers a due notification fact to a callback url
#[async_trait]
pub trait QuotaNotifier: Send + Sync {
    /// POST the fact as JSON to `call_url`
    ///
    /// # Errors
    ///
    /// - `Transport` if the request could not be sent
    /// - `Status` if the callback answered with anything but 2xx
    async fn notify(&self, call_url: &str, fact: &Fact) -> Result<(), NotifyError>;
}

/// Logs notifications instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl QuotaNotifier for LoggingNotifier {
    async fn notify(&self, call_url: &str, fact: &Fact) -> Result<(), NotifyError> {
        info!(
            call_url,
            aggregate_id = fact.aggregate_id(),
            sequence = fact.sequence,
            "quota notification due"
        );
        Ok(())
    }
}

#[cfg(feature = "http-notifier")]
pub use http::HttpNotifier;

#[cfg(feature = "http-notifier")]
mod http {
    use async_trait::async_trait;
    use reqwest::Client;
    use std::time::Duration;
    use tracing::{debug, warn};

    use super::{NotifyError, QuotaNotifier};
    use crate::events::Fact;

    /// Sends notifications as `POST` requests with a JSON body
    #[derive(Debug, Clone)]
    pub struct HttpNotifier {
        client: Client,
    }

    impl HttpNotifier {
        pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl QuotaNotifier for HttpNotifier {
        async fn notify(&self, call_url: &str, fact: &Fact) -> Result<(), NotifyError> {
            let response = self
                .client
                .post(call_url)
                .json(fact)
                .send()
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                warn!(call_url, status = status.as_u16(), "quota notification rejected");
                return Err(NotifyError::Status(status.as_u16()));
            }

            debug!(call_url, "quota notification delivered");
            Ok(())
        }
    }
}
