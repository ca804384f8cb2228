//! HTTP push transport
//!
//! Posts the reminder payload to each subscription endpoint. Status codes
//! decide the outcome: 2xx delivered, 404/410 permanent (the endpoint is
//! gone), anything else (timeouts included) transient.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{JournalError, Result};
use crate::scheduler::{PushMessage, PushOutcome, PushTransport};
use crate::types::PushSubscription;

pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JournalError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn send(&self, subscription: &PushSubscription, message: &PushMessage) -> PushOutcome {
        let response = self
            .client
            .post(&subscription.endpoint)
            .json(message)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                debug!(subscription_id = subscription.id, "push delivered");
                PushOutcome::Delivered
            }
            Ok(resp)
                if resp.status() == StatusCode::NOT_FOUND
                    || resp.status() == StatusCode::GONE =>
            {
                warn!(
                    subscription_id = subscription.id,
                    status = %resp.status(),
                    "push endpoint gone"
                );
                PushOutcome::PermanentFailure
            }
            Ok(resp) => {
                warn!(
                    subscription_id = subscription.id,
                    status = %resp.status(),
                    "push rejected, will retry next tick"
                );
                PushOutcome::TransientFailure
            }
            Err(e) => {
                warn!(subscription_id = subscription.id, error = %e, "push request failed");
                PushOutcome::TransientFailure
            }
        }
    }
}
