use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{errors::GateError, models::OutgoingMail};

// 1. Mailer Contract
/// Mailer
///
/// Abstract contract for the mail transport. Handlers only ever see this trait, so the HTTP
/// relay client in production can be swapped for the recording mock in tests.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Hands one message to the transport. No retries are attempted at this layer.
    async fn send(&self, mail: OutgoingMail) -> Result<(), GateError>;
}

// 2. The Real Implementation (HTTP mail relay)
/// HttpMailer
///
/// Posts each message as JSON to a transactional mail relay, authenticating with a bearer key.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), GateError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&mail)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GateError::Mail(format!(
                "relay rejected message to {} with status {}",
                mail.to,
                response.status()
            )));
        }

        Ok(())
    }
}

// 3. The Mock Implementation (For Tests)
/// MockMailer
///
/// Records every message instead of sending it. `should_fail` makes each send return an error.
#[derive(Clone, Default)]
pub struct MockMailer {
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), GateError> {
        if self.should_fail {
            return Err(GateError::Mail(
                "Mock Mailer Error: Simulation requested".to_string(),
            ));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(mail);
        Ok(())
    }
}

/// MailerState
///
/// The concrete type used to share the mail transport across the application state.
pub type MailerState = Arc<dyn Mailer>;
