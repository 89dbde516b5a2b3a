//! Plivo backend implementation using the `v1` REST API.

use serde_json::Value;

use super::{
    decimal_field, expect_status, extract_message_id, parse_json_body, DeliveryReceipt,
    ProviderError, SmsProvider,
};

const PLIVO_API_BASE: &str = "https://api.plivo.com/v1";

/// Plivo queues a send with 202 Accepted; reads return 200.
const PLIVO_SEND_ACCEPTED: u16 = 202;
const PLIVO_READ_ACCEPTED: u16 = 200;

/// Request body for the Plivo message endpoint.
#[derive(Debug, serde::Serialize)]
struct PlivoSendRequest<'a> {
    src: &'a str,
    dst: &'a str,
    text: &'a str,
}

/// Plivo SMS provider.
///
/// Authenticates with HTTP basic auth (`auth_id`:`auth_token`). When no sender
/// id is configured, the auth id is used as the `src` value.
#[derive(Debug, Clone)]
pub struct PlivoProvider {
    auth_id: String,
    auth_token: String,
    sender_id: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl PlivoProvider {
    /// Create a new Plivo provider instance.
    pub fn new(auth_id: String, auth_token: String, sender_id: Option<String>) -> Self {
        Self {
            auth_id,
            auth_token,
            sender_id,
            base_url: PLIVO_API_BASE.to_owned(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base URL (for integration testing against a stub server).
    #[doc(hidden)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn account_url(&self) -> String {
        format!("{}/Account/{}", self.base_url, self.auth_id)
    }

    fn sender(&self) -> &str {
        self.sender_id.as_deref().unwrap_or(&self.auth_id)
    }
}

#[async_trait::async_trait]
impl SmsProvider for PlivoProvider {
    async fn send(&self, recipient: &str, body: &str) -> Result<DeliveryReceipt, ProviderError> {
        let url = format!("{}/Message/", self.account_url());
        let request = PlivoSendRequest {
            src: self.sender(),
            dst: recipient,
            text: body,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.auth_id, Some(&self.auth_token))
            .json(&request)
            .send()
            .await?;

        let payload = expect_status(response, PLIVO_SEND_ACCEPTED).await?;
        let raw = parse_json_body(&payload)?;
        let provider_message_id =
            extract_message_id(&raw).ok_or(ProviderError::MissingMessageId)?;

        Ok(DeliveryReceipt {
            provider_message_id,
            raw,
        })
    }

    async fn balance(&self) -> Result<f64, ProviderError> {
        let url = format!("{}/", self.account_url());
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.auth_id, Some(&self.auth_token))
            .send()
            .await?;

        let payload = expect_status(response, PLIVO_READ_ACCEPTED).await?;
        let raw = parse_json_body(&payload)?;
        decimal_field(&raw, "cash_credits")
            .ok_or_else(|| ProviderError::Parse("missing 'cash_credits' field".to_owned()))
    }

    async fn delivery_status(&self, provider_message_id: &str) -> Result<Value, ProviderError> {
        let url = format!("{}/Message/{}/", self.account_url(), provider_message_id);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.auth_id, Some(&self.auth_token))
            .send()
            .await?;

        let payload = expect_status(response, PLIVO_READ_ACCEPTED).await?;
        parse_json_body(&payload)
    }

    fn name(&self) -> &str {
        "plivo"
    }
}
