//! Twilio backend implementation using the `2010-04-01` REST API.

use serde_json::Value;

use super::{
    decimal_field, expect_status, extract_message_id, parse_json_body, DeliveryReceipt,
    ProviderError, SmsProvider,
};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Twilio accepts a send with 201 Created; reads return 200.
const TWILIO_SEND_ACCEPTED: u16 = 201;
const TWILIO_READ_ACCEPTED: u16 = 200;

/// Twilio SMS provider.
///
/// Authenticates with HTTP basic auth (`account_sid`:`auth_token`). When no
/// sender id is configured, the account SID is used as the `From` value.
#[derive(Debug, Clone)]
pub struct TwilioProvider {
    account_sid: String,
    auth_token: String,
    sender_id: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl TwilioProvider {
    /// Create a new Twilio provider instance.
    pub fn new(account_sid: String, auth_token: String, sender_id: Option<String>) -> Self {
        Self {
            account_sid,
            auth_token,
            sender_id,
            base_url: TWILIO_API_BASE.to_owned(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base URL (for integration testing against a stub server).
    #[doc(hidden)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn sender(&self) -> &str {
        self.sender_id.as_deref().unwrap_or(&self.account_sid)
    }
}

#[async_trait::async_trait]
impl SmsProvider for TwilioProvider {
    async fn send(&self, recipient: &str, body: &str) -> Result<DeliveryReceipt, ProviderError> {
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        let form = [("To", recipient), ("Body", body), ("From", self.sender())];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let payload = expect_status(response, TWILIO_SEND_ACCEPTED).await?;
        let raw = parse_json_body(&payload)?;
        let provider_message_id =
            extract_message_id(&raw).ok_or(ProviderError::MissingMessageId)?;

        Ok(DeliveryReceipt {
            provider_message_id,
            raw,
        })
    }

    async fn balance(&self) -> Result<f64, ProviderError> {
        let url = format!(
            "{}/Accounts/{}/Balance.json",
            self.base_url, self.account_sid
        );
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        let payload = expect_status(response, TWILIO_READ_ACCEPTED).await?;
        let raw = parse_json_body(&payload)?;
        decimal_field(&raw, "balance")
            .ok_or_else(|| ProviderError::Parse("missing 'balance' field".to_owned()))
    }

    async fn delivery_status(&self, provider_message_id: &str) -> Result<Value, ProviderError> {
        let url = format!(
            "{}/Accounts/{}/Messages/{}.json",
            self.base_url, self.account_sid, provider_message_id
        );
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        let payload = expect_status(response, TWILIO_READ_ACCEPTED).await?;
        parse_json_body(&payload)
    }

    fn name(&self) -> &str {
        "twilio"
    }
}
