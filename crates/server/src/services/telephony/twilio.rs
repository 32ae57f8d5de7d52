//! Twilio Programmable Voice client.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use voice_confirm_core::PhoneNumber;

use super::{CallPlacement, ProviderCallStatus, Telephony, TelephonyError};
use crate::config::TwilioConfig;

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    status: String,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// REST client for `api.twilio.com/2010-04-01`.
#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: SecretString,
    from_number: String,
    api_base: String,
    /// Public URL of our `/api` prefix, used for TwiML and status callbacks
    callback_base: String,
}

impl TwilioClient {
    #[must_use]
    pub fn new(config: &TwilioConfig, callback_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            callback_base: callback_base.into(),
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls",
            self.api_base, self.account_sid
        )
    }

    fn voice_url(&self, endpoint: &str, order_number: &str) -> String {
        format!(
            "{}/voice/{endpoint}/{}",
            self.callback_base,
            urlencoding::encode(order_number)
        )
    }

    async fn api_error(response: reqwest::Response) -> TelephonyError {
        let status = response.status().as_u16();
        let message = response
            .json::<ApiErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| "Unknown error".to_string());
        TelephonyError::Api { status, message }
    }

    async fn create_call(
        &self,
        to: &PhoneNumber,
        order_number: &str,
    ) -> Result<CallResource, TelephonyError> {
        let welcome = self.voice_url("welcome", order_number);
        let status_callback = self.voice_url("status", order_number);
        let params = [
            ("To", to.as_str()),
            ("From", self.from_number.as_str()),
            ("Url", welcome.as_str()),
            ("Method", "POST"),
            ("StatusCallback", status_callback.as_str()),
            ("StatusCallbackMethod", "POST"),
        ];

        let response = self
            .http
            .post(format!("{}.json", self.calls_url()))
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(serde_json::from_str(&response.text().await?)?)
    }
}

#[async_trait]
impl Telephony for TwilioClient {
    #[instrument(skip(self, to))]
    async fn place_call(&self, to: &PhoneNumber, order_number: &str) -> CallPlacement {
        match self.create_call(to, order_number).await {
            Ok(call) => {
                debug!(call_sid = %call.sid, status = %call.status, "Call placed");
                CallPlacement::placed(call.sid, call.status)
            }
            Err(e) => {
                warn!(error = %e, "Call placement failed");
                CallPlacement::failed(e.to_string())
            }
        }
    }

    #[instrument(skip(self))]
    async fn fetch_call_status(
        &self,
        call_sid: &str,
    ) -> Result<ProviderCallStatus, TelephonyError> {
        let response = self
            .http
            .get(format!(
                "{}/{}.json",
                self.calls_url(),
                urlencoding::encode(call_sid)
            ))
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(TelephonyError::NotFound);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let call: CallResource = serde_json::from_str(&response.text().await?)?;
        Ok(ProviderCallStatus {
            call_sid: call.sid,
            status: call.status,
            duration: call.duration.and_then(|d| d.parse().ok()),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TwilioClient {
        TwilioClient::new(
            &TwilioConfig {
                account_sid: "AC123".to_string(),
                auth_token: SecretString::from("token"),
                from_number: "+15005550006".to_string(),
                support_number: "+923000000000".to_string(),
                validate_signatures: true,
                api_base: "https://api.twilio.com/".to_string(),
            },
            "https://app.example.com/api",
        )
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(
            client.calls_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls"
        );
        assert_eq!(
            client.voice_url("welcome", "1001"),
            "https://app.example.com/api/voice/welcome/1001"
        );
        assert_eq!(
            client.voice_url("status", "A 7"),
            "https://app.example.com/api/voice/status/A%207"
        );
    }
}
