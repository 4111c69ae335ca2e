use crate::error::AppError;
use crate::twilio_types::CallResource;

use std::collections::HashMap;
use tracing::{debug, error, info};

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01";

/// Twilio REST client, built once at startup from configuration.
pub struct TwilioClient {
    http_client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    /// Our Twilio number; outbound calls need it as the caller id
    phone_number: Option<String>,
}

impl TwilioClient {
    pub fn new(
        http_client: reqwest::Client,
        account_sid: String,
        auth_token: String,
        phone_number: Option<String>,
    ) -> Self {
        Self {
            http_client,
            account_sid,
            auth_token,
            phone_number,
        }
    }

    /// Ask Twilio to dial `to`; once answered it fetches `callback_url` for TwiML
    /// and reports the end of the call to `status_url`. Returns the new call's SID.
    pub async fn place_call(
        &self,
        to: &str,
        callback_url: &str,
        status_url: &str,
    ) -> Result<String, AppError> {
        let from = self
            .phone_number
            .as_deref()
            .ok_or(AppError::ConfigurationMissing("Twilio phone number not configured."))?;

        let account_sid = &self.account_sid;
        let url = format!("{TWILIO_API}/Accounts/{account_sid}/Calls.json");
        let mut form = HashMap::new();
        form.insert("To", to);
        form.insert("From", from);
        form.insert("Url", callback_url);
        form.insert("StatusCallback", status_url);

        let resp = self
            .http_client
            .post(url)
            .basic_auth(account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to send call request to twilio");
                AppError::Telephony("request failed".to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!(status=%status, body=%body, "twilio rejected call request");
            return Err(AppError::Telephony(format!("twilio answered {status}")));
        }

        let call = resp.json::<CallResource>().await.map_err(|e| {
            error!(error=%e, "failed to deserialize twilio call resource");
            AppError::Telephony("unexpected response".to_string())
        })?;
        info!(call_sid=%call.sid, status=?call.status, to, "outbound call placed");
        Ok(call.sid)
    }
}
