use crate::engine::DialogEngine;
use crate::telephony::TwilioClient;

/// Everything a request handler needs, constructed once in `main`.
pub struct AppState {
    pub engine: DialogEngine,
    /// Absent when Twilio credentials are not configured
    pub telephony: Option<TwilioClient>,
    /// Absolute base for callback URLs handed to Twilio; falls back to the Host header
    pub public_base_url: Option<String>,
}
