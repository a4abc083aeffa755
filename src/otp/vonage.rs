use serde::{Deserialize, Serialize};

use super::DispatchError;
use crate::config::VonageConfig;

const SMS_URL: &str = "https://rest.nexmo.com/sms/json";
const MESSAGES_URL: &str = "https://api.nexmo.com/v1/messages";
const SANDBOX_MESSAGES_URL: &str = "https://messages-sandbox.nexmo.com/v1/messages";

/// Vonage SMS API for text messages, Messages API for WhatsApp.
pub struct VonageClient {
    client: reqwest::Client,
    cfg: VonageConfig,
}

#[derive(Serialize)]
struct SmsRequest<'a> {
    api_key: &'a str,
    api_secret: &'a str,
    from: &'a str,
    to: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SmsResponse {
    #[serde(default)]
    messages: Vec<SmsStatus>,
}

#[derive(Deserialize)]
struct SmsStatus {
    status: String,
    #[serde(rename = "error-text")]
    error_text: Option<String>,
}

#[derive(Serialize)]
struct WhatsappRequest<'a> {
    from: &'a str,
    to: &'a str,
    message_type: &'static str,
    text: &'a str,
    channel: &'static str,
}

#[derive(Deserialize)]
struct MessageAccepted {
    message_uuid: Option<String>,
}

fn strip_spaces(number: &str) -> String {
    number.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Sandbox numbers are bare digits.
pub(crate) fn sandbox_number(number: &str) -> String {
    strip_spaces(number).trim_start_matches('+').to_string()
}

/// Production WhatsApp recipients must be E.164: `+` then 6 to 15 digits.
/// Returns the digits as the Messages API expects them.
pub(crate) fn e164_digits(number: &str) -> Result<String, DispatchError> {
    let cleaned = strip_spaces(number);
    match cleaned.strip_prefix('+') {
        Some(digits)
            if (6..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) =>
        {
            Ok(digits.to_string())
        }
        _ => Err(DispatchError::InvalidRecipient(format!(
            "WhatsApp number must be in E.164 format (e.g. +919876543210), got {}",
            number
        ))),
    }
}

impl VonageClient {
    pub fn new(cfg: VonageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cfg,
        }
    }

    pub async fn send_sms(&self, to: &str, text: &str) -> Result<(), DispatchError> {
        let from = strip_spaces(&self.cfg.from_number);
        if from.is_empty() {
            return Err(DispatchError::NotConfigured("sms"));
        }
        let to = strip_spaces(to);

        let resp: SmsResponse = self
            .client
            .post(SMS_URL)
            .json(&SmsRequest {
                api_key: &self.cfg.api_key,
                api_secret: &self.cfg.api_secret,
                from: &from,
                to: &to,
                text,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match resp.messages.first() {
            Some(m) if m.status == "0" => {
                tracing::info!("SMS accepted by Vonage");
                Ok(())
            }
            Some(m) => Err(DispatchError::Provider(format!(
                "SMS status {}: {}",
                m.status,
                m.error_text.as_deref().unwrap_or("unknown error")
            ))),
            None => Err(DispatchError::Provider(
                "SMS response contained no messages".into(),
            )),
        }
    }

    pub async fn send_whatsapp(&self, to: &str, text: &str) -> Result<(), DispatchError> {
        let (url, from, to) = if self.cfg.sandbox_enabled {
            let from = self
                .cfg
                .sandbox_from_number
                .as_deref()
                .map(sandbox_number)
                .unwrap_or_default();
            (SANDBOX_MESSAGES_URL, from, sandbox_number(to))
        } else {
            let from = strip_spaces(&self.cfg.from_number)
                .trim_start_matches('+')
                .to_string();
            (MESSAGES_URL, from, e164_digits(to)?)
        };
        if from.is_empty() {
            return Err(DispatchError::NotConfigured("whatsapp"));
        }

        let resp = self
            .client
            .post(url)
            .basic_auth(&self.cfg.api_key, Some(&self.cfg.api_secret))
            .json(&WhatsappRequest {
                from: &from,
                to: &to,
                message_type: "text",
                text,
                channel: "whatsapp",
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Provider(format!(
                "WhatsApp status {}: {}",
                status, body
            )));
        }

        let accepted: MessageAccepted = resp.json().await?;
        tracing::info!(
            "WhatsApp message accepted: {}",
            accepted.message_uuid.as_deref().unwrap_or("-")
        );
        Ok(())
    }
}
