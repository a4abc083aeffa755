use async_trait::async_trait;

use super::email::EmailSender;
use super::vonage::VonageClient;
use super::{message_text, Channel, DispatchError, OtpSender};
use crate::config::OtpConfig;

/// Routes codes to the provider for each channel.
pub struct Dispatcher {
    email: Option<EmailSender>,
    vonage: Option<VonageClient>,
    log_only: bool,
    ttl_secs: i64,
}

impl Dispatcher {
    pub fn from_config(cfg: &OtpConfig) -> anyhow::Result<Self> {
        let email = cfg.smtp.as_ref().map(EmailSender::new).transpose()?;
        let vonage = cfg.vonage.clone().map(VonageClient::new);

        if cfg.log_only {
            tracing::warn!("OTP log_only is on; codes are logged, not delivered");
        } else {
            if email.is_none() {
                tracing::warn!("No SMTP settings; email OTPs are disabled");
            }
            if vonage.is_none() {
                tracing::warn!("No Vonage settings; SMS and WhatsApp OTPs are disabled");
            }
        }

        Ok(Self {
            email,
            vonage,
            log_only: cfg.log_only,
            ttl_secs: cfg.ttl_secs,
        })
    }
}

#[async_trait]
impl OtpSender for Dispatcher {
    async fn send(&self, channel: Channel, recipient: &str, code: &str) -> Result<(), DispatchError> {
        if self.log_only {
            tracing::info!("OTP for {} via {}: {}", recipient, channel, code);
            return Ok(());
        }

        let text = message_text(channel, code, self.ttl_secs);
        match channel {
            Channel::Email => {
                let sender = self
                    .email
                    .as_ref()
                    .ok_or(DispatchError::NotConfigured("email"))?;
                sender.send(recipient, "Your OTP Code", text).await?;
            }
            Channel::Sms => {
                let vonage = self
                    .vonage
                    .as_ref()
                    .ok_or(DispatchError::NotConfigured("sms"))?;
                vonage.send_sms(recipient, &text).await?;
            }
            Channel::Whatsapp => {
                let vonage = self
                    .vonage
                    .as_ref()
                    .ok_or(DispatchError::NotConfigured("whatsapp"))?;
                vonage.send_whatsapp(recipient, &text).await?;
            }
        }

        tracing::info!("OTP sent via {}", channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_only_never_needs_a_provider() {
        let dispatcher = Dispatcher::from_config(&OtpConfig {
            log_only: true,
            ..Default::default()
        })
        .unwrap();
        for channel in [Channel::Email, Channel::Sms, Channel::Whatsapp] {
            dispatcher.send(channel, "someone", "123456").await.unwrap();
        }
    }

    #[tokio::test]
    async fn missing_provider_is_reported_per_channel() {
        let dispatcher = Dispatcher::from_config(&OtpConfig::default()).unwrap();
        let err = dispatcher
            .send(Channel::Email, "a@example.com", "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotConfigured("email")));
        let err = dispatcher
            .send(Channel::Whatsapp, "+919876543210", "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotConfigured("whatsapp")));
    }
}
