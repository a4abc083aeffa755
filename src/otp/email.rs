use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::DispatchError;
use crate::config::SmtpConfig;

pub struct EmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailSender {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = match (&cfg.username, &cfg.password) {
            (Some(user), Some(pass)) => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
                    .port(cfg.port)
                    .credentials(Credentials::new(user.clone(), pass.clone()))
                    .build()
            }
            // Unauthenticated relay, e.g. a local MTA or a dev mail catcher.
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host)
                .port(cfg.port)
                .build(),
        };
        let from = cfg.from.parse()?;
        Ok(Self { transport, from })
    }

    pub async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), DispatchError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| DispatchError::InvalidRecipient(format!("Invalid email address: {}", e)))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| DispatchError::Provider(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| DispatchError::Provider(e.to_string()))?;
        Ok(())
    }
}
