//! Report delivery by email.
//!
//! All delivery parameters come from the environment (optionally via a
//! dotenv file loaded at startup). They are validated only when a send is
//! actually requested; a misconfigured mailer never affects the audit
//! itself.

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::NotifyError;

const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 465;

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub sender: String,
    pub recipients: Vec<String>,
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
}

impl EmailSettings {
    pub fn from_env() -> Result<Self, NotifyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from a lookup function (the environment in
    /// production, a map in tests).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, NotifyError> {
        let get_non_empty = |key: &str| get(key).filter(|v| !v.is_empty());

        let sender = get_non_empty("EMAIL_SENDER").ok_or(NotifyError::MissingSetting {
            what: "sender email",
            var: "EMAIL_SENDER",
        })?;

        let recipients: Vec<String> = get_non_empty("EMAIL_RECIPIENTS")
            .map(|value| {
                value
                    .split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if recipients.is_empty() {
            return Err(NotifyError::MissingSetting {
                what: "recipient emails",
                var: "EMAIL_RECIPIENTS",
            });
        }

        let username = get_non_empty("SMTP_USERNAME").unwrap_or_else(|| sender.clone());
        let password = get_non_empty("SMTP_PASSWORD").ok_or(NotifyError::MissingSetting {
            what: "SMTP password",
            var: "SMTP_PASSWORD",
        })?;

        let server = get_non_empty("SMTP_SERVER").unwrap_or_else(|| DEFAULT_SMTP_SERVER.into());
        let port = match get_non_empty("SMTP_PORT") {
            Some(value) => value.parse().map_err(|_| NotifyError::InvalidPort)?,
            None => DEFAULT_SMTP_PORT,
        };
        let use_tls = match get_non_empty("SMTP_USE_SSL") {
            Some(value) => !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no"),
            None => true,
        };

        Ok(Self {
            sender,
            recipients,
            username,
            password,
            server,
            port,
            use_tls,
        })
    }
}

pub async fn send_report(
    settings: &EmailSettings,
    subject: &str,
    body: &str,
) -> Result<(), NotifyError> {
    let mut builder = Message::builder()
        .from(settings.sender.parse::<Mailbox>()?)
        .subject(subject);
    for recipient in &settings.recipients {
        builder = builder.to(recipient.parse::<Mailbox>()?);
    }
    let message = builder.body(body.to_string())?;

    let credentials = Credentials::new(settings.username.clone(), settings.password.clone());
    let transport = if settings.use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)?
            .port(settings.port)
            .credentials(credentials)
            .build()
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.server)
            .port(settings.port)
            .credentials(credentials)
            .build()
    };

    transport.send(message).await?;
    tracing::info!(
        "sent report to {} recipient(s) via {}",
        settings.recipients.len(),
        settings.server
    );
    Ok(())
}
