use crate::error::{NotifyError, Result};
use crate::{NotificationChannel, TrackingSnapshot};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// SMTP relay settings, usually read from the `[email]` config table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// How emails leave the process.
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    /// No SMTP relay configured: messages are logged instead of sent.
    Log,
}

impl Mailer {
    pub fn smtp(settings: &SmtpSettings) -> Result<Self> {
        let from = parse_mailbox(&settings.from)?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
            .map_err(|e| NotifyError::InvalidConfig(format!("smtp_host: {e}")))?
            .port(settings.smtp_port);

        if let (Some(user), Some(pass)) = (&settings.smtp_username, &settings.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Mailer::Smtp {
            transport: builder.build(),
            from,
        })
    }

    /// SMTP when settings are present, log-only otherwise.
    pub fn from_settings(settings: Option<&SmtpSettings>) -> Result<Self> {
        match settings {
            Some(settings) => Self::smtp(settings),
            None => Ok(Mailer::Log),
        }
    }

    async fn deliver(&self, to: &str, subject: &str, body: String) -> Result<()> {
        match self {
            Mailer::Smtp { transport, from } => {
                let email = Message::builder()
                    .from(from.clone())
                    .to(parse_mailbox(to)?)
                    .subject(subject)
                    .header(ContentType::TEXT_PLAIN)
                    .body(body)
                    .map_err(|e| NotifyError::Other(format!("failed to build email: {e}")))?;
                transport
                    .send(email)
                    .await
                    .map_err(|e| NotifyError::SmtpError(e.to_string()))?;
                Ok(())
            }
            Mailer::Log => {
                tracing::info!(to, subject, body = %body, "Email (no SMTP relay configured)");
                Ok(())
            }
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address.parse().map_err(|e: lettre::address::AddressError| {
        NotifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        }
    })
}

pub struct EmailChannel {
    mailer: Arc<Mailer>,
    to: String,
}

impl EmailChannel {
    pub fn new(mailer: Arc<Mailer>, to: &str) -> Self {
        Self {
            mailer,
            to: to.to_string(),
        }
    }

    fn format_body(snapshot: &TrackingSnapshot, headline: &str) -> String {
        let expires = snapshot
            .expires
            .map(|e| e.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let error_line = if snapshot.error.is_empty() {
            String::new()
        } else {
            format!("\nError: {}", snapshot.error)
        };
        format!(
            "{headline}\nDomain: {domain}\nStatus: {status}\nExpires: {expires}{error_line}",
            domain = snapshot.domain_name,
            status = snapshot.status,
        )
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send_status(&self, snapshot: &TrackingSnapshot) -> Result<()> {
        let subject = format!(
            "[certpulse][{}] {}",
            snapshot.status, snapshot.domain_name
        );
        let body = Self::format_body(snapshot, &snapshot.status_message());
        self.mailer.deliver(&self.to, &subject, body).await
    }

    async fn send_expiry(&self, snapshot: &TrackingSnapshot) -> Result<()> {
        let subject = format!("[certpulse][expiring] {}", snapshot.domain_name);
        let body = Self::format_body(snapshot, &snapshot.expiry_message());
        self.mailer.deliver(&self.to, &subject, body).await
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
