pub mod email;
pub mod webhook;

use std::sync::Arc;

use crate::{ChannelTarget, NotificationChannel};
use email::{EmailChannel, Mailer};
use webhook::WebhookChannel;

/// Builds the channel that delivers to a given target.
///
/// The dispatcher asks the factory once per target per alert, so factories
/// should share expensive state (SMTP pools, HTTP clients) across calls.
pub trait ChannelFactory: Send + Sync {
    fn create_channel(&self, target: &ChannelTarget) -> Box<dyn NotificationChannel>;
}

/// Production factory: lettre for email, reqwest for webhooks.
pub struct DeliveryFactory {
    mailer: Arc<Mailer>,
    http: reqwest::Client,
}

impl DeliveryFactory {
    pub fn new(mailer: Mailer) -> Self {
        Self {
            mailer: Arc::new(mailer),
            http: reqwest::Client::new(),
        }
    }
}

impl ChannelFactory for DeliveryFactory {
    fn create_channel(&self, target: &ChannelTarget) -> Box<dyn NotificationChannel> {
        match target {
            ChannelTarget::Email { address } => {
                Box::new(EmailChannel::new(self.mailer.clone(), address))
            }
            ChannelTarget::Webhook { url } => Box::new(WebhookChannel::new(self.http.clone(), url)),
        }
    }
}
