use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::mailer::MailSender;
use super::templates::{EmailMessage, NotificationTemplates};
use crate::workflows::residency::{
    DomainEvent, EventCodecError, EventMessage, RegistrationEvent, StatusChangedEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The mail transport failed. The event still counts as processed.
    SendFailed,
}

/// Turns onboarding events into emails.
///
/// Delivery is best effort: a send failure is logged and reported through
/// [`DeliveryOutcome::SendFailed`] but never surfaced as an error, so the bus
/// does not redeliver because of it. A redelivered event renders the same
/// message and is sent again.
pub struct NotificationDispatcher<M> {
    mailer: Arc<M>,
    templates: NotificationTemplates,
}

impl<M> NotificationDispatcher<M>
where
    M: MailSender + 'static,
{
    pub fn new(mailer: Arc<M>, templates: NotificationTemplates) -> Self {
        Self { mailer, templates }
    }

    pub async fn on_registered(&self, event: &RegistrationEvent) -> DeliveryOutcome {
        let message = self.templates.registration(event);
        self.deliver(&message, "registration").await
    }

    pub async fn on_status_changed(&self, event: &StatusChangedEvent) -> DeliveryOutcome {
        let message = self.templates.status_change(event);
        self.deliver(&message, "status_change").await
    }

    pub async fn handle(&self, event: &DomainEvent) -> DeliveryOutcome {
        match event {
            DomainEvent::Registered(event) => self.on_registered(event).await,
            DomainEvent::StatusChanged(event) => self.on_status_changed(event).await,
        }
    }

    /// Decodes a bus message by topic and handles it.
    pub async fn dispatch(&self, message: &EventMessage) -> Result<DeliveryOutcome, EventCodecError> {
        let event = message.decode()?;
        Ok(self.handle(&event).await)
    }

    async fn deliver(&self, message: &EmailMessage, template: &'static str) -> DeliveryOutcome {
        match self.mailer.send(message).await {
            Ok(()) => {
                debug!(template, to = %message.to, "notification sent");
                DeliveryOutcome::Delivered
            }
            Err(err) => {
                warn!(template, to = %message.to, error = %err, "notification could not be sent");
                DeliveryOutcome::SendFailed
            }
        }
    }
}

/// Consumes bus messages until the channel closes. Undecodable messages are
/// logged and skipped.
pub async fn run_consumer<M>(
    dispatcher: Arc<NotificationDispatcher<M>>,
    mut receiver: mpsc::Receiver<EventMessage>,
) where
    M: MailSender + 'static,
{
    while let Some(message) = receiver.recv().await {
        if let Err(err) = dispatcher.dispatch(&message).await {
            warn!(
                topic = %message.topic,
                key = %message.key,
                error = %err,
                "skipping undecodable event"
            );
        }
    }
    info!("notification consumer stopped; event bus closed");
}
