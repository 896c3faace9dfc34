//! Email notifications driven by onboarding events.

mod dispatcher;
mod mailer;
mod templates;

pub use dispatcher::{run_consumer, DeliveryOutcome, NotificationDispatcher};
pub use mailer::{MailError, MailSender};
pub use templates::{EmailMessage, NotificationTemplates, DEFAULT_APARTMENT_CONTACT};
