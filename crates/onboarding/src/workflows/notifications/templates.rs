use crate::config::NotificationConfig;
use crate::workflows::residency::{RegistrationEvent, StatusChangedEvent};

pub const DEFAULT_APARTMENT_CONTACT: &str = "apartment.contact@example.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Fixed plain-text templates. Rendering is a pure function of the event.
#[derive(Debug, Clone)]
pub struct NotificationTemplates {
    apartment_contact: String,
}

impl NotificationTemplates {
    pub fn new(apartment_contact: impl Into<String>) -> Self {
        Self {
            apartment_contact: apartment_contact.into(),
        }
    }

    pub fn apartment_contact(&self) -> &str {
        &self.apartment_contact
    }

    /// Review request sent to the apartment contact.
    pub fn registration(&self, event: &RegistrationEvent) -> EmailMessage {
        EmailMessage {
            to: self.apartment_contact.clone(),
            subject: "New User Registration for Apartment Approval".to_string(),
            body: format!(
                "A new user has registered for apartment {}, block {}, apartment number {}.\n\
                 User Details: {} {} ({}).\n\
                 Please review and approve/reject their registration.",
                event.apartment_id,
                event.block_name,
                event.apartment_number,
                event.first_name,
                event.last_name,
                event.email,
            ),
        }
    }

    /// Decision notice sent to the registrant.
    pub fn status_change(&self, event: &StatusChangedEvent) -> EmailMessage {
        EmailMessage {
            to: event.email.clone(),
            subject: format!(
                "Your Registration Status for Apartment {} has Changed",
                event.apartment_id
            ),
            body: format!(
                "Dear {} {},\n\n\
                 Your registration for apartment {}, block {}, apartment number {} has been updated.\n\
                 New Status: {}.\n\
                 New Role: {}.\n\n\
                 Thank you.",
                event.first_name,
                event.last_name,
                event.apartment_id,
                event.block_name,
                event.apartment_number,
                event.new_status,
                event.new_role_name,
            ),
        }
    }
}

impl Default for NotificationTemplates {
    fn default() -> Self {
        Self::new(DEFAULT_APARTMENT_CONTACT)
    }
}

impl From<&NotificationConfig> for NotificationTemplates {
    fn from(config: &NotificationConfig) -> Self {
        Self::new(config.apartment_contact.clone())
    }
}
