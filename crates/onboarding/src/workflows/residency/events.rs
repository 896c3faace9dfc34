use serde::{Deserialize, Serialize};

use super::domain::{ApartmentId, User, UserId, UserStatus};

pub const REGISTRATION_TOPIC: &str = "user-registered-events";
pub const STATUS_CHANGED_TOPIC: &str = "user-status-changed-events";

/// Emitted once per committed registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationEvent {
    pub user_id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub apartment_id: ApartmentId,
    pub block_name: String,
    pub apartment_number: String,
    pub status: UserStatus,
    pub role_name: String,
}

impl RegistrationEvent {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            apartment_id: user.apartment_id,
            block_name: user.block_name.clone(),
            apartment_number: user.apartment_number.clone(),
            status: user.status,
            role_name: user.role.name().to_string(),
        }
    }
}

/// Emitted once per committed status transition, carrying both sides of the
/// change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangedEvent {
    pub user_id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub old_status: UserStatus,
    pub new_status: UserStatus,
    pub old_role_name: String,
    pub new_role_name: String,
    pub apartment_id: ApartmentId,
    pub block_name: String,
    pub apartment_number: String,
}

impl StatusChangedEvent {
    /// Builds the event from the already-updated user and the values captured
    /// before the change.
    pub fn from_transition(updated: &User, old_status: UserStatus, old_role_name: &str) -> Self {
        Self {
            user_id: updated.id,
            email: updated.email.clone(),
            first_name: updated.first_name.clone(),
            last_name: updated.last_name.clone(),
            old_status,
            new_status: updated.status,
            old_role_name: old_role_name.to_string(),
            new_role_name: updated.role.name().to_string(),
            apartment_id: updated.apartment_id,
            block_name: updated.block_name.clone(),
            apartment_number: updated.apartment_number.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Registered(RegistrationEvent),
    StatusChanged(StatusChangedEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::Registered(_) => REGISTRATION_TOPIC,
            DomainEvent::StatusChanged(_) => STATUS_CHANGED_TOPIC,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            DomainEvent::Registered(event) => event.user_id,
            DomainEvent::StatusChanged(event) => event.user_id,
        }
    }

    /// Partition key on the bus.
    pub fn key(&self) -> String {
        self.user_id().to_string()
    }
}

impl From<RegistrationEvent> for DomainEvent {
    fn from(event: RegistrationEvent) -> Self {
        DomainEvent::Registered(event)
    }
}

impl From<StatusChangedEvent> for DomainEvent {
    fn from(event: StatusChangedEvent) -> Self {
        DomainEvent::StatusChanged(event)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventCodecError {
    #[error("no event schema registered for topic '{0}'")]
    UnknownTopic(String),
    #[error("malformed event payload on topic '{topic}': {source}")]
    Payload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Wire form of an event as it travels over the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

impl EventMessage {
    pub fn encode(event: &DomainEvent) -> Result<Self, EventCodecError> {
        let topic = event.topic();
        let payload = match event {
            DomainEvent::Registered(inner) => serde_json::to_string(inner),
            DomainEvent::StatusChanged(inner) => serde_json::to_string(inner),
        }
        .map_err(|source| EventCodecError::Payload {
            topic: topic.to_string(),
            source,
        })?;

        Ok(Self {
            topic: topic.to_string(),
            key: event.key(),
            payload,
        })
    }

    pub fn decode(&self) -> Result<DomainEvent, EventCodecError> {
        let payload_error = |source| EventCodecError::Payload {
            topic: self.topic.clone(),
            source,
        };

        match self.topic.as_str() {
            REGISTRATION_TOPIC => serde_json::from_str::<RegistrationEvent>(&self.payload)
                .map(DomainEvent::from)
                .map_err(payload_error),
            STATUS_CHANGED_TOPIC => serde_json::from_str::<StatusChangedEvent>(&self.payload)
                .map(DomainEvent::from)
                .map_err(payload_error),
            other => Err(EventCodecError::UnknownTopic(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn registration() -> RegistrationEvent {
        RegistrationEvent {
            user_id: UserId(Uuid::nil()),
            email: "john.doe@example.com".to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            apartment_id: ApartmentId(1),
            block_name: "Block A".to_string(),
            apartment_number: "101".to_string(),
            status: UserStatus::PendingApproval,
            role_name: "pending".to_string(),
        }
    }

    #[test]
    fn registration_payload_uses_camel_case_field_names() {
        let message = EventMessage::encode(&registration().into()).expect("encodes");
        assert_eq!(message.topic, REGISTRATION_TOPIC);
        assert_eq!(message.key, Uuid::nil().to_string());

        let payload: Value = serde_json::from_str(&message.payload).expect("json");
        assert_eq!(
            payload,
            json!({
                "userId": Uuid::nil().to_string(),
                "email": "john.doe@example.com",
                "firstName": "John",
                "lastName": "Doe",
                "apartmentId": 1,
                "blockName": "Block A",
                "apartmentNumber": "101",
                "status": "PENDING_APPROVAL",
                "roleName": "pending",
            })
        );
    }

    #[test]
    fn status_change_payload_carries_both_sides() {
        let event = StatusChangedEvent {
            user_id: UserId(Uuid::nil()),
            email: "john.doe@example.com".to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            old_status: UserStatus::PendingApproval,
            new_status: UserStatus::Approved,
            old_role_name: "pending".to_string(),
            new_role_name: "resident".to_string(),
            apartment_id: ApartmentId(1),
            block_name: "Block A".to_string(),
            apartment_number: "101".to_string(),
        };
        let message = EventMessage::encode(&event.clone().into()).expect("encodes");
        assert_eq!(message.topic, STATUS_CHANGED_TOPIC);

        let payload: Value = serde_json::from_str(&message.payload).expect("json");
        assert_eq!(payload["oldStatus"], "PENDING_APPROVAL");
        assert_eq!(payload["newStatus"], "APPROVED");
        assert_eq!(payload["newRoleName"], "resident");

        assert_eq!(message.decode().expect("decodes"), DomainEvent::StatusChanged(event));
    }

    #[test]
    fn decode_rejects_unknown_topics_and_bad_payloads() {
        let unknown = EventMessage {
            topic: "apartment-events".to_string(),
            key: "k".to_string(),
            payload: "{}".to_string(),
        };
        assert!(matches!(
            unknown.decode(),
            Err(EventCodecError::UnknownTopic(topic)) if topic == "apartment-events"
        ));

        let garbled = EventMessage {
            topic: REGISTRATION_TOPIC.to_string(),
            key: "k".to_string(),
            payload: "{\"userId\":".to_string(),
        };
        assert!(matches!(garbled.decode(), Err(EventCodecError::Payload { .. })));
    }
}
