use super::domain::RegistrationRequest;

const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} cannot be blank")]
    Blank { field: &'static str },
    #[error("invalid email format: {0}")]
    InvalidEmail(String),
    #[error("password must be at least {min} characters long")]
    PasswordTooShort { min: usize },
}

/// Input policy applied before any lookup or write happens.
#[derive(Debug, Clone)]
pub struct RegistrationPolicy {
    min_password_length: usize,
}

impl RegistrationPolicy {
    pub fn new(min_password_length: usize) -> Self {
        Self {
            min_password_length: min_password_length.max(1),
        }
    }

    pub fn min_password_length(&self) -> usize {
        self.min_password_length
    }

    pub fn validate(&self, request: &RegistrationRequest) -> Result<(), ValidationError> {
        require("firstName", &request.first_name)?;
        require("lastName", &request.last_name)?;
        require("email", &request.email)?;
        require("password", &request.password)?;
        require("blockName", &request.block_name)?;
        require("apartmentNumber", &request.apartment_number)?;

        if !is_valid_email(&request.email) {
            return Err(ValidationError::InvalidEmail(request.email.clone()));
        }

        self.validate_password(&request.password)
    }

    pub fn validate_password(&self, password: &str) -> Result<(), ValidationError> {
        require("password", password)?;
        if password.chars().count() < self.min_password_length {
            return Err(ValidationError::PasswordTooShort {
                min: self.min_password_length,
            });
        }
        Ok(())
    }
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PASSWORD_LENGTH)
    }
}

impl From<&crate::config::RegistrationConfig> for RegistrationPolicy {
    fn from(config: &crate::config::RegistrationConfig) -> Self {
        Self::new(config.min_password_length)
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Blank { field })
    } else {
        Ok(())
    }
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain
            .split('.')
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::residency::domain::ApartmentId;

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: "john.doe@example.com".to_string(),
            password: "password123".to_string(),
            apartment_id: ApartmentId(1),
            block_name: "Block A".to_string(),
            apartment_number: "101".to_string(),
        }
    }

    #[test]
    fn accepts_complete_request() {
        RegistrationPolicy::default()
            .validate(&request())
            .expect("valid request");
    }

    #[test]
    fn blank_fields_are_named() {
        let mut blank_block = request();
        blank_block.block_name = "  ".to_string();
        assert_eq!(
            RegistrationPolicy::default().validate(&blank_block),
            Err(ValidationError::Blank { field: "blockName" })
        );
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for email in [
            "john.doe",
            "@example.com",
            "john@",
            "john@example",
            "john@@example.com",
            "john doe@example.com",
            "john@example..com",
        ] {
            let mut candidate = request();
            candidate.email = email.to_string();
            assert!(
                matches!(
                    RegistrationPolicy::default().validate(&candidate),
                    Err(ValidationError::InvalidEmail(_))
                ),
                "{email} should be rejected"
            );
        }
    }

    #[test]
    fn short_passwords_are_rejected() {
        let mut candidate = request();
        candidate.password = "short".to_string();
        assert_eq!(
            RegistrationPolicy::default().validate(&candidate),
            Err(ValidationError::PasswordTooShort { min: 8 })
        );
        RegistrationPolicy::new(4)
            .validate(&candidate)
            .expect("relaxed policy accepts");
    }
}
