use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Roles the workflow itself depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownRole {
    /// Assigned at registration, before any administrative decision.
    Pending,
    Resident,
    Admin,
}

impl WellKnownRole {
    pub const ALL: [WellKnownRole; 3] = [
        WellKnownRole::Pending,
        WellKnownRole::Resident,
        WellKnownRole::Admin,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            WellKnownRole::Pending => "pending",
            WellKnownRole::Resident => "resident",
            WellKnownRole::Admin => "admin",
        }
    }
}

/// Named permission bucket referenced by a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role {
    name: String,
}

impl Role {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl From<WellKnownRole> for Role {
    fn from(value: WellKnownRole) -> Self {
        Self {
            name: value.name().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    #[error("role '{0}' is not configured; add it to APP_ROLES")]
    NotConfigured(&'static str),
}

/// Catalogue of role names known to the deployment.
///
/// Built once from configuration. [`RoleRegistry::require_well_known`] is
/// checked at startup so request handling never discovers a missing default
/// role; lookups during a request are plain set membership.
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    names: BTreeSet<String>,
}

impl RoleRegistry {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }

    /// Registry containing exactly the well-known roles.
    pub fn standard() -> Self {
        Self::from_names(WellKnownRole::ALL.iter().map(|role| role.name()))
    }

    pub fn require_well_known(&self) -> Result<(), RoleError> {
        for role in WellKnownRole::ALL {
            self.well_known(role)?;
        }
        Ok(())
    }

    pub fn well_known(&self, role: WellKnownRole) -> Result<Role, RoleError> {
        if self.names.contains(role.name()) {
            Ok(Role::from(role))
        } else {
            Err(RoleError::NotConfigured(role.name()))
        }
    }

    pub fn pending(&self) -> Result<Role, RoleError> {
        self.well_known(WellKnownRole::Pending)
    }

    /// Case-insensitive lookup of a free-form role name.
    pub fn resolve(&self, name: &str) -> Option<Role> {
        let normalized = name.trim().to_ascii_lowercase();
        self.names
            .contains(&normalized)
            .then_some(Role { name: normalized })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
