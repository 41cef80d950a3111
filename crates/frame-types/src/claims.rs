//! # Authentication Claims
//!
//! The caller identity that travels with a message. Claims are flattened into
//! message metadata under fixed key names on publish and rebuilt from whatever
//! subset of those keys is present on receive.
//!
//! ## Metadata Layout
//!
//! | Key | Field |
//! |-----|-------|
//! | `tenant_id` | `tenant_id` |
//! | `partition_id` | `partition_id` |
//! | `profile_id` | `profile_id` |
//! | `access_id` | `access_id` |
//! | `roles` | `roles`, as a JSON array of strings |
//! | `claims.<name>` | one entry of `extra` |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::message::Metadata;

/// Identity claims of the authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationClaims {
    pub tenant_id: String,
    pub partition_id: String,
    pub profile_id: String,
    pub access_id: String,
    pub roles: Vec<String>,
    /// Caller-added fields, propagated under the `claims.` prefix.
    pub extra: BTreeMap<String, String>,
}

impl AuthenticationClaims {
    pub const TENANT_ID_KEY: &'static str = "tenant_id";
    pub const PARTITION_ID_KEY: &'static str = "partition_id";
    pub const PROFILE_ID_KEY: &'static str = "profile_id";
    pub const ACCESS_ID_KEY: &'static str = "access_id";
    pub const ROLES_KEY: &'static str = "roles";
    pub const EXTRA_PREFIX: &'static str = "claims.";

    /// Create claims for the four core identifiers.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        partition_id: impl Into<String>,
        profile_id: impl Into<String>,
        access_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            partition_id: partition_id.into(),
            profile_id: profile_id.into(),
            access_id: access_id.into(),
            ..Self::default()
        }
    }

    /// Add a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add a caller-defined field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Flatten into metadata entries. Empty fields are omitted.
    #[must_use]
    pub fn as_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        let core = [
            (Self::TENANT_ID_KEY, &self.tenant_id),
            (Self::PARTITION_ID_KEY, &self.partition_id),
            (Self::PROFILE_ID_KEY, &self.profile_id),
            (Self::ACCESS_ID_KEY, &self.access_id),
        ];
        for (key, value) in core {
            if !value.is_empty() {
                metadata.insert(key.to_string(), value.clone());
            }
        }

        if !self.roles.is_empty() {
            metadata.insert(Self::ROLES_KEY.to_string(), encode_roles(&self.roles));
        }

        for (key, value) in &self.extra {
            metadata.insert(format!("{}{}", Self::EXTRA_PREFIX, key), value.clone());
        }

        metadata
    }

    /// Rebuild claims from metadata.
    ///
    /// Returns `None` when none of the claim keys are present. Keys that do
    /// not belong to the claims layout are ignored.
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        let mut claims = Self::default();
        let mut found = false;

        for (key, value) in metadata {
            match key.as_str() {
                Self::TENANT_ID_KEY => claims.tenant_id = value.clone(),
                Self::PARTITION_ID_KEY => claims.partition_id = value.clone(),
                Self::PROFILE_ID_KEY => claims.profile_id = value.clone(),
                Self::ACCESS_ID_KEY => claims.access_id = value.clone(),
                Self::ROLES_KEY => claims.roles = decode_roles(value),
                other => match other.strip_prefix(Self::EXTRA_PREFIX) {
                    Some(name) if !name.is_empty() => {
                        claims.extra.insert(name.to_string(), value.clone());
                    }
                    _ => continue,
                },
            }
            found = true;
        }

        found.then_some(claims)
    }
}

fn encode_roles(roles: &[String]) -> String {
    serde_json::to_string(roles).unwrap_or_default()
}

/// Producers that do not write a JSON array are read as a comma list.
fn decode_roles(value: &str) -> Vec<String> {
    serde_json::from_str(value).unwrap_or_else(|_| {
        value
            .split(',')
            .filter(|role| !role.is_empty())
            .map(str::to_string)
            .collect()
    })
}
