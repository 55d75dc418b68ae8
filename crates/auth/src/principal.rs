use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use leadops_core::{SiteId, UserId};

use crate::Permission;

/// Identity of an authenticated principal (human user, service account, etc).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A fully resolved principal, scoped to one site.
///
/// Construction is intentionally decoupled from storage and transport: the
/// caller derives this from its own auth mechanism and hands it to the
/// services. The `site_id` here is the tenancy scope every operation runs
/// under — it is not an input the request body can override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: PrincipalId,
    pub site_id: SiteId,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(subject: PrincipalId, site_id: SiteId, permissions: Vec<Permission>) -> Self {
        Self {
            subject,
            site_id,
            permissions,
        }
    }

    /// The subject as an actor id for audit rows.
    pub fn actor_id(&self) -> UserId {
        UserId::from_uuid(*self.subject.as_uuid())
    }
}
