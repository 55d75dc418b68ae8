use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "leads.read"). A special
/// wildcard permission `"*"` can be used by policy layers to indicate "allow
/// all" without hardcoding domain permissions into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Read access to leads, notes and events.
    pub fn leads_read() -> Self {
        Self::new("leads.read")
    }

    /// Status changes and note creation.
    pub fn leads_write() -> Self {
        Self::new("leads.write")
    }

    /// Enqueueing and polling export jobs.
    pub fn leads_export() -> Self {
        Self::new("leads.export")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
