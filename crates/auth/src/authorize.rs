use std::collections::HashSet;

use thiserror::Error;

use leadops_core::CoreError;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for CoreError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Forbidden(perm) => CoreError::forbidden(perm),
        }
    }
}

/// Authorize a principal within its site context.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadops_core::SiteId;

    fn principal_with(perms: Vec<Permission>) -> Principal {
        Principal::new(crate::PrincipalId::new(), SiteId::new(), perms)
    }

    #[test]
    fn explicit_permission_is_granted() {
        let p = principal_with(vec![Permission::leads_read()]);
        assert!(authorize(&p, &Permission::leads_read()).is_ok());
    }

    #[test]
    fn wildcard_grants_everything() {
        let p = principal_with(vec![Permission::new("*")]);
        assert!(authorize(&p, &Permission::leads_export()).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let p = principal_with(vec![Permission::leads_read()]);
        let err = authorize(&p, &Permission::leads_write()).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("leads.write".to_string()));

        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::Forbidden(_)));
    }
}
