//! `leadops-auth` — the authorization boundary the engine *consumes*.
//!
//! Token verification, session handling and role resolution live outside this
//! system. Whatever sits in front (an HTTP shell, a worker bootstrap) resolves
//! the request into a [`Principal`]; the services here only check it.

pub mod authorize;
pub mod permissions;
pub mod principal;

pub use authorize::{authorize, AuthzError};
pub use permissions::Permission;
pub use principal::{Principal, PrincipalId};
