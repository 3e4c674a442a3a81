use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::user::Role;
use uuid::Uuid;

/// Capability value resolved once per request from the caller's credentials
/// and passed to every scoped finder. Selecting the scope in one place keeps
/// the per-operation role dispatch out of the services entirely: a store
/// method either sees Admin (unrestricted), Instructor (ownership chain up to
/// `assessments.created_by`), or Student (active enrollment in the owning
/// class).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    Admin,
    Instructor(Uuid),
    Student(Uuid),
}

impl AccessScope {
    /// The first entry of the roles claim is the primary role. Unknown or
    /// absent roles are Forbidden; a malformed subject never reaches storage.
    pub fn from_claims(claims: &Claims) -> Result<AccessScope> {
        let caller: Uuid = claims
            .sub
            .parse()
            .map_err(|_| Error::Unauthorized("malformed subject claim".to_string()))?;
        let primary = claims
            .roles
            .first()
            .ok_or_else(|| Error::Forbidden("no role claim".to_string()))?;
        match Role::parse(primary) {
            Some(Role::Admin) => Ok(AccessScope::Admin),
            Some(Role::Instructor) => Ok(AccessScope::Instructor(caller)),
            Some(Role::Student) => Ok(AccessScope::Student(caller)),
            None => Err(Error::Forbidden(format!("unsupported role '{}'", primary))),
        }
    }

    pub fn is_student(&self) -> bool {
        matches!(self, AccessScope::Student(_))
    }
}
