//! Per-resource access policy tables.
//!
//! Each resource carries an [`AccessPolicy`]: a table from [`Operation`] to
//! the [`Capability`] a caller must hold. Policies are evaluated before any
//! data access; a failed check short-circuits the request with 401/403 and
//! no side effects.

use std::collections::HashMap;

use crate::{
    api::models::users::CurrentUser,
    errors::Error,
    types::{Capability, Operation, UserId},
};

/// Table from operation to required capability.
///
/// Operations without an entry fall back to the default: unrestricted,
/// except `Destroy` which requires the elevated role.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: HashMap<Operation, Capability>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the requirement for one operation.
    pub fn with(mut self, operation: Operation, capability: Capability) -> Self {
        self.rules.insert(operation, capability);
        self
    }

    /// The capability required for an operation.
    pub fn requirement(&self, operation: Operation) -> Capability {
        self.rules.get(&operation).cloned().unwrap_or(match operation {
            Operation::Destroy => Capability::Elevated,
            _ => Capability::Anyone,
        })
    }

    /// Check a caller against the table. `owner` is the record's creator
    /// reference, when the operation targets a single existing record.
    pub fn authorize(&self, operation: Operation, caller: Option<&CurrentUser>, owner: Option<UserId>, resource: &str) -> Result<(), Error> {
        let required = self.requirement(operation);
        if satisfies(&required, caller, owner) {
            return Ok(());
        }

        match caller {
            None => Err(Error::Unauthenticated { message: None }),
            Some(_) => Err(Error::Forbidden {
                action: operation,
                resource: resource.to_string(),
            }),
        }
    }
}

fn satisfies(capability: &Capability, caller: Option<&CurrentUser>, owner: Option<UserId>) -> bool {
    match capability {
        Capability::Anyone => true,
        Capability::Authenticated => caller.is_some(),
        Capability::Elevated => caller.map(|u| u.is_elevated()).unwrap_or(false),
        Capability::Owner => match (caller, owner) {
            (Some(user), Some(owner_id)) => user.id == owner_id,
            _ => false,
        },
        Capability::AnyOf(options) => options.iter().any(|c| satisfies(c, caller, owner)),
    }
}

/// Elevated-or-owner, the usual requirement for mutating someone's record.
pub fn elevated_or_owner() -> Capability {
    Capability::AnyOf(vec![Capability::Elevated, Capability::Owner])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use uuid::Uuid;

    fn user(role: Role) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            username: "u".to_string(),
            email: "u@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_default_policy_allows_reads_restricts_destroy() {
        let policy = AccessPolicy::new();
        let customer = user(Role::Customer);
        let admin = user(Role::Admin);

        assert!(policy.authorize(Operation::List, None, None, "mails").is_ok());
        assert!(policy.authorize(Operation::Create, Some(&customer), None, "mails").is_ok());

        // Destroy defaults to elevated-only
        let err = policy.authorize(Operation::Destroy, Some(&customer), None, "mails").unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
        assert!(policy.authorize(Operation::Destroy, Some(&admin), None, "mails").is_ok());

        // An anonymous caller failing a check gets a 401, not a 403
        let err = policy.authorize(Operation::Destroy, None, None, "mails").unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_owner_check_uses_record_owner() {
        let policy = AccessPolicy::new().with(Operation::Update, elevated_or_owner());
        let owner = user(Role::Customer);
        let stranger = user(Role::Customer);
        let admin = user(Role::Admin);

        assert!(policy.authorize(Operation::Update, Some(&owner), Some(owner.id), "mails").is_ok());
        assert!(policy.authorize(Operation::Update, Some(&admin), Some(owner.id), "mails").is_ok());
        assert!(policy
            .authorize(Operation::Update, Some(&stranger), Some(owner.id), "mails")
            .is_err());

        // No recorded owner: only elevated passes
        assert!(policy.authorize(Operation::Update, Some(&owner), None, "mails").is_err());
        assert!(policy.authorize(Operation::Update, Some(&admin), None, "mails").is_ok());
    }

    #[test]
    fn test_authenticated_requirement() {
        let policy = AccessPolicy::new().with(Operation::List, Capability::Authenticated);

        assert!(policy.authorize(Operation::List, None, None, "mails").is_err());
        assert!(policy.authorize(Operation::List, Some(&user(Role::Customer)), None, "mails").is_ok());
    }
}
