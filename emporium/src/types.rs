//! Common type definitions and access-control vocabulary.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: user account identifier
//! - [`GroupId`]: group identifier
//! - [`MailId`]: dispatched-email record identifier
//! - [`TokenId`]: one-time token identifier
//!
//! Access control is expressed with two types:
//!
//! - [`Operation`]: the controller action being performed
//! - [`Capability`]: what a caller must hold for an operation to proceed
//!
//! A per-resource table from `Operation` to `Capability` lives in
//! [`crate::auth::policy::AccessPolicy`].

use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type GroupId = Uuid;
pub type MailId = Uuid;
pub type TokenId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Controller actions a caller can request on a resource collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Retrieve,
    Create,
    Update,
    Destroy,
    DestroyAll,
    GetMany,
}

/// What a caller must hold for an operation to be allowed.
///
/// `Owner` is resolved against the record's creator reference, so it only
/// makes sense for operations that target a single existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// No restriction
    Anyone,
    /// Any authenticated account
    Authenticated,
    /// Elevated role (admin) only
    Elevated,
    /// The caller created the record
    Owner,
    /// Logical OR of several requirements
    AnyOf(Vec<Capability>),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::List => write!(f, "list"),
            Operation::Retrieve => write!(f, "retrieve"),
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Destroy => write!(f, "destroy"),
            Operation::DestroyAll => write!(f, "destroy-many"),
            Operation::GetMany => write!(f, "get-many"),
        }
    }
}
