//! Database entity models: create/update request structs and row types.

pub mod access_logs;
pub mod groups;
pub mod mails;
pub mod one_time_tokens;
pub mod revoked_tokens;
pub mod users;
