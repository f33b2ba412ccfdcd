//! Database repositories, one per table.
//!
//! Repositories borrow a `PgConnection` so callers decide whether work runs
//! on a pool connection or inside a transaction. CRUD-shaped tables
//! implement the [`repository::Repository`] trait; auxiliary tables
//! (tokens, logs) expose purpose-built methods instead.

pub mod access_logs;
pub mod groups;
pub mod mails;
pub mod one_time_tokens;
pub mod repository;
pub mod revoked_tokens;
pub mod users;

pub use access_logs::AccessLogs;
pub use groups::Groups;
pub use mails::Mails;
pub use one_time_tokens::OneTimeTokens;
pub use repository::Repository;
pub use revoked_tokens::RevokedTokens;
pub use users::Users;
