//! Database layer: repositories, entity models and error taxonomy.

pub mod errors;
pub mod handlers;
pub mod models;
