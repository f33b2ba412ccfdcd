//! HTTP request handlers for all API endpoints.
//!
//! Each handler is responsible for:
//! - Request validation and deserialization
//! - Authentication and authorization checks
//! - Business logic execution via database repositories
//! - Response serialization
//!
//! CRUD-shaped resources delegate to [`crate::api::controller`], which
//! composes policy checks, response caching, pagination and soft deletion
//! uniformly.
//!
//! # Handler Modules
//!
//! - [`auth`]: registration, login, token lifecycle and password flows
//! - [`breweries`]: proxy to the public brewery directory
//! - [`mails`]: mail record CRUD and bulk operations
//! - [`users`]: user administration and self-service profile routes

pub mod auth;
pub mod breweries;
pub mod mails;
pub mod users;
