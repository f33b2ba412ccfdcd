//! API layer: request/response models, handlers and the generic resource
//! controller they share.

pub mod controller;
pub mod handlers;
pub mod models;
