//! Business logic services.
//!
//! Services contain the database operations and the upstream client. Handlers
//! orchestrate the admission pipeline over these.

pub mod auth_service;
pub mod cache_service;
pub mod upstream;
