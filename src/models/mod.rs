//! Data models for the lookup gateway.
//!
//! Each module contains the database row structs and the request/response
//! types for one area of the domain.

pub mod api_key;
pub mod audit_log;
pub mod cache_entry;
pub mod tipo;
