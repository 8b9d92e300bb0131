//! Security building blocks used by the admission pipeline.
//!
//! - `anti_sql`: stateless input heuristics (injection detection, shape
//!   validation, masking, log sanitization)
//! - `anti_replay`: in-memory nonce/fingerprint/flood ledger
//! - `integrity`: structural inspection of upstream response payloads

pub mod anti_replay;
pub mod anti_sql;
pub mod integrity;
