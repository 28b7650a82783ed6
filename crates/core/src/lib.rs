//! Domain primitives for the retinopathy screening service.
//!
//! Everything here is pure: no I/O, no database access. The `db`, `api`,
//! `inference` and `report` crates build on these types.

pub mod analytics;
pub mod error;
pub mod hashing;
pub mod otp;
pub mod secrets;
pub mod severity;
pub mod suggestions;
pub mod types;
pub mod uploads;
pub mod validation;
