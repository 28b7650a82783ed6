//! Row models and DTOs, one module per table.

pub mod ai_model;
pub mod diagnosis;
pub mod patient;
pub mod session;
pub mod user;
