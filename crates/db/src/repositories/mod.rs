//! Repository layer for database access.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept a pool (or, where a handler needs a transaction, any
//! `PgExecutor`) as the first argument.

pub mod ai_model_repo;
pub mod diagnosis_repo;
pub mod patient_repo;
pub mod session_repo;
pub mod user_repo;

pub use ai_model_repo::AiModelRepo;
pub use diagnosis_repo::DiagnosisRepo;
pub use patient_repo::PatientRepo;
pub use session_repo::SessionRepo;
pub use user_repo::UserRepo;
