pub mod account;
pub mod ai_models;
pub mod auth;
pub mod dashboard;
pub mod patients;
pub mod prediction;
pub mod reports;
