//! BDD step definitions for firewatch service

pub mod dashboard_steps;
pub mod ingest_steps;
pub mod persistence_steps;
pub mod projection_steps;
pub mod session_steps;
