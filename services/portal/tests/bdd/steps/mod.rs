//! BDD step definitions for the portal client

pub mod config_steps;
pub mod health_steps;
pub mod polling_steps;
pub mod session_steps;
