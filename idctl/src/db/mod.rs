//! Database layer: repositories, models, and error handling.

pub mod errors;
pub mod handlers;
pub mod models;
