// Domain module - Configuration, errors and probe data model
pub mod config;
pub mod error;
pub mod probe;
