//! Repository implementations for database operations

pub mod models;
pub mod simulations;

pub use models::*;
pub use simulations::*;
