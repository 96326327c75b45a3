//! Database module for urlpulse.
//!
//! Provides SQLite storage for check results with embedded migrations.

mod models;
mod store;

pub use models::*;
pub use store::*;
