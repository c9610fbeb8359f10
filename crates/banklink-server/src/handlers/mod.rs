//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod auth;
pub mod customers;
pub mod health;
pub mod objects;
pub mod uploads;

// Re-export all handlers for use in router
pub use auth::*;
pub use customers::*;
pub use health::*;
pub use objects::*;
pub use uploads::*;
