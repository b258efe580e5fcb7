//! Shared types for the authenticated request pipeline

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
