//! Shared types for the graph-harvester workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
