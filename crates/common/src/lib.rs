//! Types shared by the relay crates: secret wrapper and configuration errors

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
