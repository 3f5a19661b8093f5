//! Auth-domain models: bearer tokens, their lifecycle status, and redacted secrets.

pub mod secret;
pub mod token;

pub use secret::*;
pub use token::*;
