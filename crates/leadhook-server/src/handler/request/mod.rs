//! Request types for HTTP handlers.

mod paginations;
mod paths;
mod webhooks;

pub use paginations::*;
pub use paths::*;
pub use webhooks::*;
