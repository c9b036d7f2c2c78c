//! Request extractors with consistent error responses.
//!
//! Every extractor here rejects with [`handler::Error`], so malformed bodies,
//! path segments and query strings produce the same JSON error shape as
//! handler failures. Each one also implements [`aide::OperationInput`] so the
//! OpenAPI document describes it.
//!
//! - [`Json`]: JSON body, also used as the response wrapper
//! - [`ValidateJson`]: JSON body checked with `validator`
//! - [`Path`]: path parameters
//! - [`Query`]: query string parameters
//!
//! [`handler::Error`]: crate::handler::Error

pub mod reject;

pub use crate::extract::reject::{Json, Path, Query, ValidateJson};
