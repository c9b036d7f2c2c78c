//! Path parameter extractor.

use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequestParts, Path as AxumPath};
use axum::http::request::Parts;
use derive_more::{Deref, DerefMut, From};
use serde::de::DeserializeOwned;

use super::sanitize_error_message;
use crate::handler::{Error, ErrorKind};

/// Path extractor whose rejections explain the expected format.
#[must_use]
#[derive(Debug, Clone, Copy, Default, Deref, DerefMut, From)]
pub struct Path<T>(pub T);

impl<T> Path<T> {
    #[inline]
    pub fn new(inner: T) -> Self {
        Self(inner)
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send + 'static,
    S: Send + Sync,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let extractor =
            <AxumPath<T> as FromRequestParts<S>>::from_request_parts(parts, state).await;
        extractor.map(|x| Self(x.0)).map_err(Into::into)
    }
}

impl From<PathRejection> for Error<'static> {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(err) => {
                let message = err.body_text();
                ErrorKind::BadRequest
                    .with_message("Invalid path parameter")
                    .with_context(format!(
                        "{}. {}",
                        sanitize_error_message(&message, 2, 150),
                        format_hint(&message)
                    ))
            }
            PathRejection::MissingPathParams(err) => ErrorKind::MissingPathParam
                .with_message("Required path parameter missing")
                .with_context(sanitize_error_message(&err.body_text(), 2, 150)),
            other => ErrorKind::InternalServerError
                .with_message("Path processing failed")
                .with_context(format!("Unexpected path rejection: {other}")),
        }
    }
}

/// Returns a hint for the most common path parameter mistakes.
fn format_hint(error_message: &str) -> &'static str {
    let lower = error_message.to_lowercase();

    if lower.contains("uuid") || lower.contains("invalid character") {
        "Identifiers must be UUIDs, e.g. 0190b4f2-8c3a-7d41-9b2e-3f6a1c2d4e5f"
    } else if lower.contains("invalid digit") || lower.contains("cannot parse") {
        "Numeric parameters must contain only digits"
    } else {
        "Check that the parameter matches the expected type"
    }
}

impl<T> aide::OperationInput for Path<T>
where
    T: schemars::JsonSchema,
{
    fn operation_input(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) {
        <AxumPath<T> as aide::OperationInput>::operation_input(ctx, operation);
    }

    fn inferred_early_responses(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) -> Vec<(Option<u16>, aide::openapi::Response)> {
        <AxumPath<T> as aide::OperationInput>::inferred_early_responses(ctx, operation)
    }
}
