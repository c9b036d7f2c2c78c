//! Query string extractor.

use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRequestParts, Query as AxumQuery};
use axum::http::request::Parts;
use derive_more::{Deref, DerefMut, From};
use serde::de::DeserializeOwned;

use crate::handler::{Error, ErrorKind};

/// Tracing target for query extraction.
const TRACING_TARGET: &str = "leadhook_server::extract::query";

/// Query extractor that names the offending parameter on failure.
///
/// ```rust,no_run
/// use leadhook_server::extract::Query;
/// use leadhook_server::handler::request::PaginationParams;
///
/// async fn list(Query(pagination): Query<PaginationParams>) {
///     let _ = pagination.into_pagination();
/// }
/// ```
#[must_use]
#[derive(Debug, Clone, Copy, Default, Deref, DerefMut, From)]
pub struct Query<T>(pub T);

impl<T> Query<T> {
    #[inline]
    pub fn new(inner: T) -> Self {
        Self(inner)
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AxumQuery::<T>::from_request_parts(parts, state).await {
            Ok(AxumQuery(query)) => Ok(Query(query)),
            Err(rejection) => Err(enhance_query_error(rejection)),
        }
    }
}

fn enhance_query_error(rejection: QueryRejection) -> Error<'static> {
    tracing::debug!(
        target: TRACING_TARGET,
        error = %rejection,
        "Query parameter parsing failed"
    );

    let error_message = match rejection {
        QueryRejection::FailedToDeserializeQueryString(err) => err.body_text(),
        other => {
            return ErrorKind::BadRequest
                .with_message("Invalid query parameters")
                .with_context(other.body_text());
        }
    };
    let field_name = extract_field_name(&error_message).unwrap_or("unknown").to_owned();

    if error_message.contains("missing field") {
        ErrorKind::BadRequest
            .with_message(format!("Missing required query parameter '{field_name}'"))
    } else if error_message.contains("duplicate field") {
        ErrorKind::BadRequest
            .with_message(format!("Query parameter '{field_name}' was given more than once"))
    } else {
        ErrorKind::BadRequest
            .with_message("Invalid query parameters")
            .with_context(error_message)
    }
}

/// Pulls the field name out of serde messages such as ``missing field `limit` ``.
fn extract_field_name(error_message: &str) -> Option<&str> {
    if let Some(start) = error_message.find('`')
        && let Some(end) = error_message[start + 1..].find('`')
    {
        return Some(&error_message[start + 1..start + 1 + end]);
    }

    if let Some(start) = error_message.find("field ") {
        let rest = &error_message[start + 6..];
        return rest.split_whitespace().next();
    }

    None
}

impl<T> aide::OperationInput for Query<T>
where
    T: schemars::JsonSchema,
{
    fn operation_input(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) {
        <AxumQuery<T> as aide::OperationInput>::operation_input(ctx, operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_are_extracted() {
        assert_eq!(extract_field_name("missing field `limit`"), Some("limit"));
        assert_eq!(
            extract_field_name("duplicate field offset at line 1"),
            Some("offset")
        );
        assert_eq!(extract_field_name("some other error"), None);
    }
}
