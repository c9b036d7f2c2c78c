//! JSON extractor with `validator` checks.

use std::borrow::Cow;
use std::collections::HashMap;

use axum::extract::{FromRequest, Request};
use derive_more::{Deref, DerefMut, From};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use super::Json;
use crate::handler::{Error, ErrorKind};

/// Tracing target for request validation.
const TRACING_TARGET: &str = "leadhook_server::extract::validate";

/// Deserializes a JSON body and runs [`Validate::validate`] on it.
///
/// Validation failures become a 400 listing every failing field.
#[must_use]
#[derive(Debug, Clone, Copy, Default, Deref, DerefMut, From)]
pub struct ValidateJson<T>(pub T);

impl<T> ValidateJson<T> {
    #[inline]
    pub fn new(inner: T) -> Self {
        Self(inner)
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T, S> FromRequest<S> for ValidateJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Error<'static>;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = <Json<T> as FromRequest<S>>::from_request(req, state).await?;
        data.validate()?;
        Ok(Self::new(data))
    }
}

fn param_u64(params: &HashMap<Cow<'static, str>, serde_json::Value>, key: &str) -> Option<u64> {
    params.get(key).and_then(serde_json::Value::as_u64)
}

fn format_length_error(
    field: &str,
    params: &HashMap<Cow<'static, str>, serde_json::Value>,
) -> String {
    match (param_u64(params, "min"), param_u64(params, "max")) {
        (Some(min), Some(max)) => {
            format!("Field '{field}' must be between {min} and {max} characters long")
        }
        (Some(min), None) => format!("Field '{field}' must be at least {min} characters long"),
        (None, Some(max)) => format!("Field '{field}' must be at most {max} characters long"),
        (None, None) => format!("Field '{field}' has invalid length"),
    }
}

fn format_range_error(
    field: &str,
    params: &HashMap<Cow<'static, str>, serde_json::Value>,
) -> String {
    match (param_u64(params, "min"), param_u64(params, "max")) {
        (Some(min), Some(max)) => format!("Field '{field}' must be between {min} and {max}"),
        (Some(min), None) => format!("Field '{field}' must be at least {min}"),
        (None, Some(max)) => format!("Field '{field}' must be at most {max}"),
        (None, None) => format!("Field '{field}' is out of range"),
    }
}

fn format_validation_error(field: &str, error: &validator::ValidationError) -> String {
    if let Some(custom_message) = &error.message {
        return format!("Field '{field}': {custom_message}");
    }

    match &*error.code {
        "length" => format_length_error(field, &error.params),
        "range" => format_range_error(field, &error.params),
        "url" => format!("Field '{field}' must be a valid URL"),
        "required" => format!("Field '{field}' is required"),
        code => format!("Field '{field}' failed validation: {code}"),
    }
}

impl From<ValidationErrors> for Error<'static> {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, field_errors)| {
                field_errors
                    .iter()
                    .map(move |error| format_validation_error(field, error))
            })
            .collect();
        messages.sort();

        tracing::warn!(
            target: TRACING_TARGET,
            errors = ?errors.field_errors(),
            "Request validation failed"
        );

        let message = if messages.is_empty() {
            "Validation failed".to_owned()
        } else {
            messages.join(". ")
        };

        ErrorKind::BadRequest
            .with_message(message)
            .with_resource("request")
    }
}

impl<T> aide::OperationInput for ValidateJson<T>
where
    T: schemars::JsonSchema,
{
    fn operation_input(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) {
        <Json<T> as aide::OperationInput>::operation_input(ctx, operation);
    }

    fn inferred_early_responses(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) -> Vec<(Option<u16>, aide::openapi::Response)> {
        <Json<T> as aide::OperationInput>::inferred_early_responses(ctx, operation)
    }
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;

    #[derive(Debug, Validate)]
    struct Named {
        #[validate(length(min = 1, max = 8))]
        name: String,
    }

    #[test]
    fn length_errors_name_the_bounds() {
        let errors = Named {
            name: String::new(),
        }
        .validate()
        .unwrap_err();

        let error = Error::from(errors);
        assert_eq!(error.kind(), ErrorKind::BadRequest);
        assert_eq!(
            error.message(),
            Some("Field 'name' must be between 1 and 8 characters long")
        );
    }
}
