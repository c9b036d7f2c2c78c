use std::borrow::Cow;
use std::collections::HashMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use schemars::JsonSchema;
use serde::Serialize;
use validator::ValidationErrors;

/// Tracing target for error responses.
const TRACING_TARGET: &str = "leadhook_server::handler::response";

/// A single field that failed validation.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ValidationErrorDetail {
    /// Field name that failed validation
    pub field: String,
    /// Validator code, e.g. `length`
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<HashMap<String, serde_json::Value>>,
}

/// JSON body of every error response.
///
/// `context` and `status` stay on the server: the first is logged, the
/// second becomes the response status line.
#[must_use = "error responses do nothing unless serialized"]
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse<'a> {
    /// Stable error identifier, e.g. `not_found`
    pub name: Cow<'a, str>,
    /// Message safe to show to the client
    pub message: Cow<'a, str>,
    /// The resource the error relates to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Cow<'a, str>>,
    /// How to resolve the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Cow<'a, str>>,
    /// Field-level validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Vec<ValidationErrorDetail>>,

    #[serde(skip)]
    pub context: Option<Cow<'a, str>>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl<'a> ErrorResponse<'a> {
    // 4xx Client Errors
    pub const BAD_REQUEST: Self = Self::new(
        "bad_request",
        "Invalid request data.",
        StatusCode::BAD_REQUEST,
    );
    // 5xx Server Errors
    pub const INTERNAL_SERVER_ERROR: Self = Self::new(
        "internal_server_error",
        "Internal server error.",
        StatusCode::INTERNAL_SERVER_ERROR,
    );
    pub const MISSING_PATH_PARAM: Self = Self::new(
        "missing_path_param",
        "Missing path parameter.",
        StatusCode::BAD_REQUEST,
    );
    pub const NOT_FOUND: Self =
        Self::new("not_found", "Resource not found.", StatusCode::NOT_FOUND);
    pub const SERVICE_UNAVAILABLE: Self = Self::new(
        "service_unavailable",
        "Service unavailable.",
        StatusCode::SERVICE_UNAVAILABLE,
    );
    pub const VALIDATION_ERROR: Self = Self::new(
        "validation_error",
        "Validation failed.",
        StatusCode::BAD_REQUEST,
    );

    #[inline]
    pub const fn new(name: &'a str, message: &'a str, status: StatusCode) -> Self {
        Self {
            name: Cow::Borrowed(name),
            message: Cow::Borrowed(message),
            resource: None,
            suggestion: None,
            validation: None,
            context: None,
            status,
        }
    }

    /// Sets the resource, joining with any existing one as `a/b`.
    pub fn with_resource(mut self, resource: impl Into<Cow<'a, str>>) -> Self {
        let new_resource = resource.into();
        self.resource = Some(match self.resource {
            Some(existing) => Cow::Owned(format!("{existing}/{new_resource}")),
            None => new_resource,
        });
        self
    }

    /// Appends a sentence to the base message.
    pub fn with_message(mut self, message: impl Into<Cow<'a, str>>) -> Self {
        let new_message = message.into();
        let base = self.message.trim_end_matches('.');
        self.message = Cow::Owned(format!("{base}. {new_message}"));
        self
    }

    pub fn with_context(mut self, context: impl Into<Cow<'a, str>>) -> Self {
        let new_context = context.into();
        self.context = Some(match self.context {
            Some(existing) => Cow::Owned(format!("{existing}; {new_context}")),
            None => new_context,
        });
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<Cow<'a, str>>) -> Self {
        let new_suggestion = suggestion.into();
        self.suggestion = Some(match self.suggestion {
            Some(existing) => Cow::Owned(format!("{existing}; {new_suggestion}")),
            None => new_suggestion,
        });
        self
    }

    pub fn with_validation_errors(mut self, errors: Vec<ValidationErrorDetail>) -> Self {
        self.validation = Some(errors);
        self
    }

    /// Builds a `validation_error` response listing every failing field.
    pub fn from_validation_errors(validation_errors: ValidationErrors) -> Self {
        let mut details = Vec::new();

        for (field, field_errors) in validation_errors.field_errors() {
            for error in field_errors {
                let params: HashMap<String, serde_json::Value> = error
                    .params
                    .iter()
                    .filter(|(key, _)| *key != "value")
                    .map(|(key, value)| (key.to_string(), value.clone()))
                    .collect();

                details.push(ValidationErrorDetail {
                    field: field.to_string(),
                    code: error.code.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Validation failed for field '{field}'")),
                    params: (!params.is_empty()).then_some(params),
                });
            }
        }

        details.sort_by(|a, b| a.field.cmp(&b.field));
        Self::VALIDATION_ERROR.with_validation_errors(details)
    }
}

impl Default for ErrorResponse<'_> {
    #[inline]
    fn default() -> Self {
        Self::INTERNAL_SERVER_ERROR
    }
}

impl From<ValidationErrors> for ErrorResponse<'_> {
    fn from(errors: ValidationErrors) -> Self {
        Self::from_validation_errors(errors)
    }
}

impl IntoResponse for ErrorResponse<'_> {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                target: TRACING_TARGET,
                status = %self.status,
                name = %self.name,
                message = %self.message,
                resource = ?self.resource,
                context = ?self.context,
                "HTTP error response"
            );
        } else {
            tracing::warn!(
                target: TRACING_TARGET,
                status = %self.status,
                name = %self.name,
                message = %self.message,
                resource = ?self.resource,
                context = ?self.context,
                "HTTP error response"
            );
        }
        (self.status, Json(self)).into_response()
    }
}
