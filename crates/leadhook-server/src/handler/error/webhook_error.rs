//! Conversion from core webhook errors to HTTP errors.

use leadhook_webhook::ErrorKind as WebhookErrorKind;

use super::http_error::{Error as HttpError, ErrorKind};

/// Tracing target for webhook error conversions.
const TRACING_TARGET: &str = "leadhook_server::handler::webhook";

impl From<leadhook_webhook::Error> for HttpError<'static> {
    fn from(error: leadhook_webhook::Error) -> Self {
        if error.kind.is_client_error() {
            tracing::debug!(
                target: TRACING_TARGET,
                error = %error,
                error_kind = %error.kind,
                "Rejected webhook request"
            );
        } else {
            tracing::error!(
                target: TRACING_TARGET,
                error = %error,
                error_kind = %error.kind,
                source = ?error.source,
                "Webhook operation failed"
            );
        }

        match error.kind {
            WebhookErrorKind::InvalidInput | WebhookErrorKind::UnsafeUrl => {
                let mut http = ErrorKind::BadRequest.into_error();
                if let Some(message) = error.message {
                    http = http.with_message(message);
                }
                match error.context {
                    Some(field) => http.with_resource(field),
                    None => http,
                }
            }
            WebhookErrorKind::NotFound => ErrorKind::NotFound
                .with_message("Webhook not found")
                .with_resource("webhook"),
            WebhookErrorKind::Storage => ErrorKind::InternalServerError
                .with_message("Storage operation failed")
                .with_context(error.to_string()),
            _ => ErrorKind::InternalServerError.with_context(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_is_bad_request() {
        let error = HttpError::from(leadhook_webhook::Error::invalid_input("name must not be empty"));
        assert_eq!(error.kind(), ErrorKind::BadRequest);
        assert_eq!(error.message(), Some("name must not be empty"));
    }

    #[test]
    fn unsafe_url_names_the_field() {
        let error = HttpError::from(
            leadhook_webhook::Error::unsafe_url("private address").with_context("url"),
        );
        assert_eq!(error.kind(), ErrorKind::BadRequest);
        assert_eq!(error.resource(), Some("url"));
    }

    #[test]
    fn not_found_is_404() {
        let error = HttpError::from(leadhook_webhook::Error::not_found("missing"));
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.resource(), Some("webhook"));
    }

    #[test]
    fn storage_failures_hide_details() {
        let error = HttpError::from(leadhook_webhook::Error::storage("connection reset"));
        assert_eq!(error.kind(), ErrorKind::InternalServerError);
        assert_eq!(error.message(), Some("Storage operation failed"));
        assert!(error.context().is_some_and(|c| c.contains("connection reset")));
    }
}
