//! Drop-in replacements for the axum extractors with richer rejections.

pub mod enhanced_json;
pub mod enhanced_path;
pub mod enhanced_query;
pub mod validated_json;

pub use self::enhanced_json::Json;
pub use self::enhanced_path::Path;
pub use self::enhanced_query::Query;
pub use self::validated_json::ValidateJson;

/// Keeps the first lines of a rejection message, bounded in length.
pub(crate) fn sanitize_error_message(message: &str, max_lines: usize, max_chars: usize) -> String {
    message
        .lines()
        .take(max_lines)
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::sanitize_error_message;

    #[test]
    fn sanitize_bounds_lines_and_length() {
        let message = "first line\nsecond line\nthird line";
        assert_eq!(sanitize_error_message(message, 2, 200), "first line second line");
        assert_eq!(sanitize_error_message(message, 3, 5), "first");
    }
}
