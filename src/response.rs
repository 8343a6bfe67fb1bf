//! Translation of docgen errors into HTTP responses.

use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::{json, Value};

/// Maps an error to its HTTP status.
#[must_use]
pub fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput { .. } | Error::PlaceholderResolution(_) => StatusCode::BAD_REQUEST,
        Error::TemplateNotFound { .. } => StatusCode::NOT_FOUND,
        Error::TemplateTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Name of the error class reported in the `error` field.
#[must_use]
pub fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::InvalidInput { .. } => "InputValidationError",
        Error::TemplateNotFound { .. } => "TemplateNotFoundError",
        Error::TemplateTooLarge { .. } => "TemplateTooLargeError",
        Error::PlaceholderResolution(_) => "PlaceholderResolutionError",
        _ => "InternalError",
    }
}

/// Builds the JSON body for an error.
///
/// Internal details are only included when `expose_details` is set.
#[must_use]
pub fn error_body(err: &Error, expose_details: bool) -> Value {
    let kind = error_kind(err);
    match err {
        Error::InvalidInput { missing, message } => json!({
            "error": kind,
            "message": message,
            "missing": missing,
        }),
        Error::TemplateNotFound { name, path } => json!({
            "error": kind,
            "message": format!("Template '{name}' was not found in the templates directory"),
            "path": path,
        }),
        Error::TemplateTooLarge { size, limit, .. } => json!({
            "error": kind,
            "message": err.to_string(),
            "sizeBytes": size,
            "limitBytes": limit,
        }),
        Error::PlaceholderResolution(errors) => json!({
            "error": kind,
            "message": err.to_string(),
            "details": errors,
        }),
        _ => {
            let mut body = json!({
                "error": kind,
                "message": "An unexpected error occurred while generating the document",
            });
            if expose_details {
                body["detail"] = Value::String(err.to_string());
            }
            body
        }
    }
}

/// Converts an error into a complete response.
#[must_use]
pub fn error_response(err: &Error, expose_details: bool) -> Response {
    let status = error_status(err);
    if status.is_server_error() {
        error!("{}", err);
    }
    (status, Json(error_body(err, expose_details))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PlaceholderError, PlaceholderErrorCode};

    #[test]
    fn test_statuses() {
        assert_eq!(error_status(&Error::missing_fields(["data"])), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_status(&Error::TemplateNotFound {
                name: "a".into(),
                path: "/t/a".into(),
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&Error::Archive("bad".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_hidden_in_production() {
        let err = Error::Archive("corrupt central directory".into());
        let detail = error_body(&err, true)["detail"].to_string();
        assert!(detail.contains("corrupt"));
        assert!(error_body(&err, false).get("detail").is_none());
    }

    #[test]
    fn test_placeholder_details() {
        let err = Error::PlaceholderResolution(vec![PlaceholderError::new(
            "nomeColaborador",
            PlaceholderErrorCode::UndefinedValue,
            "word/document.xml",
            "missing",
        )]);
        let body = error_body(&err, false);
        assert_eq!(body["details"][0]["id"], "nomeColaborador");
        assert_eq!(body["details"][0]["code"], "undefined_value");
    }
}
