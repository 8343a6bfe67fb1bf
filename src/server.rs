//! HTTP boundary of the docgen service.
//! Routes, shared state, request validation and the serve loop.

use crate::binder::NullPolicy;
use crate::config::Config;
use crate::constants::DOCX_CONTENT_TYPE;
use crate::error::{Error, Result};
use crate::generator::DocumentGenerator;
use crate::loader::LocalLoader;
use crate::renderer::{
    download_file_name, sanitize_file_name, MiniJinjaRenderer, TemplateRenderer,
};
use crate::response::error_response;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Per-request generation options.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerateOptions {
    /// Overrides the configured null-getter policy
    pub strict: Option<bool>,
    /// Overrides the configured download file name pattern
    pub file_name: Option<String>,
}

/// Body of `POST /generate-document`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerateRequest {
    pub template_name: Option<String>,
    pub data: Option<Value>,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    /// Checks required fields, reporting all missing ones at once.
    ///
    /// # Returns
    /// * `Result<(String, Value)>` - Template name and data context
    pub fn validate(self) -> Result<(String, Value)> {
        let template_name = self.template_name.filter(|n| !n.trim().is_empty());
        let data = self.data.filter(|d| !d.is_null());

        match (template_name, data) {
            (Some(name), Some(data)) => Ok((name, data)),
            (name, data) => {
                let mut missing = Vec::new();
                if name.is_none() {
                    missing.push("templateName");
                }
                if data.is_none() {
                    missing.push("data");
                }
                Err(Error::missing_fields(missing))
            }
        }
    }
}

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub generator: DocumentGenerator,
    pub renderer: Arc<dyn TemplateRenderer>,
}

impl AppState {
    /// Builds the state from a configuration.
    ///
    /// # Errors
    /// * `Error::Config` if the template glob or file name pattern is invalid
    pub fn new(config: Config) -> Result<Self> {
        let loader = LocalLoader::new(
            &config.templates_dir,
            config.max_template_bytes,
            &config.template_glob,
        )?;
        let generator = DocumentGenerator::new(
            Arc::new(loader),
            config.max_uncompressed_bytes,
            config.linebreaks,
        );
        let renderer: Arc<dyn TemplateRenderer> = Arc::new(MiniJinjaRenderer::new());
        download_file_name(
            renderer.as_ref(),
            &config.file_name_pattern,
            "check.docx",
            Local::now(),
        )
        .map_err(|e| Error::Config(format!("invalid fileNamePattern: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            generator,
            renderer,
        })
    }

    fn expose_details(&self) -> bool {
        !self.config.is_production()
    }
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/templates", get(templates_handler))
        .route("/generate-document", post(generate_document_handler))
        .layer(from_fn_with_state(state.clone(), cors_middleware))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok", "message": "docgen is running"}))
}

async fn templates_handler(State(state): State<AppState>) -> Response {
    let generator = state.generator.clone();
    let listed = tokio::task::spawn_blocking(move || generator.loader().list()).await;
    match listed {
        Ok(Ok(templates)) => Json(json!({
            "templatesDir": state.generator.loader().root().display().to_string(),
            "templates": templates,
        }))
        .into_response(),
        Ok(Err(err)) => error_response(&err, state.expose_details()),
        Err(join) => error_response(
            &Error::Internal(format!("template listing task failed: {join}")),
            state.expose_details(),
        ),
    }
}

async fn generate_document_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected generation request: {}", rejection.body_text());
            let status = rejection.status();
            let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
                "PayloadTooLargeError"
            } else {
                "InputValidationError"
            };
            let body = json!({"error": kind, "message": rejection.body_text()});
            return (status, Json(body)).into_response();
        }
    };

    let options = request.options.clone();
    let (template_name, data) = match request.validate() {
        Ok(valid) => valid,
        Err(err) => return error_response(&err, state.expose_details()),
    };
    let policy = match options.strict {
        Some(true) => NullPolicy::Strict,
        Some(false) => NullPolicy::Lenient,
        None => state.config.default_policy,
    };
    info!("Generating '{}' ({:?} policy).", template_name, policy);
    debug!("Data context: {}", data);

    let generator = state.generator.clone();
    let name = template_name.clone();
    let generated =
        tokio::task::spawn_blocking(move || generator.generate(&name, &data, policy)).await;

    let bytes = match generated {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(err)) => return error_response(&err, state.expose_details()),
        Err(join) => {
            return error_response(
                &Error::Internal(format!("generation task failed: {join}")),
                state.expose_details(),
            )
        }
    };

    let file_name = match options.file_name {
        Some(name) => Ok(sanitize_file_name(&name)),
        None => download_file_name(
            state.renderer.as_ref(),
            &state.config.file_name_pattern,
            &template_name,
            Local::now(),
        ),
    };
    let file_name = match file_name {
        Ok(name) => name,
        Err(err) => return error_response(&err, state.expose_details()),
    };
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"documento.docx\""));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(DOCX_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

fn allowed_origin(state: &AppState, origin: Option<&HeaderValue>) -> Option<HeaderValue> {
    let origins = &state.config.cors_allowed_origins;
    if origins.iter().any(|o| o == "*") {
        return Some(HeaderValue::from_static("*"));
    }
    let origin = origin?;
    let value = origin.to_str().ok()?;
    origins.iter().any(|o| o == value).then(|| origin.clone())
}

async fn cors_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let origin = allowed_origin(&state, req.headers().get(header::ORIGIN));

    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    if let Some(origin) = origin {
        let headers = resp.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET,POST,OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("content-type,accept,authorization"),
        );
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("content-disposition"),
        );
    }
    resp
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutting down.");
}

/// Binds the listener and serves until Ctrl-C.
///
/// # Errors
/// * `Error::Io` if the address cannot be bound or the server fails
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://localhost:{}/api/health", state.config.port);
    info!("Templates directory: {}", state.generator.loader().root().display());

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_every_missing_field() {
        let err = GenerateRequest::default().validate().unwrap_err();
        match err {
            Error::InvalidInput { missing, .. } => {
                assert_eq!(missing, vec!["templateName", "data"])
            }
            other => panic!("unexpected {other:?}"),
        }

        let request = GenerateRequest {
            template_name: Some("a.docx".to_string()),
            data: Some(Value::Null),
            options: GenerateOptions::default(),
        };
        match request.validate().unwrap_err() {
            Error::InvalidInput { missing, .. } => assert_eq!(missing, vec!["data"]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
