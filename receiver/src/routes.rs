//! HTTP surface: health probe plus the multipart upload endpoint.

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use serde::Serialize;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::Config;
use crate::error::AppError;
use crate::storage::{self, SavedFile};

pub fn router(config: Config) -> Router {
    // Body size limit - 1GB max for file uploads
    let body_limit = DefaultBodyLimit::max(1024 * 1024 * 1024);

    let x_request_id = header::HeaderName::from_static("x-request-id");

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .layer(body_limit)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(trace_layer)
        .with_state(config)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct UploadResponse {
    saved: Vec<SavedFile>,
}

/// Accept one or more `file` parts plus an optional `subdir` text part.
///
/// Files are saved independently; the first write failure aborts the request,
/// leaving any files saved before it on disk.
async fn upload(
    State(config): State<Config>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    // Part order in the form is not guaranteed, so collect the whole request
    // before writing anything; the subdir hint applies wherever it appears.
    let mut files: Vec<(Option<String>, axum::body::Bytes)> = Vec::new();
    let mut subdir_field: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed reading upload: {}", e)))?;
                files.push((filename, data));
            }
            Some("subdir") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed reading subdir: {}", e)))?;
                subdir_field = Some(text);
            }
            // Unknown parts are ignored.
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(AppError::BadRequest("No file parts in request".into()));
    }

    // Validate the subdir before any directory is created.
    let subdir = match subdir_field.as_deref() {
        Some(s) => storage::sanitize_subdir(s)?,
        None => None,
    };

    let dir = storage::dated_dir(&config.save_root, subdir.as_deref(), Local::now());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create save dir: {}", e)))?;

    let mut saved = Vec::with_capacity(files.len());
    for (filename, data) in &files {
        saved.push(storage::save_file(&dir, filename.as_deref(), data).await?);
    }

    tracing::info!(count = saved.len(), dir = %dir.display(), "saved upload(s)");
    Ok(Json(UploadResponse { saved }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::path::{Path, PathBuf};
    use tower::ServiceExt;

    const BOUNDARY: &str = "x-test-boundary";

    fn test_router(root: &Path) -> Router {
        router(Config {
            save_root: root.to_path_buf(),
            port: 0,
        })
    }

    /// Hand-built multipart body: (field name, filename for file parts, data).
    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, f
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post_upload(app: Router, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_upload_saves_under_dated_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let body = multipart_body(&[("file", Some("a.png"), b"0123456789")]);

        let (status, json) = post_upload(app, body).await;
        assert_eq!(status, StatusCode::OK);

        let saved = json["saved"].as_array().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0]["size"], 10);
        let filename = saved[0]["filename"].as_str().unwrap();
        assert!(filename.ends_with("_a.png"));

        let path = PathBuf::from(saved[0]["path"].as_str().unwrap());
        assert!(path.starts_with(tmp.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");

        // Parent directory is the date partition, YYYY-MM-DD.
        let date_dir = path.parent().unwrap().file_name().unwrap().to_string_lossy();
        assert_eq!(date_dir.len(), 10);
        assert_eq!(date_dir.as_bytes()[4], b'-');
        assert_eq!(date_dir.as_bytes()[7], b'-');
    }

    #[tokio::test]
    async fn test_upload_with_subdir_lands_under_it() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        // Subdir part deliberately after the file part.
        let body = multipart_body(&[
            ("file", Some("a.png"), b"bytes"),
            ("subdir", None, b"campaign/2024"),
        ]);

        let (status, json) = post_upload(app, body).await;
        assert_eq!(status, StatusCode::OK);

        let path = PathBuf::from(json["saved"][0]["path"].as_str().unwrap());
        assert!(path.starts_with(tmp.path().join("campaign/2024")));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_upload_rejects_traversal_subdir() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let body = multipart_body(&[
            ("file", Some("a.png"), b"bytes"),
            ("subdir", None, b"../../etc"),
        ]);

        let (status, json) = post_upload(app, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Invalid subdir"));
        // Nothing was written.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_many_files_with_same_name() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let body = multipart_body(&[
            ("file", Some("a.png"), b"one"),
            ("file", Some("a.png"), b"two!"),
        ]);

        let (status, json) = post_upload(app, body).await;
        assert_eq!(status, StatusCode::OK);

        let saved = json["saved"].as_array().unwrap();
        assert_eq!(saved.len(), 2);
        assert_ne!(saved[0]["path"], saved[1]["path"]);
        assert_eq!(saved[0]["size"], 3);
        assert_eq!(saved[1]["size"], 4);
    }

    #[tokio::test]
    async fn test_upload_without_file_part_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let body = multipart_body(&[("subdir", None, b"campaign")]);

        let (status, _) = post_upload(app, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_nameless_file_part_gets_fallback_name() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let body = multipart_body(&[("file", Some(""), b"data")]);

        let (status, json) = post_upload(app, body).await;
        assert_eq!(status, StatusCode::OK);
        let filename = json["saved"][0]["filename"].as_str().unwrap();
        assert!(filename.ends_with("_upload.bin"));
    }
}
