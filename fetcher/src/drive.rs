//! Minimal Google Drive v3 client.
//!
//! Only the four calls the fetcher needs: list, streaming media download,
//! parent lookup, and the add/remove-parents move. Everything else about the
//! Drive API is out of scope.

use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;

use crate::auth::{ServiceAccountKey, TokenProvider};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Drive API error ({status}): {detail}")]
    Api {
        status: reqwest::StatusCode,
        detail: String,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("auth failed: {0}")]
    Auth(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One entry from the remote listing. Identity is `id`; `name` is display only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Drive serializes int64 fields as JSON strings.
    #[serde(default)]
    pub size: Option<String>,
}

impl DriveFile {
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct FileParentsResponse {
    #[serde(default)]
    parents: Vec<String>,
}

/// AND-join the base filter with a parent-folder predicate when a folder
/// scope is configured.
pub fn build_query(base: &str, folder_id: Option<&str>) -> String {
    match folder_id {
        Some(folder) => format!("{} and '{}' in parents", base, folder),
        None => base.to_string(),
    }
}

pub struct DriveClient {
    http: reqwest::Client,
    auth: TokenProvider,
    base_url: String,
}

impl DriveClient {
    pub fn new(key: ServiceAccountKey) -> Self {
        let http = reqwest::Client::new();
        Self {
            auth: TokenProvider::new(key, http.clone()),
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API host (used by tests).
    #[allow(dead_code)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn token(&self) -> Result<String, DriveError> {
        self.auth
            .token()
            .await
            .map_err(|e| DriveError::Auth(format!("{e:#}")))
    }

    /// Check response status; on error, read the body for the detail message.
    async fn ensure_ok(resp: reqwest::Response) -> Result<reqwest::Response, DriveError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            Err(DriveError::Api { status, detail })
        }
    }

    /// List files matching `query`. Fetches the first page only (up to 100
    /// files), as the original deployment did; files beyond it are picked up
    /// on a later cycle once earlier ones have been archived away. No
    /// ordering is assumed.
    pub async fn list_files(&self, query: &str) -> Result<Vec<DriveFile>, DriveError> {
        let token = self.token().await?;
        let resp = self
            .http
            .get(format!("{}/drive/v3/files", self.base_url))
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("spaces", "drive"),
                ("fields", "files(id, name, mimeType, size)"),
                ("pageSize", "100"),
            ])
            .send()
            .await?;
        let list: FileListResponse = Self::ensure_ok(resp).await?.json().await?;
        Ok(list.files)
    }

    /// Stream the file's media content to `dest`, logging incremental
    /// progress. Returns the number of bytes written.
    pub async fn download_to(&self, file: &DriveFile, dest: &Path) -> Result<u64, DriveError> {
        let token = self.token().await?;
        let resp = self
            .http
            .get(format!("{}/drive/v3/files/{}", self.base_url, file.id))
            .query(&[("alt", "media")])
            .bearer_auth(token)
            .send()
            .await?;
        let resp = Self::ensure_ok(resp).await?;

        let total = file.size_bytes();
        let mut out = tokio::fs::File::create(dest).await?;
        let mut stream = resp.bytes_stream();
        let mut written: u64 = 0;
        let mut last_pct: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if let Some(total) = total.filter(|t| *t > 0) {
                let pct = written * 100 / total;
                if pct >= last_pct + 25 {
                    tracing::info!(file = %file.name, "downloading: {}%", pct.min(100));
                    last_pct = pct;
                }
            }
        }
        out.flush().await?;

        Ok(written)
    }

    /// Current parent folder set of a remote file.
    pub async fn parents(&self, file_id: &str) -> Result<Vec<String>, DriveError> {
        let token = self.token().await?;
        let resp = self
            .http
            .get(format!("{}/drive/v3/files/{}", self.base_url, file_id))
            .query(&[("fields", "parents")])
            .bearer_auth(token)
            .send()
            .await?;
        let body: FileParentsResponse = Self::ensure_ok(resp).await?.json().await?;
        Ok(body.parents)
    }

    /// Reparent the file under `add`, removing all of `remove`. This is a
    /// move, not a copy; the remote display name is unchanged.
    pub async fn move_to_folder(
        &self,
        file_id: &str,
        add: &str,
        remove: &[String],
    ) -> Result<(), DriveError> {
        let token = self.token().await?;
        let remove = remove.join(",");
        let resp = self
            .http
            .patch(format!("{}/drive/v3/files/{}", self.base_url, file_id))
            .query(&[("addParents", add), ("removeParents", remove.as_str())])
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::ensure_ok(resp).await?;
        Ok(())
    }
}
