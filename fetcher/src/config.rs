use std::path::PathBuf;
use std::time::Duration;

/// Process-wide configuration, read from the environment once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub credentials_path: PathBuf,
    pub download_dir: PathBuf,
    pub query: String,
    pub poll_interval: Duration,
    /// Restrict the listing to a single Drive folder.
    pub folder_id: Option<String>,
    /// Drive folder processed files are moved into. When unset, files stay
    /// where they are and get re-listed every cycle.
    pub archive_folder_id: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            credentials_path: std::env::var("GOOGLE_APPLICATION_CREDENTIALS")
                .unwrap_or_else(|_| "/creds/service_account.json".to_string())
                .into(),
            download_dir: std::env::var("DOWNLOAD_DIR")
                .unwrap_or_else(|_| "/downloads".to_string())
                .into(),
            query: std::env::var("DRIVE_QUERY")
                .unwrap_or_else(|_| "mimeType contains 'image/'".to_string()),
            poll_interval: Duration::from_secs(
                std::env::var("POLL_INTERVAL")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
            ),
            folder_id: std::env::var("DRIVE_FOLDER_ID").ok().filter(|s| !s.is_empty()),
            archive_folder_id: std::env::var("ARCHIVE_FOLDER_ID")
                .ok()
                .filter(|s| !s.is_empty()),
        })
    }
}
